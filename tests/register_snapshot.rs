use std::cell::Cell;

use anyhow::Result;
use pretty_assertions::assert_eq;

use shelltrace::memory::WORD_SIZE;
use shelltrace::regs::{collect, collect_on_exit};
use shelltrace::{Capabilities, Pid, ProcessInfo, RegisterBlob, RegisterSet, RegisterSource, Signal, SignalNumber};

/// Register source whose contents change each time `tick()` is called, as if the tracee
/// had run.
struct FakeTracee {
    generation: Cell<u8>,
    signo: i32,
    event: u64,
}

impl FakeTracee {
    fn new() -> Self {
        Self { generation: Cell::new(1), signo: libc::SIGTRAP, event: 0 }
    }

    fn tick(&self) {
        self.generation.set(self.generation.get() + 1);
    }
}

impl RegisterSource for FakeTracee {
    fn fetch(&self, set: RegisterSet) -> shelltrace::Result<RegisterBlob> {
        let fill = self.generation.get().wrapping_mul(set.note() as u8);
        Ok(RegisterBlob::from_bytes(vec![fill; 4 * WORD_SIZE]))
    }

    fn signal_number(&self) -> shelltrace::Result<i32> {
        Ok(self.signo)
    }

    fn event_message(&self) -> shelltrace::Result<u64> {
        Ok(self.event)
    }
}

fn info(extended_fp: bool) -> ProcessInfo {
    let caps = Capabilities::new().extended_fp(extended_fp);
    ProcessInfo::new(Pid::from_raw(1), caps)
}

#[test]
fn test_collect_rotates_generations() -> Result<()> {
    let tracee = FakeTracee::new();
    let mut info = info(false);

    collect(&tracee, &mut info)?;
    let first = info.clone();

    tracee.tick();
    collect(&tracee, &mut info)?;

    assert_eq!(info.previous_registers, first.registers);
    assert_eq!(info.previous_fp_registers, first.fp_registers);
    assert_ne!(info.registers, first.registers);
    assert_ne!(info.fp_registers, first.fp_registers);

    Ok(())
}

#[test]
fn test_collect_without_execution_is_stable() -> Result<()> {
    let tracee = FakeTracee::new();
    let mut info = info(false);

    collect(&tracee, &mut info)?;
    let first = info.registers.clone();

    collect(&tracee, &mut info)?;

    assert_eq!(info.previous_registers, first);
    assert_eq!(info.registers, first);
    assert_eq!(info.registers.changed_words(&info.previous_registers).count(), 0);

    Ok(())
}

#[test]
fn test_collect_extended_fp_capability() -> Result<()> {
    let tracee = FakeTracee::new();

    let mut without = info(false);
    collect(&tracee, &mut without)?;
    assert!(without.extended_fp_registers.is_none());
    assert!(without.previous_extended_fp_registers.is_none());

    let mut with = info(true);
    collect(&tracee, &mut with)?;
    let first = with.extended_fp_registers.clone();
    assert!(first.is_some());

    tracee.tick();
    collect(&tracee, &mut with)?;
    assert_eq!(with.previous_extended_fp_registers, first);
    assert_ne!(with.extended_fp_registers, first);

    Ok(())
}

#[test]
fn test_collect_resets_status() -> Result<()> {
    let tracee = FakeTracee::new();
    let mut info = info(false);

    info.last_signal = Some(Signal::SIGSEGV.into());
    info.exit_code = Some(3);
    info.terminating_signal = Some(Signal::SIGKILL.into());

    collect(&tracee, &mut info)?;

    assert_eq!(info.last_signal, None);
    assert_eq!(info.exit_code, None);
    assert_eq!(info.terminating_signal, None);

    Ok(())
}

#[test]
fn test_collect_on_exit_code() -> Result<()> {
    let mut tracee = FakeTracee::new();
    tracee.event = 42 << 8;

    let mut info = info(false);
    collect_on_exit(&tracee, &mut info)?;

    assert_eq!(info.last_signal, Some(Signal::SIGTRAP.into()));
    assert_eq!(info.exit_code, Some(42));
    assert_eq!(info.terminating_signal, None);
    assert!(!info.registers.is_empty());

    Ok(())
}

#[test]
fn test_collect_on_exit_signaled() -> Result<()> {
    let mut tracee = FakeTracee::new();
    tracee.event = libc::SIGSEGV as u64 | 0x80;

    let mut info = info(false);
    collect_on_exit(&tracee, &mut info)?;

    assert_eq!(info.exit_code, None);
    assert_eq!(info.terminating_signal, Some(Signal::SIGSEGV.into()));

    Ok(())
}

#[test]
fn test_collect_on_exit_realtime_signal() -> Result<()> {
    let rtmin = libc::SIGRTMIN();

    let mut tracee = FakeTracee::new();
    tracee.event = rtmin as u64;

    let mut info = info(false);
    collect_on_exit(&tracee, &mut info)?;

    assert_eq!(info.exit_code, None);
    assert_eq!(info.terminating_signal, Some(SignalNumber::from_raw(rtmin)));

    Ok(())
}

#[test]
fn test_collect_on_exit_rejects_stop_status() {
    let mut tracee = FakeTracee::new();
    tracee.event = ((libc::SIGTRAP as u64) << 8) | 0x7f;

    let mut info = info(false);
    assert!(collect_on_exit(&tracee, &mut info).is_err());
}

#[test]
fn test_changed_words() {
    let mut old = vec![0u8; 3 * WORD_SIZE];
    let mut new = old.clone();
    new[WORD_SIZE] = 1;
    new[2 * WORD_SIZE + 1] = 2;
    old[2 * WORD_SIZE + 1] = 3;

    let old = RegisterBlob::from_bytes(old);
    let new = RegisterBlob::from_bytes(new);

    let offsets: Vec<usize> = new.changed_words(&old).map(|(off, _, _)| off).collect();
    assert_eq!(offsets, vec![WORD_SIZE, 2 * WORD_SIZE]);

    // First snapshot: everything nonzero is a change.
    let empty = RegisterBlob::default();
    assert_eq!(new.changed_words(&empty).count(), 2);
}
