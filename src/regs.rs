//! Register set capture via `PTRACE_GETREGSET`.

use std::convert::TryInto;
use std::mem;

use nix::{errno::Errno, sys::ptrace};
use tracing::trace;

use crate::arch;
use crate::error::{Request, Result, ResultExt};
use crate::info::ProcessInfo;
use crate::memory::WORD_SIZE;
use crate::stop::{ExitType, SignalNumber};
use crate::tracer::Pid;

/// Linux constants defined in `include/uapi/linux/elf.h`.
const NT_PRSTATUS: i32 = 0x1;
const NT_PRFPREG: i32 = 0x2;
const NT_PRXFPREG: i32 = 0x46e6_2b7f;

/// A register set that can be requested from the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterSet {
    General,
    Float,
    ExtendedFloat,
}

impl RegisterSet {
    /// ELF note type naming the set in `PTRACE_GETREGSET`.
    pub fn note(self) -> i32 {
        match self {
            RegisterSet::General => NT_PRSTATUS,
            RegisterSet::Float => NT_PRFPREG,
            RegisterSet::ExtendedFloat => NT_PRXFPREG,
        }
    }

    /// Size in bytes of the set on the build architecture.
    pub fn size(self) -> usize {
        match self {
            RegisterSet::General => mem::size_of::<arch::Registers>(),
            RegisterSet::Float => mem::size_of::<arch::FpRegisters>(),
            RegisterSet::ExtendedFloat => arch::EXTENDED_FP_SIZE,
        }
    }
}

/// Raw contents of one register set, in kernel layout.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterBlob {
    bytes: Vec<u8>,
}

impl RegisterBlob {
    pub fn zeroed(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True until the first snapshot fills the blob.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Native word at byte `offset`, if the blob is large enough.
    pub fn word_at(&self, offset: usize) -> Option<u64> {
        let end = offset.checked_add(WORD_SIZE)?;
        let bytes = self.bytes.get(offset..end)?;
        bytes.try_into().ok().map(|w| usize::from_ne_bytes(w) as u64)
    }

    /// Typed view of a general-purpose set.
    pub fn general(&self) -> Option<arch::Registers> {
        if self.bytes.len() < mem::size_of::<arch::Registers>() {
            return None;
        }

        // SAFETY: the length was checked, the register struct is plain old data, and the
        // read tolerates the byte buffer's alignment.
        let regs = unsafe { std::ptr::read_unaligned(self.bytes.as_ptr() as *const arch::Registers) };

        Some(regs)
    }

    /// Iterate over `(offset, old, new)` for each native word that differs from `previous`.
    ///
    /// Words missing from `previous` compare as zero.
    pub fn changed_words<'a>(&'a self, previous: &'a RegisterBlob) -> impl Iterator<Item = (usize, u64, u64)> + 'a {
        (0..self.bytes.len() / WORD_SIZE)
            .map(|i| i * WORD_SIZE)
            .filter_map(move |off| {
                let new = self.word_at(off)?;
                let old = previous.word_at(off).unwrap_or(0);
                (old != new).then(|| (off, old, new))
            })
    }
}

/// Provider of tracee register state.
///
/// Implemented for [`Pid`] against the kernel.
pub trait RegisterSource {
    fn fetch(&self, set: RegisterSet) -> Result<RegisterBlob>;

    /// `si_signo` of the signal that caused the current stop.
    fn signal_number(&self) -> Result<i32>;

    /// `PTRACE_GETEVENTMSG` data for the current ptrace-event-stop.
    fn event_message(&self) -> Result<u64>;
}

impl RegisterSource for Pid {
    fn fetch(&self, set: RegisterSet) -> Result<RegisterBlob> {
        read_regset(*self, set.note(), set.size())
    }

    fn signal_number(&self) -> Result<i32> {
        let info = ptrace::getsiginfo(*self).invariant(Request::GetSiginfo, *self)?;
        Ok(info.si_signo)
    }

    fn event_message(&self) -> Result<u64> {
        let msg = ptrace::getevent(*self).invariant(Request::GetEventMsg, *self)?;
        Ok(msg as u64)
    }
}

/// Read the register set named by the ELF note type `note`, into a buffer of at most
/// `capacity` bytes.
///
/// The blob holds only the bytes the kernel filled, which may be fewer than `capacity`.
pub fn read_regset(pid: Pid, note: i32, capacity: usize) -> Result<RegisterBlob> {
    let mut blob = RegisterBlob::zeroed(capacity);

    let mut iov = libc::iovec {
        iov_base: blob.bytes.as_mut_ptr() as *mut libc::c_void,
        iov_len: blob.bytes.len(),
    };

    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_GETREGSET,
            pid.as_raw(),
            note as usize as *mut libc::c_void,
            &mut iov as *mut _ as *mut libc::c_void,
        )
    };

    Errno::result(res).invariant(Request::GetRegset { note }, pid)?;

    trace!(pid = pid.as_raw(), note, len = iov.iov_len, "fetched register set");

    // The kernel shrinks `iov_len` to the size of the set it filled.
    blob.bytes.truncate(iov.iov_len);

    Ok(blob)
}

/// Snapshot all register sets of a stopped tracee into `info`.
///
/// Each current generation is moved into its `previous_*` slot before the new one is
/// fetched. This is not an exit observation, so the status fields are reset.
pub fn collect(source: &impl RegisterSource, info: &mut ProcessInfo) -> Result<()> {
    info.previous_registers.clone_from(&info.registers);
    info.registers = source.fetch(RegisterSet::General)?;

    info.previous_fp_registers.clone_from(&info.fp_registers);
    info.fp_registers = source.fetch(RegisterSet::Float)?;

    if info.capabilities().has_extended_fp() {
        info.previous_extended_fp_registers.clone_from(&info.extended_fp_registers);
        info.extended_fp_registers = Some(source.fetch(RegisterSet::ExtendedFloat)?);
    }

    info.clear_status();

    Ok(())
}

/// Snapshot a tracee in its `PTRACE_EVENT_EXIT` stop, recording how it is exiting.
pub fn collect_on_exit(source: &impl RegisterSource, info: &mut ProcessInfo) -> Result<()> {
    collect(source, info)?;

    info.last_signal = Some(SignalNumber::from_raw(source.signal_number()?));

    // The event message is the wait status the tracee will be reaped with.
    let status = source.event_message()? as u16 as i32;

    match ExitType::decode(status) {
        Some(ExitType::Exit(exit_code)) => info.exit_code = Some(exit_code),
        Some(ExitType::Signaled { signal, .. }) => info.terminating_signal = Some(signal),
        None => internal_error!("exit event message is not a termination status"),
    }

    Ok(())
}
