#![allow(dead_code)]

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lazy_static::lazy_static;

use shelltrace::{Capabilities, ProcessInfo, Tracer};

lazy_static! {
    /// Image exec'd by every tracee. Its code is never run past the exec-stop: tests
    /// overwrite the instructions at its entry point.
    pub static ref TRUE_EXE: PathBuf = ["/bin/true", "/usr/bin/true"]
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .expect("no `true` executable");
}

/// Spawn a tracee in its exec-stop, with an initial register snapshot.
///
/// Returns the tracer, the snapshot, and the program counter at which to inject code.
#[allow(unused)]
pub fn start() -> Result<(Tracer, ProcessInfo, u64)> {
    let exe = File::open(&*TRUE_EXE)?;
    let tracer = Tracer::spawn(&exe)?;

    let mut info = ProcessInfo::new(tracer.pid(), Capabilities::new());
    tracer.peek(&mut info)?;

    let pc = info.program_counter().context("no program counter")?;

    Ok((tracer, info, pc))
}

/// `x86_64` machine code used as payloads.
#[allow(unused)]
#[cfg(target_arch = "x86_64")]
pub mod payload {
    /// `nop`, one word's worth.
    pub const NOPS: [u8; 8] = [0x90; 8];

    /// `ud2`
    pub const UD2: &[u8] = &[0x0f, 0x0b];

    /// `mov rax, [0]`
    pub const SEGV: &[u8] = &[0x48, 0x8b, 0x04, 0x25, 0x00, 0x00, 0x00, 0x00];

    /// `mov edi, code; mov eax, SYS_exit_group; syscall`
    pub fn exit_group(code: u8) -> Vec<u8> {
        vec![
            0xbf, code, 0x00, 0x00, 0x00,
            0xb8, 0xe7, 0x00, 0x00, 0x00,
            0x0f, 0x05,
        ]
    }
}
