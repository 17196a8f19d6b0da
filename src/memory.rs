//! Word-granular access to tracee memory via `PTRACE_PEEKDATA` and `PTRACE_POKEDATA`.
//!
//! Transfers never stop at the first failed word. Every word of the range is attempted,
//! and any failure is reported once for the whole call. After a failed call the contents
//! of the tracee range (for writes) or of the returned bytes (for reads) are undefined.

use std::convert::TryInto;
use std::mem;

use nix::{errno::Errno, sys::ptrace};
use tracing::{trace, warn};

use crate::arch::TRAP;
use crate::error::{Error, Result};
use crate::tracer::Pid;

/// Size of the unit transferred by a single peek or poke.
pub const WORD_SIZE: usize = mem::size_of::<libc::c_long>();

/// Round `n` up to the nearest multiple of `m`.
///
/// `None` if `m` is zero, or if the result does not fit in a `usize`.
pub fn round_up(n: usize, m: usize) -> Option<usize> {
    let bumped = n.checked_add(m.checked_sub(1)?)?;
    Some((bumped / m) * m)
}

// Round a transfer length up to whole words.
fn word_len(n: usize) -> Result<usize> {
    match round_up(n, WORD_SIZE) {
        Some(len) => Ok(len),
        None => internal_error!("transfer length overflows the address space"),
    }
}

// Address of the `i`th word from `addr`. Tracee addresses wrap like the kernel's.
fn word_addr(addr: u64, i: usize) -> u64 {
    addr.wrapping_add((i * WORD_SIZE) as u64)
}

/// Build the word-aligned image written for `payload`.
///
/// The image is the payload followed by at least one full trap marker, padded to a word
/// boundary. Everything past the payload is the trap pattern, repeated from the start of
/// the image.
pub fn stage(payload: &[u8]) -> Result<Vec<u8>> {
    let len = word_len(payload.len().saturating_add(TRAP.len()))?;

    let mut image: Vec<u8> = TRAP.iter().copied().cycle().take(len).collect();
    image[..payload.len()].copy_from_slice(payload);

    Ok(image)
}

/// Write `payload` into the tracee at `addr`, followed by a trap marker.
pub fn write(pid: Pid, addr: u64, payload: &[u8]) -> Result<()> {
    let image = stage(payload)?;
    let words = image.len() / WORD_SIZE;
    let mut failed = 0;

    for (i, chunk) in image.chunks_exact(WORD_SIZE).enumerate() {
        let at = word_addr(addr, i);
        let word = usize::from_ne_bytes(chunk.try_into().unwrap_or_default());

        trace!(pid = pid.as_raw(), addr = at, word, "poke");

        if let Err(errno) = poke(pid, at, word) {
            failed += 1;

            warn!(pid = pid.as_raw(), addr = at, word, %errno, "failed to write word to tracee");

            if errno == Errno::ESRCH {
                probe_exit_status(pid);
            }
        }
    }

    if failed > 0 {
        return Err(Error::MemoryWrite { pid, addr, words, failed });
    }

    Ok(())
}

/// Read `len` bytes from the tracee at `addr`.
pub fn read(pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>> {
    let mut data = vec![0; len];
    read_into(pid, addr, &mut data)?;
    Ok(data)
}

/// Fill `data` from the tracee at `addr`.
///
/// On failure, `data` holds whatever words could be read, with zeroes elsewhere.
pub fn read_into(pid: Pid, addr: u64, data: &mut [u8]) -> Result<()> {
    let len = word_len(data.len())?;
    let words = len / WORD_SIZE;

    let mut copy = vec![0u8; len];
    let mut failed = 0;

    for (i, chunk) in copy.chunks_exact_mut(WORD_SIZE).enumerate() {
        let at = word_addr(addr, i);

        trace!(pid = pid.as_raw(), addr = at, "peek");

        match ptrace::read(pid, at as usize as ptrace::AddressType) {
            Ok(word) => chunk.copy_from_slice(&word.to_ne_bytes()),
            Err(errno) => {
                failed += 1;
                warn!(pid = pid.as_raw(), addr = at, %errno, "failed to read word from tracee");
            },
        }
    }

    data.copy_from_slice(&copy[..data.len()]);

    if failed > 0 {
        return Err(Error::MemoryRead { pid, addr, words, failed });
    }

    Ok(())
}

fn poke(pid: Pid, addr: u64, word: usize) -> nix::Result<()> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEDATA,
            pid.as_raw(),
            addr as usize as *mut libc::c_void,
            word as *mut libc::c_void,
        )
    };

    Errno::result(res).map(drop)
}

// Best-effort report of why a tracee vanished mid-write. Reaps it if it has exited.
fn probe_exit_status(pid: Pid) {
    let mut status = 0;
    let flags = libc::WNOHANG | libc::WCONTINUED;
    let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, flags) };

    match Errno::result(res) {
        Ok(rcode) => {
            warn!(
                pid = pid.as_raw(),
                rcode,
                status,
                exited = libc::WIFEXITED(status),
                exit_status = libc::WEXITSTATUS(status),
                signaled = libc::WIFSIGNALED(status),
                term_sig = libc::WTERMSIG(status),
                core_dumped = libc::WCOREDUMP(status),
                stopped = libc::WIFSTOPPED(status),
                stop_sig = libc::WSTOPSIG(status),
                continued = libc::WIFCONTINUED(status),
                "tracee no longer exists"
            );
        },
        Err(errno) => {
            warn!(pid = pid.as_raw(), %errno, "could not probe status of missing tracee");
        },
    }
}
