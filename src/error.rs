use std::io;

use nix::errno::Errno;

use crate::stop::StopClass;
use crate::tracer::{Pid, State};

pub type Result<T> = std::result::Result<T, Error>;

/// Raise an `Error::Internal` for a tracee state that the kernel should never report.
macro_rules! internal_error {
    ($msg: expr) => {
        return Err($crate::error::Error::Internal($msg.into()))
    };
}

/// Kernel requests made on behalf of a tracee, named for error reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Request {
    TraceMe,
    Wait,
    SetOptions,
    GetRegset { note: i32 },
    GetSiginfo,
    GetEventMsg,
    Continue,
    Detach,
    PeekData,
    PokeData,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A kernel call whose success the trace session depends on failed.
    ///
    /// The tracee must exist and be traceable at this point, so the session cannot
    /// continue. Callers at a process boundary should translate this into an exit.
    #[error("{request:?} failed for tracee = {pid}")]
    Invariant {
        request: Request,
        pid: Pid,
        source: nix::Error,
    },

    /// A spawned child did not reach its exec-stop.
    #[error("Tracee = {pid} did not stop after exec: {class:?}")]
    Spawn { pid: Pid, class: StopClass },

    #[error("Could not write {failed} of {words} words to tracee = {pid} at {addr:#x}")]
    MemoryWrite {
        pid: Pid,
        addr: u64,
        words: usize,
        failed: usize,
    },

    #[error("Could not read {failed} of {words} words from tracee = {pid} at {addr:#x}")]
    MemoryRead {
        pid: Pid,
        addr: u64,
        words: usize,
        failed: usize,
    },

    #[error("Cannot {op} tracee = {pid} in state = {state:?}")]
    State {
        pid: Pid,
        state: State,
        op: &'static str,
    },

    #[error("Could not fork tracee")]
    Fork(#[source] nix::Error),

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if the error means the trace session must be abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Invariant { .. } | Error::Spawn { .. } | Error::Internal(..)
        )
    }

    /// True if the error was caused by the tracee no longer existing.
    pub fn tracee_died(&self) -> bool {
        matches!(self, Error::Invariant { source: Errno::ESRCH, .. })
    }
}

pub(crate) trait ResultExt<T> {
    /// Treat a failed kernel request as a violated session invariant.
    fn invariant(self, request: Request, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for nix::Result<T> {
    fn invariant(self, request: Request, pid: Pid) -> Result<T> {
        self.map_err(|source| Error::Invariant { request, pid, source })
    }
}
