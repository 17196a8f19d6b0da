//! Classification of raw `wait(2)` statuses reported for a tracee.

use std::convert::TryFrom;
use std::fmt;

use crate::error::Result;
use crate::tracer::Signal;

/// Signal number exactly as the kernel reported it.
///
/// [`Signal`] has no variants for real-time signals, which a tracee can still be stopped
/// or killed by, so stops carry the raw number.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct SignalNumber(i32);

impl SignalNumber {
    pub const fn from_raw(signo: i32) -> Self {
        Self(signo)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// The named signal, if there is one.
    pub fn named(self) -> Option<Signal> {
        Signal::try_from(self.0).ok()
    }
}

impl From<Signal> for SignalNumber {
    fn from(signal: Signal) -> Self {
        Self(signal as i32)
    }
}

impl PartialEq<Signal> for SignalNumber {
    fn eq(&self, other: &Signal) -> bool {
        self.0 == *other as i32
    }
}

impl fmt::Debug for SignalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.named() {
            Some(signal) => write!(f, "{:?}", signal),
            None if self.0 >= libc::SIGRTMIN() => write!(f, "SIGRTMIN+{}", self.0 - libc::SIGRTMIN()),
            None => write!(f, "signal {}", self.0),
        }
    }
}

/// How a reaped tracee ended.
///
/// Decoded from a `wait(2)` status, or from the pending status that is the event message
/// of a `PTRACE_EVENT_EXIT` stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitType {
    Exit(i32),
    Signaled { signal: SignalNumber, core_dumped: bool },
}

impl ExitType {
    /// `None` if `status` does not describe a terminated process.
    pub fn decode(status: i32) -> Option<Self> {
        if libc::WIFEXITED(status) {
            return Some(ExitType::Exit(libc::WEXITSTATUS(status)));
        }

        if libc::WIFSIGNALED(status) {
            let signal = SignalNumber(libc::WTERMSIG(status));
            let core_dumped = libc::WCOREDUMP(status);
            return Some(ExitType::Signaled { signal, core_dumped });
        }

        None
    }
}

/// Why a tracee last changed state, as seen by the tracer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopClass {
    /// A bare `SIGTRAP` with no ptrace event: the tracee hit a trap instruction, such as
    /// the marker appended to an injected payload, or finished a single-step.
    OrdinaryBreakpointTrap,

    /// `PTRACE_EVENT_EXIT`: the tracee is about to exit, but is still stopped and its
    /// registers are inspectable.
    ProcessExitEvent,

    /// The tracee exited and has been reaped.
    NaturallyExited { exit_code: i32 },

    /// The tracee was terminated by a signal and has been reaped.
    KilledBySignal { signal: SignalNumber, core_dumped: bool },

    /// Signal-delivery-stop for any signal other than a bare `SIGTRAP`.
    OtherStoppingSignal { signal: SignalNumber },
}

impl StopClass {
    /// Classify a raw `waitpid()` status word.
    ///
    /// A ptrace-event-stop reports `SIGTRAP` as its stop signal, with the event code in
    /// bits 16..24 of `status`.
    pub fn from_status(status: i32) -> Result<Self> {
        match ExitType::decode(status) {
            Some(ExitType::Exit(exit_code)) => return Ok(StopClass::NaturallyExited { exit_code }),
            Some(ExitType::Signaled { signal, core_dumped }) => {
                return Ok(StopClass::KilledBySignal { signal, core_dumped });
            },
            None => {},
        }

        if !libc::WIFSTOPPED(status) {
            // Assume `!WCONTINUED`.
            internal_error!("unreachable `wait()` status");
        }

        let stopsig = libc::WSTOPSIG(status);
        let event = status >> 16;

        let class = match (stopsig, event) {
            (libc::SIGTRAP, 0) => StopClass::OrdinaryBreakpointTrap,
            (libc::SIGTRAP, libc::PTRACE_EVENT_EXIT) => StopClass::ProcessExitEvent,
            (_, 0) => StopClass::OtherStoppingSignal { signal: SignalNumber(stopsig) },
            _ => {
                // Only `PTRACE_O_TRACEEXIT` is requested.
                internal_error!("unexpected ptrace-event-stop code")
            },
        };

        Ok(class)
    }

    /// True if the tracee has exited, or is stopped on its way out.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StopClass::ProcessExitEvent
                | StopClass::NaturallyExited { .. }
                | StopClass::KilledBySignal { .. }
        )
    }
}
