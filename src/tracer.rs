//! The trace session: attaching to a spawned tracee, resuming it, and interpreting its
//! stops until it exits or is detached.

use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;

use nix::{errno::Errno, sys::ptrace};
use tracing::{debug, info};

use crate::child;
use crate::error::{Error, Request, Result, ResultExt};
use crate::info::ProcessInfo;
use crate::regs;
use crate::stop::{SignalNumber, StopClass};

pub use nix::sys::ptrace::Options;
pub use nix::unistd::Pid;

/// POSIX signal.
pub use nix::sys::signal::Signal;

/// Options set on every tracee once it reaches its exec-stop.
/// These are:
/// - [`PTRACE_O_EXITKILL`](Options::PTRACE_O_EXITKILL), so the tracee cannot outlive us
/// - [`PTRACE_O_TRACEEXIT`](Options::PTRACE_O_TRACEEXIT), so we see the tracee stopped
///   in its exit, with registers still readable
pub const REQUIRED_OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_EXITKILL)
    .union(Options::PTRACE_O_TRACEEXIT);

/// Policy for handling stops the tracer does not itself expect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// Redeliver signals other than `SIGTRAP` to the tracee. Defaults to `false`.
    forward_signals: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of the `forward_signals` flag.
    pub fn forward_signals(mut self, forward_signals: bool) -> Self {
        self.forward_signals = forward_signals;
        self
    }

    pub fn forwards_signals(&self) -> bool {
        self.forward_signals
    }
}

/// Lifecycle of a tracee, as known to its [`Tracer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    // Stopped after exec, options set, not yet resumed.
    Attached,

    // Resumed, not yet seen to stop.
    Running,

    // In a ptrace-stop after a trap or a swallowed signal.
    Stopped,

    // In the `PTRACE_EVENT_EXIT` stop. Still inspectable, pending detach.
    Exiting,

    // Reaped.
    Exited,
}

/// Tracer for a single, single-threaded Linux process.
///
/// Each method blocks until its kernel requests complete, and expects strict alternation
/// of [`resume()`](Tracer::resume()) and [`wait_for_stop()`](Tracer::wait_for_stop()).
#[derive(Debug, Eq, PartialEq)]
pub struct Tracer {
    pid: Pid,
    state: State,

    // ptrace requests must come from the tracing thread.
    _not_send: PhantomData<*const ()>,
}

impl Tracer {
    /// Spawn the executable open at `exe` as a tracee, and attach to it.
    pub fn spawn(exe: &impl AsRawFd) -> Result<Self> {
        let pid = child::spawn(exe)?;
        Self::attach(pid)
    }

    /// Wait for the exec-stop of a child that requested `PTRACE_TRACEME`, then set
    /// [`REQUIRED_OPTIONS`].
    pub fn attach(pid: Pid) -> Result<Self> {
        let status = wait(pid)?;

        match StopClass::from_status(status)? {
            StopClass::OrdinaryBreakpointTrap => {},
            class => return Err(Error::Spawn { pid, class }),
        }

        ptrace::setoptions(pid, REQUIRED_OPTIONS).invariant(Request::SetOptions, pid)?;

        info!(pid = pid.as_raw(), "attached to tracee");

        let state = State::Attached;
        let _not_send = PhantomData;

        Ok(Self { pid, state, _not_send })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Snapshot the registers of the stopped tracee without resuming it.
    pub fn peek(&self, info: &mut ProcessInfo) -> Result<()> {
        self.expect_stopped("peek")?;
        regs::collect(&self.pid, info)
    }

    /// Snapshot the registers of the stopped tracee, then continue it.
    ///
    /// The snapshot is the state at the instant of resumption, to compare with the state
    /// captured at the next stop.
    pub fn resume(&mut self, info: &mut ProcessInfo) -> Result<()> {
        self.expect_stopped("resume")?;

        regs::collect(&self.pid, info)?;

        cont(self.pid, None).invariant(Request::Continue, self.pid)?;
        self.set_state(State::Running);

        Ok(())
    }

    /// Wait for the running tracee to change state, and record the change in `info`.
    ///
    /// Returns how the tracee stopped. After a [terminal](StopClass::is_terminal()) stop
    /// the tracee cannot be resumed: it has either been reaped, or is stopped in its exit
    /// and must be finished with [`detach()`](Tracer::detach()).
    pub fn wait_for_stop(&mut self, info: &mut ProcessInfo, config: &Config) -> Result<StopClass> {
        if self.state != State::Running {
            return Err(self.state_error("wait for"));
        }

        let pid = self.pid;
        let status = wait(pid)?;

        // The status is consumed, so track it before anything else can fail.
        if libc::WIFEXITED(status) || libc::WIFSIGNALED(status) {
            self.set_state(State::Exited);
        } else {
            self.set_state(State::Stopped);
        }

        let class = StopClass::from_status(status)?;

        match class {
            StopClass::NaturallyExited { exit_code } => {
                info!(pid = pid.as_raw(), exit_code, "tracee exited");

                info.clear_status();
                info.exit_code = Some(exit_code);
            },
            StopClass::KilledBySignal { signal, core_dumped } => {
                info!(pid = pid.as_raw(), ?signal, core_dumped, "tracee exited on signal");

                info.clear_status();
                info.last_signal = Some(signal);
            },
            StopClass::ProcessExitEvent => {
                self.set_state(State::Exiting);
                regs::collect_on_exit(&pid, info)?;

                info!(
                    pid = pid.as_raw(),
                    exit_code = ?info.exit_code,
                    signal = ?info.terminating_signal,
                    "tracee exiting"
                );
            },
            StopClass::OrdinaryBreakpointTrap => {
                regs::collect(&pid, info)?;
            },
            StopClass::OtherStoppingSignal { signal } => {
                regs::collect(&pid, info)?;
                info.last_signal = Some(signal);

                let forward = config.forwards_signals();

                info!(
                    pid = pid.as_raw(),
                    ?signal,
                    "tracee got signal, {}",
                    if forward { "delivering" } else { "not delivering" }
                );

                if forward {
                    cont(pid, Some(signal)).invariant(Request::Continue, pid)?;
                    self.set_state(State::Running);
                }
            },
        }

        Ok(class)
    }

    /// Detach from the stopped tracee, and wait for it to terminate on its own.
    ///
    /// Records the exit code if it exits normally, or the signal if it is killed.
    pub fn detach(&mut self, info: &mut ProcessInfo) -> Result<()> {
        match self.state {
            State::Attached | State::Stopped | State::Exiting => {},
            _ => return Err(self.state_error("detach")),
        }

        let pid = self.pid;

        ptrace::detach(pid, None).invariant(Request::Detach, pid)?;
        let status = wait(pid)?;

        info.clear_status();

        // An untraced child only reports its termination.
        self.set_state(State::Exited);

        match StopClass::from_status(status)? {
            StopClass::NaturallyExited { exit_code } => {
                info!(pid = pid.as_raw(), exit_code, "detached tracee exited");
                info.exit_code = Some(exit_code);
            },
            StopClass::KilledBySignal { signal, .. } => {
                info!(pid = pid.as_raw(), ?signal, "detached tracee exited on signal");
                info.last_signal = Some(signal);
            },
            class => {
                debug!(pid = pid.as_raw(), ?class, "unexpected status for detached tracee");
            },
        }

        Ok(())
    }

    fn expect_stopped(&self, op: &'static str) -> Result<()> {
        match self.state {
            State::Attached | State::Stopped => Ok(()),
            _ => Err(self.state_error(op)),
        }
    }

    fn state_error(&self, op: &'static str) -> Error {
        let Self { pid, state, .. } = *self;
        Error::State { pid, state, op }
    }

    fn set_state(&mut self, state: State) {
        debug!(pid = self.pid.as_raw(), ?state, "setting tracee state");

        self.state = state;
    }
}

// `PTRACE_CONT`, delivering `signal` if set. `ptrace::cont()` cannot name real-time
// signals.
fn cont(pid: Pid, signal: Option<SignalNumber>) -> nix::Result<()> {
    let data = signal.map_or(0, SignalNumber::as_raw);

    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_CONT,
            pid.as_raw(),
            std::ptr::null_mut::<libc::c_void>(),
            data as usize as *mut libc::c_void,
        )
    };

    Errno::result(res).map(drop)
}

// Block until `pid` changes state, returning the raw `wait(2)` status.
fn wait(pid: Pid) -> Result<i32> {
    let mut status = 0;
    let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) };

    Errno::result(res).invariant(Request::Wait, pid)?;

    Ok(status)
}
