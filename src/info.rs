//! Per-session record of tracee state.

use crate::arch;
use crate::regs::RegisterBlob;
use crate::stop::SignalNumber;
use crate::tracer::Pid;

/// Optional register sets to capture at each snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    extended_fp: bool,
}

impl Default for Capabilities {
    /// The extended FP set (`NT_PRXFPREG`) only exists for 32-bit x86 tasks.
    fn default() -> Self {
        Self { extended_fp: cfg!(target_arch = "x86") }
    }
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the extended floating-point set is captured.
    pub fn extended_fp(mut self, extended_fp: bool) -> Self {
        self.extended_fp = extended_fp;
        self
    }

    pub fn has_extended_fp(&self) -> bool {
        self.extended_fp
    }
}

/// Register and status state of a single tracee, kept across stops.
///
/// Each snapshot moves the current register sets into their `previous_*` slots before
/// fetching, so the two generations are always adjacent observations and a consumer can
/// show what changed between them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessInfo {
    pid: Pid,
    capabilities: Capabilities,

    pub registers: RegisterBlob,
    pub previous_registers: RegisterBlob,

    pub fp_registers: RegisterBlob,
    pub previous_fp_registers: RegisterBlob,

    /// `Some` only if [`Capabilities::has_extended_fp()`].
    pub extended_fp_registers: Option<RegisterBlob>,
    pub previous_extended_fp_registers: Option<RegisterBlob>,

    /// Signal of the most recent exit-classified stop, or of a terminating signal.
    pub last_signal: Option<SignalNumber>,

    /// Exit code, once the tracee has exited or is stopped in its exit.
    pub exit_code: Option<i32>,

    /// Signal the tracee is dying of, if seen in its exit event.
    pub terminating_signal: Option<SignalNumber>,
}

impl ProcessInfo {
    pub fn new(pid: Pid, capabilities: Capabilities) -> Self {
        let extended = || capabilities.has_extended_fp().then(RegisterBlob::default);

        Self {
            pid,
            capabilities,
            registers: RegisterBlob::default(),
            previous_registers: RegisterBlob::default(),
            fp_registers: RegisterBlob::default(),
            previous_fp_registers: RegisterBlob::default(),
            extended_fp_registers: extended(),
            previous_extended_fp_registers: extended(),
            last_signal: None,
            exit_code: None,
            terminating_signal: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Instruction pointer of the current general-purpose generation, if captured.
    pub fn program_counter(&self) -> Option<u64> {
        self.registers.word_at(arch::pc_offset())
    }

    /// Reset the exit observation fields.
    pub(crate) fn clear_status(&mut self) {
        self.last_signal = None;
        self.exit_code = None;
        self.terminating_signal = None;
    }
}
