#[macro_use]
pub mod error;

pub mod child;
pub mod info;
pub mod memory;
pub mod regs;
pub mod stop;
pub mod tracer;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod x86;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::x86 as arch;

#[cfg(target_arch = "aarch64")]
#[allow(non_camel_case_types)]
pub mod aarch64;

#[cfg(target_arch = "aarch64")]
use crate::aarch64 as arch;

pub use arch::{FpRegisters, Registers, TRAP};
pub use error::{Error, Request, Result};
pub use info::{Capabilities, ProcessInfo};
pub use regs::{RegisterBlob, RegisterSet, RegisterSource};
pub use stop::{SignalNumber, StopClass};
pub use tracer::{Config, Pid, Signal, State, Tracer};
