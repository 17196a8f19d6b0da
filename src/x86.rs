//! Register layouts and trap encoding for `x86` and `x86_64`.

/// General-purpose register state, as returned for `NT_PRSTATUS`.
pub type Registers = libc::user_regs_struct;

/// Floating-point register state, as returned for `NT_PRFPREG`.
pub type FpRegisters = libc::user_fpregs_struct;

/// Size of `struct user_fpxregs_struct`, the `NT_PRXFPREG` set of 32-bit tasks.
pub const EXTENDED_FP_SIZE: usize = 512;

/// `int3`.
pub const TRAP: &[u8] = &[0xcc];

/// Offset of the instruction pointer in [`Registers`].
#[cfg(target_arch = "x86_64")]
pub(crate) fn pc_offset() -> usize {
    memoffset::offset_of!(libc::user_regs_struct, rip)
}

/// Offset of the instruction pointer in [`Registers`].
#[cfg(target_arch = "x86")]
pub(crate) fn pc_offset() -> usize {
    memoffset::offset_of!(libc::user_regs_struct, eip)
}
