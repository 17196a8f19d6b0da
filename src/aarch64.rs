//! Register layouts and trap encoding for `aarch64`.

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://android.googlesource.com/kernel/common/+/refs/heads/android-mainline/arch/arm64/include/uapi/asm/ptrace.h#88).
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

/// Defined in `arch/arm64/include/uapi/asm/ptrace.h`, returned for `NT_PRFPREG`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct user_fpsimd_state {
    pub vregs: [u128; 32],
    pub fpsr: u32,
    pub fpcr: u32,
    reserved: [u32; 2],
}

pub type Registers = user_pt_regs;

pub type FpRegisters = user_fpsimd_state;

/// There is no extended set on this architecture.
pub const EXTENDED_FP_SIZE: usize = 0;

/// `brk #0`, little-endian.
pub const TRAP: &[u8] = &[0x00, 0x00, 0x20, 0xd4];

/// Offset of `pc` in [`user_pt_regs`]: 31 general registers, then `sp`.
pub(crate) fn pc_offset() -> usize {
    32 * std::mem::size_of::<u64>()
}
