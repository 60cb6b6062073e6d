use std::arch::asm;

/// Call `f` with `rsp` set to `top`, restoring the caller's stack after.
/// `r12` is callee-saved in the SysV ABI, so it survives the call.
#[inline(always)]
pub(super) unsafe fn switch_call(top: usize, f: usize, a0: usize, a1: usize, a2: usize) {
    asm!(
        "mov r12, rsp",
        "mov rsp, {top}",
        "call {f}",
        "mov rsp, r12",
        top = in(reg) top,
        f = in(reg) f,
        in("rdi") a0,
        in("rsi") a1,
        in("rdx") a2,
        out("r12") _,
        clobber_abi("C"),
    );
}
