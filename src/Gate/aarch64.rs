use std::arch::asm;

/// Call `f` with `sp` set to `top`, restoring the caller's stack after.
/// `x19` is reserved by the compiler, `x20` is the next callee-saved register.
#[inline(always)]
pub(super) unsafe fn switch_call(top: usize, f: usize, a0: usize, a1: usize, a2: usize) {
    asm!(
        "mov x20, sp",
        "mov sp, {top}",
        "blr {f}",
        "mov sp, x20",
        top = in(reg) top,
        f = in(reg) f,
        in("x0") a0,
        in("x1") a1,
        in("x2") a2,
        out("x20") _,
        clobber_abi("C"),
    );
}
