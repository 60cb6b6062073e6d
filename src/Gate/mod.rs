//! Synchronous calls into C-ABI functions taking up to three pointer-sized
//! arguments.
//!
//! [`IsolatedStack`] runs the callee on a dedicated per-thread stack, for
//! callees with unknown stack usage. [`NativeStack`] calls on the current
//! stack: the callee must only use a small, bounded amount of stack and must
//! not block. Results come back through an output-pointer argument.
//!
//! Targets without a stack-switch fast path run both variants as a plain
//! call, so they behave identically there.

use std::ffi::c_void;

pub type ExternFn0 = unsafe extern "C" fn();
pub type ExternFn1 = unsafe extern "C" fn(*const c_void);
pub type ExternFn2 = unsafe extern "C" fn(*const c_void, *const c_void);
pub type ExternFn3 = unsafe extern "C" fn(*const c_void, *const c_void, *const c_void);

#[cfg(all(unix, any(target_arch = "x86_64", target_arch = "aarch64")))]
mod stack;
#[cfg(all(unix, any(target_arch = "x86_64", target_arch = "aarch64")))]
pub use stack::GATE_STACK_SIZE;

#[cfg(all(unix, target_arch = "x86_64"))]
#[path = "x86_64.rs"]
mod arch;
#[cfg(all(unix, target_arch = "aarch64"))]
#[path = "aarch64.rs"]
mod arch;

/// How a foreign function is entered.
pub trait CallGate {
    /// # Safety
    /// `f` must be safe to call with these arguments under the gate's stack
    /// discipline.
    unsafe fn call_p0(f: ExternFn0);
    /// # Safety
    /// See [`CallGate::call_p0`].
    unsafe fn call_p1(f: ExternFn1, a0: *const c_void);
    /// # Safety
    /// See [`CallGate::call_p0`].
    unsafe fn call_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void);
    /// # Safety
    /// See [`CallGate::call_p0`].
    unsafe fn call_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void);
}

/// Switch to the thread's gate stack for the call. A callee that re-enters
/// the gate while already on it is called directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolatedStack;

/// Call on the current stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeStack;

impl CallGate for NativeStack {
    #[inline]
    unsafe fn call_p0(f: ExternFn0) {
        f()
    }

    #[inline]
    unsafe fn call_p1(f: ExternFn1, a0: *const c_void) {
        f(a0)
    }

    #[inline]
    unsafe fn call_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void) {
        f(a0, a1)
    }

    #[inline]
    unsafe fn call_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void) {
        f(a0, a1, a2)
    }
}

#[cfg(all(unix, any(target_arch = "x86_64", target_arch = "aarch64")))]
impl CallGate for IsolatedStack {
    unsafe fn call_p0(f: ExternFn0) {
        stack::run(f as usize, [0; 3], || f())
    }

    unsafe fn call_p1(f: ExternFn1, a0: *const c_void) {
        stack::run(f as usize, [a0 as usize, 0, 0], || f(a0))
    }

    unsafe fn call_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void) {
        stack::run(f as usize, [a0 as usize, a1 as usize, 0], || f(a0, a1))
    }

    unsafe fn call_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void) {
        stack::run(f as usize, [a0 as usize, a1 as usize, a2 as usize], || {
            f(a0, a1, a2)
        })
    }
}

#[cfg(not(all(unix, any(target_arch = "x86_64", target_arch = "aarch64"))))]
impl CallGate for IsolatedStack {
    unsafe fn call_p0(f: ExternFn0) {
        NativeStack::call_p0(f)
    }

    unsafe fn call_p1(f: ExternFn1, a0: *const c_void) {
        NativeStack::call_p1(f, a0)
    }

    unsafe fn call_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void) {
        NativeStack::call_p2(f, a0, a1)
    }

    unsafe fn call_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void) {
        NativeStack::call_p3(f, a0, a1, a2)
    }
}

/// Call `f` on the gate stack.
///
/// # Safety
/// `f` must be a valid C-ABI function.
pub unsafe fn call_func_g0_p0(f: ExternFn0) {
    IsolatedStack::call_p0(f)
}

/// # Safety
/// See [`call_func_g0_p0`].
pub unsafe fn call_func_g0_p1(f: ExternFn1, a0: *const c_void) {
    IsolatedStack::call_p1(f, a0)
}

/// # Safety
/// See [`call_func_g0_p0`].
pub unsafe fn call_func_g0_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void) {
    IsolatedStack::call_p2(f, a0, a1)
}

/// # Safety
/// See [`call_func_g0_p0`].
pub unsafe fn call_func_g0_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void) {
    IsolatedStack::call_p3(f, a0, a1, a2)
}

/// Call `f` on the current stack.
///
/// # Safety
/// `f` must be a valid C-ABI function that uses little stack and does not
/// block.
pub unsafe fn call_func_p0(f: ExternFn0) {
    NativeStack::call_p0(f)
}

/// # Safety
/// See [`call_func_p0`].
pub unsafe fn call_func_p1(f: ExternFn1, a0: *const c_void) {
    NativeStack::call_p1(f, a0)
}

/// # Safety
/// See [`call_func_p0`].
pub unsafe fn call_func_p2(f: ExternFn2, a0: *const c_void, a1: *const c_void) {
    NativeStack::call_p2(f, a0, a1)
}

/// # Safety
/// See [`call_func_p0`].
pub unsafe fn call_func_p3(f: ExternFn3, a0: *const c_void, a1: *const c_void, a2: *const c_void) {
    NativeStack::call_p3(f, a0, a1, a2)
}
