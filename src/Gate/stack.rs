// Per-thread stack the isolated gate switches onto.

use std::cell::RefCell;
use std::io;
use std::ptr;

/// Usable bytes per gate stack, guard page excluded.
pub const GATE_STACK_SIZE: usize = 256 * 1024;

struct GateStack {
    base: *mut libc::c_void,
    size: usize,
}

impl GateStack {
    fn new(usable: usize) -> io::Result<Self> {
        let page = page_size();
        let size = usable.div_ceil(page) * page + page;
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // guard page below the stack
        if unsafe { libc::mprotect(base, page, libc::PROT_NONE) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::munmap(base, size) };
            return Err(err);
        }
        tracing::debug!(size, "mapped gate stack");
        Ok(Self { base, size })
    }

    /// Highest usable address, 16-byte aligned.
    fn top(&self) -> usize {
        (self.base as usize + self.size) & !0xF
    }
}

impl Drop for GateStack {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.base, self.size) } != 0 {
            tracing::error!(error = %io::Error::last_os_error(), "failed to unmap gate stack");
        }
    }
}

#[derive(Default)]
struct Slot {
    stack: Option<GateStack>,
    active: bool,
}

thread_local! {
    static SLOT: RefCell<Slot> = RefCell::new(Slot::default());
}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

/// Claim this thread's gate stack and return its top. `None` when a call is
/// already running on it or the stack cannot be mapped.
fn acquire() -> Option<usize> {
    SLOT.try_with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.active {
            return None;
        }
        if slot.stack.is_none() {
            match GateStack::new(GATE_STACK_SIZE) {
                Ok(stack) => slot.stack = Some(stack),
                Err(e) => {
                    tracing::warn!(error = %e, "gate stack unavailable, calling on current stack");
                    return None;
                }
            }
        }
        slot.active = true;
        slot.stack.as_ref().map(GateStack::top)
    })
    .ok()
    .flatten()
}

fn release() {
    let _ = SLOT.try_with(|slot| slot.borrow_mut().active = false);
}

/// Run `f(a0, a1, a2)` on the gate stack, or `direct` when it is taken.
///
/// # Safety
/// `f` must be a C-ABI function taking at most three pointer-sized
/// arguments; unused argument registers are ignored by such a callee.
pub(super) unsafe fn run(f: usize, args: [usize; 3], direct: impl FnOnce()) {
    match acquire() {
        Some(top) => {
            super::arch::switch_call(top, f, args[0], args[1], args[2]);
            release();
        }
        None => direct(),
    }
}

/// `(lowest, top)` of this thread's gate stack, if mapped.
#[cfg(test)]
pub(super) fn bounds() -> Option<(usize, usize)> {
    SLOT.with(|slot| {
        slot.borrow()
            .stack
            .as_ref()
            .map(|s| (s.base as usize, s.top()))
    })
}
