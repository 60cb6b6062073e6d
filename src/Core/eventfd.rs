// Cross-boundary wakeup signals over kernel event counters.
//
// The side that wants to wake its peer writes to the descriptor through a
// `Notifier`; the side being woken blocks on it through one of the awaiters.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// An owned eventfd counter. Closing happens on drop.
#[derive(Debug)]
pub struct EventFd {
    fd: RawFd,
}

impl EventFd {
    #[cfg(target_os = "linux")]
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn new() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "eventfd only supported on Linux",
        ))
    }

    /// Borrowing notifier for this descriptor.
    pub fn notifier(&self) -> Notifier {
        unsafe { Notifier::from_raw_fd(self.fd) }
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        if unsafe { libc::close(self.fd) } != 0 {
            tracing::error!(fd = self.fd, error = %io::Error::last_os_error(), "close failed for eventfd");
        }
    }
}

/// Write side of a wakeup signal. Never closes the descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Notifier {
    fd: RawFd,
}

impl Notifier {
    /// # Safety
    /// `fd` must stay open for as long as the notifier is used.
    #[inline]
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Bump the peer's counter. Retries on EINTR.
    pub fn notify(&self) -> io::Result<()> {
        const DATA: u64 = 1;
        loop {
            let n = unsafe {
                libc::write(
                    self.fd,
                    &DATA as *const u64 as *const libc::c_void,
                    std::mem::size_of::<u64>(),
                )
            };
            if n != -1 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
    }
}

impl AsRawFd for Notifier {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// Blocking-read awaiter: parks the calling thread until the counter is
/// non-zero, then consumes it.
#[derive(Debug)]
pub struct BlockingAwaiter {
    fd: RawFd,
}

impl BlockingAwaiter {
    /// # Safety
    /// `fd` must stay open for as long as the awaiter is used.
    #[inline]
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Returns the number of notifications folded into this wakeup.
    pub fn wait(&mut self) -> io::Result<u64> {
        read_counter(self.fd)
    }
}

impl AsRawFd for BlockingAwaiter {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// Readiness-poll awaiter for wait-with-timeout on a single descriptor.
#[derive(Debug)]
pub struct PollAwaiter {
    fd: RawFd,
}

impl PollAwaiter {
    /// # Safety
    /// `fd` must stay open for as long as the awaiter is used.
    #[inline]
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Wait until the descriptor is readable or `timeout` elapses
    /// (`None` waits forever). Returns the number of ready descriptors:
    /// 1 when signalled, 0 on timeout. A pending signal is consumed.
    pub fn wait_timeout(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let timeout_ms = match deadline {
                None => -1,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    // round up so a 100us wait does not degrade into a busy poll
                    let ms = remaining.as_micros().div_ceil(1000);
                    ms.min(i32::MAX as u128) as i32
                }
            };
            let mut pfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ready > 0 {
                read_counter(self.fd)?;
            }
            return Ok(ready as usize);
        }
    }
}

impl AsRawFd for PollAwaiter {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

fn read_counter(fd: RawFd) -> io::Result<u64> {
    let mut value: u64 = 0;
    loop {
        let n = unsafe {
            libc::read(
                fd,
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n != -1 {
            return Ok(value);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err);
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn notify_then_wait_consumes_count() {
        let efd = EventFd::new().unwrap();
        let notifier = efd.notifier();
        notifier.notify().unwrap();
        notifier.notify().unwrap();

        let mut awaiter = unsafe { BlockingAwaiter::from_raw_fd(efd.as_raw_fd()) };
        assert_eq!(awaiter.wait().unwrap(), 2);

        let mut poller = unsafe { PollAwaiter::from_raw_fd(efd.as_raw_fd()) };
        assert_eq!(
            poller.wait_timeout(Some(Duration::from_millis(10))).unwrap(),
            0
        );
    }

    #[test]
    fn poll_awaiter_sees_cross_thread_signal() {
        let efd = EventFd::new().unwrap();
        let notifier = efd.notifier();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            notifier.notify().unwrap();
        });

        let mut poller = unsafe { PollAwaiter::from_raw_fd(efd.as_raw_fd()) };
        assert_eq!(poller.wait_timeout(Some(Duration::from_secs(5))).unwrap(), 1);
        handle.join().unwrap();
    }
}
