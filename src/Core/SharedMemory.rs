// Shared memory backend abstraction for Linux
// Uses memfd_create + mmap so the region can be handed to a peer by fd

use std::fmt::Debug;
use std::io;
#[cfg(target_os = "linux")]
use std::ptr::{self, NonNull};

/// Shared memory backend trait for cross-runtime memory mapping
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying file descriptor
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor (Linux memfd)
    Fd(i32),
}

/// Round a mapping size up to the 128-byte line the ring header is aligned to.
#[inline]
pub(crate) const fn align_region(size: usize) -> usize {
    (size + 127) & !127
}

/// Create a new anonymous shared memory region with the specified size.
///
/// # Arguments
/// * `size` - Size of the shared memory region in bytes
/// * `name` - Optional debug name for the memfd (shows up in /proc/<pid>/fd)
#[cfg(target_os = "linux")]
pub fn create_shared_memory(
    size: usize,
    name: Option<&str>,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(size, name)?))
}

/// Map an existing memfd received from a peer.
///
/// The descriptor is duplicated; the caller keeps ownership of `fd`.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(fd: i32, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach(fd, size)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(
    _size: usize,
    _name: Option<&str>,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_fd: i32, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    /// Create a new memfd-backed region of at least `size` bytes.
    pub fn create(size: usize, name: Option<&str>) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared memory region must not be empty",
            ));
        }
        let size = align_region(size);
        let c_name = std::ffi::CString::new(name.unwrap_or("memcall_ring")).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid shared memory name: {e}"),
            )
        })?;

        let fd = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let ptr = match unsafe { map_fd(fd, size) } {
            Ok(ptr) => ptr,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };

        tracing::debug!(fd, size, "created shared memory region");
        Ok(Self { ptr, size, fd })
    }

    /// Map a peer's memfd. Fails if the file is smaller than `expected_size`.
    pub fn attach(fd: i32, expected_size: usize) -> io::Result<Self> {
        let fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let actual_size = unsafe {
            let mut stat: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut stat) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            stat.st_size as usize
        };

        if actual_size < expected_size || actual_size == 0 {
            unsafe { libc::close(fd) };
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory too small: expected at least {}, got {}",
                    expected_size, actual_size
                ),
            ));
        }

        let ptr = match unsafe { map_fd(fd, actual_size) } {
            Ok(ptr) => ptr,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };

        tracing::debug!(fd, size = actual_size, "attached shared memory region");
        Ok(Self {
            ptr,
            size: actual_size,
            fd,
        })
    }
}

#[cfg(target_os = "linux")]
unsafe fn map_fd(fd: i32, size: usize) -> io::Result<NonNull<u8>> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            if libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) != 0 {
                tracing::error!(
                    error = %io::Error::last_os_error(),
                    size = self.size,
                    "munmap failed for shared memory region"
                );
            } else {
                tracing::debug!(fd = self.fd, size = self.size, "unmapped shared memory region");
            }
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}
