// Shared memory backend tests for Linux
// Run with: cargo test --test shared_memory -- --nocapture

#[cfg(target_os = "linux")]
mod linux_tests {
    use memcall::Core::{attach_shared_memory, create_shared_memory, RawHandle};

    #[test]
    fn test_create_shared_memory() {
        let size = 4096;
        let shm = create_shared_memory(size, Some("test_create")).unwrap();

        assert_eq!(shm.size(), size);
        assert!(!shm.as_ptr().is_null());

        unsafe {
            let slice = std::slice::from_raw_parts_mut(shm.as_ptr(), size);
            slice[0] = 0x42;
            assert_eq!(slice[0], 0x42);
        }
    }

    #[test]
    fn test_size_rounds_up_to_header_line() {
        let shm = create_shared_memory(100, None).unwrap();
        assert_eq!(shm.size(), 128);

        let shm = create_shared_memory(1024 * 1024, None).unwrap();
        assert_eq!(shm.size(), 1024 * 1024);
    }

    #[test]
    fn test_empty_region_is_rejected() {
        let err = create_shared_memory(0, None).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_attach_sees_owner_writes() {
        let size = 8192;
        let owner = create_shared_memory(size, Some("test_attach")).unwrap();
        let RawHandle::Fd(fd) = owner.raw_handle();
        assert!(fd > 0, "File descriptor should be positive");

        let peer = attach_shared_memory(fd, size).unwrap();
        assert_eq!(peer.size(), size);
        // two mappings of one file
        assert_ne!(peer.as_ptr(), owner.as_ptr());

        unsafe {
            let w = std::slice::from_raw_parts_mut(owner.as_ptr(), size);
            for (i, b) in w.iter_mut().enumerate().take(100) {
                *b = (i % 256) as u8;
            }
            let r = std::slice::from_raw_parts(peer.as_ptr(), size);
            for (i, b) in r.iter().enumerate().take(100) {
                assert_eq!(*b, (i % 256) as u8);
            }
        }

        // the peer holds its own descriptor
        let RawHandle::Fd(peer_fd) = peer.raw_handle();
        assert_ne!(peer_fd, fd);
    }

    #[test]
    fn test_attach_rejects_short_region() {
        let owner = create_shared_memory(4096, Some("test_short")).unwrap();
        let RawHandle::Fd(fd) = owner.raw_handle();
        let err = attach_shared_memory(fd, 8192).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_mmap_zero_initialized() {
        let size = 1024;
        let shm = create_shared_memory(size, Some("test_zero")).unwrap();

        unsafe {
            let slice = std::slice::from_raw_parts(shm.as_ptr(), size);
            assert!(slice.iter().all(|b| *b == 0), "Mmap'd memory should be zero-initialized");
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod non_linux_tests {
    use memcall::Core::{attach_shared_memory, create_shared_memory};

    #[test]
    fn test_unsupported() {
        let err = create_shared_memory(4096, None).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
        let err = attach_shared_memory(3, 4096).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    }
}
