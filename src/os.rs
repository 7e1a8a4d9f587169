//! The OS page interface: the only primitive the rest of this crate depends
//! on. Everything above this module works in terms of [`MappedRegion`]s
//! built from the pointers handed back here; nothing else ever calls into
//! `libc` directly.
//!
//! [`MappedRegion`]: crate::region::MappedRegion

use std::io;
use std::ptr;
use std::ptr::NonNull;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The runtime page size, queried once via `sysconf(_SC_PAGESIZE)` and
/// cached for the lifetime of the process.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: `sysconf` with a well-known, always-supported name never
        // touches memory beyond reading a kernel-provided constant.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).expect("sysconf(_SC_PAGESIZE) returned a non-positive value")
    })
}

/// Map `len` bytes of anonymous, private, read/write memory.
///
/// `len` must be a positive multiple of [`page_size`]; this is only ever
/// called with directory-computed sizes, so it is checked with a
/// `debug_assert` rather than returning an error for it.
pub fn map(len: usize) -> Option<NonNull<u8>> {
    debug_assert!(len > 0 && len % page_size() == 0, "mapping length {len} is not page-aligned");

    // SAFETY: requesting a new anonymous mapping touches no file descriptor
    // and no caller-supplied memory; `len` is validated above.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        log::warn!("mmap({len} bytes) failed: {}", io::Error::last_os_error());
        return None;
    }
    log::debug!("mmap({len} bytes) -> {ptr:p}");
    NonNull::new(ptr.cast())
}

/// Unmap a region previously returned by [`map`].
///
/// # Safety
/// `ptr` and `len` must be exactly the pointer and length returned by a
/// prior call to [`map`], and that mapping must not already have been
/// unmapped.
pub unsafe fn unmap(ptr: NonNull<u8>, len: usize) {
    // SAFETY: forwarded from the caller's safety contract above.
    let result = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
    debug_assert_eq!(result, 0, "munmap({ptr:p}, {len}) failed: {}", io::Error::last_os_error());
    log::debug!("munmap({ptr:p}, {len} bytes)");
}
