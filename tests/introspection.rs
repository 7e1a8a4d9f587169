use stralloc::{Handle, StrAlloc};

fn mkstr(alloc: &mut StrAlloc, bytes: &[u8]) -> Handle {
    let _ = env_logger::try_init();
    let handle = alloc.allocate(bytes.len()).unwrap();
    alloc.data_mut(handle).copy_from_slice(bytes);
    handle
}

#[test]
fn sizes_add_up_consistently() {
    let mut alloc = StrAlloc::new();
    assert_eq!(alloc.live_size(), 0);
    assert_eq!(alloc.free_size(), 0);
    assert_eq!(alloc.used_size(), 0);

    let a = mkstr(&mut alloc, b"0123456789");
    let b = mkstr(&mut alloc, b"abcdefghij");

    assert_eq!(alloc.live_size(), 20);
    // capacity rounding and per-region headers mean live + free never
    // exceeds the mapped total, only approaches it
    assert!(alloc.live_size() + alloc.free_size() <= alloc.used_size());

    alloc.free(Some(a));
    assert_eq!(alloc.live_size(), 10);
    assert!(alloc.free_size() > 0);
    assert!(alloc.live_size() + alloc.free_size() <= alloc.used_size());

    alloc.free(Some(b));
    assert_eq!(alloc.live_size(), 0);
    assert!(alloc.free_size() <= alloc.used_size());
}

#[test]
fn used_size_only_grows_when_capacity_is_actually_exhausted() {
    let mut alloc = StrAlloc::new();
    let handle = mkstr(&mut alloc, b"tiny");
    let used = alloc.used_size();
    alloc.free(Some(handle));
    let _ = mkstr(&mut alloc, b"tiny");
    assert_eq!(alloc.used_size(), used);
}

#[test]
fn fresh_allocator_reports_all_zeros() {
    let alloc = StrAlloc::new();
    assert_eq!(alloc.live_size(), 0);
    assert_eq!(alloc.free_size(), 0);
    assert_eq!(alloc.used_size(), 0);
}
