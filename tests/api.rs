use stralloc::StrAlloc;

fn mkstr(alloc: &mut StrAlloc, bytes: &[u8]) -> stralloc::Handle {
    let _ = env_logger::try_init();
    let handle = alloc.allocate(bytes.len()).unwrap();
    alloc.data_mut(handle).copy_from_slice(bytes);
    handle
}

#[test]
fn default_constructs_an_empty_allocator() {
    let alloc = StrAlloc::default();
    assert_eq!(alloc.live_size(), 0);
    assert_eq!(alloc.used_size(), 0);
}

#[test]
fn handles_are_copy_and_comparable() {
    let mut alloc = StrAlloc::new();
    let handle = mkstr(&mut alloc, b"x");
    let copied = handle;
    assert_eq!(handle, copied);
}

#[test]
fn allocating_an_empty_slice_is_allowed() {
    let mut alloc = StrAlloc::new();
    let handle = alloc.allocate(0).unwrap();
    assert_eq!(alloc.size(handle), 0);
    assert_eq!(alloc.data(handle), b"");
}

#[test]
fn freeing_none_is_a_no_op() {
    let mut alloc = StrAlloc::new();
    alloc.free(None);
}
