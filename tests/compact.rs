use stralloc::{Handle, StrAlloc};

fn mkstr(alloc: &mut StrAlloc, bytes: &[u8]) -> Handle {
    let _ = env_logger::try_init();
    let handle = alloc.allocate(bytes.len()).unwrap();
    alloc.data_mut(handle).copy_from_slice(bytes);
    handle
}

#[test]
fn compact_reclaims_bytes_left_by_freed_handles() {
    let mut alloc = StrAlloc::new();
    let mut handles = Vec::new();
    for i in 0..2_000u32 {
        handles.push(mkstr(&mut alloc, &i.to_le_bytes()));
    }
    // free every other handle, fragmenting the data region
    let mut survivors = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        if i % 2 == 0 {
            alloc.free(Some(handle));
        } else {
            survivors.push(handle);
        }
    }

    let used_before = alloc.used_size();
    let reclaimed = alloc.compact();
    assert!(reclaimed > 0);
    assert!(alloc.used_size() < used_before);

    for (i, handle) in survivors.iter().enumerate() {
        let original_index = 2 * i + 1;
        assert_eq!(alloc.data(*handle), (original_index as u32).to_le_bytes());
    }
}

#[test]
fn compacting_with_nothing_freed_changes_nothing_observable() {
    let mut alloc = StrAlloc::new();
    let a = mkstr(&mut alloc, b"alpha");
    let b = mkstr(&mut alloc, b"beta");
    alloc.compact();
    assert_eq!(alloc.data(a), b"alpha");
    assert_eq!(alloc.data(b), b"beta");
}

#[test]
fn compact_is_idempotent_when_nothing_is_fragmented() {
    let mut alloc = StrAlloc::new();
    let handle = mkstr(&mut alloc, b"steady");
    alloc.compact();
    let first_pass = alloc.used_size();
    alloc.compact();
    assert_eq!(alloc.used_size(), first_pass);
    assert_eq!(alloc.data(handle), b"steady");
}
