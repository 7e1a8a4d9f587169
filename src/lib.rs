//! A byte-string allocator backed directly by anonymous OS memory mappings.
//!
//! Callers reserve a byte length and get back a [`Handle`]: a small,
//! copyable value that indexes into two parallel structures this type owns:
//!
//! - a **handle directory**: a growing sequence of bitmap-indexed slabs,
//!   each slot holding one [`Record`](handle_region::Record) (size, rounded
//!   capacity, and where the bytes live);
//! - a **data directory**: a growing sequence of free-list heaps, which is
//!   where the bytes themselves actually sit.
//!
//! Both directories start empty and grow region by region as they fill, each
//! new region twice the size of the last (see [`directory::MAX_REGIONS`]).
//! Freeing a handle returns its handle slot and its data extent to their
//! respective free structures for reuse; it never shrinks a directory or
//! unmaps a region, only [`StrAlloc::compact`] does that, by rebuilding the
//! data directory from scratch around just the bytes still live.
//!
//! ```
//! # use stralloc::StrAlloc;
//! let mut alloc = StrAlloc::new();
//! let hello = alloc.allocate(5).unwrap();
//! alloc.data_mut(hello).copy_from_slice(b"hello");
//! let world = alloc.allocate(5).unwrap();
//! alloc.data_mut(world).copy_from_slice(b"world");
//! let combined = alloc.concat(hello, world).unwrap();
//! assert_eq!(alloc.data(combined), b"helloworld");
//! alloc.free(Some(hello));
//! alloc.free(Some(world));
//! alloc.free(Some(combined));
//! ```

mod compact;
mod data_region;
mod directory;
mod handle_region;
mod os;
mod region;

const _: () = assert!(
    usize::BITS == 64,
    "stralloc assumes a 64-bit machine word; region offsets and directory math are not valid on other targets"
);

use data_region::DataRegion;
use directory::Directory;
use handle_region::{HandleRegion, Record};

/// A reference to one live allocation.
///
/// Opaque and copyable; the fields are crate-private so a `Handle` can only
/// be produced by [`StrAlloc::allocate`]/[`StrAlloc::concat`], never forged
/// from raw indices by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    handle_region: usize,
    slot: usize,
}

/// Why an operation on a [`StrAlloc`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The OS refused to hand back more anonymous memory.
    OutOfMemory,
    /// The handle directory has reached [`directory::MAX_REGIONS`] regions
    /// and cannot grow further.
    HandleDirectoryFull,
    /// The data directory has reached [`directory::MAX_REGIONS`] regions
    /// and cannot grow further.
    DataDirectoryFull,
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::OutOfMemory => "the operating system refused to map more memory",
            Self::HandleDirectoryFull => "handle directory exhausted its region capacity",
            Self::DataDirectoryFull => "data directory exhausted its region capacity",
        };
        f.write_str(message)
    }
}

impl std::error::Error for AllocError {}

/// The allocator itself: two directories of OS-mapped regions and nothing
/// else. Not `Sync`: every method takes `&mut self`, so sharing one across
/// threads needs its own external synchronization.
pub struct StrAlloc {
    handle_directory: Directory<HandleRegion>,
    data_directory: Directory<DataRegion>,
    page_size: usize,
}

impl StrAlloc {
    /// An allocator with nothing mapped yet; the first call to `allocate`
    /// maps its first handle region and its first data region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle_directory: Directory::new(),
            data_directory: Directory::new(),
            page_size: os::page_size(),
        }
    }

    /// Reserve `size` bytes and return a handle to them. The bytes are not
    /// zero-filled (non-goal, see the crate-level docs); write through
    /// [`data_mut`](StrAlloc::data_mut) before reading anything meaningful
    /// back.
    pub fn allocate(&mut self, size: usize) -> Option<Handle> {
        self.try_allocate(size).ok()
    }

    fn try_allocate(&mut self, size: usize) -> Result<Handle, AllocError> {
        let (handle_region, slot) = allocate_handle_slot(&mut self.handle_directory, self.page_size)?;

        match allocate_data_extent(&mut self.data_directory, self.page_size, size) {
            Ok((data_region, offset, capacity)) => {
                let record = Record { size, capacity, data_offset: offset, data_region };
                self.handle_directory
                    .slot_mut(handle_region)
                    .expect("just allocated this slot")
                    .set_record(slot, record);

                Ok(Handle { handle_region, slot })
            }
            Err(err) => {
                // undo the handle reservation so a failed allocation never
                // leaves a slot looking live with no backing data
                self.handle_directory
                    .slot_mut(handle_region)
                    .expect("just allocated this slot")
                    .release(slot);
                Err(err)
            }
        }
    }

    /// Release a handle and return its bytes to the free structures for
    /// reuse. A no-op on `None`.
    pub fn free(&mut self, handle: Option<Handle>) {
        let Some(handle) = handle else { return };
        let handle_region = self
            .handle_directory
            .slot_mut(handle.handle_region)
            .expect("handle refers to a mapped handle region");
        let record = handle_region.record(handle.slot);
        handle_region.release(handle.slot);

        let data_region = self
            .data_directory
            .slot_mut(record.data_region)
            .expect("handle's record refers to a mapped data region");
        data_region.free(record.data_offset, record.capacity);
    }

    /// The number of bytes a handle was allocated with.
    pub fn size(&self, handle: Handle) -> usize {
        self.record(handle).size
    }

    /// A read-only view of a handle's bytes.
    ///
    /// Borrows `&self`, so the returned slice can't outlive a subsequent
    /// call to [`compact`](StrAlloc::compact) or [`data_mut`](StrAlloc::data_mut),
    /// since both take `&mut self` and the borrow checker rejects holding
    /// it across either.
    pub fn data(&self, handle: Handle) -> &[u8] {
        let record = self.record(handle);
        let region = self
            .data_directory
            .slot(record.data_region)
            .expect("handle's record refers to a mapped data region");
        region.bytes(record.data_offset, record.size)
    }

    /// A writable view of a handle's bytes. See [`data`](StrAlloc::data) for
    /// the read-only counterpart and its anti-compaction borrow contract.
    pub fn data_mut(&mut self, handle: Handle) -> &mut [u8] {
        let record = self.record(handle);
        let region = self
            .data_directory
            .slot_mut(record.data_region)
            .expect("handle's record refers to a mapped data region");
        region.bytes_mut(record.data_offset, record.size)
    }

    /// Allocate a new handle holding the concatenation of two existing
    /// ones. Neither input handle is freed or modified.
    pub fn concat(&mut self, left: Handle, right: Handle) -> Option<Handle> {
        let mut combined = Vec::with_capacity(self.size(left) + self.size(right));
        combined.extend_from_slice(self.data(left));
        combined.extend_from_slice(self.data(right));
        let handle = self.allocate(combined.len())?;
        self.data_mut(handle).copy_from_slice(&combined);
        Some(handle)
    }

    /// Repack every live record into a tightly packed set of data regions,
    /// unmapping whatever is left over. Returns the number of bytes
    /// reclaimed. Existing handles stay valid; their records are rewritten
    /// in place to point at the new locations.
    pub fn compact(&mut self) -> usize {
        compact::compact(&mut self.handle_directory, &mut self.data_directory, self.page_size)
    }

    /// Total bytes currently occupied by live records.
    pub fn live_size(&self) -> usize {
        self.handle_directory
            .occupied()
            .flat_map(|(_, region)| region.live_slots().map(|slot| region.record(slot).size))
            .sum()
    }

    /// Total bytes sitting in free extents across every mapped data region.
    pub fn free_size(&self) -> usize {
        self.data_directory.occupied().map(|(_, region)| region.free_size()).sum()
    }

    /// Total bytes currently mapped for the data heap (live plus free).
    pub fn used_size(&self) -> usize {
        self.data_directory.used_size(self.page_size)
    }

    fn record(&self, handle: Handle) -> Record {
        self.handle_directory
            .slot(handle.handle_region)
            .expect("handle refers to a mapped handle region")
            .record(handle.slot)
    }
}

impl Default for StrAlloc {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a free handle slot anywhere in the directory, creating the next
/// region if every existing one is full.
fn allocate_handle_slot(
    directory: &mut Directory<HandleRegion>,
    page_size: usize,
) -> Result<(usize, usize), AllocError> {
    for index in 0..directory::MAX_REGIONS {
        let region = match directory.get_or_create(index, page_size, HandleRegion::initialize) {
            Some(region) => region,
            None => return Err(AllocError::OutOfMemory),
        };
        if let Some(slot) = region.find_free_slot() {
            return Ok((index, slot));
        }
    }
    Err(AllocError::HandleDirectoryFull)
}

/// Find room for `requested` bytes, starting the scan at the smallest
/// region that could plausibly fit it and creating new regions as needed.
fn allocate_data_extent(
    directory: &mut Directory<DataRegion>,
    page_size: usize,
    requested: usize,
) -> Result<(usize, usize, usize), AllocError> {
    let capacity = data_region::round_capacity(requested);
    let start = (0..directory::MAX_REGIONS)
        .find(|&index| Directory::<DataRegion>::region_size(index, page_size) >= capacity)
        .unwrap_or(0);

    for index in start..directory::MAX_REGIONS {
        let region = match directory.get_or_create(index, page_size, DataRegion::initialize) {
            Some(region) => region,
            None => return Err(AllocError::OutOfMemory),
        };
        if let Some((offset, got)) = region.allocate(requested) {
            return Ok((index, offset, got));
        }
    }
    Err(AllocError::DataDirectoryFull)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Allocate `bytes.len()` bytes and write `bytes` through the data view,
    /// mirroring how a real caller would build a string up from raw content.
    fn mkstr(alloc: &mut StrAlloc, bytes: &[u8]) -> Handle {
        let handle = alloc.allocate(bytes.len()).unwrap();
        alloc.data_mut(handle).copy_from_slice(bytes);
        handle
    }

    #[test]
    fn allocate_and_read_back() {
        let mut alloc = StrAlloc::new();
        let handle = mkstr(&mut alloc, b"hello");
        assert_eq!(alloc.size(handle), 5);
        assert_eq!(alloc.data(handle), b"hello");
    }

    #[test]
    fn free_then_allocate_reuses_space() {
        let mut alloc = StrAlloc::new();
        let handle = mkstr(&mut alloc, b"hello");
        let free_before = alloc.free_size();
        alloc.free(Some(handle));
        assert!(alloc.free_size() > free_before);
        let handle2 = mkstr(&mut alloc, b"world");
        assert_eq!(alloc.data(handle2), b"world");
    }

    #[test]
    fn concat_produces_a_new_independent_handle() {
        let mut alloc = StrAlloc::new();
        let a = mkstr(&mut alloc, b"foo");
        let b = mkstr(&mut alloc, b"bar");
        let combined = alloc.concat(a, b).unwrap();
        assert_eq!(alloc.data(combined), b"foobar");
        assert_eq!(alloc.data(a), b"foo");
        assert_eq!(alloc.data(b), b"bar");
    }

    #[test]
    fn live_size_tracks_allocations_and_frees() {
        let mut alloc = StrAlloc::new();
        assert_eq!(alloc.live_size(), 0);
        let a = mkstr(&mut alloc, b"12345");
        let b = mkstr(&mut alloc, b"67");
        assert_eq!(alloc.live_size(), 7);
        alloc.free(Some(a));
        assert_eq!(alloc.live_size(), 2);
        alloc.free(Some(b));
        assert_eq!(alloc.live_size(), 0);
    }

    #[test]
    fn compact_preserves_handle_validity_and_contents() {
        let mut alloc = StrAlloc::new();
        let a = mkstr(&mut alloc, b"hello");
        let b = mkstr(&mut alloc, b"world");
        alloc.free(Some(a));
        let c = mkstr(&mut alloc, b"!!");
        alloc.compact();
        assert_eq!(alloc.data(b), b"world");
        assert_eq!(alloc.data(c), b"!!");
    }

    #[test]
    fn allocating_many_small_strings_grows_past_one_region() {
        let mut alloc = StrAlloc::new();
        let mut handles = Vec::new();
        for i in 0..10_000u32 {
            handles.push(mkstr(&mut alloc, &i.to_le_bytes()));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(alloc.data(handle), (i as u32).to_le_bytes());
        }
    }

    #[test]
    fn free_on_none_is_a_no_op() {
        let mut alloc = StrAlloc::new();
        alloc.free(None);
        assert_eq!(alloc.live_size(), 0);
    }
}
