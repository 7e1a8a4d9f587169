//! The data heap: a first-fit free-list allocator over one region, used to
//! back the variable-length byte payloads that handles point at.
//!
//! Free extents form a singly linked list threaded through the region
//! itself: each free extent's first two words are `(next, size)`, where
//! `next` is the byte offset (relative to the start of the usable area) of
//! the next free extent, or [`NONE`]. Allocated extents carry no header;
//! their bytes belong entirely to the caller.

use crate::region::{MappedRegion, WORD};

/// Sentinel marking "no next extent" / "empty list".
const NONE: usize = usize::MAX;

/// Bytes reserved at the front of the region for the free-list head
/// pointer.
const HEADER_BYTES: usize = WORD;

/// The smallest capacity a free extent can have and still carry its own
/// `(next, size)` header.
pub const MIN_CAPACITY: usize = 2 * WORD;

/// Round a requested byte count up to a word-aligned capacity of at least
/// [`MIN_CAPACITY`], so every extent (free or allocated) is always big
/// enough to later hold free-list linkage if it's freed.
pub fn round_capacity(requested: usize) -> usize {
    requested.div_ceil(WORD).max(2) * WORD
}

pub struct DataRegion {
    mapped: MappedRegion,
}

impl DataRegion {
    /// Initialize a freshly mapped region as one large free extent spanning
    /// its entire usable area.
    pub fn initialize(mapped: MappedRegion) -> Self {
        let mut region = Self { mapped };
        let usable_len = region.usable_len();
        region.write_extent(0, NONE, usable_len);
        region.set_head(0);
        region
    }

    fn usable_len(&self) -> usize {
        self.mapped.len() - HEADER_BYTES
    }

    fn head(&self) -> usize {
        self.mapped.read_word(0)
    }

    fn set_head(&mut self, offset: usize) {
        self.mapped.write_word(0, offset);
    }

    fn extent_word_index(offset: usize) -> usize {
        debug_assert_eq!(offset % WORD, 0, "extent offset {offset} is not word-aligned");
        1 + offset / WORD
    }

    fn read_extent(&self, offset: usize) -> (usize, usize) {
        let word = Self::extent_word_index(offset);
        (self.mapped.read_word(word), self.mapped.read_word(word + 1))
    }

    fn write_extent(&mut self, offset: usize, next: usize, size: usize) {
        let word = Self::extent_word_index(offset);
        self.mapped.write_word(word, next);
        self.mapped.write_word(word + 1, size);
    }

    fn set_next(&mut self, prev: Option<usize>, next: usize) {
        match prev {
            Some(prev_offset) => {
                let (_, size) = self.read_extent(prev_offset);
                self.write_extent(prev_offset, next, size);
            }
            None => self.set_head(next),
        }
    }

    /// Find a free extent of at least `requested` bytes, first-fit, and
    /// reserve it. Returns the usable offset and the actual capacity
    /// reserved (which may be larger than requested, up to
    /// [`MIN_CAPACITY`]-worth of tail absorption).
    pub fn allocate(&mut self, requested: usize) -> Option<(usize, usize)> {
        let capacity = round_capacity(requested);
        let mut prev = None;
        let mut current = self.head();
        while current != NONE {
            let (next, size) = self.read_extent(current);
            if size >= capacity {
                let remaining = size - capacity;
                if remaining < MIN_CAPACITY {
                    self.set_next(prev, next);
                    return Some((current, size));
                }
                let new_offset = current + capacity;
                self.write_extent(new_offset, next, remaining);
                self.set_next(prev, new_offset);
                return Some((current, capacity));
            }
            prev = Some(current);
            current = next;
        }
        log::trace!("data region: no fit for {requested} bytes (rounded {capacity})");
        None
    }

    /// Return a previously allocated extent to the free list. Insertion is
    /// LIFO at the head; adjacency is not checked here, call [`coalesce`]
    /// to merge neighboring free extents.
    ///
    /// [`coalesce`]: DataRegion::coalesce
    pub fn free(&mut self, offset: usize, capacity: usize) {
        let old_head = self.head();
        self.write_extent(offset, old_head, capacity);
        self.set_head(offset);
    }

    /// Merge adjacent free extents into larger ones.
    ///
    /// This rebuilds the free list from scratch each call rather than
    /// coalescing incrementally on every free: the list is not kept sorted
    /// by offset (new nodes are always pushed at the head), so detecting
    /// adjacency requires a sorted view regardless, and a full rebuild is
    /// simpler to reason about than threading merge logic through `free`.
    pub fn coalesce(&mut self) {
        let mut extents = Vec::new();
        let mut current = self.head();
        while current != NONE {
            let (next, size) = self.read_extent(current);
            extents.push((current, size));
            current = next;
        }
        extents.sort_unstable_by_key(|&(offset, _)| offset);

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(extents.len());
        for (offset, size) in extents {
            if let Some(last) = merged.last_mut() {
                if last.0 + last.1 == offset {
                    last.1 += size;
                    continue;
                }
            }
            merged.push((offset, size));
        }

        if merged.is_empty() {
            self.set_head(NONE);
            return;
        }
        for i in 0..merged.len() {
            let next = merged.get(i + 1).map(|&(o, _)| o).unwrap_or(NONE);
            let (offset, size) = merged[i];
            self.write_extent(offset, next, size);
        }
        self.set_head(merged[0].0);
    }

    /// Total bytes currently sitting in free extents.
    pub fn free_size(&self) -> usize {
        let mut total = 0;
        let mut current = self.head();
        while current != NONE {
            let (next, size) = self.read_extent(current);
            total += size;
            current = next;
        }
        total
    }

    /// A byte view of `len` bytes at usable-area offset `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.mapped.slice(HEADER_BYTES + offset, len)
    }

    /// A mutable byte view of `len` bytes at usable-area offset `offset`.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.mapped.slice_mut(HEADER_BYTES + offset, len)
    }
}
