//! Compaction: pack every live record's bytes down into as few data regions
//! as possible, then drop the rest.
//!
//! This is the one operation allowed to move data out from under a handle,
//! which is why [`crate::StrAlloc::compact`] requires `&mut self` and why
//! [`crate::StrAlloc::data`] borrows from it, so the borrow checker keeps the
//! two from ever running in a way that would leave a caller holding a
//! pointer into memory that just got unmapped.

use crate::data_region::{round_capacity, DataRegion};
use crate::directory::Directory;
use crate::handle_region::HandleRegion;
use crate::region::MappedRegion;

/// Repack every live record into a fresh, tightly packed set of data
/// regions, unmapping whatever is left over. Returns the number of bytes
/// reclaimed.
pub fn compact(
    handle_directory: &mut Directory<HandleRegion>,
    data_directory: &mut Directory<DataRegion>,
    page_size: usize,
) -> usize {
    let before = data_directory.used_size(page_size);

    let mut fresh: Vec<(usize, DataRegion)> = Vec::new();
    let mut next_index = 0usize;

    for (_handle_region_index, handle_region) in handle_directory.occupied_mut() {
        let live_slots: Vec<usize> = handle_region.live_slots().collect();
        for slot in live_slots {
            let mut record = handle_region.record(slot);

            let old_bytes = {
                let old_data_region =
                    data_directory.slot(record.data_region).expect("record points at a live data region");
                old_data_region.bytes(record.data_offset, record.size).to_vec()
            };

            let (dest_index, dest_offset) =
                place(&mut fresh, &mut next_index, page_size, record.size, &old_bytes);

            record.data_region = dest_index;
            record.data_offset = dest_offset;
            record.capacity = round_capacity(record.size);
            handle_region.set_record(slot, record);
        }
    }

    for (_, region) in fresh.iter_mut() {
        region.coalesce();
    }
    let dropped = data_directory.replace_all(fresh);
    drop(dropped);

    let after = data_directory.used_size(page_size);
    let reclaimed = before.saturating_sub(after);
    log::debug!("compact: reclaimed {reclaimed} bytes ({before} -> {after})");
    reclaimed
}

/// Find or create room for `size` bytes among the regions built so far
/// during this compaction pass, write `payload` into it, and return where
/// it landed.
fn place(
    fresh: &mut Vec<(usize, DataRegion)>,
    next_index: &mut usize,
    page_size: usize,
    size: usize,
    payload: &[u8],
) -> (usize, usize) {
    for (index, region) in fresh.iter_mut() {
        if let Some((offset, _capacity)) = region.allocate(size) {
            region.bytes_mut(offset, size).copy_from_slice(payload);
            return (*index, offset);
        }
    }

    // None of the regions built so far during this pass have room. Map the
    // next geometrically sized region and try again, growing one index at a
    // time, until one is large enough to hold this record; a region that
    // turns out too small is still kept around for smaller records placed
    // later in this same pass, exactly like a freshly grown directory slot
    // would be.
    loop {
        let index = *next_index;
        *next_index += 1;
        let region_len = Directory::<DataRegion>::region_size(index, page_size);
        let mapped = MappedRegion::map(region_len).expect("compaction ran out of memory");
        let mut region = DataRegion::initialize(mapped);
        let fit = region.allocate(size);
        fresh.push((index, region));
        if let Some((offset, _capacity)) = fit {
            fresh.last_mut().expect("just pushed").1.bytes_mut(offset, size).copy_from_slice(payload);
            return (index, offset);
        }
    }
}
