//! The region directory: an ordered, append-only table of up to
//! [`MAX_REGIONS`] backing regions, each double the size of the last.
//!
//! Both the handle slab and the data heap grow the same way, so the growth
//! policy lives here once and each region kind only supplies how to
//! initialize a freshly mapped page range.

use crate::region::MappedRegion;

/// Hard ceiling on the number of regions a directory can hold.
///
/// With geometric doubling this is never actually reached: the byte size of
/// region `k` is `page_size * 2^k`, which overflows `usize` long before `k`
/// gets anywhere near 64. The bound exists to give the directory a plain,
/// fixed-size array representation instead of its own growable allocation.
pub const MAX_REGIONS: usize = 64;

/// A sparse, growable table of regions of kind `R`.
pub struct Directory<R> {
    slots: Box<[Option<R>; MAX_REGIONS]>,
}

impl<R> Directory<R> {
    pub fn new() -> Self {
        Self { slots: Box::new(std::array::from_fn(|_| None)) }
    }

    /// The byte size of region `index`, given the process page size.
    pub fn region_size(index: usize, page_size: usize) -> usize {
        page_size
            .checked_shl(index as u32)
            .expect("region index exceeds representable region size")
    }

    pub fn slot(&self, index: usize) -> Option<&R> {
        self.slots[index].as_ref()
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut R> {
        self.slots[index].as_mut()
    }

    /// Fetch region `index`, mapping and initializing it first if this is
    /// its first use.
    pub fn get_or_create(
        &mut self,
        index: usize,
        page_size: usize,
        init: impl FnOnce(MappedRegion) -> R,
    ) -> Option<&mut R> {
        if self.slots[index].is_none() {
            let mapped = MappedRegion::map(Self::region_size(index, page_size))?;
            log::debug!("directory: mapped region {index} ({} bytes)", mapped.len());
            self.slots[index] = Some(init(mapped));
        }
        self.slots[index].as_mut()
    }

    /// Iterate occupied slots in index order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &R)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|r| (i, r)))
    }

    /// Iterate occupied slots mutably in index order.
    pub fn occupied_mut(&mut self) -> impl Iterator<Item = (usize, &mut R)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| slot.as_mut().map(|r| (i, r)))
    }

    /// The total byte size of every mapped region.
    pub fn used_size(&self, page_size: usize) -> usize {
        self.occupied().map(|(index, _)| Self::region_size(index, page_size)).sum()
    }

    /// Replace the entire table with a freshly built set of regions,
    /// returning the old table so the caller can decide when to drop it
    /// (dropping unmaps each region it still holds).
    pub fn replace_all(&mut self, new_regions: Vec<(usize, R)>) -> Box<[Option<R>; MAX_REGIONS]> {
        let mut fresh: Box<[Option<R>; MAX_REGIONS]> = Box::new(std::array::from_fn(|_| None));
        for (index, region) in new_regions {
            fresh[index] = Some(region);
        }
        std::mem::replace(&mut self.slots, fresh)
    }
}

impl<R> Default for Directory<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_size_doubles_geometrically() {
        let page = 4096;
        assert_eq!(Directory::<()>::region_size(0, page), 4096);
        assert_eq!(Directory::<()>::region_size(1, page), 8192);
        assert_eq!(Directory::<()>::region_size(3, page), 32768);
    }

    #[test]
    fn get_or_create_maps_once_then_reuses() {
        let mut dir: Directory<MappedRegion> = Directory::new();
        let mut init_calls = 0;
        {
            let _ = dir.get_or_create(0, 4096, |mapped| {
                init_calls += 1;
                mapped
            });
        }
        {
            let _ = dir.get_or_create(0, 4096, |mapped| {
                init_calls += 1;
                mapped
            });
        }
        assert_eq!(init_calls, 1);
        assert_eq!(dir.occupied().count(), 1);
    }

    #[test]
    fn used_size_sums_only_occupied_regions() {
        let mut dir: Directory<MappedRegion> = Directory::new();
        dir.get_or_create(0, 4096, |m| m);
        dir.get_or_create(2, 4096, |m| m);
        assert_eq!(dir.used_size(4096), 4096 + 16384);
    }
}
