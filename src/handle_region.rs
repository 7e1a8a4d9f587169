//! The handle slab: a region holding fixed-size [`Record`]s behind an
//! occupancy bitmap, scanned MSB-first so low-numbered slots fill first.

use crate::region::{MappedRegion, WORD};

const BITS_PER_WORD: usize = WORD * 8;

/// The bookkeeping stored per live handle: the requested size, the rounded
/// capacity actually reserved for it, and where its bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub size: usize,
    pub capacity: usize,
    pub data_offset: usize,
    pub data_region: usize,
}

impl Record {
    /// Words occupied by one record: size, capacity, data offset, data
    /// region index.
    const WORDS: usize = 4;

    fn from_words(words: [usize; Self::WORDS]) -> Self {
        Self { size: words[0], capacity: words[1], data_offset: words[2], data_region: words[3] }
    }

    fn to_words(self) -> [usize; Self::WORDS] {
        [self.size, self.capacity, self.data_offset, self.data_region]
    }
}

/// One region of the handle directory: a header word (slot count), an
/// occupancy bitmap, then `capacity` fixed-size record slots.
pub struct HandleRegion {
    mapped: MappedRegion,
    capacity: usize,
    bitmap_words: usize,
}

impl HandleRegion {
    const HEADER_WORDS: usize = 1;

    /// Initialize a freshly mapped region as a handle slab: compute how many
    /// slots fit, write the header, and preset the bitmap's tail bits so
    /// slots past `capacity` never look free.
    pub fn initialize(mapped: MappedRegion) -> Self {
        let word_count = mapped.word_count();
        let available = word_count.saturating_sub(Self::HEADER_WORDS);
        let mut capacity = available / Record::WORDS;
        while capacity > 0 {
            let bitmap_words = capacity.div_ceil(BITS_PER_WORD);
            if capacity * Record::WORDS + bitmap_words <= available {
                break;
            }
            capacity -= 1;
        }
        let bitmap_words = capacity.div_ceil(BITS_PER_WORD);
        debug_assert!(
            capacity * Record::WORDS + bitmap_words <= available,
            "handle region too small to hold even one slot"
        );

        let mut region = Self { mapped, capacity, bitmap_words };
        region.mapped.write_word(0, capacity);

        // mmap'd pages start zeroed, so every bitmap word already reads as
        // "all free"; only the tail bits beyond `capacity` in the last
        // bitmap word need presetting to "occupied" so they are never
        // handed out.
        if bitmap_words > 0 {
            let valid_in_last = capacity - (bitmap_words - 1) * BITS_PER_WORD;
            let tail_mask = if valid_in_last >= BITS_PER_WORD {
                0
            } else {
                (1usize << (BITS_PER_WORD - valid_in_last)) - 1
            };
            if tail_mask != 0 {
                let last_word_index = Self::HEADER_WORDS + bitmap_words - 1;
                let current = region.mapped.read_word(last_word_index);
                region.mapped.write_word(last_word_index, current | tail_mask);
            }
        }
        region
    }

    /// How many handle slots this region holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bitmap_word(&self, slot: usize) -> usize {
        self.mapped.read_word(Self::HEADER_WORDS + slot / BITS_PER_WORD)
    }

    fn set_bitmap_word(&mut self, word_index: usize, value: usize) {
        self.mapped.write_word(Self::HEADER_WORDS + word_index, value);
    }

    fn bit_mask(slot: usize) -> usize {
        let bit_from_msb = slot % BITS_PER_WORD;
        1usize << (BITS_PER_WORD - 1 - bit_from_msb)
    }

    pub fn is_live(&self, slot: usize) -> bool {
        self.bitmap_word(slot) & Self::bit_mask(slot) != 0
    }

    /// Find and reserve the first free slot, scanning bitmap words in order
    /// and within each word from the most significant bit.
    pub fn find_free_slot(&mut self) -> Option<usize> {
        for word_index in 0..self.bitmap_words {
            let word = self.mapped.read_word(Self::HEADER_WORDS + word_index);
            let free_bits = !word;
            if free_bits == 0 {
                continue;
            }
            let bit_from_msb = free_bits.leading_zeros() as usize;
            let slot = word_index * BITS_PER_WORD + bit_from_msb;
            if slot >= self.capacity {
                log::trace!("handle region: {slot} slots exhausted");
                return None;
            }
            self.set_bitmap_word(word_index, word | Self::bit_mask(slot));
            return Some(slot);
        }
        None
    }

    /// Mark `slot` free again.
    pub fn release(&mut self, slot: usize) {
        debug_assert!(self.is_live(slot), "double free of handle slot {slot}");
        let word_index = slot / BITS_PER_WORD;
        let word = self.bitmap_word(slot);
        self.set_bitmap_word(word_index, word & !Self::bit_mask(slot));
    }

    fn record_base_word(&self, slot: usize) -> usize {
        Self::HEADER_WORDS + self.bitmap_words + slot * Record::WORDS
    }

    pub fn record(&self, slot: usize) -> Record {
        let base = self.record_base_word(slot);
        let words = std::array::from_fn(|i| self.mapped.read_word(base + i));
        Record::from_words(words)
    }

    pub fn set_record(&mut self, slot: usize, record: Record) {
        let base = self.record_base_word(slot);
        for (i, word) in record.to_words().into_iter().enumerate() {
            self.mapped.write_word(base + i, word);
        }
    }

    /// Iterate the indices of every currently live slot, in order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity).filter(move |&slot| self.is_live(slot))
    }
}
