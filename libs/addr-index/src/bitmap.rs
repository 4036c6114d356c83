//! A fixed-size occupancy bitmap over pool slot indices.
//!
//! Mirrors the table-entry bitmaps used by physical-frame allocators in this
//! codebase (e.g. the page-granularity usage maps in a bitmap frame
//! allocator): one bit per slot, `u64` words, linear scan for the first free
//! bit. The pool this backs tops out at a few thousand slots, so a linear
//! scan is not worth replacing with a free-list for the complexity it would
//! add.

pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.len);
        self.words[idx / 64] |= 1 << (idx % 64);
    }

    pub fn clear(&mut self, idx: usize) {
        debug_assert!(idx < self.len);
        self.words[idx / 64] &= !(1 << (idx % 64));
    }

    /// Returns the index of the first unset bit, if any.
    pub fn first_unset(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                let idx = word_idx * 64 + bit;
                if idx < self.len {
                    return Some(idx);
                }
            }
        }
        None
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
