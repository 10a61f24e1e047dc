/// Packed missing-value bitmap: bit `i` set means element `i` is NA.
///
/// Positions at or beyond `len` read as NA, so a mask can be consulted with
/// untrusted positions without a bounds check at the call site.
#[derive(Debug, Clone, Eq)]
pub struct NaMask {
    words: Vec<u64>,
    len: usize,
}

impl NaMask {
    #[must_use]
    pub fn from_flags(flags: &[bool]) -> Self {
        let len = flags.len();
        let mut words = vec![0_u64; len.div_ceil(64)];
        for (idx, &missing) in flags.iter().enumerate() {
            if missing {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    /// Mask of `len` elements, none missing.
    #[must_use]
    pub fn none(len: usize) -> Self {
        Self {
            words: vec![0_u64; len.div_ceil(64)],
            len,
        }
    }

    /// Mask of `len` elements, all missing.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut words = vec![u64::MAX; len.div_ceil(64)];
        let remainder = len % 64;
        if remainder > 0
            && let Some(last) = words.last_mut()
        {
            *last = (1_u64 << remainder) - 1;
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return true;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub fn set(&mut self, idx: usize, missing: bool) {
        if idx >= self.len {
            return;
        }
        if missing {
            self.words[idx / 64] |= 1_u64 << (idx % 64);
        } else {
            self.words[idx / 64] &= !(1_u64 << (idx % 64));
        }
    }

    pub fn push(&mut self, missing: bool) {
        if self.len.is_multiple_of(64) {
            self.words.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, missing);
    }

    pub fn extend_from(&mut self, other: &Self) {
        for missing in other.flags() {
            self.push(missing);
        }
    }

    #[must_use]
    pub fn count_na(&self) -> usize {
        let full_words = self.len / 64;
        let mut count: u32 = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones())
            .sum();
        let remainder = self.len % 64;
        if remainder > 0 && full_words < self.words.len() {
            let mask = (1_u64 << remainder) - 1;
            count += (self.words[full_words] & mask).count_ones();
        }
        count as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn flags(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<bool> {
        self.flags().collect()
    }
}

impl PartialEq for NaMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.flags().eq(other.flags())
    }
}
