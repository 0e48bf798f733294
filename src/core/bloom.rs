// Membership filter over fixed-width native values, hashed by their little-endian bytes.
use std::fmt;
use std::marker::PhantomData;

use bloomfilter::Bloom;

use crate::core::error::{Error, ErrorKind};
use crate::core::paged::NativeType;

const MAX_WIDTH: usize = 16;

pub struct BloomFilter<T> {
    filter: Bloom<[u8]>,
    items: usize,
    _value: PhantomData<fn(T)>,
}

impl<T: NativeType> BloomFilter<T> {
    /// Size the filter for `expected_items` at the given false-positive rate.
    ///
    /// The rate must lie strictly between 0 and 1.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self, Error> {
        check_rate(false_positive_rate)?;
        Ok(Self {
            filter: Bloom::new_for_fp_rate(expected_items.max(1), false_positive_rate),
            items: 0,
            _value: PhantomData,
        })
    }

    pub fn insert(&mut self, value: T) {
        let mut raw = [0u8; MAX_WIDTH];
        value.put(&mut raw);
        self.filter.set(&raw[..T::WIDTH]);
        self.items += 1;
    }

    /// False means the value was never inserted.
    pub fn probably(&self, value: T) -> bool {
        let mut raw = [0u8; MAX_WIDTH];
        value.put(&mut raw);
        self.filter.check(&raw[..T::WIDTH])
    }

    pub fn items(&self) -> usize {
        self.items
    }
}

// NaN fails both comparisons.
pub(crate) fn check_rate(rate: f64) -> Result<(), Error> {
    if !(rate > 0.0 && rate < 1.0) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("bloom false-positive rate {rate} is outside (0, 1)"))
            .with_hint("Pick a rate such as 0.01."));
    }
    Ok(())
}

impl<T> fmt::Debug for BloomFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("items", &self.items)
            .field("bits", &self.filter.number_of_bits())
            .finish()
    }
}
