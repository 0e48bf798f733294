//! Purpose: Per-kind columnar stores with optional bloom filters, parsed defaults and histograms.
//! Exports: `StoreType`, `TypeData`, `StringData`, `PageSizes`, `StoreOptions`.
//! Role: Value store behind `TypeDataProxy`; one instance per scalar column.
//! Invariants: Fixed-width values live at `index * WIDTH`; void positions hold zero bytes.
//! Invariants: Void writes never touch the bloom filter, so `probably` has no false negatives.
//! Invariants: String values are append-only and resolve through an offset table.
//! Invariants: A dictionary position links to the first equal value and stores no bytes.
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::core::bloom::{self, BloomFilter};
use crate::core::error::{Error, ErrorKind};
use crate::core::histogram::Histogram;
use crate::core::kind::{Column, ColumnType, Kind};
use crate::core::paged::{NativeType, PagedSlice};

/// Page size per store family, in bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageSizes {
    pub meta: usize,
    pub bool: usize,
    pub byte: usize,
    pub short: usize,
    pub int: usize,
    pub long: usize,
    pub int128: usize,
    pub float: usize,
    pub double: usize,
    pub binary: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            meta: 4 * 1024,
            bool: 1024,
            byte: 2 * 1024,
            short: 2 * 1024,
            int: 4 * 1024,
            long: 8 * 1024,
            int128: 8 * 1024,
            float: 8 * 1024,
            double: 8 * 1024,
            binary: 32 * 1024,
        }
    }
}

impl PageSizes {
    pub fn for_kind(&self, kind: Kind) -> usize {
        match kind {
            Kind::Bool => self.bool,
            Kind::Byte => self.byte,
            Kind::Short => self.short,
            Kind::Int => self.int,
            Kind::Long => self.long,
            Kind::Int128 => self.int128,
            Kind::Float => self.float,
            Kind::Double => self.double,
            Kind::String => self.binary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub page_sizes: PageSizes,
    pub bloom_fp_rate: f64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            page_sizes: PageSizes::default(),
            bloom_fp_rate: 0.01,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<(), Error> {
        bloom::check_rate(self.bloom_fp_rate)
    }
}

/// Native type a `TypeData` can hold.
pub trait StoreType: NativeType + FromStr + PartialEq + Debug {
    const KIND: Kind;
    /// Whether a bloom filter is worth keeping for this kind.
    const BLOOM: bool;

    fn record(self, histogram: &mut Histogram);
}

macro_rules! store_type {
    ($($ty:ty => $kind:expr, $bloom:expr, $record:ident;)*) => {
        $(
            impl StoreType for $ty {
                const KIND: Kind = $kind;
                const BLOOM: bool = $bloom;

                fn record(self, histogram: &mut Histogram) {
                    histogram.$record(self);
                }
            }
        )*
    };
}

store_type! {
    bool => Kind::Bool, false, record_bool;
    i8 => Kind::Byte, true, record_int;
    i16 => Kind::Short, true, record_int;
    i32 => Kind::Int, true, record_int;
    i64 => Kind::Long, true, record_int;
    f32 => Kind::Float, true, record_real;
    f64 => Kind::Double, true, record_real;
    i128 => Kind::Int128, true, record_count;
}

fn check_column(column: &Column, kind: Kind) -> Result<(), Error> {
    if column.ty != ColumnType::Scalar(kind) {
        return Err(Error::new(ErrorKind::TypeMismatch).with_message(format!(
            "column `{}` is {}, store holds {kind}",
            column.name, column.ty
        )));
    }
    Ok(())
}

// Empty literals mean no default.
fn default_literal(column: &Column) -> Option<&str> {
    column.default.as_deref().filter(|literal| !literal.is_empty())
}

fn position(index: usize, width: usize) -> Result<usize, Error> {
    index.checked_mul(width).ok_or_else(|| {
        Error::new(ErrorKind::OutOfRange)
            .with_message("store position overflow")
            .with_offset(index)
    })
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::new(ErrorKind::OutOfRange)
        .with_message(format!("store index out of range ({len} positions)"))
        .with_offset(index)
}

#[derive(Debug)]
pub struct TypeData<T: StoreType> {
    slice: PagedSlice<'static>,
    present: Vec<bool>,
    bloom: Option<BloomFilter<T>>,
    default: Option<T>,
    histogram: Histogram,
}

impl<T: StoreType> TypeData<T> {
    pub fn new(column: &Column, batch_size: usize, options: &StoreOptions) -> Result<Self, Error> {
        check_column(column, T::KIND)?;
        let default = match default_literal(column) {
            Some(literal) => Some(literal.parse::<T>().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message(format!(
                    "default `{literal}` for column `{}` is not a valid {}",
                    column.name,
                    T::KIND
                ))
            })?),
            None => None,
        };
        let bloom = match column.bloom_filter && T::BLOOM {
            true => Some(BloomFilter::new(batch_size, options.bloom_fp_rate)?),
            false => None,
        };
        debug!(
            column = %column.name,
            kind = %T::KIND,
            bloom = bloom.is_some(),
            "typed store ready"
        );
        Ok(Self {
            slice: PagedSlice::new(options.page_sizes.for_kind(T::KIND)),
            present: Vec::new(),
            bloom,
            default,
            histogram: Histogram::for_kind(T::KIND),
        })
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    pub fn add(&mut self, index: usize, value: T) -> Result<usize, Error> {
        let written = self.slice.write(position(index, T::WIDTH)?, value)?;
        self.mark(index, true);
        if let Some(bloom) = &mut self.bloom {
            bloom.insert(value);
        }
        value.record(&mut self.histogram);
        Ok(written)
    }

    pub fn add_void(&mut self, index: usize) -> Result<(), Error> {
        let zero = [0u8; 16];
        self.slice
            .write_bytes(position(index, T::WIDTH)?, &zero[..T::WIDTH])?;
        self.mark(index, false);
        Ok(())
    }

    /// Value at `index`; void positions read back as zero.
    pub fn read(&self, index: usize) -> Result<T, Error> {
        if index >= self.present.len() {
            return Err(out_of_range(index, self.present.len()));
        }
        self.slice.read(position(index, T::WIDTH)?)
    }

    pub fn is_void(&self, index: usize) -> Result<bool, Error> {
        self.present
            .get(index)
            .map(|present| !present)
            .ok_or_else(|| out_of_range(index, self.present.len()))
    }

    pub fn default_value(&self) -> Option<T> {
        self.default
    }

    pub fn probably(&self, value: T) -> bool {
        self.bloom.as_ref().is_none_or(|bloom| bloom.probably(value))
    }

    /// Void positions, including gaps left by writes past the end.
    pub fn null_count(&self) -> usize {
        self.present.iter().filter(|present| !**present).count()
    }

    pub fn histogram(&self) -> Histogram {
        self.histogram.with_nulls(self.null_count())
    }

    fn mark(&mut self, index: usize, present: bool) {
        if index >= self.present.len() {
            self.present.resize(index + 1, false);
        }
        self.present[index] = present;
    }
}

/// Equal-value sharing for a string store.
#[derive(Debug)]
struct Dictionary {
    // hash -> positions holding stored bytes, in insert order; dropped on seal
    items: Option<HashMap<u64, Vec<usize>>>,
    links: HashMap<usize, usize>,
}

fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Append-only string store; `offsets` holds the end offset of each value.
#[derive(Debug)]
pub struct StringData {
    slice: PagedSlice<'static>,
    offsets: PagedSlice<'static>,
    size: usize,
    voids: Vec<bool>,
    default: Option<String>,
    dictionary: Option<Dictionary>,
    histogram: Histogram,
}

impl StringData {
    pub fn new(column: &Column, options: &StoreOptions) -> Result<Self, Error> {
        check_column(column, Kind::String)?;
        debug!(
            column = %column.name,
            kind = %Kind::String,
            bloom = false,
            dictionary = column.dictionary,
            "typed store ready"
        );
        Ok(Self {
            slice: PagedSlice::new(options.page_sizes.binary),
            offsets: PagedSlice::new(options.page_sizes.meta),
            size: 0,
            voids: Vec::new(),
            default: default_literal(column).map(str::to_owned),
            dictionary: column.dictionary.then(|| Dictionary {
                items: Some(HashMap::new()),
                links: HashMap::new(),
            }),
            histogram: Histogram::for_kind(Kind::String),
        })
    }

    pub fn len(&self) -> usize {
        self.voids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voids.is_empty()
    }

    /// Total value bytes stored.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_dictionary(&self) -> bool {
        self.dictionary.is_some()
    }

    /// Stops matching new values against earlier ones; existing links stay readable.
    pub fn seal(&mut self) {
        if let Some(dictionary) = &mut self.dictionary {
            dictionary.items = None;
        }
    }

    /// Bytes written; zero when the value links to an equal earlier one.
    pub fn add(&mut self, index: usize, value: &str) -> Result<usize, Error> {
        self.check_next(index)?;
        let hash = self
            .dictionary
            .as_ref()
            .filter(|dictionary| dictionary.items.is_some())
            .map(|_| hash_str(value));
        if let Some(hash) = hash {
            if let Some(target) = self.find(hash, value)? {
                self.push(index, 0, false)?;
                if let Some(dictionary) = &mut self.dictionary {
                    dictionary.links.insert(index, target);
                }
                self.histogram.record_count(value);
                return Ok(0);
            }
        }

        let written = self.slice.write_bytes(self.size, value.as_bytes())?;
        self.push(index, written, false)?;
        if let (Some(hash), Some(items)) = (
            hash,
            self.dictionary.as_mut().and_then(|dictionary| dictionary.items.as_mut()),
        ) {
            items.entry(hash).or_default().push(index);
        }
        self.histogram.record_count(value);
        Ok(written)
    }

    pub fn add_void(&mut self, index: usize) -> Result<(), Error> {
        self.check_next(index)?;
        self.push(index, 0, true)
    }

    pub fn read_str(&self, index: usize) -> Result<&str, Error> {
        if index >= self.voids.len() {
            return Err(out_of_range(index, self.voids.len()));
        }
        let target = self
            .dictionary
            .as_ref()
            .and_then(|dictionary| dictionary.links.get(&index).copied())
            .unwrap_or(index);
        self.stored_str(target)
    }

    pub fn is_void(&self, index: usize) -> Result<bool, Error> {
        self.voids
            .get(index)
            .copied()
            .ok_or_else(|| out_of_range(index, self.voids.len()))
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Strings carry no bloom filter, so every value may be present.
    pub fn probably(&self, _value: &str) -> bool {
        true
    }

    pub fn null_count(&self) -> usize {
        self.voids.iter().filter(|void| **void).count()
    }

    pub fn histogram(&self) -> Histogram {
        self.histogram.with_nulls(self.null_count())
    }

    fn find(&self, hash: u64, value: &str) -> Result<Option<usize>, Error> {
        let candidates = self
            .dictionary
            .as_ref()
            .and_then(|dictionary| dictionary.items.as_ref())
            .and_then(|items| items.get(&hash));
        for &candidate in candidates.into_iter().flatten() {
            if self.stored_str(candidate)? == value {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    // Bytes between the previous end offset and this one, ignoring links.
    fn stored_str(&self, index: usize) -> Result<&str, Error> {
        let start = match index {
            0 => 0,
            _ => self.end_of(index - 1)?,
        };
        let end = self.end_of(index)?;
        let bytes = self.slice.bytes(start, end - start)?;
        std::str::from_utf8(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("stored string is not valid utf-8")
                .with_offset(index)
                .with_source(err)
        })
    }

    fn check_next(&self, index: usize) -> Result<(), Error> {
        if index != self.voids.len() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "string store is append-only; next position is {}",
                    self.voids.len()
                ))
                .with_offset(index));
        }
        Ok(())
    }

    fn push(&mut self, index: usize, len: usize, void: bool) -> Result<(), Error> {
        let end = self.size + len;
        self.offsets.write(position(index, 8)?, end as u64)?;
        self.size = end;
        self.voids.push(void);
        Ok(())
    }

    fn end_of(&self, index: usize) -> Result<usize, Error> {
        let end = self.offsets.read::<u64>(position(index, 8)?)?;
        usize::try_from(end).map_err(|_| {
            Error::new(ErrorKind::Corrupt)
                .with_message("string offset exceeds address space")
                .with_offset(index)
        })
    }
}
