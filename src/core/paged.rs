//! Purpose: Growable byte regions with typed little-endian get/put at arbitrary offsets.
//! Exports: `NativeType`, `PagedSlice`, `Buffer`.
//! Role: Storage primitive under the row encoder regions and the typed stores.
//! Invariants: Owned capacity grows in whole pages and never shrinks.
//! Invariants: Borrowed slices are fixed-size and read-only; writes fail with `Usage`.
use tracing::trace;

use crate::core::error::{Error, ErrorKind};

/// Fixed-width value that can be stored in a `PagedSlice`.
pub trait NativeType: Copy + Sized {
    const WIDTH: usize;

    fn put(self, out: &mut [u8]);

    fn get(bytes: &[u8]) -> Self;
}

macro_rules! native_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NativeType for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn put(self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

native_le!(u8, u32, u64, i8, i16, i32, i64, i128, f32, f64);

impl NativeType for bool {
    const WIDTH: usize = 1;

    fn put(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    fn get(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug)]
enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

#[derive(Debug)]
pub struct PagedSlice<'a> {
    storage: Storage<'a>,
    page_size: usize,
}

impl PagedSlice<'static> {
    pub fn new(page_size: usize) -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
            page_size: page_size.max(1),
        }
    }
}

impl<'a> PagedSlice<'a> {
    pub fn borrowed(bytes: &'a [u8]) -> Self {
        Self {
            storage: Storage::Borrowed(bytes),
            page_size: bytes.len().max(1),
        }
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_))
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn capacity(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes,
            Storage::Borrowed(bytes) => bytes,
        }
    }

    pub fn write<T: NativeType>(&mut self, offset: usize, value: T) -> Result<usize, Error> {
        let end = end_of(offset, T::WIDTH)?;
        let bytes = self.ensure(end)?;
        value.put(&mut bytes[offset..end]);
        Ok(T::WIDTH)
    }

    pub fn write_bytes(&mut self, offset: usize, src: &[u8]) -> Result<usize, Error> {
        let end = end_of(offset, src.len())?;
        let bytes = self.ensure(end)?;
        bytes[offset..end].copy_from_slice(src);
        Ok(src.len())
    }

    pub fn read<T: NativeType>(&self, offset: usize) -> Result<T, Error> {
        self.bytes(offset, T::WIDTH).map(T::get)
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], Error> {
        let end = end_of(offset, len)?;
        let slice = self.as_slice();
        if end > slice.len() {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message(format!("read of {len} bytes past capacity {}", slice.len()))
                .with_offset(offset));
        }
        Ok(&slice[offset..end])
    }

    fn ensure(&mut self, end: usize) -> Result<&mut [u8], Error> {
        let page_size = self.page_size;
        match &mut self.storage {
            Storage::Borrowed(_) => Err(Error::new(ErrorKind::Usage)
                .with_message("cannot write into a borrowed region")
                .with_offset(end)),
            Storage::Owned(bytes) => {
                if end > bytes.len() {
                    let target = end.div_ceil(page_size).saturating_mul(page_size);
                    bytes.try_reserve(target - bytes.len()).map_err(|err| {
                        Error::new(ErrorKind::Alloc)
                            .with_message(format!("failed to grow region to {target} bytes"))
                            .with_source(err)
                    })?;
                    trace!(from = bytes.len(), to = target, "grow paged slice");
                    bytes.resize(target, 0);
                }
                Ok(bytes.as_mut_slice())
            }
        }
    }
}

fn end_of(offset: usize, len: usize) -> Result<usize, Error> {
    offset.checked_add(len).ok_or_else(|| {
        Error::new(ErrorKind::OutOfRange)
            .with_message("offset overflow")
            .with_offset(offset)
    })
}

/// A paged slice paired with a running write offset.
///
/// Over borrowed bytes the offset is fixed at the borrowed length.
#[derive(Debug)]
pub struct Buffer<'a> {
    offset: usize,
    slice: PagedSlice<'a>,
}

impl Buffer<'static> {
    pub fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            slice: PagedSlice::new(page_size),
        }
    }
}

impl<'a> Buffer<'a> {
    pub fn borrowed(bytes: &'a [u8]) -> Self {
        Self {
            offset: bytes.len(),
            slice: PagedSlice::borrowed(bytes),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn slice(&self) -> &PagedSlice<'a> {
        &self.slice
    }

    pub fn is_borrowed(&self) -> bool {
        self.slice.is_borrowed()
    }

    pub fn append<T: NativeType>(&mut self, value: T) -> Result<usize, Error> {
        let written = self.slice.write(self.offset, value)?;
        self.offset += written;
        Ok(written)
    }

    pub fn append_bytes(&mut self, src: &[u8]) -> Result<usize, Error> {
        let written = self.slice.write_bytes(self.offset, src)?;
        self.offset += written;
        Ok(written)
    }

    pub fn write<T: NativeType>(&mut self, offset: usize, value: T) -> Result<usize, Error> {
        if end_of(offset, T::WIDTH)? > self.offset {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message("in-place write past the write offset")
                .with_offset(offset));
        }
        self.slice.write(offset, value)
    }

    pub fn read<T: NativeType>(&self, offset: usize) -> Result<T, Error> {
        self.bytes(offset, T::WIDTH).map(T::get)
    }

    /// Bytes inside the written extent only.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], Error> {
        if end_of(offset, len)? > self.offset {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message(format!("read of {len} bytes past write offset {}", self.offset))
                .with_offset(offset));
        }
        self.slice.bytes(offset, len)
    }

    pub fn written(&self) -> &[u8] {
        &self.slice.as_slice()[..self.offset]
    }

    /// Move the write offset back to an earlier checkpoint.
    pub fn rewind(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.offset {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("rewind target is past the write offset")
                .with_offset(offset));
        }
        if self.is_borrowed() {
            return Err(Error::new(ErrorKind::Usage).with_message("cannot rewind a borrowed region"));
        }
        self.offset = offset;
        Ok(())
    }
}
