//! Purpose: Centralize the slot header byte and serialized blob layout.
//! Exports: `NULL_BIT`, `BLOB_MAGIC`, `header_byte`, `is_null_header`, `BlobLayout`.
//! Role: Shared policy between the row encoder, its accessors, and reconstruction.
//! Invariants: All integers are little-endian; blob header fields are 8 bytes wide.
//! Invariants: The reserved header field always carries `BLOB_MAGIC`.
use std::ops::Range;

use crate::core::error::{Error, ErrorKind};
use crate::core::kind::Kind;

/// Header bit 7 marks a null slot; the low nibble holds the kind code.
pub const NULL_BIT: u8 = 0x80;
pub const KIND_MASK: u8 = 0x0F;

pub const BLOB_MAGIC: u64 = 0x0091_0928;
pub const WORD: usize = 8;
pub const BLOCK_HEADER_LEN: usize = 4 * WORD;

pub fn header_byte(kind: Kind, is_null: bool) -> u8 {
    let code = kind.code() & KIND_MASK;
    if is_null { code | NULL_BIT } else { code }
}

pub fn is_null_header(header: u8) -> bool {
    header & NULL_BIT != 0
}

/// Decoded blob: row offsets plus the byte ranges of the three regions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobLayout {
    pub row_offsets: Vec<usize>,
    pub main: Range<usize>,
    pub data: Range<usize>,
    pub list: Range<usize>,
}

impl BlobLayout {
    pub fn bin_size(rows: usize, main_len: usize, data_len: usize, list_len: usize) -> usize {
        WORD + rows * WORD + BLOCK_HEADER_LEN + main_len + data_len + list_len
    }

    pub fn write<I>(
        dest: &mut [u8],
        row_offsets: I,
        main: &[u8],
        data: &[u8],
        list: &[u8],
    ) -> Result<usize, Error>
    where
        I: ExactSizeIterator<Item = usize>,
    {
        let rows = row_offsets.len();
        let total = Self::bin_size(rows, main.len(), data.len(), list.len());
        if dest.len() < total {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "destination holds {} bytes, serialization needs {total}",
                    dest.len()
                ))
                .with_hint("Size the destination with `bin_size()`."));
        }

        let mut cursor = 0;
        write_u64(dest, cursor, rows as u64);
        cursor += WORD;
        for offset in row_offsets {
            write_u64(dest, cursor, offset as u64);
            cursor += WORD;
        }
        write_u64(dest, cursor, main.len() as u64);
        write_u64(dest, cursor + WORD, data.len() as u64);
        write_u64(dest, cursor + 2 * WORD, list.len() as u64);
        write_u64(dest, cursor + 3 * WORD, BLOB_MAGIC);
        cursor += BLOCK_HEADER_LEN;

        for block in [main, data, list] {
            dest[cursor..cursor + block.len()].copy_from_slice(block);
            cursor += block.len();
        }
        Ok(cursor)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < WORD {
            return Err(corrupt("blob too small for row count"));
        }
        let rows = to_usize(read_u64(bytes, 0))?;
        let table_end = rows
            .checked_mul(WORD)
            .and_then(|len| len.checked_add(WORD))
            .ok_or_else(|| corrupt("row count overflow"))?;
        let header_end = table_end
            .checked_add(BLOCK_HEADER_LEN)
            .ok_or_else(|| corrupt("row count overflow"))?;
        if bytes.len() < header_end {
            return Err(corrupt("blob too small for row table"));
        }

        let main_len = to_usize(read_u64(bytes, table_end))?;
        let data_len = to_usize(read_u64(bytes, table_end + WORD))?;
        let list_len = to_usize(read_u64(bytes, table_end + 2 * WORD))?;
        if read_u64(bytes, table_end + 3 * WORD) != BLOB_MAGIC {
            return Err(corrupt("bad blob magic"));
        }

        let main = region(header_end, main_len)?;
        let data = region(main.end, data_len)?;
        let list = region(data.end, list_len)?;
        if list.end > bytes.len() {
            return Err(corrupt("blob shorter than its declared regions"));
        }

        let mut row_offsets = Vec::with_capacity(rows);
        let mut previous = 0;
        for row in 0..rows {
            let offset = to_usize(read_u64(bytes, WORD + row * WORD))?;
            if offset < previous || offset > main_len {
                return Err(corrupt("row offset out of order").with_row(row));
            }
            previous = offset;
            row_offsets.push(offset);
        }

        Ok(Self {
            row_offsets,
            main,
            data,
            list,
        })
    }
}

fn region(start: usize, len: usize) -> Result<Range<usize>, Error> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| corrupt("region length overflow"))?;
    Ok(start..end)
}

fn corrupt(message: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

fn to_usize(value: u64) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| corrupt("length exceeds address space"))
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_8(buf, offset))
}

fn read_8(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    out
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::{BLOB_MAGIC, BlobLayout, NULL_BIT, header_byte, is_null_header};
    use crate::core::error::ErrorKind;
    use crate::core::kind::Kind;

    #[test]
    fn header_byte_carries_null_bit_and_kind() {
        let header = header_byte(Kind::Int, true);
        assert!(is_null_header(header));
        assert_eq!(header & !NULL_BIT, Kind::Int.code());
        assert!(!is_null_header(header_byte(Kind::String, false)));
    }

    #[test]
    fn layout_decodes_what_it_writes() {
        let main = [1u8, 2, 3, 4, 5];
        let data = *b"hello";
        let list = [9u8; 3];
        let size = BlobLayout::bin_size(2, main.len(), data.len(), list.len());
        let mut dest = vec![0u8; size];
        let written =
            BlobLayout::write(&mut dest, [0usize, 3].into_iter(), &main, &data, &list).expect("write");
        assert_eq!(written, size);

        let layout = BlobLayout::decode(&dest).expect("decode");
        assert_eq!(layout.row_offsets, vec![0, 3]);
        assert_eq!(&dest[layout.main.clone()], &main);
        assert_eq!(&dest[layout.data.clone()], b"hello");
        assert_eq!(&dest[layout.list.clone()], &list);
    }

    #[test]
    fn short_destination_is_rejected() {
        let mut dest = vec![0u8; 8];
        let err = BlobLayout::write(&mut dest, std::iter::empty(), &[1], &[], &[]).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn corrupt_blobs_are_rejected() {
        let mut dest = vec![0u8; BlobLayout::bin_size(0, 0, 0, 0)];
        BlobLayout::write(&mut dest, std::iter::empty(), &[], &[], &[]).expect("write");
        assert!(BlobLayout::decode(&dest).is_ok());

        let mut bad_magic = dest.clone();
        bad_magic[32..40].copy_from_slice(&(BLOB_MAGIC + 1).to_le_bytes());
        assert_eq!(BlobLayout::decode(&bad_magic).expect_err("magic").kind(), ErrorKind::Corrupt);

        let mut truncated = dest.clone();
        truncated[8..16].copy_from_slice(&100u64.to_le_bytes());
        assert_eq!(BlobLayout::decode(&truncated).expect_err("len").kind(), ErrorKind::Corrupt);

        let mut huge_rows = dest;
        huge_rows[0..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert_eq!(BlobLayout::decode(&huge_rows).expect_err("rows").kind(), ErrorKind::Corrupt);
    }
}
