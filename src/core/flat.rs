//! Purpose: Pack schema-typed rows into main/data/list regions and track row metadata.
//! Exports: `FlatBuffer`, `FlatOptions`, `RowProps`, `ColumnProps`.
//! Role: Single-producer row encoder; accessors decode against its frozen state.
//! Invariants: Exactly one row is recorded per successful `add`; failures leave no partial row.
//! Invariants: `rollback` undoes only the most recent `add`; `resume` never moves that checkpoint.
//! Invariants: Instances built from bytes borrow them, copy no payload, and reject writes.
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::core::accessor::RowAccessor;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{self, BlobLayout};
use crate::core::kind::{ColumnType, Kind, Schema};
use crate::core::paged::Buffer;
use crate::core::scalar::Scalar;
use crate::core::surface::{ListData, RowData};

pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlatOptions {
    pub page_size: usize,
}

impl Default for FlatOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnProps {
    pub is_null: bool,
    /// Offset of the column's header byte relative to the row's start in main.
    pub offset: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowProps {
    pub offset: usize,
    pub columns: Vec<ColumnProps>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Checkpoint {
    main: usize,
    data: usize,
    list: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Encoder {
    Scalar(Kind),
    String,
    List(Kind),
}

impl Encoder {
    fn for_column(index: usize, ty: ColumnType) -> Result<Self, Error> {
        match ty {
            ColumnType::Scalar(Kind::String) => Ok(Encoder::String),
            ColumnType::Scalar(kind) => Ok(Encoder::Scalar(kind)),
            ColumnType::List(kind) => Ok(Encoder::List(kind)),
            ColumnType::Map(..) => Err(Error::new(ErrorKind::Unsupported)
                .with_message("map columns have no flat encoding")
                .with_column(index)),
        }
    }

    pub(crate) fn kind(self) -> Kind {
        match self {
            Encoder::Scalar(kind) | Encoder::List(kind) => kind,
            Encoder::String => Kind::String,
        }
    }

    /// Main-region bytes after the header byte when not null.
    fn width(self) -> usize {
        match self {
            Encoder::Scalar(kind) => kind.width(),
            Encoder::String | Encoder::List(_) => 8,
        }
    }
}

fn bind(schema: &Schema) -> Result<Vec<Encoder>, Error> {
    schema
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| Encoder::for_column(index, column.ty))
        .collect()
}

#[derive(Debug)]
pub struct FlatBuffer<'a> {
    schema: Arc<Schema>,
    encoders: Vec<Encoder>,
    main: Buffer<'a>,
    data: Buffer<'a>,
    list: Buffer<'a>,
    rows: Vec<RowProps>,
    last: Option<Checkpoint>,
}

impl FlatBuffer<'static> {
    pub fn new(schema: Arc<Schema>) -> Result<Self, Error> {
        Self::with_options(schema, FlatOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, options: FlatOptions) -> Result<Self, Error> {
        let encoders = bind(&schema)?;
        Ok(Self {
            schema,
            encoders,
            main: Buffer::new(options.page_size),
            data: Buffer::new(options.page_size),
            list: Buffer::new(options.page_size),
            rows: Vec::new(),
            last: None,
        })
    }
}

impl<'a> FlatBuffer<'a> {
    /// Rebuild an encoder over a serialized blob without copying its payload.
    pub fn from_bytes(schema: Arc<Schema>, bytes: &'a [u8]) -> Result<Self, Error> {
        let encoders = bind(&schema)?;
        let layout = BlobLayout::decode(bytes)?;
        let main = Buffer::borrowed(&bytes[layout.main.clone()]);
        let data = Buffer::borrowed(&bytes[layout.data.clone()]);
        let list = Buffer::borrowed(&bytes[layout.list.clone()]);

        match layout.row_offsets.first() {
            Some(&first) if first != 0 => {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("first row does not start the main region"));
            }
            None if main.offset() != 0 => {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("main region has bytes but no rows"));
            }
            _ => {}
        }

        let mut rows = Vec::with_capacity(layout.row_offsets.len());
        for (row, &offset) in layout.row_offsets.iter().enumerate() {
            let (columns, len) = walk_columns(&main, &encoders, offset).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("row slots exceed the main region")
                    .with_row(row)
                    .with_source(err)
            })?;
            let next = layout
                .row_offsets
                .get(row + 1)
                .copied()
                .unwrap_or(main.offset());
            if offset + len != next {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("row slots disagree with the row offset table")
                    .with_row(row));
            }
            rows.push(RowProps { offset, columns });
        }

        debug!(
            rows = rows.len(),
            main = main.offset(),
            data = data.offset(),
            list = list.offset(),
            "rebuilt flat buffer over borrowed bytes"
        );
        Ok(Self {
            schema,
            encoders,
            main,
            data,
            list,
            rows,
            last: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        self.main.is_borrowed()
    }

    pub fn row_props(&self, index: usize) -> Result<&RowProps, Error> {
        self.rows.get(index).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message(format!("row index out of range ({} rows)", self.rows.len()))
                .with_row(index)
        })
    }

    pub(crate) fn encoder(&self, column: usize) -> Option<Encoder> {
        self.encoders.get(column).copied()
    }

    pub(crate) fn main(&self) -> &Buffer<'a> {
        &self.main
    }

    pub(crate) fn data(&self) -> &Buffer<'a> {
        &self.data
    }

    pub(crate) fn list(&self) -> &Buffer<'a> {
        &self.list
    }

    /// Append one row; returns its index.
    pub fn add(&mut self, row: &dyn RowData) -> Result<usize, Error> {
        self.ensure_writable()?;
        let checkpoint = self.checkpoint();
        let index = self.rows.len();
        let mut columns = Vec::with_capacity(self.encoders.len());
        for column in 0..self.encoders.len() {
            match self.encode_column(column, row, checkpoint.main) {
                Ok((props, _)) => columns.push(props),
                Err(err) => {
                    self.restore(checkpoint)?;
                    return Err(err.with_column(column).with_row(index));
                }
            }
        }
        self.rows.push(RowProps {
            offset: checkpoint.main,
            columns,
        });
        self.last = Some(checkpoint);
        Ok(index)
    }

    /// Undo the most recent `add`. Returns false when there is nothing to undo.
    pub fn rollback(&mut self) -> bool {
        let Some(checkpoint) = self.last.take() else {
            return false;
        };
        if self.restore(checkpoint).is_err() {
            return false;
        }
        self.rows.pop();
        debug!(rows = self.rows.len(), "rolled back last row");
        true
    }

    /// Re-encode the columns of the last row that are not in `skip`.
    ///
    /// Skipped columns keep their encoded bytes. Returns bytes written in this pass.
    pub fn resume(
        &mut self,
        row: &dyn RowData,
        skip: &HashSet<usize>,
        row_index: usize,
    ) -> Result<usize, Error> {
        self.ensure_writable()?;
        if self.rows.len().checked_sub(1) != Some(row_index) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("only the most recently added row can be resumed")
                .with_row(row_index));
        }
        let count = self.encoders.len();
        if let Some(&column) = skip.iter().find(|&&column| column >= count) {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message("skip column out of range")
                .with_column(column));
        }
        let Some(first) = (0..count).find(|column| !skip.contains(column)) else {
            return Ok(0);
        };

        let previous = self.rows[row_index].clone();
        let checkpoint = self.checkpoint();
        let start = previous.offset + previous.columns[first].offset as usize;
        let tail = self.main.bytes(start, checkpoint.main - start)?.to_vec();
        self.main.rewind(start)?;

        match self.encode_tail(row, skip, &previous, first, &tail, start) {
            Ok((columns, written)) => {
                self.rows[row_index].columns = columns;
                debug!(row = row_index, written, "resumed row");
                Ok(written)
            }
            Err(err) => {
                self.restore(Checkpoint {
                    main: start,
                    ..checkpoint
                })?;
                self.main.append_bytes(&tail)?;
                Err(err.with_row(row_index))
            }
        }
    }

    /// Accessor borrowing this encoder's row metadata.
    pub fn row(&self, index: usize) -> Result<RowAccessor<'_>, Error> {
        let props = self.row_props(index)?;
        Ok(RowAccessor::new(self, index, Cow::Borrowed(props)))
    }

    /// Accessor owning a private copy of the row metadata.
    pub fn crow(&self, index: usize) -> Result<RowAccessor<'_>, Error> {
        let props = self.row_props(index)?.clone();
        Ok(RowAccessor::new(self, index, Cow::Owned(props)))
    }

    /// Overwrite a non-null fixed-width value in place.
    pub fn overwrite(&mut self, row: usize, column: usize, value: Scalar) -> Result<(), Error> {
        self.ensure_writable()?;
        let props = self.row_props(row)?;
        let slot = props.columns.get(column).copied().ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message("column index out of range")
                .with_column(column)
        })?;
        let at = props.offset + slot.offset as usize + 1;
        if slot.is_null || value.is_null() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("in-place writes need a non-null slot and value")
                .with_row(row)
                .with_column(column));
        }
        if value.kind().map(Encoder::Scalar) != Some(self.encoders[column]) {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!(
                    "cannot write {:?} into a {} column",
                    value,
                    self.schema.columns()[column].ty
                ))
                .with_column(column));
        }
        match value {
            Scalar::Bool(value) => self.main.write(at, value),
            Scalar::Byte(value) => self.main.write(at, value),
            Scalar::Short(value) => self.main.write(at, value),
            Scalar::Int(value) => self.main.write(at, value),
            Scalar::Long(value) => self.main.write(at, value),
            Scalar::Float(value) => self.main.write(at, value),
            Scalar::Double(value) => self.main.write(at, value),
            Scalar::Int128(value) => self.main.write(at, value),
            Scalar::Null => return Err(Error::new(ErrorKind::Internal)),
        }?;
        Ok(())
    }

    pub fn bin_size(&self) -> usize {
        BlobLayout::bin_size(
            self.rows.len(),
            self.main.offset(),
            self.data.offset(),
            self.list.offset(),
        )
    }

    /// Write the blob into `dest`, which must hold at least `bin_size()` bytes.
    pub fn serialize(&self, dest: &mut [u8]) -> Result<usize, Error> {
        BlobLayout::write(
            dest,
            self.rows.iter().map(|row| row.offset),
            self.main.written(),
            self.data.written(),
            self.list.written(),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![0u8; self.bin_size()];
        self.serialize(&mut out)?;
        Ok(out)
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("flat buffer over borrowed bytes is read-only"));
        }
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            main: self.main.offset(),
            data: self.data.offset(),
            list: self.list.offset(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), Error> {
        self.main.rewind(checkpoint.main)?;
        self.data.rewind(checkpoint.data)?;
        self.list.rewind(checkpoint.list)
    }

    fn encode_tail(
        &mut self,
        row: &dyn RowData,
        skip: &HashSet<usize>,
        previous: &RowProps,
        first: usize,
        tail: &[u8],
        start: usize,
    ) -> Result<(Vec<ColumnProps>, usize), Error> {
        let mut columns = previous.columns[..first].to_vec();
        let mut written = 0;
        for (index, old) in previous.columns.iter().enumerate().skip(first) {
            if skip.contains(&index) {
                let from = previous.offset + old.offset as usize - start;
                let to = previous
                    .columns
                    .get(index + 1)
                    .map(|next| previous.offset + next.offset as usize - start)
                    .unwrap_or(tail.len());
                let offset = slot_offset(self.main.offset() - previous.offset)?;
                written += self.main.append_bytes(&tail[from..to])?;
                columns.push(ColumnProps {
                    is_null: old.is_null,
                    offset,
                });
            } else {
                let (props, bytes) = self
                    .encode_column(index, row, previous.offset)
                    .map_err(|err| err.with_column(index))?;
                columns.push(props);
                written += bytes;
            }
        }
        Ok((columns, written))
    }

    fn encode_column(
        &mut self,
        index: usize,
        row: &dyn RowData,
        row_offset: usize,
    ) -> Result<(ColumnProps, usize), Error> {
        let Self {
            schema,
            encoders,
            main,
            data,
            list,
            ..
        } = self;
        let column = &schema.columns()[index];
        let encoder = encoders[index];
        let offset = slot_offset(main.offset() - row_offset)?;

        if row.is_null_by_name(&column.name)? {
            if !column.nullable {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("null value for non-nullable column `{}`", column.name)));
            }
            let written = main.append(format::header_byte(encoder.kind(), true))?;
            return Ok((
                ColumnProps {
                    is_null: true,
                    offset,
                },
                written,
            ));
        }

        let mut written = main.append(format::header_byte(encoder.kind(), false))?;
        written += match encoder {
            Encoder::Scalar(kind) => append_field(main, kind, row, &column.name)?,
            Encoder::String => append_string(main, data, row.read_string_by_name(&column.name)?)?,
            Encoder::List(item) => {
                let items = row.read_list_by_name(&column.name)?;
                append_list(main, data, list, item, items.as_ref())?
            }
        };
        Ok((
            ColumnProps {
                is_null: false,
                offset,
            },
            written,
        ))
    }
}

fn append_field(main: &mut Buffer<'_>, kind: Kind, row: &dyn RowData, name: &str) -> Result<usize, Error> {
    match kind {
        Kind::Bool => main.append(row.read_bool_by_name(name)?),
        Kind::Byte => main.append(row.read_byte_by_name(name)?),
        Kind::Short => main.append(row.read_short_by_name(name)?),
        Kind::Int => main.append(row.read_int_by_name(name)?),
        Kind::Long => main.append(row.read_long_by_name(name)?),
        Kind::Float => main.append(row.read_float_by_name(name)?),
        Kind::Double => main.append(row.read_double_by_name(name)?),
        Kind::Int128 => main.append(row.read_int128_by_name(name)?),
        Kind::String => Err(Error::new(ErrorKind::Internal)
            .with_message("string column bound to a fixed-width encoder")),
    }
}

fn append_item(list: &mut Buffer<'_>, kind: Kind, items: &dyn ListData, index: usize) -> Result<usize, Error> {
    match kind {
        Kind::Bool => list.append(items.read_bool(index)?),
        Kind::Byte => list.append(items.read_byte(index)?),
        Kind::Short => list.append(items.read_short(index)?),
        Kind::Int => list.append(items.read_int(index)?),
        Kind::Long => list.append(items.read_long(index)?),
        Kind::Float => list.append(items.read_float(index)?),
        Kind::Double => list.append(items.read_double(index)?),
        Kind::Int128 => list.append(items.read_int128(index)?),
        Kind::String => Err(Error::new(ErrorKind::Internal)
            .with_message("string item bound to a fixed-width encoder")),
    }
}

// Slot gets (offset, length) into data.
fn append_string(slot: &mut Buffer<'_>, data: &mut Buffer<'_>, value: &str) -> Result<usize, Error> {
    let offset = to_u32(data.offset(), "data region offset")?;
    let len = to_u32(value.len(), "string length")?;
    let written = data.append_bytes(value.as_bytes())?;
    Ok(written + slot.append(offset)? + slot.append(len)?)
}

// Items go to list, each behind its own header byte; main gets (count, offset).
fn append_list(
    main: &mut Buffer<'_>,
    data: &mut Buffer<'_>,
    list: &mut Buffer<'_>,
    item: Kind,
    items: &dyn ListData,
) -> Result<usize, Error> {
    let offset = to_u32(list.offset(), "list region offset")?;
    let count = items.items();
    let mut written = 0;
    for index in 0..count {
        if items.is_null(index)? {
            written += list.append(format::header_byte(item, true))?;
            continue;
        }
        written += list.append(format::header_byte(item, false))?;
        written += match item {
            Kind::String => append_string(list, data, items.read_string(index)?)?,
            kind => append_item(list, kind, items, index)?,
        };
    }
    written += main.append(to_u32(count, "list item count")?)?;
    written += main.append(offset)?;
    Ok(written)
}

fn walk_columns(
    main: &Buffer<'_>,
    encoders: &[Encoder],
    row_offset: usize,
) -> Result<(Vec<ColumnProps>, usize), Error> {
    let mut columns = Vec::with_capacity(encoders.len());
    let mut cursor = 0usize;
    for encoder in encoders {
        let header = main.read::<u8>(row_offset + cursor)?;
        let is_null = format::is_null_header(header);
        columns.push(ColumnProps {
            is_null,
            offset: slot_offset(cursor)?,
        });
        cursor += 1;
        if !is_null {
            cursor += encoder.width();
        }
    }
    if row_offset + cursor > main.offset() {
        return Err(Error::new(ErrorKind::OutOfRange)
            .with_message("last column runs past the main region")
            .with_offset(row_offset));
    }
    Ok((columns, cursor))
}

fn slot_offset(relative: usize) -> Result<u32, Error> {
    to_u32(relative, "row slot size")
}

fn to_u32(value: usize, what: &str) -> Result<u32, Error> {
    u32::try_from(value)
        .map_err(|_| Error::new(ErrorKind::Usage).with_message(format!("{what} exceeds u32 range")))
}
