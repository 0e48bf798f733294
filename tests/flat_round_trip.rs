// Round-trip tests for the row encoder through live and reconstructed accessors.
use std::sync::Arc;

use flatbatch::core::error::{Error, ErrorKind};
use flatbatch::core::flat::{FlatBuffer, FlatOptions};
use flatbatch::core::kind::{Column, ColumnType, Kind, Schema};
use flatbatch::core::surface::{ListData, RowData};

#[derive(Clone, Debug, PartialEq)]
enum Cell {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Int128(i128),
    Str(String),
    List(Vec<Cell>),
}

impl Cell {
    // This producer reports empty lists as null.
    fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

fn mismatch(index: usize) -> Error {
    Error::new(ErrorKind::TypeMismatch).with_column(index)
}

macro_rules! cell_reads {
    ($($name:ident -> $ty:ty => $variant:ident;)*) => {
        $(
            fn $name(&self, index: usize) -> Result<$ty, Error> {
                match self.cell(index)? {
                    Cell::$variant(value) => Ok(value.clone()),
                    _ => Err(mismatch(index)),
                }
            }
        )*
    };
}

struct StaticRow<'s> {
    schema: &'s Schema,
    cells: &'s [Cell],
}

impl<'s> StaticRow<'s> {
    fn cell(&self, index: usize) -> Result<&'s Cell, Error> {
        self.cells
            .get(index)
            .ok_or_else(|| Error::new(ErrorKind::OutOfRange).with_column(index))
    }
}

impl RowData for StaticRow<'_> {
    fn index_of(&self, field: &str) -> Result<usize, Error> {
        self.schema.field(field)
    }

    fn is_null(&self, index: usize) -> Result<bool, Error> {
        Ok(self.cell(index)?.is_null())
    }

    cell_reads! {
        read_bool -> bool => Bool;
        read_byte -> i8 => Byte;
        read_short -> i16 => Short;
        read_int -> i32 => Int;
        read_long -> i64 => Long;
        read_float -> f32 => Float;
        read_double -> f64 => Double;
        read_int128 -> i128 => Int128;
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        match self.cell(index)? {
            Cell::Str(value) => Ok(value),
            _ => Err(mismatch(index)),
        }
    }

    fn read_list(&self, index: usize) -> Result<Box<dyn ListData + '_>, Error> {
        match self.cell(index)? {
            Cell::List(items) => Ok(Box::new(StaticList { cells: items })),
            _ => Err(mismatch(index)),
        }
    }
}

struct StaticList<'s> {
    cells: &'s [Cell],
}

impl<'s> StaticList<'s> {
    fn cell(&self, index: usize) -> Result<&'s Cell, Error> {
        self.cells
            .get(index)
            .ok_or_else(|| Error::new(ErrorKind::OutOfRange).with_offset(index))
    }
}

impl ListData for StaticList<'_> {
    fn items(&self) -> usize {
        self.cells.len()
    }

    fn is_null(&self, index: usize) -> Result<bool, Error> {
        Ok(matches!(self.cell(index)?, Cell::Null))
    }

    cell_reads! {
        read_bool -> bool => Bool;
        read_byte -> i8 => Byte;
        read_short -> i16 => Short;
        read_int -> i32 => Int;
        read_long -> i64 => Long;
        read_float -> f32 => Float;
        read_double -> f64 => Double;
        read_int128 -> i128 => Int128;
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        match self.cell(index)? {
            Cell::Str(value) => Ok(value),
            _ => Err(mismatch(index)),
        }
    }
}

fn read_cell(row: &dyn RowData, schema: &Schema, index: usize, by_name: bool) -> Cell {
    let column = &schema.columns()[index];
    let name = column.name.as_str();
    let is_null = if by_name {
        row.is_null_by_name(name).expect("null by name")
    } else {
        row.is_null(index).expect("null")
    };
    if is_null {
        return Cell::Null;
    }
    match column.ty {
        ColumnType::Scalar(kind) if by_name => match kind {
            Kind::Bool => Cell::Bool(row.read_bool_by_name(name).expect("bool")),
            Kind::Byte => Cell::Byte(row.read_byte_by_name(name).expect("byte")),
            Kind::Short => Cell::Short(row.read_short_by_name(name).expect("short")),
            Kind::Int => Cell::Int(row.read_int_by_name(name).expect("int")),
            Kind::Long => Cell::Long(row.read_long_by_name(name).expect("long")),
            Kind::Float => Cell::Float(row.read_float_by_name(name).expect("float")),
            Kind::Double => Cell::Double(row.read_double_by_name(name).expect("double")),
            Kind::Int128 => Cell::Int128(row.read_int128_by_name(name).expect("int128")),
            Kind::String => Cell::Str(row.read_string_by_name(name).expect("string").to_string()),
        },
        ColumnType::Scalar(kind) => match kind {
            Kind::Bool => Cell::Bool(row.read_bool(index).expect("bool")),
            Kind::Byte => Cell::Byte(row.read_byte(index).expect("byte")),
            Kind::Short => Cell::Short(row.read_short(index).expect("short")),
            Kind::Int => Cell::Int(row.read_int(index).expect("int")),
            Kind::Long => Cell::Long(row.read_long(index).expect("long")),
            Kind::Float => Cell::Float(row.read_float(index).expect("float")),
            Kind::Double => Cell::Double(row.read_double(index).expect("double")),
            Kind::Int128 => Cell::Int128(row.read_int128(index).expect("int128")),
            Kind::String => Cell::Str(row.read_string(index).expect("string").to_string()),
        },
        ColumnType::List(kind) => {
            let list = if by_name {
                row.read_list_by_name(name).expect("list by name")
            } else {
                row.read_list(index).expect("list")
            };
            Cell::List((0..list.items()).map(|item| read_item(list.as_ref(), item, kind)).collect())
        }
        ColumnType::Map(..) => panic!("map columns are not encoded"),
    }
}

fn read_item(list: &dyn ListData, index: usize, kind: Kind) -> Cell {
    if list.is_null(index).expect("item null") {
        return Cell::Null;
    }
    match kind {
        Kind::Bool => Cell::Bool(list.read_bool(index).expect("bool")),
        Kind::Byte => Cell::Byte(list.read_byte(index).expect("byte")),
        Kind::Short => Cell::Short(list.read_short(index).expect("short")),
        Kind::Int => Cell::Int(list.read_int(index).expect("int")),
        Kind::Long => Cell::Long(list.read_long(index).expect("long")),
        Kind::Float => Cell::Float(list.read_float(index).expect("float")),
        Kind::Double => Cell::Double(list.read_double(index).expect("double")),
        Kind::Int128 => Cell::Int128(list.read_int128(index).expect("int128")),
        Kind::String => Cell::Str(list.read_string(index).expect("string").to_string()),
    }
}

fn expected(cells: &[Cell]) -> Vec<Cell> {
    cells
        .iter()
        .map(|cell| if cell.is_null() { Cell::Null } else { cell.clone() })
        .collect()
}

fn assert_rows(flat: &FlatBuffer<'_>, rows: &[Vec<Cell>]) {
    let schema = Arc::clone(flat.schema());
    assert_eq!(flat.rows(), rows.len());
    for (index, cells) in rows.iter().enumerate() {
        let want = expected(cells);
        let shared = flat.row(index).expect("row");
        let owned = flat.crow(index).expect("crow");
        for by_name in [false, true] {
            for accessor in [&shared as &dyn RowData, &owned as &dyn RowData] {
                let got: Vec<Cell> = (0..schema.len())
                    .map(|column| read_cell(accessor, &schema, column, by_name))
                    .collect();
                assert_eq!(got, want, "row {index} (by_name: {by_name})");
            }
        }
    }
}

fn scenario_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(vec![
            Column::scalar("id", Kind::Int),
            Column::scalar("event", Kind::String),
            Column::list("items", Kind::String),
            Column::scalar("flag", Kind::Bool),
        ])
        .expect("schema"),
    )
}

fn add(flat: &mut FlatBuffer<'_>, cells: &[Cell]) -> usize {
    let schema = Arc::clone(flat.schema());
    let row = StaticRow {
        schema: &schema,
        cells,
    };
    flat.add(&row).expect("add")
}

#[test]
fn concrete_scenario_survives_rollback_and_reconstruction() {
    let mut flat = FlatBuffer::new(scenario_schema()).expect("flat");
    let first = vec![
        Cell::Int(1),
        Cell::Str("hello".to_string()),
        Cell::List(vec![Cell::Str("a".to_string()), Cell::Str("b".to_string())]),
        Cell::Bool(true),
    ];
    assert_eq!(add(&mut flat, &first), 0);
    assert_eq!(flat.rows(), 1);

    {
        let row = flat.row(0).expect("row");
        assert_eq!(row.read_int_by_name("id").expect("id"), 1);
        assert_eq!(row.read_string_by_name("event").expect("event"), "hello");
        let items = row.read_list_by_name("items").expect("items");
        assert_eq!(items.items(), 2);
        assert_eq!(items.read_string(0).expect("a"), "a");
        assert_eq!(items.read_string(1).expect("b"), "b");
        assert!(row.read_bool_by_name("flag").expect("flag"));
    }

    let second = vec![
        Cell::Int(2),
        Cell::Str("bye".to_string()),
        Cell::List(Vec::new()),
        Cell::Bool(false),
    ];
    assert_eq!(add(&mut flat, &second), 1);
    assert!(flat.row(1).expect("row").is_null_by_name("items").expect("null"));

    assert!(flat.rollback());
    assert_eq!(flat.rows(), 1);
    assert!(!flat.rollback());
    assert_eq!(flat.rows(), 1);

    let mut blob = vec![0u8; flat.bin_size()];
    assert_eq!(flat.serialize(&mut blob).expect("serialize"), blob.len());
    let rebuilt = FlatBuffer::from_bytes(scenario_schema(), &blob).expect("rebuild");
    assert_rows(&rebuilt, &[first]);
}

#[test]
fn rollback_before_any_add_is_refused() {
    let mut flat = FlatBuffer::new(scenario_schema()).expect("flat");
    assert!(!flat.rollback());
    assert_eq!(flat.rows(), 0);
}

#[test]
fn empty_encoder_round_trips() {
    let flat = FlatBuffer::new(scenario_schema()).expect("flat");
    let blob = flat.to_bytes().expect("bytes");
    assert_eq!(blob.len(), flat.bin_size());
    let rebuilt = FlatBuffer::from_bytes(scenario_schema(), &blob).expect("rebuild");
    assert_eq!(rebuilt.rows(), 0);
    assert!(rebuilt.row(0).is_err());
}

#[test]
fn reconstruction_reads_the_callers_bytes_in_place() {
    let mut flat = FlatBuffer::new(scenario_schema()).expect("flat");
    add(
        &mut flat,
        &[
            Cell::Int(9),
            Cell::Str("borrowed".to_string()),
            Cell::Null,
            Cell::Bool(false),
        ],
    );
    let blob = flat.to_bytes().expect("bytes");
    let rebuilt = FlatBuffer::from_bytes(scenario_schema(), &blob).expect("rebuild");
    let value = rebuilt.row(0).expect("row").read_string(1).expect("event");
    let span = blob.as_ptr_range();
    assert!(span.contains(&value.as_ptr()));
}

#[test]
fn truncated_blobs_are_corrupt() {
    let mut flat = FlatBuffer::new(scenario_schema()).expect("flat");
    add(
        &mut flat,
        &[Cell::Int(1), Cell::Null, Cell::Null, Cell::Bool(true)],
    );
    let blob = flat.to_bytes().expect("bytes");
    let err = FlatBuffer::from_bytes(scenario_schema(), &blob[..blob.len() - 1]).expect_err("short");
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as usize
    }

    fn chance(&mut self, percent: usize) -> bool {
        self.next_range(100) < percent
    }

    fn word(&mut self) -> String {
        let len = self.next_range(12);
        (0..len)
            .map(|_| ['a', 'z', 'é', '7', ' ', 'Ω'][self.next_range(6)])
            .collect()
    }

    fn value(&mut self, kind: Kind) -> Cell {
        let bits = self.next_u64();
        match kind {
            Kind::Bool => Cell::Bool(bits & 1 == 1),
            Kind::Byte => Cell::Byte(bits as i8),
            Kind::Short => Cell::Short(bits as i16),
            Kind::Int => Cell::Int(bits as i32),
            Kind::Long => Cell::Long(bits as i64),
            Kind::Float => Cell::Float((bits % 100_000) as f32 / 8.0 - 5_000.0),
            Kind::Double => Cell::Double((bits as i64) as f64 / 3.0),
            Kind::Int128 => Cell::Int128(((bits as i128) << 64) | self.next_u64() as i128),
            Kind::String => Cell::Str(self.word()),
        }
    }
}

fn random_schema() -> Arc<Schema> {
    let kinds = [
        Kind::Bool,
        Kind::Byte,
        Kind::Short,
        Kind::Int,
        Kind::Long,
        Kind::Float,
        Kind::Double,
        Kind::Int128,
        Kind::String,
    ];
    let mut columns: Vec<Column> = kinds
        .iter()
        .map(|kind| Column::scalar(format!("c_{kind}"), *kind))
        .collect();
    columns.push(Column::list("l_string", Kind::String));
    columns.push(Column::list("l_int128", Kind::Int128));
    columns.push(Column::list("l_double", Kind::Double));
    Arc::new(Schema::new(columns).expect("schema"))
}

fn random_row(rng: &mut XorShift64, schema: &Schema) -> Vec<Cell> {
    schema
        .columns()
        .iter()
        .map(|column| {
            if rng.chance(15) {
                return Cell::Null;
            }
            match column.ty {
                ColumnType::Scalar(kind) => rng.value(kind),
                ColumnType::List(kind) => {
                    let len = rng.next_range(5);
                    Cell::List(
                        (0..len)
                            .map(|_| if rng.chance(20) { Cell::Null } else { rng.value(kind) })
                            .collect(),
                    )
                }
                ColumnType::Map(..) => Cell::Null,
            }
        })
        .collect()
}

#[test]
fn randomized_rows_round_trip_live_and_rebuilt() {
    for seed in [0x9E37_79B9_7F4A_7C15u64, 7, 0xDEAD_BEEF] {
        let mut rng = XorShift64::new(seed);
        let schema = random_schema();
        let mut flat =
            FlatBuffer::with_options(Arc::clone(&schema), FlatOptions { page_size: 64 }).expect("flat");
        let mut rows = Vec::new();
        for _ in 0..60 {
            let cells = random_row(&mut rng, &schema);
            add(&mut flat, &cells);
            rows.push(cells);
            if rng.chance(10) {
                assert!(flat.rollback());
                rows.pop();
            }
        }
        assert_rows(&flat, &rows);

        let blob = flat.to_bytes().expect("bytes");
        let rebuilt = FlatBuffer::from_bytes(Arc::clone(&schema), &blob).expect("rebuild");
        assert_rows(&rebuilt, &rows);
        assert_eq!(rebuilt.bin_size(), blob.len());
    }
}
