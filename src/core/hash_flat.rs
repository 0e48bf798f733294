//! Purpose: Keep at most one row per distinct key, merging value columns on collisions.
//! Exports: `HashFlat`.
//! Role: Keyed aggregation layer over a `FlatBuffer`.
//! Invariants: Value columns are non-nullable fixed-width scalars, so merges rewrite in place.
//! Invariants: A merged `update` leaves the encoder exactly as it was before the call, apart
//! from the merged values.
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::trace;

use crate::core::accessor::RowAccessor;
use crate::core::error::{Error, ErrorKind};
use crate::core::flat::{FlatBuffer, FlatOptions};
use crate::core::kind::{ColumnType, Kind, Schema};
use crate::core::scalar::Scalar;
use crate::core::surface::RowData;

#[derive(Debug)]
enum KeyPart<'f> {
    Null,
    Fixed(Scalar),
    Str(&'f str),
    List(Vec<KeyPart<'f>>),
}

impl PartialEq for KeyPart<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyPart::Null, KeyPart::Null) => true,
            (KeyPart::Fixed(a), KeyPart::Fixed(b)) => a.bit_eq(b),
            (KeyPart::Str(a), KeyPart::Str(b)) => a == b,
            (KeyPart::List(a), KeyPart::List(b)) => a == b,
            _ => false,
        }
    }
}

// Scalar hashes float bits, matching `bit_eq` above.
impl Hash for KeyPart<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            KeyPart::Null => {}
            KeyPart::Fixed(value) => value.hash(state),
            KeyPart::Str(value) => value.hash(state),
            KeyPart::List(items) => items.hash(state),
        }
    }
}

#[derive(Debug)]
pub struct HashFlat {
    flat: FlatBuffer<'static>,
    keys: Vec<(usize, ColumnType)>,
    values: Vec<(usize, Kind)>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl HashFlat {
    pub fn new(schema: Arc<Schema>, keys: &[usize]) -> Result<Self, Error> {
        Self::with_options(schema, keys, FlatOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, keys: &[usize], options: FlatOptions) -> Result<Self, Error> {
        if let Some(&column) = keys.iter().find(|&&column| column >= schema.len()) {
            return Err(Error::new(ErrorKind::OutOfRange)
                .with_message("key column out of range")
                .with_column(column));
        }
        let mut key_columns = Vec::with_capacity(keys.len());
        let mut values = Vec::new();
        for (index, column) in schema.columns().iter().enumerate() {
            if keys.contains(&index) {
                key_columns.push((index, column.ty));
                continue;
            }
            match column.ty.scalar() {
                Some(kind) if kind != Kind::String && !column.nullable => values.push((index, kind)),
                _ => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "value column `{}` must be a non-nullable fixed-width scalar",
                            column.name
                        ))
                        .with_column(index));
                }
            }
        }
        Ok(Self {
            flat: FlatBuffer::with_options(schema, options)?,
            keys: key_columns,
            values,
            buckets: HashMap::new(),
        })
    }

    pub fn flat(&self) -> &FlatBuffer<'static> {
        &self.flat
    }

    pub fn into_flat(self) -> FlatBuffer<'static> {
        self.flat
    }

    pub fn rows(&self) -> usize {
        self.flat.rows()
    }

    /// Hash of a row's key columns.
    pub fn hash(&self, row: usize) -> Result<u64, Error> {
        let keys = self.key_parts(row)?;
        Ok(hash_parts(&keys))
    }

    pub fn equal(&self, row1: usize, row2: usize) -> Result<bool, Error> {
        Ok(self.key_parts(row1)? == self.key_parts(row2)?)
    }

    /// Copy every value column of `from` into `to`.
    pub fn copy(&mut self, from: usize, to: usize) -> Result<(), Error> {
        let source = self.read_values(from)?;
        for ((column, _), value) in self.values.iter().zip(source) {
            self.flat.overwrite(to, *column, value)?;
        }
        Ok(())
    }

    /// Add `row`, or merge it into the existing row with equal keys.
    ///
    /// Returns true when the row was merged and no new row was kept.
    pub fn update<F>(&mut self, row: &dyn RowData, mut merge: F) -> Result<bool, Error>
    where
        F: FnMut(usize, Scalar, Scalar) -> Scalar,
    {
        let added = self.flat.add(row)?;
        let (hash, existing) = match self.find(added) {
            Ok(found) => found,
            Err(err) => {
                self.undo_add()?;
                return Err(err);
            }
        };

        let Some(existing) = existing else {
            self.buckets.entry(hash).or_default().push(added);
            return Ok(false);
        };

        let merged = match self.merged_values(existing, added, &mut merge) {
            Ok(merged) => merged,
            Err(err) => {
                self.undo_add()?;
                return Err(err);
            }
        };
        self.undo_add()?;
        for (column, value) in merged {
            self.flat.overwrite(existing, column, value)?;
        }
        trace!(row = existing, "merged row into existing key");
        Ok(true)
    }

    // The checkpoint always covers the row `update` just added.
    fn undo_add(&mut self) -> Result<(), Error> {
        if self.flat.rollback() {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Internal).with_message("rollback of the pending row failed"))
    }

    fn find(&self, row: usize) -> Result<(u64, Option<usize>), Error> {
        let keys = self.key_parts(row)?;
        let hash = hash_parts(&keys);
        if let Some(bucket) = self.buckets.get(&hash) {
            for &candidate in bucket {
                if self.key_parts(candidate)? == keys {
                    return Ok((hash, Some(candidate)));
                }
            }
        }
        Ok((hash, None))
    }

    fn merged_values<F>(&self, existing: usize, added: usize, merge: &mut F) -> Result<Vec<(usize, Scalar)>, Error>
    where
        F: FnMut(usize, Scalar, Scalar) -> Scalar,
    {
        let old = self.read_values(existing)?;
        let new = self.read_values(added)?;
        Ok(self
            .values
            .iter()
            .zip(old.into_iter().zip(new))
            .map(|(&(column, _), (old, new))| (column, merge(column, old, new)))
            .collect())
    }

    fn read_values(&self, row: usize) -> Result<Vec<Scalar>, Error> {
        let accessor = self.flat.row(row)?;
        self.values
            .iter()
            .map(|&(column, kind)| Scalar::read(&accessor, column, kind))
            .collect()
    }

    fn key_parts(&self, row: usize) -> Result<Vec<KeyPart<'_>>, Error> {
        let accessor = self.flat.row(row)?;
        self.keys
            .iter()
            .map(|&(column, ty)| key_part(&accessor, column, ty))
            .collect()
    }
}

fn key_part<'f>(row: &RowAccessor<'f>, column: usize, ty: ColumnType) -> Result<KeyPart<'f>, Error> {
    if row.is_null(column)? {
        return Ok(KeyPart::Null);
    }
    match ty {
        ColumnType::Scalar(Kind::String) => Ok(KeyPart::Str(row.read_string(column)?)),
        ColumnType::Scalar(kind) => Ok(KeyPart::Fixed(Scalar::read(row, column, kind)?)),
        ColumnType::List(kind) => {
            let list = row.read_list(column)?;
            let mut items = Vec::with_capacity(list.items());
            for index in 0..list.items() {
                items.push(if list.is_null(index)? {
                    KeyPart::Null
                } else if kind == Kind::String {
                    KeyPart::Str(list.read_string(index)?)
                } else {
                    KeyPart::Fixed(Scalar::read_item(&list, index, kind)?)
                });
            }
            Ok(KeyPart::List(items))
        }
        ColumnType::Map(..) => Err(Error::new(ErrorKind::Unsupported)
            .with_message("map columns cannot be keys")
            .with_column(column)),
    }
}

fn hash_parts(parts: &[KeyPart<'_>]) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::HashFlat;
    use crate::core::error::ErrorKind;
    use crate::core::kind::{Column, Kind, Schema};
    use crate::core::scalar::Scalar;
    use crate::json::JsonRow;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                Column::scalar("event", Kind::String),
                Column::list("tags", Kind::Int),
                Column::scalar("count", Kind::Long).with_nullable(false),
                Column::scalar("max", Kind::Double).with_nullable(false),
            ])
            .expect("schema"),
        )
    }

    fn sum_and_max(column: usize, old: Scalar, new: Scalar) -> Scalar {
        match (column, old, new) {
            (2, Scalar::Long(a), Scalar::Long(b)) => Scalar::Long(a + b),
            (3, Scalar::Double(a), Scalar::Double(b)) => Scalar::Double(a.max(b)),
            (_, old, _) => old,
        }
    }

    fn update(hash: &mut HashFlat, value: Value) -> bool {
        let schema = Arc::clone(hash.flat().schema());
        let row = JsonRow::new(&schema, &value).expect("row");
        hash.update(&row, sum_and_max).expect("update")
    }

    #[test]
    fn equal_keys_merge_into_one_row() {
        let mut hash = HashFlat::new(schema(), &[0, 1]).expect("hash flat");
        assert!(!update(&mut hash, json!({"event": "a", "tags": [1, 2], "count": 1, "max": 1.0})));
        assert!(!update(&mut hash, json!({"event": "b", "tags": [1, 2], "count": 5, "max": 2.0})));
        assert!(!update(&mut hash, json!({"event": "a", "tags": [1], "count": 7, "max": 3.0})));
        let size = hash.flat().bin_size();
        assert!(update(&mut hash, json!({"event": "a", "tags": [1, 2], "count": 2, "max": 0.5})));
        assert!(update(&mut hash, json!({"event": "a", "tags": [1, 2], "count": 3, "max": 4.0})));

        assert_eq!(hash.rows(), 3);
        assert_eq!(hash.flat().bin_size(), size);
        let row = hash.flat().row(0).expect("row");
        assert_eq!(row.read_long(2).expect("count"), 6);
        assert_eq!(row.read_double(3).expect("max"), 4.0);
        assert!(hash.equal(0, 0).expect("equal"));
        assert!(!hash.equal(0, 2).expect("equal"));
    }

    #[test]
    fn null_keys_group_together() {
        let mut hash = HashFlat::new(schema(), &[0, 1]).expect("hash flat");
        assert!(!update(&mut hash, json!({"event": null, "tags": null, "count": 1, "max": 0.0})));
        assert!(update(&mut hash, json!({"event": null, "tags": null, "count": 1, "max": 0.0})));
        assert!(!update(&mut hash, json!({"event": null, "tags": [], "count": 1, "max": 0.0})));
        assert_eq!(hash.rows(), 2);
        assert_ne!(hash.hash(0).expect("hash"), hash.hash(1).expect("hash"));
    }

    #[test]
    fn copy_overwrites_value_columns() {
        let mut hash = HashFlat::new(schema(), &[0, 1]).expect("hash flat");
        update(&mut hash, json!({"event": "x", "tags": [], "count": 1, "max": 1.0}));
        update(&mut hash, json!({"event": "y", "tags": [], "count": 9, "max": 9.0}));
        hash.copy(1, 0).expect("copy");
        let row = hash.flat().row(0).expect("row");
        assert_eq!(row.read_string(0).expect("key"), "x");
        assert_eq!(row.read_long(2).expect("count"), 9);
    }

    #[test]
    fn value_columns_must_be_fixed_width_and_non_nullable() {
        let err = HashFlat::new(schema(), &[0]).expect_err("list value");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let nullable = Arc::new(
            Schema::new(vec![Column::scalar("k", Kind::Int), Column::scalar("v", Kind::Int)])
                .expect("schema"),
        );
        assert_eq!(HashFlat::new(nullable, &[0]).expect_err("nullable").kind(), ErrorKind::Usage);
        assert_eq!(HashFlat::new(schema(), &[7]).expect_err("range").kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn failed_update_adds_nothing() {
        let mut hash = HashFlat::new(schema(), &[0, 1]).expect("hash flat");
        update(&mut hash, json!({"event": "x", "tags": [], "count": 1, "max": 1.0}));
        let schema = Arc::clone(hash.flat().schema());
        let value = json!({"event": "x", "tags": [], "count": null, "max": 1.0});
        let row = JsonRow::new(&schema, &value).expect("row");
        assert!(hash.update(&row, sum_and_max).is_err());
        assert_eq!(hash.rows(), 1);
        assert_eq!(hash.flat().row(0).expect("row").read_long(2).expect("count"), 1);
    }

    #[test]
    fn merged_update_consumes_the_pending_row() {
        let mut hash = HashFlat::new(schema(), &[0, 1]).expect("hash flat");
        update(&mut hash, json!({"event": "k", "tags": [3], "count": 1, "max": 1.0}));
        let size = hash.flat().bin_size();
        assert!(update(&mut hash, json!({"event": "k", "tags": [3], "count": 4, "max": 0.0})));
        assert_eq!(hash.flat().bin_size(), size);
        let mut flat = hash.into_flat();
        assert!(!flat.rollback());
        assert_eq!(flat.rows(), 1);
    }

    #[test]
    fn float_keys_hash_by_bits() {
        let keyed = Arc::new(
            Schema::new(vec![
                Column::scalar("k", Kind::Double),
                Column::scalar("n", Kind::Long).with_nullable(false),
            ])
            .expect("schema"),
        );
        let mut hash = HashFlat::new(keyed, &[0]).expect("hash flat");
        let mut add = |value: Value| {
            let schema = Arc::clone(hash.flat().schema());
            let row = JsonRow::new(&schema, &value).expect("row");
            hash.update(&row, |_, old, _| old).expect("update")
        };
        assert!(!add(json!({"k": 0.0, "n": 1})));
        assert!(!add(json!({"k": -0.0, "n": 1})));
        assert!(add(json!({"k": 0.0, "n": 2})));
        assert_eq!(hash.rows(), 2);
        assert_ne!(hash.hash(0).expect("hash"), hash.hash(1).expect("hash"));
    }
}
