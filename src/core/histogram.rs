//! Purpose: Running per-column summaries fed by every non-null store write.
//! Exports: `Histogram`, `BoolHistogram`, `IntHistogram`, `RealHistogram`, `CountHistogram`.
//! Role: Cheap statistics a store can answer without scanning its values.
//! Invariants: `count` tracks non-null writes only; `nulls` is filled from the store's void set.
//! Invariants: `min`/`max` stay `None` until the first value is recorded.
use serde::{Serialize, Serializer};

use crate::core::kind::Kind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoolHistogram {
    pub count: usize,
    pub nulls: usize,
    pub true_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct IntHistogram {
    pub count: usize,
    pub nulls: usize,
    pub min: Option<i64>,
    pub max: Option<i64>,
    #[serde(serialize_with = "wide_sum")]
    pub sum: i128,
}

// JSON numbers stop at 64 bits; wider sums degrade to a double.
fn wide_sum<S: Serializer>(sum: &i128, serializer: S) -> Result<S::Ok, S::Error> {
    match i64::try_from(*sum) {
        Ok(sum) => serializer.serialize_i64(sum),
        Err(_) => serializer.serialize_f64(*sum as f64),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RealHistogram {
    pub count: usize,
    pub nulls: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
}

/// Kinds without a typed summary only count values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CountHistogram {
    pub count: usize,
    pub nulls: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Histogram {
    Bool(BoolHistogram),
    Int(IntHistogram),
    Real(RealHistogram),
    Count(CountHistogram),
}

impl Histogram {
    pub fn for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Bool => Histogram::Bool(BoolHistogram::default()),
            Kind::Byte | Kind::Short | Kind::Int | Kind::Long => Histogram::Int(IntHistogram::default()),
            Kind::Float | Kind::Double => Histogram::Real(RealHistogram::default()),
            Kind::Int128 | Kind::String => Histogram::Count(CountHistogram::default()),
        }
    }

    /// Non-null values recorded so far.
    pub fn count(&self) -> usize {
        match self {
            Histogram::Bool(h) => h.count,
            Histogram::Int(h) => h.count,
            Histogram::Real(h) => h.count,
            Histogram::Count(h) => h.count,
        }
    }

    pub fn nulls(&self) -> usize {
        match self {
            Histogram::Bool(h) => h.nulls,
            Histogram::Int(h) => h.nulls,
            Histogram::Real(h) => h.nulls,
            Histogram::Count(h) => h.nulls,
        }
    }

    pub(crate) fn with_nulls(mut self, nulls: usize) -> Self {
        match &mut self {
            Histogram::Bool(h) => h.nulls = nulls,
            Histogram::Int(h) => h.nulls = nulls,
            Histogram::Real(h) => h.nulls = nulls,
            Histogram::Count(h) => h.nulls = nulls,
        }
        self
    }

    pub(crate) fn record_bool(&mut self, value: bool) {
        match self {
            Histogram::Bool(h) => {
                h.count += 1;
                h.true_count += usize::from(value);
            }
            other => other.record_count(value),
        }
    }

    pub(crate) fn record_int(&mut self, value: impl Into<i64>) {
        let value = value.into();
        match self {
            Histogram::Int(h) => {
                h.count += 1;
                h.min = Some(h.min.map_or(value, |min| min.min(value)));
                h.max = Some(h.max.map_or(value, |max| max.max(value)));
                h.sum += i128::from(value);
            }
            other => other.record_count(value),
        }
    }

    pub(crate) fn record_real(&mut self, value: impl Into<f64>) {
        let value = value.into();
        match self {
            Histogram::Real(h) => {
                h.count += 1;
                h.min = Some(h.min.map_or(value, |min| min.min(value)));
                h.max = Some(h.max.map_or(value, |max| max.max(value)));
                h.sum += value;
            }
            other => other.record_count(value),
        }
    }

    pub(crate) fn record_count<T>(&mut self, _value: T) {
        match self {
            Histogram::Bool(h) => h.count += 1,
            Histogram::Int(h) => h.count += 1,
            Histogram::Real(h) => h.count += 1,
            Histogram::Count(h) => h.count += 1,
        }
    }
}
