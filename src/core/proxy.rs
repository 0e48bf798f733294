//! Purpose: One uniform entry point over the closed set of typed stores.
//! Exports: `StoreData`, `TypeDataProxy`, `ProxyValue`.
//! Role: Call sites write nulls and values without knowing the concrete store kind.
//! Invariants: The void writer is chosen once at construction and never re-resolved.
//! Invariants: Access with a native type other than the bound kind fails with `TypeMismatch`.
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::histogram::Histogram;
use crate::core::kind::{Column, ColumnType, Kind};
use crate::core::type_data::{StoreOptions, StoreType, StringData, TypeData};

#[derive(Debug)]
pub enum StoreData {
    Bool(TypeData<bool>),
    Byte(TypeData<i8>),
    Short(TypeData<i16>),
    Int(TypeData<i32>),
    Long(TypeData<i64>),
    Float(TypeData<f32>),
    Double(TypeData<f64>),
    Int128(TypeData<i128>),
    String(StringData),
}

impl StoreData {
    /// Build the store matching a scalar column.
    pub fn for_column(column: &Column, batch_size: usize, options: &StoreOptions) -> Result<Self, Error> {
        let ColumnType::Scalar(kind) = column.ty else {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message(format!("column `{}` ({}) has no typed store", column.name, column.ty)));
        };
        Ok(match kind {
            Kind::Bool => StoreData::Bool(TypeData::new(column, batch_size, options)?),
            Kind::Byte => StoreData::Byte(TypeData::new(column, batch_size, options)?),
            Kind::Short => StoreData::Short(TypeData::new(column, batch_size, options)?),
            Kind::Int => StoreData::Int(TypeData::new(column, batch_size, options)?),
            Kind::Long => StoreData::Long(TypeData::new(column, batch_size, options)?),
            Kind::Float => StoreData::Float(TypeData::new(column, batch_size, options)?),
            Kind::Double => StoreData::Double(TypeData::new(column, batch_size, options)?),
            Kind::Int128 => StoreData::Int128(TypeData::new(column, batch_size, options)?),
            Kind::String => StoreData::String(StringData::new(column, options)?),
        })
    }

    pub fn kind(&self) -> Kind {
        match self {
            StoreData::Bool(_) => Kind::Bool,
            StoreData::Byte(_) => Kind::Byte,
            StoreData::Short(_) => Kind::Short,
            StoreData::Int(_) => Kind::Int,
            StoreData::Long(_) => Kind::Long,
            StoreData::Float(_) => Kind::Float,
            StoreData::Double(_) => Kind::Double,
            StoreData::Int128(_) => Kind::Int128,
            StoreData::String(_) => Kind::String,
        }
    }

    pub fn histogram(&self) -> Histogram {
        match self {
            StoreData::Bool(store) => store.histogram(),
            StoreData::Byte(store) => store.histogram(),
            StoreData::Short(store) => store.histogram(),
            StoreData::Int(store) => store.histogram(),
            StoreData::Long(store) => store.histogram(),
            StoreData::Float(store) => store.histogram(),
            StoreData::Double(store) => store.histogram(),
            StoreData::Int128(store) => store.histogram(),
            StoreData::String(store) => store.histogram(),
        }
    }
}

/// Native type that selects its store out of a `StoreData`.
pub trait ProxyValue: StoreType {
    fn store(data: &StoreData) -> Option<&TypeData<Self>>;

    fn store_mut(data: &mut StoreData) -> Option<&mut TypeData<Self>>;
}

macro_rules! proxy_value {
    ($($ty:ty => $variant:ident;)*) => {
        $(
            impl ProxyValue for $ty {
                fn store(data: &StoreData) -> Option<&TypeData<Self>> {
                    match data {
                        StoreData::$variant(store) => Some(store),
                        _ => None,
                    }
                }

                fn store_mut(data: &mut StoreData) -> Option<&mut TypeData<Self>> {
                    match data {
                        StoreData::$variant(store) => Some(store),
                        _ => None,
                    }
                }
            }
        )*
    };
}

proxy_value! {
    bool => Bool;
    i8 => Byte;
    i16 => Short;
    i32 => Int;
    i64 => Long;
    f32 => Float;
    f64 => Double;
    i128 => Int128;
}

type VoidWriter = fn(&mut StoreData, usize) -> Result<(), Error>;

fn void_fixed<T: ProxyValue>(data: &mut StoreData, index: usize) -> Result<(), Error> {
    match T::store_mut(data) {
        Some(store) => store.add_void(index),
        None => Err(Error::new(ErrorKind::Internal).with_message("void writer bound to another store")),
    }
}

fn void_string(data: &mut StoreData, index: usize) -> Result<(), Error> {
    match data {
        StoreData::String(store) => store.add_void(index),
        _ => Err(Error::new(ErrorKind::Internal).with_message("void writer bound to another store")),
    }
}

#[derive(Debug)]
pub struct TypeDataProxy {
    data: StoreData,
    kind: Kind,
    has_bloom_filter: bool,
    void: VoidWriter,
}

impl TypeDataProxy {
    pub fn new(data: StoreData) -> Self {
        let (void, has_bloom_filter): (VoidWriter, bool) = match &data {
            StoreData::Bool(store) => (void_fixed::<bool>, store.has_bloom_filter()),
            StoreData::Byte(store) => (void_fixed::<i8>, store.has_bloom_filter()),
            StoreData::Short(store) => (void_fixed::<i16>, store.has_bloom_filter()),
            StoreData::Int(store) => (void_fixed::<i32>, store.has_bloom_filter()),
            StoreData::Long(store) => (void_fixed::<i64>, store.has_bloom_filter()),
            StoreData::Float(store) => (void_fixed::<f32>, store.has_bloom_filter()),
            StoreData::Double(store) => (void_fixed::<f64>, store.has_bloom_filter()),
            StoreData::Int128(store) => (void_fixed::<i128>, store.has_bloom_filter()),
            StoreData::String(_) => (void_string, false),
        };
        let kind = data.kind();
        debug!(%kind, bloom = has_bloom_filter, "bound store proxy");
        Self {
            data,
            kind,
            has_bloom_filter,
            void,
        }
    }

    pub fn for_column(column: &Column, batch_size: usize, options: &StoreOptions) -> Result<Self, Error> {
        StoreData::for_column(column, batch_size, options).map(Self::new)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.has_bloom_filter
    }

    pub fn data(&self) -> &StoreData {
        &self.data
    }

    pub fn into_data(self) -> StoreData {
        self.data
    }

    pub fn histogram(&self) -> Histogram {
        self.data.histogram()
    }

    /// Closes a string dictionary to new matches; other stores ignore it.
    pub fn seal(&mut self) {
        if let StoreData::String(store) = &mut self.data {
            store.seal();
        }
    }

    pub fn add_void(&mut self, index: usize) -> Result<(), Error> {
        (self.void)(&mut self.data, index)
    }

    pub fn add<T: ProxyValue>(&mut self, index: usize, value: T) -> Result<usize, Error> {
        self.typed_mut::<T>()?.add(index, value)
    }

    pub fn read<T: ProxyValue>(&self, index: usize) -> Result<T, Error> {
        self.typed::<T>()?.read(index)
    }

    pub fn probably<T: ProxyValue>(&self, value: T) -> Result<bool, Error> {
        Ok(self.typed::<T>()?.probably(value))
    }

    pub fn default_value<T: ProxyValue>(&self) -> Result<Option<T>, Error> {
        Ok(self.typed::<T>()?.default_value())
    }

    /// Stored value, or the declared default at void positions.
    pub fn value_or_default<T: ProxyValue>(&self, index: usize) -> Result<Option<T>, Error> {
        let store = self.typed::<T>()?;
        if store.is_void(index)? {
            return Ok(store.default_value());
        }
        store.read(index).map(Some)
    }

    pub fn add_str(&mut self, index: usize, value: &str) -> Result<usize, Error> {
        self.strings_mut()?.add(index, value)
    }

    pub fn read_str(&self, index: usize) -> Result<&str, Error> {
        self.strings()?.read_str(index)
    }

    pub fn probably_str(&self, value: &str) -> Result<bool, Error> {
        Ok(self.strings()?.probably(value))
    }

    pub fn default_str(&self) -> Result<Option<&str>, Error> {
        Ok(self.strings()?.default_value())
    }

    pub fn str_or_default(&self, index: usize) -> Result<Option<&str>, Error> {
        let store = self.strings()?;
        if store.is_void(index)? {
            return Ok(store.default_value());
        }
        store.read_str(index).map(Some)
    }

    fn typed<T: ProxyValue>(&self) -> Result<&TypeData<T>, Error> {
        T::store(&self.data).ok_or_else(|| self.mismatch(T::KIND))
    }

    fn typed_mut<T: ProxyValue>(&mut self) -> Result<&mut TypeData<T>, Error> {
        let kind = self.kind;
        T::store_mut(&mut self.data).ok_or_else(|| mismatch(kind, T::KIND))
    }

    fn strings(&self) -> Result<&StringData, Error> {
        match &self.data {
            StoreData::String(store) => Ok(store),
            _ => Err(self.mismatch(Kind::String)),
        }
    }

    fn strings_mut(&mut self) -> Result<&mut StringData, Error> {
        match &mut self.data {
            StoreData::String(store) => Ok(store),
            _ => Err(mismatch(self.kind, Kind::String)),
        }
    }

    fn mismatch(&self, requested: Kind) -> Error {
        mismatch(self.kind, requested)
    }
}

fn mismatch(bound: Kind, requested: Kind) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("store holds {bound} values, accessed as {requested}"))
}
