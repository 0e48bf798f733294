// Core modules: paged storage, row encoding and access, typed stores, errors.
pub mod accessor;
pub mod bloom;
pub mod error;
pub mod flat;
pub mod format;
pub mod hash_flat;
pub mod histogram;
pub mod kind;
pub mod paged;
pub mod proxy;
pub mod scalar;
pub mod surface;
pub mod type_data;
