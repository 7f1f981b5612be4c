//! Domain types shared by the render pipeline.

pub mod filter;
pub mod format;
pub mod key;

pub use filter::{PostFilter, UnknownFilter, chain_label, normalize_chain};
pub use format::{OutputFormat, UnknownFormat};
pub use key::{CacheKey, KeyMaterial, SecondaryMaterial, derive_key};
