use std::{fmt, str::FromStr};

use serde::Deserialize;
use thiserror::Error;

/// Optional post-processing steps applied to vector output.
///
/// Variant order is execution order: inkscape re-exports first, svgo
/// minifies the result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PostFilter {
    Inkscape,
    Svgo,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown post-processing filter `{0}` (expected inkscape or svgo)")]
pub struct UnknownFilter(pub String);

impl PostFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            PostFilter::Inkscape => "inkscape",
            PostFilter::Svgo => "svgo",
        }
    }
}

impl fmt::Display for PostFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostFilter {
    type Err = UnknownFilter;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inkscape" => Ok(PostFilter::Inkscape),
            "svgo" => Ok(PostFilter::Svgo),
            _ => Err(UnknownFilter(value.to_string())),
        }
    }
}

/// Sort into execution order and drop duplicates, whatever order the
/// configuration listed them in.
pub fn normalize_chain(filters: &[PostFilter]) -> Vec<PostFilter> {
    let mut chain = filters.to_vec();
    chain.sort();
    chain.dedup();
    chain
}

/// Stable textual form of a chain, used as cache key material.
pub fn chain_label(filters: &[PostFilter]) -> String {
    filters
        .iter()
        .map(|filter| filter.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
