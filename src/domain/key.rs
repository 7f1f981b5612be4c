//! Content-addressed cache keys for rendered diagrams.
//!
//! A key covers every input that can change the bytes the mermaid CLI
//! produces. Each component is framed with its length before hashing, so two
//! different tuples can never feed the digest the same byte stream.

use std::fmt;

use sha2::{Digest, Sha256};

use super::format::OutputFormat;

const KEY_LEN: usize = 32;

/// SHA-256 fingerprint of a render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; KEY_LEN]);

impl CacheKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Inputs that determine the output of one render.
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterial<'a> {
    pub format: OutputFormat,
    pub source: &'a [u8],
    /// Canonical bytes of the materialized puppeteer config.
    pub config: &'a [u8],
    /// Diagram-level `mermaid.config.json` shipped with the toolchain; empty when absent.
    pub diagram_config: &'a [u8],
    /// Present only when post-processing filters run for this format.
    pub secondary: Option<SecondaryMaterial<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SecondaryMaterial<'a> {
    /// Comma separated filter chain, in execution order.
    pub filters: &'a str,
    /// Canonical bytes of the materialized optimizer config.
    pub config: &'a [u8],
}

impl KeyMaterial<'_> {
    pub fn derive(&self) -> CacheKey {
        derive_key(self)
    }
}

/// Hash the framed key components. Pure and deterministic across processes.
pub fn derive_key(material: &KeyMaterial<'_>) -> CacheKey {
    let mut hasher = Sha256::new();
    frame(&mut hasher, material.format.as_str().as_bytes());
    frame(&mut hasher, material.source);
    frame(&mut hasher, material.config);
    frame(&mut hasher, material.diagram_config);
    if let Some(secondary) = material.secondary {
        frame(&mut hasher, secondary.filters.as_bytes());
        frame(&mut hasher, secondary.config);
    }

    let digest = hasher.finalize();
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&digest);
    CacheKey(bytes)
}

fn frame(hasher: &mut Sha256, component: &[u8]) {
    hasher.update((component.len() as u64).to_le_bytes());
    hasher.update(component);
}
