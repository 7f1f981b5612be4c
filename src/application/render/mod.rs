//! Mermaid rendering through the mermaid CLI.
//!
//! [`MermaidService`] is the entry point: it derives a content-addressed key
//! for each request, consults the result cache, and only spawns `mmdc` on a
//! miss. Tool configs are materialized into the work directory on demand.

mod embed;
mod error;
mod filters;
mod materialize;
mod service;

pub use embed::{EmbedMode, embed};
pub use error::RenderError;
pub use filters::{FilterContext, FilterOutcome, apply_chain};
pub use materialize::{ConfigMaterializer, ConfigStyle, WriteOutcome};
pub use service::{
    MermaidService, PUPPETEER_CONFIG_FILE, RenderOptions, SVGO_CONFIG_FILE, install,
};
