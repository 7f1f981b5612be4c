//! Render Mermaid diagrams through the mermaid CLI (`mmdc`), fronted by a
//! content-addressed result cache.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
