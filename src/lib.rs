//! Rewrites relative URLs in HTML fragments to absolute ones, for catalog
//! content injected from a remote origin.
//!
//! The rewriter works without a DOM parser: it is a fixed pipeline of
//! regex-based rewrite rules over the fragment text, aware of the numeric
//! HTML entity encodings commonly used to obfuscate URLs. Also included are
//! the catalog's deposition metadata mapping helpers.

mod entities;
mod metadata;
mod resolve;
mod rewrite;

pub use metadata::{
    deposition_to_rdf, rdf_to_metadata, records_query_url, Creator, Deposition, DepositionFile,
    DepositionLinks, DepositionMetadata, Rdf, RelatedIdentifier,
};
pub use resolve::{join_url, resolve_url, BaseUrl};
pub use rewrite::rewrite_relative_urls;
