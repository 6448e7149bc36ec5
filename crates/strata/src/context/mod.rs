//! Relevance-ranked context assembly

pub mod assembler;
pub mod candidate;
pub mod scoring;

pub use assembler::{AssembledContext, ContextAssembler, ContextSources, TRUNCATION_MARKER};
pub use candidate::{ContextCandidate, Priority};
