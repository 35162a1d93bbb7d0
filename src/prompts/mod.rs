//! Prompt module for hosted-model operations.
//!
//! Templates are plain constants so they can be rendered and checked
//! without a network call.

pub mod metadata_extraction;
pub mod synthesis;

pub use metadata_extraction::build_metadata_prompt;
pub use synthesis::{build_statements_prompt, build_summary_prompt};
