//! Continuation & stitching: truncation detection, completion verification,
//! match-point discovery, and the bounded continuation loop.

mod engine;
mod extract;
mod splice;

pub use engine::ContinuationEngine;
pub use extract::{clean_artifact_text, detect_truncation, extract, Extraction, ExtractionMethod};
pub use splice::{splice, SpliceMethod};
