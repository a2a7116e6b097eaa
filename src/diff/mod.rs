//! Unified-diff parsing, noise filtering, and size bounding.
//!
//! Everything in this module is pure and panic-free: malformed input
//! degrades to an empty or partial result, never an error. The pipeline
//! calls [`process`] once per review; the remaining operations are the
//! building blocks it composes.

mod parser;

pub use parser::{
    chunk, detect_language, filter, is_noise_path, parse, process, summarize, DiffFile,
};
