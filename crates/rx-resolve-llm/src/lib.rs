//! LLM wrapper for medicine taxonomy classification using llama.cpp.
//!
//! This crate provides best-effort taxonomy classification (category,
//! subcategory, dosage form, route) for medicine names read off Vietnamese
//! prescriptions, using Llama 3.2 models via llama.cpp bindings. The core
//! resolver treats the classifier as an optional collaborator: anything
//! this crate fails to produce degrades to an empty classification.

pub mod classification;
pub mod prompts;

pub use classification::*;
pub use prompts::*;
