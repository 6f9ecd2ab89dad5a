//! Declarative study definitions.
//!
//! A study definition names the patients to extract and the variables to
//! extract for them, built from codelists. This crate loads and validates
//! the document; running the extraction is the job of an external service.
//!
//! # Example
//! ```rust
//! use sdc_core::study::validate_study_definition;
//! use serde_json::json;
//!
//! let study = validate_study_definition(&json!({
//!     "index_date": "2021-12-16",
//!     "population": "registered",
//!     "variables": { "registered": { "extractor": "registered_as_of" } }
//! }))
//! .unwrap();
//! assert_eq!(study.variables.len(), 1);
//! ```

mod model;
mod validation;

pub use model::{
    CATEGORISED_AS, Codelist, CodelistSource, DEFAULT_CATEGORY, StudyDefinition, VariableRule,
};
pub use validation::{load_study_definition, semantic_errors, validate_study_definition};
