//! Structural and semantic validation of study definitions.
//!
//! Structure is checked against an embedded JSON Schema, compiled once.
//! Semantics are checked on the deserialized model:
//! - identifiers in expressions name declared variables or `index_date`
//! - `codelist` parameter references name declared codelists
//! - a `categorised_as` rule has at most one `DEFAULT` category

use super::model::{CATEGORISED_AS, DEFAULT_CATEGORY, StudyDefinition};
use crate::Result;
use crate::error::SdcError;
use jsonschema::Validator;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

/// Words that may appear in expressions without naming a variable.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "and", "or", "not", "is", "null", "true", "false", "default", "in", "today", "day", "days",
    "month", "months", "year", "years",
];

/// Embedded JSON Schema of the study definition document
const STUDY_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Study definition",
  "type": "object",
  "required": ["index_date", "population", "variables"],
  "additionalProperties": false,
  "properties": {
    "index_date": { "type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$" },
    "default_expectations": { "type": "object" },
    "population": { "type": "string", "minLength": 1 },
    "codelists": {
      "type": "object",
      "additionalProperties": {
        "type": "object",
        "required": ["system"],
        "properties": {
          "system": { "type": "string", "minLength": 1 },
          "csv": { "type": "string", "minLength": 1 },
          "column": { "type": "string", "minLength": 1 },
          "category_column": { "type": "string" },
          "codes": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
        },
        "oneOf": [
          { "required": ["csv", "column"] },
          { "required": ["codes"] }
        ]
      }
    },
    "variables": {
      "type": "object",
      "minProperties": 1,
      "additionalProperties": { "$ref": "#/$defs/rule" }
    }
  },
  "$defs": {
    "rule": {
      "type": "object",
      "required": ["extractor"],
      "additionalProperties": false,
      "properties": {
        "extractor": { "type": "string", "minLength": 1 },
        "returning": { "type": "string" },
        "parameters": { "type": "object" },
        "expression": { "type": "string", "minLength": 1 },
        "categories": {
          "type": "object",
          "minProperties": 1,
          "additionalProperties": { "type": "string", "minLength": 1 }
        },
        "variables": {
          "type": "object",
          "additionalProperties": { "$ref": "#/$defs/rule" }
        },
        "return_expectations": { "type": "object" }
      }
    }
  }
}"##;

/// Compiled study schema (initialized once)
static STUDY_VALIDATOR: OnceLock<Validator> = OnceLock::new();

fn study_validator() -> Result<&'static Validator> {
    if let Some(validator) = STUDY_VALIDATOR.get() {
        return Ok(validator);
    }

    let schema: JsonValue = serde_json::from_str(STUDY_SCHEMA).map_err(|e| {
        SdcError::Serialization {
            context: "Failed to parse embedded study schema".to_string(),
            source: e,
        }
    })?;
    let compiled = jsonschema::validator_for(&schema).map_err(|e| {
        SdcError::configuration(format!("Study schema compilation error: {}", e))
    })?;

    // another thread may have won the race; either value is the same schema
    let _ = STUDY_VALIDATOR.set(compiled);
    STUDY_VALIDATOR
        .get()
        .ok_or_else(|| SdcError::configuration("Study schema validator not initialized"))
}

fn expression_identifiers(expression: &str) -> Result<Vec<String>> {
    let literals = Regex::new(r#""[^"]*"|'[^']*'"#)
        .map_err(|e| SdcError::configuration(format!("Invalid literal pattern: {}", e)))?;
    let identifiers = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*")
        .map_err(|e| SdcError::configuration(format!("Invalid identifier pattern: {}", e)))?;

    let stripped = literals.replace_all(expression, " ");
    Ok(identifiers
        .find_iter(&stripped)
        .map(|m| m.as_str())
        .filter(|word| !EXPRESSION_KEYWORDS.contains(&word.to_ascii_lowercase().as_str()))
        .map(str::to_string)
        .collect())
}

/// Semantic problems in a study definition, empty when it is consistent.
///
/// # Errors
/// Returns a configuration error only if the expression patterns fail to
/// compile.
pub fn semantic_errors(study: &StudyDefinition) -> Result<Vec<String>> {
    let declared = study.declared_names();
    let mut errors = Vec::new();

    let mut check_expression = |owner: &str, expression: &str| -> Result<()> {
        let unknown: BTreeSet<String> = expression_identifiers(expression)?
            .into_iter()
            .filter(|id| !declared.contains(id.as_str()))
            .collect();
        for id in unknown {
            errors.push(format!("{}: expression refers to undeclared variable '{}'", owner, id));
        }
        Ok(())
    };

    check_expression("population", &study.population)?;
    let rules = study.rules();
    for (path, rule) in &rules {
        for expression in rule.expressions() {
            if expression != DEFAULT_CATEGORY {
                check_expression(path.as_str(), expression)?;
            }
        }
    }

    for (path, rule) in &rules {
        for name in rule.codelist_references() {
            if !study.codelists.contains_key(name) {
                errors.push(format!("{}: unknown codelist '{}'", path, name));
            }
        }

        if rule.extractor == CATEGORISED_AS {
            match &rule.categories {
                None => errors.push(format!("{}: categorised_as rule has no categories", path)),
                Some(categories) => {
                    let defaults = categories
                        .values()
                        .filter(|e| e.trim() == DEFAULT_CATEGORY)
                        .count();
                    if defaults > 1 {
                        errors.push(format!(
                            "{}: {} categories are {}; at most one is allowed",
                            path, defaults, DEFAULT_CATEGORY
                        ));
                    }
                }
            }
        }
    }

    Ok(errors)
}

/// Validates a study definition document and returns its model.
///
/// # Errors
/// Returns [`SdcError::StudyValidation`] listing every schema violation, or
/// every semantic problem when the structure is valid.
pub fn validate_study_definition(document: &JsonValue) -> Result<StudyDefinition> {
    let validator = study_validator()?;
    let schema_errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| e.to_string())
        .collect();
    if !schema_errors.is_empty() {
        return Err(SdcError::StudyValidation {
            errors: schema_errors,
        });
    }

    let study: StudyDefinition =
        serde_json::from_value(document.clone()).map_err(|e| SdcError::StudyValidation {
            errors: vec![e.to_string()],
        })?;

    let errors = semantic_errors(&study)?;
    if !errors.is_empty() {
        return Err(SdcError::StudyValidation { errors });
    }

    tracing::debug!("Study definition has {} variables", study.variables.len());
    Ok(study)
}

/// Reads and validates a study definition from a JSON file.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, a serialization error
/// if it is not JSON, or a validation error as for
/// [`validate_study_definition`].
pub fn load_study_definition(path: &Path) -> Result<StudyDefinition> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SdcError::io(format!("Failed to read {}", path.display()), e))?;
    let document: JsonValue = serde_json::from_str(&text).map_err(|e| SdcError::Serialization {
        context: format!("Failed to parse {}", path.display()),
        source: e,
    })?;
    validate_study_definition(&document)
}
