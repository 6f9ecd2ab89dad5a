//! Serde model of a study definition document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// Category expression that matches whatever no other category matched.
pub const DEFAULT_CATEGORY: &str = "DEFAULT";

/// Extractor whose rule assigns one of several categories.
pub const CATEGORISED_AS: &str = "categorised_as";

/// Which patients to extract and what to extract for them.
///
/// The document is declarative: extraction itself is performed by an
/// external cohort-extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDefinition {
    /// Reference date for study time windows
    pub index_date: NaiveDate,
    /// Expectations used when generating dummy data
    #[serde(default)]
    pub default_expectations: BTreeMap<String, JsonValue>,
    /// Boolean expression over variables selecting the population
    pub population: String,
    /// Named code lists referenced by variable parameters
    #[serde(default)]
    pub codelists: BTreeMap<String, Codelist>,
    /// Extracted variables by name
    pub variables: BTreeMap<String, VariableRule>,
}

/// A named list of clinical codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codelist {
    /// Coding system (`snomed`, `icd10`, `opcs4`, ...)
    pub system: String,
    /// Where the codes come from
    #[serde(flatten)]
    pub source: CodelistSource,
}

/// Source of the codes in a [`Codelist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodelistSource {
    /// Codes read from a CSV file
    Csv {
        /// Path of the CSV file, relative to the study directory
        csv: String,
        /// Column holding the codes
        column: String,
        /// Column holding each code's category
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_column: Option<String>,
    },
    /// Codes listed in the document
    Inline {
        /// The codes
        codes: Vec<String>,
    },
}

/// How one variable is extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRule {
    /// Extractor name, e.g. `with_covid_therapeutics` or `satisfying`
    pub extractor: String,
    /// What the extractor returns (`date`, `binary_flag`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<String>,
    /// Extractor parameters; a `{"codelist": name}` object refers to a
    /// declared codelist
    #[serde(default)]
    pub parameters: BTreeMap<String, JsonValue>,
    /// Boolean expression for `satisfying` rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Category label to expression, for `categorised_as` rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, String>>,
    /// Helper variables visible to this rule's expressions
    #[serde(default)]
    pub variables: BTreeMap<String, VariableRule>,
    /// Expectations used when generating dummy data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_expectations: Option<JsonValue>,
}

impl VariableRule {
    /// Expressions of this rule: the `satisfying` expression and every
    /// category expression.
    pub fn expressions(&self) -> Vec<&str> {
        let mut expressions: Vec<&str> = self.expression.iter().map(String::as_str).collect();
        if let Some(categories) = &self.categories {
            expressions.extend(categories.values().map(String::as_str));
        }
        expressions
    }

    /// Codelist names referenced by the parameters.
    pub fn codelist_references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for value in self.parameters.values() {
            collect_codelist_references(value, &mut names);
        }
        names
    }
}

fn collect_codelist_references<'a>(value: &'a JsonValue, names: &mut Vec<&'a str>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(name)) = map.get("codelist") {
                names.push(name);
            }
            for nested in map.values() {
                collect_codelist_references(nested, names);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_codelist_references(item, names);
            }
        }
        _ => {}
    }
}

impl StudyDefinition {
    /// Every variable name an expression may refer to: top-level variables,
    /// nested helpers at any depth, and `index_date`.
    pub fn declared_names(&self) -> BTreeSet<&str> {
        fn walk<'a>(rules: &'a BTreeMap<String, VariableRule>, names: &mut BTreeSet<&'a str>) {
            for (name, rule) in rules {
                names.insert(name);
                walk(&rule.variables, names);
            }
        }

        let mut names = BTreeSet::new();
        names.insert("index_date");
        walk(&self.variables, &mut names);
        names
    }

    /// Every rule with its path (`parent.child` for helpers).
    pub fn rules(&self) -> Vec<(String, &VariableRule)> {
        fn walk<'a>(
            prefix: &str,
            rules: &'a BTreeMap<String, VariableRule>,
            out: &mut Vec<(String, &'a VariableRule)>,
        ) {
            for (name, rule) in rules {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                walk(&path, &rule.variables, out);
                out.push((path, rule));
            }
        }

        let mut out = Vec::new();
        walk("", &self.variables, &mut out);
        out
    }
}
