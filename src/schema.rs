//! Typed view of the form schema produced by the model.
//!
//! The orchestrator keeps the sanitized JSON text as the artifact; this
//! module only *reads* it. Every field is optional or defaulted so a schema
//! that drifts from the contract still yields a partial view instead of an
//! error. Form identifiers are derived here too.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Control type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Date,
    Phone,
    Select,
    Radio,
    Checkbox,
    Html,
    /// Anything outside the fixed enumeration.
    #[serde(other)]
    Other,
}

/// `x-field-config` of a property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub field_type: Option<FieldKind>,
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Objects `{value, label}` in practice; kept loose.
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub layout: Option<String>,
}

/// One entry of `properties`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "x-field-config", default)]
    pub config: Option<FieldConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutColumn {
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutRow {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub columns: Vec<LayoutColumn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSection {
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub layout: Vec<LayoutRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPage {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<FormSection>,
}

/// Root `x-form-config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    #[serde(default)]
    pub form_id: Option<String>,
    /// `"1.0"` or `1.0`, depending on the model's mood.
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub pages: Vec<FormPage>,
}

/// The schema output contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "x-form-config", default)]
    pub form_config: Option<FormConfig>,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Counts reported alongside an extracted schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub field_count: usize,
    pub required_count: usize,
    pub page_count: usize,
    pub section_count: usize,
}

impl FormSchema {
    /// Typed view of `value`, or `None` when it does not fit the contract.
    pub fn from_value(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!("Schema does not match the form contract: {}", e);
                None
            }
        }
    }

    /// Names that are required either at the root or in their field config.
    pub fn required_fields(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.required.iter().map(String::as_str).collect();
        for (name, field) in &self.properties {
            if field.config.as_ref().is_some_and(|c| c.required) {
                names.insert(name.as_str());
            }
        }
        names
    }

    /// Fields placed in a layout column that have no property definition.
    pub fn unknown_layout_fields(&self) -> Vec<&str> {
        self.form_config
            .iter()
            .flat_map(|c| &c.pages)
            .flat_map(|p| &p.sections)
            .flat_map(|s| &s.layout)
            .flat_map(|r| &r.columns)
            .flat_map(|c| &c.fields)
            .map(String::as_str)
            .filter(|f| !self.properties.contains_key(*f))
            .collect()
    }

    pub fn summary(&self) -> SchemaSummary {
        let pages = self
            .form_config
            .as_ref()
            .map(|c| c.pages.as_slice())
            .unwrap_or_default();
        SchemaSummary {
            field_count: self.properties.len(),
            required_count: self.required_fields().len(),
            page_count: pages.len(),
            section_count: pages.iter().map(|p| p.sections.len()).sum(),
        }
    }
}

// ── Form identifiers ─────────────────────────────────────────────────────────

static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, collapse non-alphanumeric runs to `-`, trim dashes.
pub fn slugify(text: &str) -> String {
    RE_NON_SLUG
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Form identifier for `schema`, stamped with the current time if needed.
pub fn derive_form_id(schema: &Value) -> String {
    derive_form_id_at(schema, chrono::Utc::now().timestamp_millis())
}

/// Form identifier with an explicit fallback timestamp.
///
/// Precedence: `x-form-config.formId`, then a slug of `title`, then
/// `form-schema-<millis>`.
pub fn derive_form_id_at(schema: &Value, millis: i64) -> String {
    if let Some(id) = schema
        .pointer("/x-form-config/formId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        debug!("Found formId in x-form-config: {}", id);
        return id.to_string();
    }

    if let Some(slug) = schema
        .get("title")
        .and_then(Value::as_str)
        .map(slugify)
        .filter(|s| !s.is_empty())
    {
        debug!("Generated formId from title: {}", slug);
        return slug;
    }

    let fallback = format!("form-schema-{millis}");
    warn!("No formId or title in schema, using {}", fallback);
    fallback
}
