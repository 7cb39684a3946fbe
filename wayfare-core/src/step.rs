//! Step definitions and their validation rules.
//!
//! A [`StepDefinition`] is static for the lifetime of a flow: its required
//! fields are checked first, then its [`FieldRule`]s (only against fields that
//! are present), then an optional custom validator. Only the first error per
//! field is kept, so the presentation layer shows one message per input.

use crate::draft::FormFields;
use crate::{CoreError, CoreResult};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

pub const REQUIRED_MESSAGE: &str = "This field is required";

/// Outcome of validating one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub field_errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            field_errors: BTreeMap::new(),
        }
    }

    pub fn field_error(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::valid();
        result.add_error(key, message);
        result
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Record an error; a field that already has one keeps its first message
    pub fn add_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.field_errors.entry(key.into()).or_insert_with(|| message.into());
        self.valid = false;
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for (key, message) in other.field_errors {
            self.add_error(key, message);
        }
        if !other.valid {
            self.valid = false;
        }
    }

    pub fn error_for(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

/// Declarative check on a single field (or a pair, for date ranges)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Email { key: String },
    MinLength { key: String, min: usize },
    NumberRange { key: String, min: Decimal, max: Decimal },
    PositiveNumber { key: String },
    OneOf { key: String, options: Vec<String> },
    /// `end` must be a date strictly after `start`
    DateOrder { start: String, end: String },
    NotInPast { key: String },
    Accepted { key: String },
    NonEmptyList { key: String },
}

impl FieldRule {
    pub fn email(key: &str) -> Self {
        FieldRule::Email { key: key.to_string() }
    }

    pub fn min_length(key: &str, min: usize) -> Self {
        FieldRule::MinLength { key: key.to_string(), min }
    }

    pub fn number_range(key: &str, min: Decimal, max: Decimal) -> Self {
        FieldRule::NumberRange { key: key.to_string(), min, max }
    }

    pub fn positive(key: &str) -> Self {
        FieldRule::PositiveNumber { key: key.to_string() }
    }

    pub fn one_of(key: &str, options: &[&str]) -> Self {
        FieldRule::OneOf {
            key: key.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn date_order(start: &str, end: &str) -> Self {
        FieldRule::DateOrder { start: start.to_string(), end: end.to_string() }
    }

    pub fn not_in_past(key: &str) -> Self {
        FieldRule::NotInPast { key: key.to_string() }
    }

    pub fn accepted(key: &str) -> Self {
        FieldRule::Accepted { key: key.to_string() }
    }

    pub fn non_empty_list(key: &str) -> Self {
        FieldRule::NonEmptyList { key: key.to_string() }
    }

    /// The field an error from this rule is reported against
    pub fn target(&self) -> &str {
        match self {
            FieldRule::Email { key }
            | FieldRule::MinLength { key, .. }
            | FieldRule::NumberRange { key, .. }
            | FieldRule::PositiveNumber { key }
            | FieldRule::OneOf { key, .. }
            | FieldRule::NotInPast { key }
            | FieldRule::Accepted { key }
            | FieldRule::NonEmptyList { key } => key,
            FieldRule::DateOrder { end, .. } => end,
        }
    }

    /// Returns the error message if the rule is violated
    pub fn check(&self, fields: &FormFields) -> Option<String> {
        let target = self.target();
        if fields.is_blank(target) {
            // Blank required fields are already reported with the generic message
            return match self {
                FieldRule::Accepted { .. } => Some("Must be accepted".to_string()),
                FieldRule::NonEmptyList { .. } => Some("Add at least one item".to_string()),
                _ => None,
            };
        }

        match self {
            FieldRule::Email { key } => {
                let text = fields.text(key)?;
                (!looks_like_email(&text)).then(|| "Enter a valid email address".to_string())
            }
            FieldRule::MinLength { key, min } => {
                let len = fields.text(key).map(|t| t.chars().count()).unwrap_or(0);
                (len < *min).then(|| format!("Must be at least {min} characters"))
            }
            FieldRule::NumberRange { key, min, max } => match fields.decimal(key) {
                None => Some("Must be a number".to_string()),
                Some(value) if value < *min || value > *max => {
                    Some(format!("Must be between {min} and {max}"))
                }
                Some(_) => None,
            },
            FieldRule::PositiveNumber { key } => match fields.decimal(key) {
                None => Some("Must be a number".to_string()),
                Some(value) if value <= Decimal::ZERO => Some("Must be greater than 0".to_string()),
                Some(_) => None,
            },
            FieldRule::OneOf { key, options } => {
                let text = fields.text(key).unwrap_or_default();
                (!options.iter().any(|o| *o == text))
                    .then(|| format!("Must be one of: {}", options.join(", ")))
            }
            FieldRule::DateOrder { start, end } => {
                let Some(end_date) = fields.date(end) else {
                    return Some("Enter a date as YYYY-MM-DD".to_string());
                };
                let start_date = fields.date(start)?;
                (end_date <= start_date).then(|| format!("Must be after {start}"))
            }
            FieldRule::NotInPast { key } => match fields.date(key) {
                None => Some("Enter a date as YYYY-MM-DD".to_string()),
                Some(date) if date < Utc::now().date_naive() => {
                    Some("Date cannot be in the past".to_string())
                }
                Some(_) => None,
            },
            FieldRule::Accepted { key } => {
                (fields.bool(key) != Some(true)).then(|| "Must be accepted".to_string())
            }
            FieldRule::NonEmptyList { key } => match fields.get(key) {
                Some(serde_json::Value::Array(items)) if !items.is_empty() => None,
                _ => Some("Add at least one item".to_string()),
            },
        }
    }
}

fn looks_like_email(text: &str) -> bool {
    let mut parts = text.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !text.contains(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

pub type StepValidator = Arc<dyn Fn(&FormFields) -> ValidationResult + Send + Sync>;

/// A single page of a booking or listing flow
#[derive(Clone)]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub required_fields: BTreeSet<String>,
    pub rules: Vec<FieldRule>,
    validator: Option<StepValidator>,
}

impl StepDefinition {
    pub fn new(id: &str, order: u32) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
            order,
            required_fields: BTreeSet::new(),
            rules: Vec::new(),
            validator: None,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn require(mut self, key: &str) -> Self {
        self.required_fields.insert(key.to_string());
        self
    }

    pub fn require_all(mut self, keys: &[&str]) -> Self {
        self.required_fields.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&FormFields) -> ValidationResult + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn has_custom_validator(&self) -> bool {
        self.validator.is_some()
    }

    pub fn validate(&self, fields: &FormFields) -> ValidationResult {
        let mut result = ValidationResult::valid();

        for key in &self.required_fields {
            if fields.is_blank(key) {
                result.add_error(key.clone(), REQUIRED_MESSAGE);
            }
        }

        for rule in &self.rules {
            if let Some(message) = rule.check(fields) {
                result.add_error(rule.target().to_string(), message);
            }
        }

        if let Some(validator) = &self.validator {
            result.merge(validator(fields));
        }

        result
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("required_fields", &self.required_fields)
            .field("rules", &self.rules)
            .field("custom_validator", &self.validator.is_some())
            .finish()
    }
}

/// Ordered, immutable list of the steps of one flow
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new(mut steps: Vec<StepDefinition>) -> CoreResult<Self> {
        if steps.is_empty() {
            return Err(CoreError::InvalidRegistry("a flow needs at least one step".to_string()));
        }

        let mut ids = HashSet::new();
        let mut orders = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(CoreError::InvalidRegistry(format!("duplicate step id '{}'", step.id)));
            }
            if !orders.insert(step.order) {
                return Err(CoreError::InvalidRegistry(format!(
                    "duplicate step order {} ('{}')",
                    step.order, step.id
                )));
            }
        }

        steps.sort_by_key(|s| s.order);
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; an empty registry cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }
}
