use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use wayfare_shared::pii::is_sensitive_key;
use wayfare_shared::Masked;

/// Values collected across all steps, keyed by `step.field`.
///
/// Setting a key to `null` removes it. Blank means absent, `null`, an empty or
/// whitespace-only string, or an empty array.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, Value>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Store a value. Returns `true` if the stored value changed.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if value.is_null() {
            return self.0.remove(&key).is_some();
        }
        match self.0.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.0.insert(key, value);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge `other` into `self`, returning the keys whose value changed
    pub fn merge(&mut self, other: FormFields) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in other.0 {
            if self.insert(key.clone(), value) {
                changed.push(key);
            }
        }
        changed
    }

    pub fn is_blank(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        }
    }

    /// Text form of a scalar value; numbers and booleans are stringified
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        match self.0.get(key)? {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// ISO calendar date (`YYYY-MM-DD`)
    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        match self.0.get(key)? {
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields belonging to one step namespace (`"pricing"` -> `pricing.*`)
    pub fn namespace(&self, step_id: &str) -> FormFields {
        let prefix = format!("{step_id}.");
        self.0
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Expand dotted keys into nested objects.
    ///
    /// `{"contactInfo.email": "a@b.c"}` becomes `{"contactInfo": {"email": "a@b.c"}}`.
    /// When a key is both a leaf and a prefix of a deeper key, the deeper key wins.
    pub fn to_nested_json(&self) -> Value {
        let mut root = Map::new();
        'keys: for (key, value) in &self.0 {
            let mut segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
            let Some(leaf) = segments.pop() else {
                continue;
            };

            let mut node = &mut root;
            for segment in segments {
                let entry = node
                    .entry(segment.to_string())
                    .and_modify(|v| {
                        if !v.is_object() {
                            *v = Value::Object(Map::new());
                        }
                    })
                    .or_insert_with(|| Value::Object(Map::new()));
                let Some(map) = entry.as_object_mut() else {
                    continue 'keys;
                };
                node = map;
            }

            match node.get(leaf) {
                Some(Value::Object(_)) => {}
                _ => {
                    node.insert(leaf.to_string(), value.clone());
                }
            }
        }
        Value::Object(root)
    }
}

impl fmt::Debug for FormFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            if is_sensitive_key(key) {
                map.entry(key, &Masked(value));
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

impl FromIterator<(String, Value)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut fields = FormFields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

impl<const N: usize> From<[(&str, Value); N]> for FormFields {
    fn from(entries: [(&str, Value); N]) -> Self {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// The in-progress record of one booking or listing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub id: Uuid,
    /// Flow template this draft was started from (`hotel`, `vehicle-listing`, ...)
    pub flow: String,
    pub current_step_index: usize,
    pub fields: FormFields,
    pub completed_steps: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingDraft {
    pub fn new(flow: impl Into<String>) -> Self {
        Self::with_defaults(flow, FormFields::new())
    }

    pub fn with_defaults(flow: impl Into<String>, defaults: FormFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            flow: flow.into(),
            current_step_index: 0,
            fields: defaults,
            completed_steps: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.contains(step_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_insert_tracks_changes_and_null_removes() {
        let mut fields = FormFields::new();
        assert!(fields.insert("contactInfo.email", json!("a@b.io")));
        assert!(!fields.insert("contactInfo.email", json!("a@b.io")));
        assert!(fields.insert("contactInfo.email", Value::Null));
        assert!(fields.get("contactInfo.email").is_none());
        assert!(!fields.insert("contactInfo.phone", Value::Null));
    }

    #[test]
    fn test_blank_values() {
        let fields = FormFields::from([
            ("a.text", json!("   ")),
            ("a.list", json!([])),
            ("a.zero", json!(0)),
            ("a.flag", json!(false)),
        ]);
        assert!(fields.is_blank("a.text"));
        assert!(fields.is_blank("a.list"));
        assert!(fields.is_blank("a.missing"));
        assert!(!fields.is_blank("a.zero"));
        assert!(!fields.is_blank("a.flag"));
    }

    #[test]
    fn test_typed_accessors() {
        let fields = FormFields::from([
            ("pricing.dailyRate", json!("79.90")),
            ("pricing.weeklyDiscount", json!(12.5)),
            ("stay.guests", json!("3")),
            ("stay.checkIn", json!("2031-05-01")),
            ("payment.acceptTerms", json!(true)),
        ]);
        assert_eq!(fields.decimal("pricing.dailyRate"), Some(dec!(79.90)));
        assert_eq!(fields.decimal("pricing.weeklyDiscount"), Some(dec!(12.5)));
        assert_eq!(fields.integer("stay.guests"), Some(3));
        assert_eq!(
            fields.date("stay.checkIn"),
            NaiveDate::from_ymd_opt(2031, 5, 1)
        );
        assert_eq!(fields.bool("payment.acceptTerms"), Some(true));
        assert_eq!(fields.text("stay.guests").as_deref(), Some("3"));
    }

    #[test]
    fn test_merge_reports_changed_keys_only() {
        let mut fields = FormFields::from([("a.x", json!(1)), ("a.y", json!(2))]);
        let changed = fields.merge(FormFields::from([
            ("a.x", json!(1)),
            ("a.y", json!(3)),
            ("b.z", json!("z")),
        ]));
        assert_eq!(changed, vec!["a.y".to_string(), "b.z".to_string()]);
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_nested_json_expansion() {
        let fields = FormFields::from([
            ("contactInfo.email", json!("guest@example.com")),
            ("contactInfo.name.first", json!("Ada")),
            ("pricing.dailyRate", json!("120")),
            ("notes", json!("late arrival")),
        ]);
        assert_eq!(
            fields.to_nested_json(),
            json!({
                "contactInfo": { "email": "guest@example.com", "name": { "first": "Ada" } },
                "pricing": { "dailyRate": "120" },
                "notes": "late arrival"
            })
        );
    }

    #[test]
    fn test_nested_json_deeper_key_wins() {
        let fields = FormFields::from([("a", json!(1)), ("a.b", json!(2))]);
        assert_eq!(fields.to_nested_json(), json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn test_namespace_and_masked_debug() {
        let fields = FormFields::from([
            ("contactInfo.email", json!("guest@example.com")),
            ("pricing.dailyRate", json!("120")),
        ]);
        let pricing = fields.namespace("pricing");
        assert_eq!(pricing.len(), 1);

        let debug = format!("{:?}", fields);
        assert!(!debug.contains("guest@example.com"));
        assert!(debug.contains("120"));
    }
}
