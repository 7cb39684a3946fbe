use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wrapper for guest details (emails, phone numbers, card holders) that must
/// not leak through `tracing` output.
///
/// Debug and Display are masked; Serialize passes the real value through so
/// the booking request still carries it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Field keys whose values are personal data, matched on the last key segment
/// (`contactInfo.email` -> `email`).
pub fn is_sensitive_key(key: &str) -> bool {
    let leaf = key.rsplit('.').next().unwrap_or(key).to_ascii_lowercase();
    matches!(
        leaf.as_str(),
        "email" | "phone" | "cardnumber" | "cvv" | "cardholder" | "passport" | "licensenumber"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_logs_but_serializes() {
        let email = Masked::new("guest@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(email.to_string(), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"guest@example.com\"");
        assert_eq!(email.inner(), "guest@example.com");
    }

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("contactInfo.email"));
        assert!(is_sensitive_key("payment.cardNumber"));
        assert!(!is_sensitive_key("pricing.dailyRate"));
    }
}
