//! Secret-bearing values: host connection descriptors and request auth keys.
//!
//! Formatting and serializing never print the inner value. Log fields that
//! need to identify a host use [`Sensitive::loggable_descriptor`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::redact_descriptor;

const REDACTED: &str = "[REDACTED]";

#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// The raw value, for handing to a driver or comparing a key.
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Sensitive<String> {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Descriptor with credentials masked, safe for span fields.
    pub fn loggable_descriptor(&self) -> String {
        redact_descriptor(&self.0)
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

// Summaries and config dumps may be serialized; the secret never is.
impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_hidden_from_formatting() {
        let descriptor = Sensitive::new("mysql://reader:pw@db/app".to_string());
        assert_eq!(format!("{descriptor:?}"), "[REDACTED]");
        assert_eq!(descriptor.to_string(), "[REDACTED]");
        assert_eq!(descriptor.expose(), "mysql://reader:pw@db/app");
        assert_eq!(descriptor.loggable_descriptor(), "mysql://reader:***@db/app");
    }

    #[test]
    fn auth_key_reads_from_json_but_never_writes_back() {
        let key: Sensitive<String> = serde_json::from_str("\"key-1\"").unwrap();
        assert_eq!(key.expose(), "key-1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"***\"");

        assert!(Sensitive::<String>::default().is_blank());
        assert!(Sensitive::new("  ".to_string()).is_blank());
        assert!(!key.is_blank());
    }
}
