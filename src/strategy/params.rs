//! Named strategy parameters.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DeepTestError, Result};

/// A single parameter combination, in grid-axis order.
///
/// Serializes as a name → value map, keeping insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    values: Vec<(String, f64)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing value of the same name.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: f64) {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Read a window length: a positive whole number.
    pub fn get_window(&self, name: &str, default: usize) -> Result<usize> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };
        if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
            return Err(DeepTestError::configuration(format!(
                "parameter {} must be a positive integer, got {}",
                name, value
            )));
        }
        Ok(value as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        self.values
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (n, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", n, v)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct ParameterSetVisitor;

impl<'de> Visitor<'de> for ParameterSetVisitor {
    type Value = ParameterSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of parameter names to numbers")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut params = ParameterSet::new();
        while let Some((name, value)) = access.next_entry::<String, f64>()? {
            params.set(&name, value);
        }
        Ok(params)
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ParameterSetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_set_key() {
        let params = ParameterSet::new().with("fast", 10.0).with("slow", 100.0);
        assert_eq!(params.key(), "fast=10_slow=100");
        assert_eq!(params.to_string(), "{fast: 10, slow: 100}");
    }

    #[test]
    fn test_set_replaces() {
        let params = ParameterSet::new().with("fast", 10.0).with("fast", 20.0);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("fast"), Some(20.0));
    }

    #[test]
    fn test_get_window() {
        let params = ParameterSet::new().with("fast", 5.0).with("bad", 2.5);
        assert_eq!(params.get_window("fast", 20).unwrap(), 5);
        assert_eq!(params.get_window("slow", 100).unwrap(), 100);
        assert!(params.get_window("bad", 1).is_err());
    }

    #[test]
    fn test_serde_map_keeps_order() {
        let params = ParameterSet::new().with("slow", 100.0).with("fast", 10.0);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"slow":100.0,"fast":10.0}"#);

        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);

        let from_toml: ParameterSet = toml::from_str("fast = 20\nslow = 80.0").unwrap();
        assert_eq!(from_toml.get("fast"), Some(20.0));
        assert_eq!(from_toml.get("slow"), Some(80.0));
    }
}
