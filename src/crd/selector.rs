//! Typed label selectors
//!
//! Converts a Kubernetes `LabelSelector` into a validated [`Selector`] that can be
//! evaluated in memory (event routing, tests) and rendered into the string form the
//! API server accepts for list calls.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static NAME_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").expect("static regex")
});

static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("static regex")
});

/// A single selector requirement
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => labels.get(key).map_or(true, |v| !values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(key, value) => write!(f, "{}={}", key, value),
            Requirement::In(key, values) => write!(f, "{} in ({})", key, values.join(",")),
            Requirement::NotIn(key, values) => write!(f, "{} notin ({})", key, values.join(",")),
            Requirement::Exists(key) => write!(f, "{}", key),
            Requirement::DoesNotExist(key) => write!(f, "!{}", key),
        }
    }
}

/// A validated label selector. An empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Check a label set against every requirement
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let empty = BTreeMap::new();
        let labels = labels.unwrap_or(&empty);
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", rendered.join(","))
    }
}

impl TryFrom<&LabelSelector> for Selector {
    type Error = Error;

    fn try_from(selector: &LabelSelector) -> Result<Self> {
        let mut requirements = Vec::new();

        if let Some(match_labels) = &selector.match_labels {
            for (key, value) in match_labels {
                validate_key(key)?;
                validate_value(key, value)?;
                requirements.push(Requirement::Equals(key.clone(), value.clone()));
            }
        }

        for expr in selector.match_expressions.iter().flatten() {
            validate_key(&expr.key)?;
            let values = expr.values.clone().unwrap_or_default();
            for value in &values {
                validate_value(&expr.key, value)?;
            }
            let requirement = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(Error::InvalidSelector(format!(
                        "operator {} on key {:?} requires at least one value",
                        expr.operator, expr.key
                    )));
                }
                "Exists" | "DoesNotExist" if !values.is_empty() => {
                    return Err(Error::InvalidSelector(format!(
                        "operator {} on key {:?} must not have values",
                        expr.operator, expr.key
                    )));
                }
                "In" => Requirement::In(expr.key.clone(), values),
                "NotIn" => Requirement::NotIn(expr.key.clone(), values),
                "Exists" => Requirement::Exists(expr.key.clone()),
                "DoesNotExist" => Requirement::DoesNotExist(expr.key.clone()),
                other => {
                    return Err(Error::InvalidSelector(format!(
                        "unknown operator {:?} on key {:?}",
                        other, expr.key
                    )));
                }
            };
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }
}

/// Validate a qualified label key: an optional DNS subdomain prefix and a name part
fn validate_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > 253 || !DNS_SUBDOMAIN.is_match(prefix) {
            return Err(Error::InvalidSelector(format!(
                "invalid prefix in label key {:?}",
                key
            )));
        }
    }
    if name.is_empty() || name.len() > 63 || !NAME_PART.is_match(name) {
        return Err(Error::InvalidSelector(format!("invalid label key {:?}", key)));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > 63 || !NAME_PART.is_match(value) {
        return Err(Error::InvalidSelector(format!(
            "invalid value {:?} for label key {:?}",
            value, key
        )));
    }
    Ok(())
}
