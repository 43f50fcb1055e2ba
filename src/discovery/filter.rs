//! Attribute-based port filtering.

use super::{DiscoveryError, PortDiscovery, PortInfo};
use regex::Regex;
use std::fmt;

/// Value of a port attribute, or of an equality constraint on one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Integer(i64),
    /// The port does not report this attribute.
    Absent,
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Absent => f.write_str("<absent>"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        Self::Integer(v.into())
    }
}

/// Constraint on a single attribute.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Text attributes must match the regular expression.
    Pattern(Regex),
    /// The attribute must equal the value exactly.
    Equals(AttrValue),
}

impl Criterion {
    pub fn matches(&self, actual: &AttrValue) -> bool {
        match (self, actual) {
            (Self::Pattern(re), AttrValue::Text(text)) => re.is_match(text),
            (Self::Pattern(_), _) => false,
            (Self::Equals(expected), actual) => expected == actual,
        }
    }
}

/// Conjunction of attribute constraints.
///
/// Constraints on names that are not port attributes are ignored; a known
/// attribute the port lacks never satisfies a pattern.
#[derive(Debug, Clone, Default)]
pub struct PortFilter {
    criteria: Vec<(String, Criterion)>,
}

impl PortFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `attribute` to match `pattern`.
    pub fn pattern(self, attribute: impl Into<String>, pattern: &str) -> Result<Self, DiscoveryError> {
        Ok(self.regex(attribute, Regex::new(pattern)?))
    }

    pub fn regex(mut self, attribute: impl Into<String>, regex: Regex) -> Self {
        self.criteria
            .push((attribute.into(), Criterion::Pattern(regex)));
        self
    }

    /// Require `attribute` to equal `value`.
    pub fn equals(mut self, attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.criteria
            .push((attribute.into(), Criterion::Equals(value.into())));
        self
    }

    /// Add a `name=value` constraint.
    ///
    /// Decimal or `0x`-prefixed values become integer equality checks; anything
    /// else is compiled as a pattern.
    pub fn parse_constraint(self, expr: &str) -> Result<Self, DiscoveryError> {
        let (name, value) = expr
            .split_once('=')
            .ok_or_else(|| DiscoveryError::InvalidFilter(format!("expected NAME=VALUE, got '{expr}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DiscoveryError::InvalidFilter(format!(
                "missing attribute name in '{expr}'"
            )));
        }

        match parse_integer(value) {
            Some(v) => Ok(self.equals(name, v)),
            None => self.pattern(name, value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Whether `port` satisfies every constraint.
    pub fn matches(&self, port: &PortInfo) -> bool {
        self.criteria
            .iter()
            .all(|(name, criterion)| match port.attribute(name) {
                Some(actual) => criterion.matches(&actual),
                None => true,
            })
    }
}

fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Device paths of the ports satisfying `filter`, in enumeration order.
pub fn filter_ports<'a>(
    discovery: &dyn PortDiscovery,
    filter: &'a PortFilter,
) -> Result<impl Iterator<Item = String> + 'a, DiscoveryError> {
    let ports = discovery.list_ports()?;
    Ok(ports
        .into_iter()
        .filter(move |port| filter.matches(port))
        .map(|port| port.device))
}
