//! Resource and reference model for the declaration graph.
//!
//! A [`Resource`] is a named, typed, attribute-bearing declaration. A
//! [`Reference`] is a typed edge from one resource's attribute to another
//! resource's identity or post-apply output. References are promoted from
//! `${id.attribute}` expressions at load time so that all downstream
//! dependency analysis is structural, never textual.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConfigError, Result, StackError};

/// The closed set of resource kinds the provisioner understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A key-value table.
    Table,
    /// An access-control role.
    Role,
    /// A policy document attached to a role.
    Policy,
    /// A managed function.
    Function,
    /// A scheduled trigger rule.
    Rule,
    /// A rule-to-target trigger binding.
    Binding,
}

/// A typed, lazy pointer to another resource's attribute or output.
///
/// A reference resolves only after the target resource has been applied;
/// resolving earlier fails with an unresolved-reference error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Id of the referenced resource.
    pub target: String,
    /// Attribute or provider output name on the referenced resource.
    pub attribute: String,
}

/// An attribute value in a resource declaration.
///
/// Mirrors the YAML scalar/sequence/mapping shapes, plus the [`Reference`]
/// variant promoted from `${id.attribute}` strings.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Sequence of values.
    List(Vec<AttrValue>),
    /// Mapping of string keys to values, ordered for determinism.
    Map(BTreeMap<String, AttrValue>),
    /// Reference to another resource's attribute or output.
    Ref(Reference),
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Unique id within the graph.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Declared attributes.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Explicit dependencies on other resource ids.
    pub depends_on: Vec<String>,
}

impl Reference {
    /// Creates a new reference.
    #[must_use]
    pub fn new(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: attribute.into(),
        }
    }

    /// Parses a reference expression of the form `${id.attribute}`.
    ///
    /// Returns `None` if the string is not a reference expression at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the string looks like a reference expression but
    /// is malformed (missing the `id.attribute` shape).
    pub fn parse(expression: &str) -> Result<Option<Self>> {
        let Some(inner) = expression
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        else {
            return Ok(None);
        };

        let malformed = || {
            StackError::Config(ConfigError::InvalidReference {
                expression: expression.to_string(),
            })
        };

        let (target, attribute) = inner.split_once('.').ok_or_else(malformed)?;
        if target.is_empty() || attribute.is_empty() || attribute.contains('.') {
            return Err(malformed());
        }

        Ok(Some(Self::new(target, attribute)))
    }
}

impl AttrValue {
    /// Converts a parsed YAML value into an attribute value, promoting
    /// `${id.attribute}` strings into typed references.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed reference expressions or non-string
    /// mapping keys.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        match value {
            serde_yaml::Value::Null => Ok(Self::Null),
            serde_yaml::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_yaml::Value::Number(n) => n.as_i64().map_or_else(
                || {
                    n.as_f64().map(Self::Float).ok_or_else(|| {
                        StackError::Config(ConfigError::ParseError {
                            message: format!("Unrepresentable number: {n}"),
                            location: None,
                        })
                    })
                },
                |i| Ok(Self::Int(i)),
            ),
            serde_yaml::Value::String(s) => Ok(Reference::parse(s)?
                .map_or_else(|| Self::String(s.clone()), Self::Ref)),
            serde_yaml::Value::Sequence(seq) => Ok(Self::List(
                seq.iter().map(Self::from_yaml).collect::<Result<_>>()?,
            )),
            serde_yaml::Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (key, val) in map {
                    let key = key.as_str().ok_or_else(|| {
                        StackError::Config(ConfigError::ParseError {
                            message: String::from("Attribute keys must be strings"),
                            location: None,
                        })
                    })?;
                    out.insert(key.to_string(), Self::from_yaml(val)?);
                }
                Ok(Self::Map(out))
            }
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }

    /// Collects every reference contained in this value, depth first.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Ref(reference) => out.push(reference),
            Self::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::String(_) => {}
        }
    }
}

impl Resource {
    /// Creates a new resource declaration.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        attributes: BTreeMap<String, AttrValue>,
        depends_on: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            attributes,
            depends_on,
        }
    }

    /// Returns every reference embedded in this resource's attributes.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        for value in self.attributes.values() {
            value.collect_references(&mut out);
        }
        out
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Table => "table",
            Self::Role => "role",
            Self::Policy => "policy",
            Self::Function => "function",
            Self::Rule => "rule",
            Self::Binding => "binding",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}}}", self.target, self.attribute)
    }
}
