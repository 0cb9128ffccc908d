//! Attribute overrides applied before the environment resets.
//!
//! An override names a dotted path (`env.word_list`) and a transform (`"sort"`). The path is
//! walked from the game master: every segment but the last selects a child node, the last one
//! names the attribute whose value is replaced by `transform(current_value)`.
//!
//! Overrides exist to force reproducible episodes, e.g. sorting a candidate list the
//! environment would otherwise sample from in hash order. A failing override is reported and
//! skipped, the others are still applied.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A value reachable through the attribute graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Text(String),
    /// Ordered list of values.
    List(Vec<AttrValue>),
}

impl AttrValue {
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (AttrValue::Bool(a), AttrValue::Bool(b)) => Some(a.cmp(b)),
            (AttrValue::Int(a), AttrValue::Int(b)) => Some(a.cmp(b)),
            (AttrValue::Float(a), AttrValue::Float(b)) => Some(a.total_cmp(b)),
            (AttrValue::Int(a), AttrValue::Float(b)) => Some((*a as f64).total_cmp(b)),
            (AttrValue::Float(a), AttrValue::Int(b)) => Some(a.total_cmp(&(*b as f64))),
            (AttrValue::Text(a), AttrValue::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Text(_) => "text",
            AttrValue::List(_) => "list",
        }
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(values: Vec<String>) -> Self {
        AttrValue::List(values.into_iter().map(AttrValue::Text).collect())
    }
}

impl TryFrom<AttrValue> for Vec<String> {
    type Error = anyhow::Error;

    fn try_from(value: AttrValue) -> anyhow::Result<Self> {
        match value {
            AttrValue::List(items) => items
                .into_iter()
                .map(|item| match item {
                    AttrValue::Text(text) => Ok(text),
                    other => anyhow::bail!("expected text item, got {}", other.type_name()),
                })
                .collect(),
            other => anyhow::bail!("expected a list of text, got {}", other.type_name()),
        }
    }
}

/// A node of the attribute graph.
///
/// Every method has a default so that types with nothing to expose can implement the trait with
/// an empty `impl` block.
pub trait Attributes {
    /// Child node named `name`, used for every path segment but the last.
    fn child_mut(&mut self, _name: &str) -> Option<&mut dyn Attributes> {
        None
    }

    /// Current value of the attribute `name`.
    fn get_attribute(&self, _name: &str) -> Option<AttrValue> {
        None
    }

    /// Replace the attribute `name`.
    ///
    /// # Errors
    /// Returned when the attribute does not exist or does not accept `value`.
    fn set_attribute(&mut self, name: &str, _value: AttrValue) -> anyhow::Result<()> {
        anyhow::bail!("attribute '{name}' is read-only")
    }
}

/// Supported transforms. All of them are pure functions of the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Sort a list in ascending order.
    Sort,
    /// Sort a list in descending order.
    SortDescending,
    /// Reverse a list.
    Reverse,
}

impl FromStr for Transform {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sort" | "sort_ascending" => Ok(Transform::Sort),
            "sort_descending" => Ok(Transform::SortDescending),
            "reverse" => Ok(Transform::Reverse),
            _ => Err(OverrideError::UnsupportedTransform {
                transform: s.to_owned(),
            }),
        }
    }
}

impl Transform {
    /// Apply the transform.
    ///
    /// # Errors
    /// Returns a description of the problem when `value` is not a list, or when a sort meets
    /// items that cannot be compared with each other.
    pub fn apply(self, value: AttrValue) -> Result<AttrValue, String> {
        let AttrValue::List(mut items) = value else {
            return Err(format!("expected a list, got {}", value.type_name()));
        };
        match self {
            Transform::Reverse => items.reverse(),
            Transform::Sort | Transform::SortDescending => {
                if let Some(pair) = items.windows(2).find(|w| w[0].compare(&w[1]).is_none()) {
                    return Err(format!(
                        "cannot compare {} with {}",
                        pair[0].type_name(),
                        pair[1].type_name()
                    ));
                }
                items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
                if self == Transform::SortDescending {
                    items.reverse();
                }
            }
        }
        Ok(AttrValue::List(items))
    }
}

/// An override as declared in the episode configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOverride {
    /// Dotted path from the game master, e.g. `env.word_list`.
    pub path: String,
    /// Transform name, e.g. `sort`.
    pub transform: String,
}

impl AttributeOverride {
    /// Create an override.
    pub fn new(path: impl Into<String>, transform: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transform: transform.into(),
        }
    }
}

/// Why an override was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// The path is empty or has an empty segment.
    MalformedPath {
        /// Offending path.
        path: String,
    },
    /// A segment did not resolve to a child node.
    UnresolvedSegment {
        /// Full path.
        path: String,
        /// First segment that could not be resolved.
        segment: String,
    },
    /// The final attribute does not exist.
    MissingAttribute {
        /// Full path.
        path: String,
    },
    /// The transform name is unknown.
    UnsupportedTransform {
        /// Unknown name.
        transform: String,
    },
    /// The transform could not be applied to the current value.
    TransformFailed {
        /// Full path.
        path: String,
        /// Description of the failure.
        reason: String,
    },
    /// The node refused the transformed value.
    Rejected {
        /// Full path.
        path: String,
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for OverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideError::MalformedPath { path } => write!(f, "malformed path '{path}'"),
            OverrideError::UnresolvedSegment { path, segment } => {
                write!(f, "could not resolve '{segment}' in '{path}'")
            }
            OverrideError::MissingAttribute { path } => write!(f, "no attribute at '{path}'"),
            OverrideError::UnsupportedTransform { transform } => {
                write!(f, "unsupported transform '{transform}'")
            }
            OverrideError::TransformFailed { path, reason } => {
                write!(f, "transform failed on '{path}': {reason}")
            }
            OverrideError::Rejected { path, reason } => {
                write!(f, "'{path}' rejected the new value: {reason}")
            }
        }
    }
}

impl std::error::Error for OverrideError {}

/// Outcome of applying every configured override.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupReport {
    /// Paths that were rewritten.
    pub applied: Vec<String>,
    /// Overrides that were skipped, with the reason.
    pub skipped: Vec<(AttributeOverride, OverrideError)>,
}

impl SetupReport {
    /// True when every override was applied.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

fn resolve<'a>(
    node: &'a mut dyn Attributes,
    path: &str,
    segments: &[&str],
) -> Result<&'a mut dyn Attributes, OverrideError> {
    match segments.split_first() {
        None => Ok(node),
        Some((first, rest)) => {
            let child = node
                .child_mut(first)
                .ok_or_else(|| OverrideError::UnresolvedSegment {
                    path: path.to_owned(),
                    segment: (*first).to_owned(),
                })?;
            resolve(child, path, rest)
        }
    }
}

/// Apply a single override against `root`.
///
/// # Errors
/// See [`OverrideError`]. On error `root` is left untouched.
pub fn apply_override(
    root: &mut dyn Attributes,
    item: &AttributeOverride,
) -> Result<(), OverrideError> {
    let transform = item.transform.parse::<Transform>()?;
    let path = item.path.as_str();
    let segments = path.split('.').collect::<Vec<_>>();
    let Some((last, parents)) = segments.split_last() else {
        return Err(OverrideError::MalformedPath {
            path: path.to_owned(),
        });
    };
    if segments.iter().any(|s| s.is_empty()) {
        return Err(OverrideError::MalformedPath {
            path: path.to_owned(),
        });
    }

    let node = resolve(root, path, parents)?;
    let current = node
        .get_attribute(last)
        .ok_or_else(|| OverrideError::MissingAttribute {
            path: path.to_owned(),
        })?;
    let value = transform
        .apply(current)
        .map_err(|reason| OverrideError::TransformFailed {
            path: path.to_owned(),
            reason,
        })?;
    node.set_attribute(last, value)
        .map_err(|err| OverrideError::Rejected {
            path: path.to_owned(),
            reason: format!("{err:#}"),
        })
}

/// Apply every override in order. Failures are logged and collected, never propagated.
pub fn apply_all(root: &mut dyn Attributes, overrides: &[AttributeOverride]) -> SetupReport {
    let mut report = SetupReport::default();
    for item in overrides {
        match apply_override(root, item) {
            Ok(()) => {
                debug!(path = %item.path, transform = %item.transform, "override applied");
                report.applied.push(item.path.clone());
            }
            Err(err) => {
                warn!(path = %item.path, "override skipped: {err}");
                report.skipped.push((item.clone(), err));
            }
        }
    }
    report
}
