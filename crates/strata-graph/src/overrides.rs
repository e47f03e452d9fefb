//! Named parameter values supplied to a graph pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameter values keyed by exposed parameter name.
///
/// A graph carries its own defaults; a function node carries a separate set
/// that replaces them when it invokes the graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(BTreeMap<String, f32>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.get(name).copied()
    }

    /// Sets a value, returning the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: f32) -> Option<f32> {
        self.0.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<f32> {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
