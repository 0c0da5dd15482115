// src/graph/model.rs

//! The declarative job model as the graph builder sees it.
//!
//! Components are opaque except for their declared edges: input columns,
//! produced columns/outcomes, and an optional requirement gate. The
//! builder never inspects a component's configuration.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Stable identity of a component within one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub String);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        ComponentId(s.to_string())
    }
}

/// Closed set of component kinds that participate in dependency
/// resolution. Capability queries on [`Component`] replace any runtime
/// type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Produces virtual columns from its inputs.
    Transform,
    /// Produces filter outcomes (categories) that gate downstream work.
    Filter,
    /// Terminal consumer producing results (annotations, aggregates).
    Analyzer,
}

/// A reference to a column a component consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    /// A column of a physical source table.
    Physical { table: String, column: String },
    /// A virtual column produced by another component.
    Virtual { name: String },
}

/// A filter's outcome category, usable as a requirement gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct FilterOutcome {
    pub filter: ComponentId,
    pub category: String,
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.filter, self.category)
    }
}

/// One processing component: the unit the dependency graph is built over.
#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub kind: ComponentKind,
    /// Columns this component consumes.
    #[serde(default)]
    pub inputs: Vec<ColumnRef>,
    /// Virtual columns this component produces.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Outcome categories this component produces (filters only).
    #[serde(default)]
    pub outcomes: Vec<String>,
    /// Optional gate: process rows only under this filter outcome.
    #[serde(default)]
    pub requirement: Option<FilterOutcome>,
    /// Named output data streams, for multi-stream components.
    #[serde(default)]
    pub output_streams: Vec<String>,
}

impl Component {
    pub fn has_requirement(&self) -> bool {
        self.requirement.is_some()
    }

    pub fn has_filter_outcomes(&self) -> bool {
        matches!(self.kind, ComponentKind::Filter) && !self.outcomes.is_empty()
    }

    pub fn is_multi_stream(&self) -> bool {
        !self.output_streams.is_empty()
    }
}

/// An enumerable set of components making up one job.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineJob {
    pub name: String,
    pub components: Vec<Component>,
}

impl PipelineJob {
    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| &c.id == id)
    }
}

/// Resolves "who produces this input" questions against one job.
pub struct SourceResolver<'a> {
    by_output: HashMap<&'a str, &'a Component>,
    by_id: HashMap<&'a ComponentId, &'a Component>,
}

impl<'a> SourceResolver<'a> {
    pub fn new(job: &'a PipelineJob) -> Self {
        let mut by_output = HashMap::new();
        let mut by_id = HashMap::new();
        for component in &job.components {
            by_id.insert(&component.id, component);
            for output in &component.outputs {
                by_output.insert(output.as_str(), component);
            }
        }
        Self { by_output, by_id }
    }

    /// The component producing a virtual column, if any.
    pub fn producer_of(&self, virtual_column: &str) -> Option<&'a Component> {
        self.by_output.get(virtual_column).copied()
    }

    pub fn component(&self, id: &ComponentId) -> Option<&'a Component> {
        self.by_id.get(id).copied()
    }
}
