// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::JobFile;
use crate::graph::{ColumnRef, PipelineJob};

/// Run basic semantic validation against a loaded job file.
///
/// This checks:
/// - there is at least one component
/// - component ids are unique
/// - every virtual-column input has a producer
/// - every requirement references a known filter and one of its outcomes
/// - the component graph has no cycles (self-references excluded; those
///   are handled as a terminal case by the graph builder)
/// - pool/queue sizes are sane
pub fn validate_job_file(file: &JobFile) -> Result<()> {
    validate_engine(file)?;
    ensure_has_components(&file.job)?;
    ensure_unique_ids(&file.job)?;
    validate_references(&file.job)?;
    validate_dag(&file.job)?;
    Ok(())
}

fn validate_engine(file: &JobFile) -> Result<()> {
    if file.engine.pool_size == 0 {
        return Err(anyhow!("[engine].pool_size must be >= 1 (got 0)"));
    }
    if file.engine.queue_capacity == 0 {
        return Err(anyhow!("[engine].queue_capacity must be >= 1 (got 0)"));
    }
    Ok(())
}

fn ensure_has_components(job: &PipelineJob) -> Result<()> {
    if job.components.is_empty() {
        return Err(anyhow!(
            "job '{}' must contain at least one [[job.components]] entry",
            job.name
        ));
    }
    Ok(())
}

fn ensure_unique_ids(job: &PipelineJob) -> Result<()> {
    let mut seen = HashSet::new();
    for component in &job.components {
        if !seen.insert(&component.id) {
            return Err(anyhow!("duplicate component id '{}'", component.id));
        }
    }
    Ok(())
}

fn validate_references(job: &PipelineJob) -> Result<()> {
    let mut producers: HashMap<&str, &str> = HashMap::new();
    for component in &job.components {
        for output in &component.outputs {
            producers.insert(output.as_str(), component.id.0.as_str());
        }
    }

    for component in &job.components {
        for input in &component.inputs {
            if let ColumnRef::Virtual { name } = input {
                if !producers.contains_key(name.as_str()) {
                    return Err(anyhow!(
                        "component '{}' consumes virtual column '{}' which no component produces",
                        component.id,
                        name
                    ));
                }
            }
        }
        if let Some(requirement) = &component.requirement {
            let Some(filter) = job.component(&requirement.filter) else {
                return Err(anyhow!(
                    "component '{}' requires outcome of unknown filter '{}'",
                    component.id,
                    requirement.filter
                ));
            };
            if !filter.has_filter_outcomes() {
                return Err(anyhow!(
                    "component '{}' requires an outcome of '{}', which is not a filter with outcomes",
                    component.id,
                    requirement.filter
                ));
            }
            if !filter.outcomes.contains(&requirement.category) {
                return Err(anyhow!(
                    "component '{}' requires unknown outcome '{}' of filter '{}'",
                    component.id,
                    requirement.category,
                    requirement.filter
                ));
            }
        }
    }
    Ok(())
}

fn validate_dag(job: &PipelineJob) -> Result<()> {
    // Edge direction: producer -> consumer. Self-references are skipped;
    // the builder treats them as a terminal case, not a cycle.
    let mut producers: HashMap<&str, &str> = HashMap::new();
    for component in &job.components {
        for output in &component.outputs {
            producers.insert(output.as_str(), component.id.0.as_str());
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for component in &job.components {
        graph.add_node(component.id.0.as_str());
    }
    for component in &job.components {
        let consumer = component.id.0.as_str();
        for input in &component.inputs {
            if let ColumnRef::Virtual { name } = input {
                if let Some(&producer) = producers.get(name.as_str()) {
                    if producer != consumer {
                        graph.add_edge(producer, consumer, ());
                    }
                }
            }
        }
        if let Some(requirement) = &component.requirement {
            let filter = requirement.filter.0.as_str();
            if filter != consumer {
                graph.add_edge(filter, consumer, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(anyhow!(
            "cycle detected in component graph involving '{}'",
            cycle.node_id()
        )),
    }
}
