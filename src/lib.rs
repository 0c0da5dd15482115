// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod scheduler;
pub mod storage;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::JobFile;
use crate::engine::JobExecutor;
use crate::graph::{GraphLayout, JobGraph};
use crate::scheduler::ClosureTask;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job file loading and validation
/// - graph construction, pruning and layout
/// - storage provider + task runner
/// - job execution behind the completion gate
pub fn run(args: CliArgs) -> Result<()> {
    let job_path = PathBuf::from(&args.job);
    let file = load_and_validate(&job_path)?;

    if args.dry_run {
        print_dry_run(&file)?;
        return Ok(());
    }

    let runner = file.engine.task_runner();
    let storage = Arc::new(file.engine.storage_provider()?);
    let executor = JobExecutor::new(runner.clone(), Arc::clone(&storage));

    // The binary has no analytic payloads of its own; each component runs
    // as a unit that reports itself, which exercises the full scheduling
    // and storage path for the job.
    let result = executor.execute(&file.job, |component, _ctx| {
        let name = component.name.clone();
        let id = component.id.clone();
        Arc::new(ClosureTask::new(name, move || {
            info!(component = %id, "component executed");
            Ok(())
        }))
    })?;

    runner.shutdown();
    storage.close()?;

    if result.is_success() {
        info!(job = %file.job.name, "job completed successfully");
        Ok(())
    } else {
        for error in result.errors() {
            tracing::error!(error = %error, "job task failed");
        }
        anyhow::bail!("job '{}' finished with {} error(s)", file.job.name, result.errors().len())
    }
}

/// Print the pruned dependency graph, execution levels and layout without
/// executing anything.
fn print_dry_run(file: &JobFile) -> Result<()> {
    let mut graph = JobGraph::build(&file.job)?;
    let removed = graph.prune_shortcut_edges();
    let levels = graph.execution_levels()?;
    let layout = GraphLayout::compute(&graph, &HashMap::new());

    println!("job: {}", file.job.name);
    println!(
        "graph: {} nodes, {} edges ({} shortcut edge(s) pruned)",
        graph.node_count(),
        graph.edge_count(),
        removed
    );

    println!("edges:");
    for (from, to, edge) in graph.edges() {
        match &edge.requirement {
            Some(req) => println!("  {from} -> {to} [requires {req}]"),
            None => println!("  {from} -> {to}"),
        }
    }

    println!("execution levels:");
    for (i, level) in levels.iter().enumerate() {
        let ids: Vec<String> = level.iter().map(|id| id.to_string()).collect();
        println!("  {}: {}", i, ids.join(", "));
    }

    println!("layout:");
    let mut positions: Vec<(String, i32, i32)> = layout
        .positions()
        .map(|(node, p)| (node.to_string(), p.x, p.y))
        .collect();
    positions.sort();
    for (node, x, y) in positions {
        println!("  {node} at ({x}, {y})");
    }

    Ok(())
}
