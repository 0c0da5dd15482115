// src/graph/mod.rs

//! Dependency graph derivation for one job: construction from declared
//! inputs/requirements, shortcut-edge pruning, execution layering, and a
//! 2-D layout for visualization.

pub mod builder;
pub mod layout;
pub mod model;

pub use builder::{GraphEdge, GraphNode, JobGraph};
pub use layout::{GraphLayout, Point};
pub use model::{
    ColumnRef, Component, ComponentId, ComponentKind, FilterOutcome, PipelineJob, SourceResolver,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str, kind: ComponentKind) -> Component {
        Component {
            id: id.into(),
            name: id.to_string(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            outcomes: Vec::new(),
            requirement: None,
            output_streams: Vec::new(),
        }
    }

    fn virt(name: &str) -> ColumnRef {
        ColumnRef::Virtual {
            name: name.to_string(),
        }
    }

    /// A -> B, A -> C, B -> D, C -> D plus the redundant direct A -> D.
    fn diamond_with_shortcut() -> PipelineJob {
        let mut a = component("a", ComponentKind::Transform);
        a.outputs = vec!["va".into()];
        let mut b = component("b", ComponentKind::Transform);
        b.inputs = vec![virt("va")];
        b.outputs = vec!["vb".into()];
        let mut c = component("c", ComponentKind::Transform);
        c.inputs = vec![virt("va")];
        c.outputs = vec!["vc".into()];
        let mut d = component("d", ComponentKind::Analyzer);
        d.inputs = vec![virt("vb"), virt("vc"), virt("va")];
        PipelineJob {
            name: "diamond".into(),
            components: vec![a, b, c, d],
        }
    }

    #[test]
    fn shortcut_edge_is_pruned_and_pruning_is_idempotent() {
        let mut graph = JobGraph::build(&diamond_with_shortcut()).unwrap();
        let a = GraphNode::Component("a".into());
        let b = GraphNode::Component("b".into());
        let c = GraphNode::Component("c".into());
        let d = GraphNode::Component("d".into());
        assert!(graph.edge_between(&a, &d).is_some());

        let removed = graph.prune_shortcut_edges();
        assert_eq!(removed, 1);
        assert!(graph.edge_between(&a, &d).is_none());
        assert!(graph.edge_between(&a, &b).is_some());
        assert!(graph.edge_between(&a, &c).is_some());
        assert!(graph.edge_between(&b, &d).is_some());
        assert!(graph.edge_between(&c, &d).is_some());

        assert_eq!(graph.prune_shortcut_edges(), 0);
    }

    #[test]
    fn requirement_edges_survive_pruning() {
        let mut a = component("a", ComponentKind::Transform);
        a.outputs = vec!["va".into()];
        let mut f = component("f", ComponentKind::Filter);
        f.inputs = vec![virt("va")];
        f.outcomes = vec!["VALID".into()];
        let mut d = component("d", ComponentKind::Analyzer);
        d.inputs = vec![virt("va")];
        d.requirement = Some(FilterOutcome {
            filter: "f".into(),
            category: "VALID".into(),
        });
        let job = PipelineJob {
            name: "gated".into(),
            components: vec![a, f, d],
        };

        let mut graph = JobGraph::build(&job).unwrap();
        let a = GraphNode::Component("a".into());
        let f = GraphNode::Component("f".into());
        let d = GraphNode::Component("d".into());

        graph.prune_shortcut_edges();

        // a->d is a plain shortcut of a->f->d; the gated f->d edge stays.
        assert!(graph.edge_between(&a, &d).is_none());
        let gate = graph.edge_between(&f, &d).unwrap();
        assert!(gate.requirement.is_some());
    }

    #[test]
    fn sole_incoming_edge_is_never_pruned() {
        let mut a = component("a", ComponentKind::Transform);
        a.outputs = vec!["va".into()];
        let mut b = component("b", ComponentKind::Analyzer);
        b.inputs = vec![virt("va")];
        let job = PipelineJob {
            name: "pair".into(),
            components: vec![a, b],
        };

        let mut graph = JobGraph::build(&job).unwrap();
        assert_eq!(graph.prune_shortcut_edges(), 0);
        assert!(graph
            .edge_between(&GraphNode::Component("a".into()), &GraphNode::Component("b".into()))
            .is_some());
    }

    #[test]
    fn self_reference_terminates_without_recursing() {
        let mut a = component("a", ComponentKind::Transform);
        a.outputs = vec!["va".into()];
        a.inputs = vec![virt("va")];
        let job = PipelineJob {
            name: "selfref".into(),
            components: vec![a],
        };

        let graph = JobGraph::build(&job).unwrap();
        let a = GraphNode::Component("a".into());
        assert!(graph.edge_between(&a, &a).is_some());
    }

    #[test]
    fn multi_stream_component_feeds_its_stream_tables() {
        let mut splitter = component("split", ComponentKind::Transform);
        splitter.output_streams = vec!["matches".into(), "rest".into()];
        let job = PipelineJob {
            name: "streams".into(),
            components: vec![splitter],
        };

        let graph = JobGraph::build(&job).unwrap();
        let split = GraphNode::Component("split".into());
        assert!(graph.edge_between(&split, &GraphNode::Table("matches".into())).is_some());
        assert!(graph.edge_between(&split, &GraphNode::Table("rest".into())).is_some());
    }

    #[test]
    fn unresolved_virtual_column_is_an_error() {
        let mut b = component("b", ComponentKind::Analyzer);
        b.inputs = vec![virt("nowhere")];
        let job = PipelineJob {
            name: "dangling".into(),
            components: vec![b],
        };
        assert!(JobGraph::build(&job).is_err());
    }

    #[test]
    fn execution_levels_follow_dependencies() {
        let graph = JobGraph::build(&diamond_with_shortcut()).unwrap();
        let levels = graph.execution_levels().unwrap();
        assert_eq!(levels[0], vec![ComponentId::from("a")]);
        assert_eq!(levels[1], vec![ComponentId::from("b"), ComponentId::from("c")]);
        assert_eq!(levels[2], vec![ComponentId::from("d")]);
    }
}
