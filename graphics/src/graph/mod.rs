//! Render graphs.
//!
//! A [`RenderGraph`] is a named set of nodes, each a render pass with a body
//! and the ids of the nodes it depends on. Graphs are sorted once, when they
//! are registered with the [`RenderGraphExecutor`], and executed in that
//! order every frame.
//!
//! # Example
//!
//! ```ignore
//! let graph = RenderGraph::new("main")
//!     .with_node(RenderGraphNode::new("shadow", shadow_pass, ShadowNode::default()))
//!     .with_node(
//!         RenderGraphNode::new("lighting", PassDescriptor::new().with_color(ColorAttachment::screen()), LightingNode)
//!             .with_dependency("shadow"),
//!     );
//! executor.register_graph(graph, None)?;
//! ```

mod executor;
mod pass;

pub use executor::RenderGraphExecutor;
pub use pass::{
    AttachmentView, ColorAttachment, DepthStencilAttachment, PassContext, PassDescriptor,
    RenderNode,
};

use std::collections::HashMap;
use std::fmt;

use crate::command::RenderPassEncoder;
use crate::error::{GraphicsError, GraphicsResult};

/// One render pass in a graph.
pub struct RenderGraphNode {
    id: String,
    dependencies: Vec<String>,
    pass: PassDescriptor,
    node: Box<dyn RenderNode>,
}

impl RenderGraphNode {
    pub fn new(id: impl Into<String>, pass: PassDescriptor, node: impl RenderNode + 'static) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            pass,
            node: Box::new(node),
        }
    }

    /// Node whose body is a closure.
    pub fn from_fn<F>(id: impl Into<String>, pass: PassDescriptor, body: F) -> Self
    where
        F: FnMut(&mut RenderPassEncoder<'_>, &PassContext<'_>) -> GraphicsResult<()>
            + Send
            + 'static,
    {
        Self::new(id, pass, body)
    }

    /// Run after `id`. Repeated ids are kept once.
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().fold(self, |node, id| node.with_dependency(id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn pass(&self) -> &PassDescriptor {
        &self.pass
    }
}

impl fmt::Debug for RenderGraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraphNode")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("pass", &self.pass)
            .finish_non_exhaustive()
    }
}

/// A named set of render passes with dependency edges.
#[derive(Debug)]
pub struct RenderGraph {
    id: String,
    nodes: Vec<RenderGraphNode>,
}

impl RenderGraph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: RenderGraphNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_node(&mut self, node: RenderGraphNode) {
        self.nodes.push(node);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nodes(&self) -> &[RenderGraphNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Topologically sort the nodes.
    ///
    /// Returns node indices such that every node comes after the nodes it
    /// depends on. Dependencies on ids that are not in the graph are ignored.
    pub fn sorted_indices(&self) -> GraphicsResult<Vec<usize>> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(GraphicsError::validation(format!(
                    "render graph '{}' has duplicate node id '{}'",
                    self.id, node.id
                )));
            }
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        // (node, index of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Visiting;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (i, next) = *top;
                let node = &self.nodes[i];
                let Some(dep) = node.dependencies.get(next) else {
                    marks[i] = Mark::Visited;
                    order.push(i);
                    stack.pop();
                    continue;
                };
                top.1 += 1;

                let Some(&j) = index.get(dep.as_str()) else {
                    log::debug!(
                        "RenderGraph '{}': node '{}' depends on unknown node '{dep}', ignored",
                        self.id,
                        node.id
                    );
                    continue;
                };
                match marks[j] {
                    Mark::Visited => {}
                    Mark::Visiting => {
                        return Err(GraphicsError::CyclicDependency {
                            graph: self.id.clone(),
                            node: self.nodes[j].id.clone(),
                        });
                    }
                    Mark::Unvisited => {
                        marks[j] = Mark::Visiting;
                        stack.push((j, 0));
                    }
                }
            }
        }
        Ok(order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> RenderGraphNode {
        RenderGraphNode::from_fn(id, PassDescriptor::new(), |_, _| Ok(()))
            .with_dependencies(deps.iter().copied())
    }

    fn order(graph: &RenderGraph) -> Vec<&str> {
        graph
            .sorted_indices()
            .unwrap()
            .into_iter()
            .map(|i| graph.nodes()[i].id())
            .collect()
    }

    #[test]
    fn test_sort_respects_dependencies() {
        let graph = RenderGraph::new("g")
            .with_node(node("A", &[]))
            .with_node(node("B", &["A"]))
            .with_node(node("C", &["A", "B"]));
        assert_eq!(order(&graph), ["A", "B", "C"]);
    }

    #[test]
    fn test_sort_reorders_declared_nodes() {
        let graph = RenderGraph::new("g")
            .with_node(node("post", &["lighting"]))
            .with_node(node("lighting", &["gbuffer", "shadow"]))
            .with_node(node("shadow", &[]))
            .with_node(node("gbuffer", &[]));
        assert_eq!(order(&graph), ["gbuffer", "shadow", "lighting", "post"]);
    }

    #[test]
    fn test_cycle_names_node() {
        let graph = RenderGraph::new("g")
            .with_node(node("A", &["B"]))
            .with_node(node("B", &["A"]));
        let err = graph.sorted_indices().unwrap_err();
        assert_eq!(
            err,
            GraphicsError::CyclicDependency {
                graph: "g".into(),
                node: "A".into()
            }
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = RenderGraph::new("g").with_node(node("A", &["A"]));
        assert!(matches!(
            graph.sorted_indices(),
            Err(GraphicsError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_ignored() {
        let graph = RenderGraph::new("g")
            .with_node(node("A", &["missing"]))
            .with_node(node("B", &["A"]));
        assert_eq!(order(&graph), ["A", "B"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let graph = RenderGraph::new("g")
            .with_node(node("A", &[]))
            .with_node(node("A", &[]));
        assert!(graph.sorted_indices().unwrap_err().is_validation());
    }

    #[test]
    fn test_deep_chain_declared_in_reverse() {
        const LEN: usize = 20_000;
        let mut graph = RenderGraph::new("deep");
        for i in (0..LEN).rev() {
            let mut n = node(&format!("n{i}"), &[]);
            if i > 0 {
                n = n.with_dependency(format!("n{}", i - 1));
            }
            graph.add_node(n);
        }

        let sorted = graph.sorted_indices().unwrap();
        assert_eq!(sorted.len(), LEN);
        assert_eq!(graph.nodes()[sorted[0]].id(), "n0");
        assert_eq!(graph.nodes()[sorted[LEN - 1]].id(), format!("n{}", LEN - 1));
    }

    #[test]
    fn test_long_cycle_detected() {
        let mut graph = RenderGraph::new("ring");
        for i in 0..5_000 {
            let next = format!("n{}", (i + 1) % 5_000);
            graph.add_node(node(&format!("n{i}"), &[]).with_dependency(next));
        }
        assert!(matches!(
            graph.sorted_indices(),
            Err(GraphicsError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_repeated_dependency_kept_once() {
        let n = node("B", &["A", "A"]);
        assert_eq!(n.dependencies(), ["A".to_string()]);
    }
}
