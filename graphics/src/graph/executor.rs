//! Registration and execution of render graphs.

use crate::command::CommandEncoder;
use crate::error::{GraphicsError, GraphicsResult};
use crate::scheduler::FrameTime;
use crate::surface::PresentationSurface;
use crate::types::PluginId;

use super::{PassContext, RenderGraph};

struct RegisteredGraph {
    graph: RenderGraph,
    order: Vec<usize>,
    owner: Option<PluginId>,
}

/// Holds sorted render graphs and runs them into a [`CommandEncoder`].
///
/// Graphs keep the position of their first registration; replacing a graph
/// does not move it to the end.
#[derive(Default)]
pub struct RenderGraphExecutor {
    graphs: Vec<RegisteredGraph>,
    passes_executed: u64,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort `graph` and store it under its id.
    ///
    /// Fails on a dependency cycle or duplicate node ids, in which case any
    /// graph already registered under the same id is kept unchanged.
    pub fn register_graph(
        &mut self,
        graph: RenderGraph,
        owner: Option<PluginId>,
    ) -> GraphicsResult<()> {
        let order = graph.sorted_indices()?;
        log::trace!(
            "RenderGraphExecutor: graph '{}' sorted {} node(s)",
            graph.id,
            order.len()
        );

        let entry = RegisteredGraph {
            graph,
            order,
            owner,
        };
        match self.position(&entry.graph.id) {
            Some(i) => {
                log::info!("RenderGraphExecutor: replacing graph '{}'", entry.graph.id);
                self.graphs[i] = entry;
            }
            None => {
                log::info!("RenderGraphExecutor: registered graph '{}'", entry.graph.id);
                self.graphs.push(entry);
            }
        }
        Ok(())
    }

    /// Remove a graph. Returns false if no graph had that id.
    pub fn unregister_graph(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(i) => {
                self.graphs.remove(i);
                log::debug!("RenderGraphExecutor: unregistered graph '{id}'");
                true
            }
            None => false,
        }
    }

    /// Remove every graph registered on behalf of `plugin`.
    pub fn unregister_plugin_graphs(&mut self, plugin: &PluginId) -> usize {
        let before = self.graphs.len();
        self.graphs.retain(|g| g.owner.as_ref() != Some(plugin));
        let removed = before - self.graphs.len();
        if removed > 0 {
            log::debug!("RenderGraphExecutor: removed {removed} graph(s) of '{plugin}'");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Registered graph ids in execution order.
    pub fn graph_ids(&self) -> Vec<&str> {
        self.graphs.iter().map(|g| g.graph.id.as_str()).collect()
    }

    /// The plugin a graph was registered for.
    pub fn owner(&self, id: &str) -> Option<&PluginId> {
        self.position(id)
            .and_then(|i| self.graphs[i].owner.as_ref())
    }

    /// Cached node order of a graph.
    pub fn execution_order(&self, id: &str) -> Option<Vec<&str>> {
        let entry = &self.graphs[self.position(id)?];
        Some(
            entry
                .order
                .iter()
                .map(|&i| entry.graph.nodes[i].id.as_str())
                .collect(),
        )
    }

    /// Total render passes run by this executor.
    pub fn passes_executed(&self) -> u64 {
        self.passes_executed
    }

    /// Run one graph. Returns the number of passes recorded.
    ///
    /// Every node gets its own render pass, which is ended even when the node
    /// fails or panics. The first failing node stops the graph.
    pub fn execute(
        &mut self,
        id: &str,
        encoder: &mut CommandEncoder,
        surface: Option<&mut (dyn PresentationSurface + '_)>,
        time: FrameTime,
    ) -> GraphicsResult<usize> {
        let Some(i) = self.position(id) else {
            return Err(GraphicsError::validation(format!(
                "no render graph registered as '{id}'"
            )));
        };
        self.execute_at(i, encoder, surface, time)
    }

    /// Run every graph in registration order.
    pub fn execute_all(
        &mut self,
        encoder: &mut CommandEncoder,
        mut surface: Option<&mut (dyn PresentationSurface + '_)>,
        time: FrameTime,
    ) -> GraphicsResult<usize> {
        let mut passes = 0;
        for i in 0..self.graphs.len() {
            passes += self.execute_at(i, encoder, surface.as_deref_mut(), time)?;
        }
        Ok(passes)
    }

    fn execute_at(
        &mut self,
        index: usize,
        encoder: &mut CommandEncoder,
        mut surface: Option<&mut (dyn PresentationSurface + '_)>,
        time: FrameTime,
    ) -> GraphicsResult<usize> {
        let entry = &mut self.graphs[index];
        let graph = &mut entry.graph;
        let mut passes = 0;

        for &i in &entry.order {
            let node = &mut graph.nodes[i];
            let (descriptor, target_size) = node.pass.resolve(surface.as_deref_mut())?;
            let ctx = PassContext {
                graph_id: &graph.id,
                node_id: &node.id,
                time,
                target_size,
            };

            log::trace!(
                "RenderGraphExecutor: executing pass '{}' of graph '{}'",
                node.id,
                graph.id
            );
            let mut pass = encoder.begin_render_pass(&descriptor)?;
            let result = node.node.execute(&mut pass, &ctx);
            pass.end();
            result?;
            passes += 1;
        }

        self.passes_executed += passes as u64;
        Ok(passes)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.graphs.iter().position(|g| g.graph.id == id)
    }
}

impl std::fmt::Debug for RenderGraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraphExecutor")
            .field("graphs", &self.graph_ids())
            .field("passes_executed", &self.passes_executed)
            .finish()
    }
}
