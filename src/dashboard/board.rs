use crate::render::{ChartHandle, ChartMount, ChartSurface};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tracks which chart instance lives on which display node, so every
/// render pass releases the old instance before creating a new one.
pub struct ChartBoard<S: ChartSurface> {
    surface: S,
    live: BTreeMap<String, ChartHandle>,
}

impl<S: ChartSurface> ChartBoard<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            live: BTreeMap::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn handle_for(&self, node: &str) -> Option<ChartHandle> {
        self.live.get(node).copied()
    }

    /// Replace the board's contents with `charts`. Nodes not in the new pass
    /// are disposed too.
    pub fn replace_all(&mut self, charts: Vec<ChartMount>) -> usize {
        let keep: BTreeSet<&str> = charts.iter().map(|c| c.node.as_str()).collect();
        let orphans: Vec<String> = self
            .live
            .keys()
            .filter(|node| !keep.contains(node.as_str()))
            .cloned()
            .collect();
        for node in orphans {
            self.release(&node);
        }

        let n = charts.len();
        for chart in charts {
            self.mount(chart);
        }
        n
    }

    /// Mount one chart, disposing whatever held its node before.
    pub fn mount(&mut self, chart: ChartMount) -> ChartHandle {
        let node = chart.node.clone();
        self.release(&node);
        let handle = self.surface.mount(chart);
        self.live.insert(node, handle);
        handle
    }

    /// Dispose every live chart.
    pub fn clear(&mut self) {
        let nodes: Vec<String> = self.live.keys().cloned().collect();
        for node in nodes {
            self.release(&node);
        }
    }

    fn release(&mut self, node: &str) {
        if let Some(handle) = self.live.remove(node) {
            debug!("releasing {:?} on {}", handle, node);
            self.surface.dispose(handle);
        }
    }
}
