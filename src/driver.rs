//! Greedy merge driver: repeatedly joins the highest-ranked
//! edge, rewires the graph and registry, and checkpoints the tile table to
//! disk after every merge. A plain loop polling a cancellation flag between
//! units of work, never inside one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::graph::TileGraph;
use crate::parcel::ParcelTable;
use crate::registry::JoinRegistry;

/// Shared flag a signal handler can flip to ask the driver to stop after
/// its current iteration. Checked only between iterations -- never
/// mid-merge.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No edge remained to join -- the tile graph is fully disconnected.
    NoEdgesRemain,
    /// Reached `desired_ending_tile_count`.
    ReachedDesiredTileCount,
    /// Stopped by [`CancelToken::cancel`] between iterations.
    Cancelled,
}

pub struct MergeOutcome {
    pub iterations_run: usize,
    pub final_tile_count: usize,
    pub stop_reason: StopReason,
}

pub struct MergeDriver {
    graph: TileGraph,
    registry: JoinRegistry,
    parcels: ParcelTable,
    min_sales_for_ols: usize,
    desired_ending_tile_count: usize,
    output_directory: PathBuf,
    cancel: CancelToken,
}

impl MergeDriver {
    pub fn new(
        graph: TileGraph,
        parcels: ParcelTable,
        min_sales_for_ols: usize,
        desired_ending_tile_count: usize,
        output_directory: PathBuf,
        cancel: CancelToken,
    ) -> Self {
        let registry = JoinRegistry::from_graph(&graph);
        Self {
            graph,
            registry,
            parcels,
            min_sales_for_ols,
            desired_ending_tile_count,
            output_directory,
            cancel,
        }
    }

    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    /// Runs the greedy merge loop to completion, writing
    /// `intermediate_tiles_<n>.parquet` after every merge. `n` starts at 1
    /// for the first merge; the starting tile set, before any merge, is
    /// never written.
    pub fn run(&mut self) -> Result<MergeOutcome, crate::Error> {
        let mut iterations_run = 0usize;

        let stop_reason = loop {
            if self.graph.tile_count() <= self.desired_ending_tile_count {
                break StopReason::ReachedDesiredTileCount;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let best_edge = self
                .registry
                .best(&self.graph, &self.parcels, self.min_sales_for_ols)?;
            let Some(edge) = best_edge else {
                break StopReason::NoEdgesRemain;
            };

            let r_squared = self
                .registry
                .r_squared_of(edge)
                .expect("best() only returns edges with a cached entry");
            let (a, b) = edge.endpoints();
            let (new_key, neighbors) = self.graph.merge(a, b, r_squared, &mut self.parcels)?;
            self.registry.on_merge(new_key, (a, b), &neighbors);

            iterations_run += 1;
            info!(
                iteration = iterations_run,
                tile_count = self.graph.tile_count(),
                new_tile = new_key.0,
                r_squared,
                "merged tiles"
            );

            crate::io::parquet::write_intermediate_tiles(
                &self.graph,
                &self.output_directory,
                iterations_run,
            )?;
        };

        info!(?stop_reason, iterations_run, "merge driver stopped");

        Ok(MergeOutcome {
            iterations_run,
            final_tile_count: self.graph.tile_count(),
            stop_reason,
        })
    }
}
