use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use metrics::counter;
use tracing::debug;

use super::{
    runtime::DiagramGenerations,
    service::{
        DiagramOutcome, DiagramPipeline, METRIC_DIAGRAM_STALE, active_render_config,
        render_service,
    },
    types::{DiagramNode, DiagramState, Document, RenderService, RenderTree},
};

/// A document bound to one diagram pipeline and its artifact cache.
///
/// [`render`](Self::render) is synchronous and never waits on a converter.
/// Diagrams not yet cached come back `Pending`; [`resolve`](Self::resolve)
/// converts them and applies only results whose ticket is still current.
pub struct MountedDocument {
    service: Arc<dyn RenderService>,
    pipeline: DiagramPipeline,
    generations: DiagramGenerations,
}

impl MountedDocument {
    pub fn new(service: Arc<dyn RenderService>, pipeline: DiagramPipeline) -> Self {
        Self {
            service,
            pipeline,
            generations: DiagramGenerations::new(),
        }
    }

    /// Shared render service with the configured diagram pipeline.
    pub fn with_pipeline(pipeline: DiagramPipeline) -> Self {
        Self::new(render_service(), pipeline)
    }

    pub fn pipeline(&self) -> &DiagramPipeline {
        &self.pipeline
    }

    pub fn generations(&self) -> &DiagramGenerations {
        &self.generations
    }

    pub fn render(&self, document: &Document) -> RenderTree {
        let tree = self.service.render(document);
        self.generations.truncate(tree.diagrams().len());

        tree.map_diagrams(|node| {
            let ticket = self
                .generations
                .observe(node.instance, node.content_hash.as_deref());
            let state = match (&node.state, node.content_hash.as_deref()) {
                (DiagramState::Pending, Some(hash)) => match self.pipeline.lookup(hash) {
                    Some(artifact) => DiagramState::Ready {
                        artifact: (*artifact).clone(),
                    },
                    None => DiagramState::Pending,
                },
                (state, _) => state.clone(),
            };

            DiagramNode {
                ticket: Some(ticket),
                state,
                ..node.clone()
            }
        })
    }

    pub async fn resolve(&self, tree: &RenderTree) -> RenderTree {
        let pending: Vec<&DiagramNode> = tree
            .diagrams()
            .into_iter()
            .filter(|node| node.state == DiagramState::Pending)
            .collect();
        if pending.is_empty() {
            return tree.clone();
        }

        let outcomes = join_all(pending.into_iter().map(|node| async move {
            (node, self.pipeline.render(&node.source).await)
        }))
        .await;

        let mut resolved = HashMap::new();
        for (node, outcome) in outcomes {
            let current = node
                .ticket
                .is_some_and(|ticket| self.generations.is_current(ticket));
            if !current {
                counter!(METRIC_DIAGRAM_STALE).increment(1);
                debug!(
                    target = "application::render::diagram",
                    op = "diagram::resolve",
                    result = "stale",
                    instance = node.instance,
                    "Discarding diagram result for a superseded render"
                );
                continue;
            }

            let state = match outcome {
                DiagramOutcome::Empty => DiagramState::Empty,
                DiagramOutcome::Ready(artifact) => DiagramState::Ready {
                    artifact: (*artifact).clone(),
                },
                DiagramOutcome::Unavailable => DiagramState::Unavailable,
            };
            resolved.insert(node.instance, state);
        }

        tree.map_diagrams(|node| match resolved.remove(&node.instance) {
            Some(state) => DiagramNode {
                state,
                ..node.clone()
            },
            None => node.clone(),
        })
    }

    /// Render and wait for every diagram.
    pub async fn render_resolved(&self, document: &Document) -> RenderTree {
        let tree = self.render(document);
        if !tree.has_pending_diagrams() {
            return tree;
        }
        self.resolve(&tree).await
    }
}

impl Default for MountedDocument {
    fn default() -> Self {
        Self::with_pipeline(active_render_config().diagram_pipeline())
    }
}
