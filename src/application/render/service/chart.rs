use serde_json::{Value, json};
use tracing::debug;

use crate::application::render::types::RenderNode;

/// Title shown by the fallback chart when a block does not parse.
pub const CHART_FALLBACK_TITLE: &str = "Chart error - Wrong format.";

/// Parse a chart block into a chart option. Malformed input yields a chart
/// whose title reports the problem, so the result always renders.
pub(crate) fn produce(raw: &str) -> RenderNode {
    let content = raw.strip_suffix('\n').unwrap_or(raw);

    let option = match serde_json::from_str::<Value>(content) {
        Ok(option) => option,
        Err(err) => {
            debug!(
                target = "application::render::chart",
                error = %err,
                line = err.line(),
                column = err.column(),
                "Chart specification failed to parse; using fallback"
            );
            fallback_option()
        }
    };

    RenderNode::ChartSpec { option }
}

fn fallback_option() -> Value {
    json!({ "title": { "text": CHART_FALLBACK_TITLE } })
}
