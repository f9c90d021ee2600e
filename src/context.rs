//! Reduce retrieved passages into a single [`ContextBlock`].

use crate::models::{ContextBlock, RetrievedDocument};

/// Used verbatim when retrieval found nothing.
pub const NO_CONTEXT: &str =
    "No specific context available. Responding based on general knowledge.";

/// Join passage contents with a blank line, keeping retrieval order.
pub fn assemble_context(docs: &[RetrievedDocument]) -> ContextBlock {
    if docs.is_empty() {
        return ContextBlock::new(NO_CONTEXT);
    }
    let joined = docs
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    ContextBlock::new(joined)
}
