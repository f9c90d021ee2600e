//! Assemble [`ModelRequest`]s for the retrieval-augmented pipeline.
//!
//! The context is placed twice: interpolated into the system preamble and
//! repeated as a closing system message right after the user's turn (see
//! [`ModelRequest::to_messages`]). Sparse retrieval results stay close to the
//! end of a long conversation that way.

use crate::models::{ContextBlock, ConversationTurn, ModelRequest};

/// Persona instructions. `{context}` is replaced by the assembled context.
pub const SYSTEM_TEMPLATE: &str = "You are a compassionate and knowledgeable AI therapist. \
Your role is to provide emotional support, practical guidance, and mental health insights \
based on the retrieved context. Respond with empathy and validation while offering helpful solutions. \
Your responses should be concise (3-5 sentences) and action-oriented.\n\n\
Balance these approaches in your responses:\n\
1. Brief validation of feelings (1 sentence)\n\
2. One relevant insight or perspective shift\n\
3. One practical technique or exercise when appropriate (breathing exercises, grounding techniques, etc.)\n\n\
Use the following retrieved context to answer the question. \
If needed, ask one focused follow-up question, but prioritize providing immediate value. \
Your responses should be warm yet direct, creating a supportive space without unnecessary length.\n\n\
{context}";

pub fn render_system(context: &ContextBlock) -> String {
    SYSTEM_TEMPLATE.replace("{context}", context.as_str())
}

pub fn build_request(
    history: &[ConversationTurn],
    user_input: &str,
    context: ContextBlock,
) -> ModelRequest {
    ModelRequest {
        system_instructions: render_system(&context),
        history: history.to_vec(),
        user_input: user_input.to_string(),
        context: Some(context),
    }
}
