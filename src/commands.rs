//! Conversation-ending commands recognized before the pipeline runs.

pub const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

pub const FAREWELL: &str = "Goodbye! Take care. 💙";

/// Trimmed, case-insensitive exact match. "bye now" is not an exit.
pub fn is_exit_command(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    EXIT_COMMANDS.contains(&normalized.as_str())
}
