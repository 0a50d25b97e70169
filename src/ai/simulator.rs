//! Deterministic, network-free stand-in for the completion provider.

use crate::ai::turn::{Role, Turn};

/// Prefix carried by every simulated response.
pub const SIMULATED_PREFIX: &str = "[Simulated]";

/// Echo the most recent user turn.
#[must_use]
pub fn simulate_reply(turns: &[Turn]) -> String {
    let last_user = turns
        .iter()
        .rev()
        .find(|turn| turn.role() == Role::User)
        .map_or("", Turn::content);
    format!("{SIMULATED_PREFIX} Response to: {last_user}")
}

/// Count user and assistant turns.
#[must_use]
pub fn simulate_summary(turns: &[Turn]) -> String {
    let user = count_role(turns, Role::User);
    let assistant = count_role(turns, Role::Assistant);
    format!("{SIMULATED_PREFIX} Summary: {user} user messages, {assistant} AI messages.")
}

/// Describe a cross-conversation query without answering it.
#[must_use]
pub fn simulate_query(summary_count: usize, query: &str) -> String {
    format!("{SIMULATED_PREFIX} With context of {summary_count} summaries, query was: {query}")
}

fn count_role(turns: &[Turn], role: Role) -> usize {
    turns.iter().filter(|turn| turn.role() == role).count()
}
