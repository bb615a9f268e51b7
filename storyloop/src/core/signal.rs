//! Completion-marker classification of assistant replies.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Outcome;

pub const ALL_DONE_MARKER: &str = "<complete>ALL_DONE</complete>";
pub const STORY_DONE_MARKER: &str = "<complete>STORY_DONE</complete>";

static BLOCKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<complete>BLOCKED:(.*?)</complete>").expect("blocked marker regex is valid")
});

/// Classify a reply by the first matching marker.
///
/// Precedence is fixed: `ALL_DONE`, then `STORY_DONE`, then `BLOCKED:`. Markers
/// may appear anywhere in the reply. The blocked reason is trimmed of
/// surrounding whitespace and may span lines.
pub fn classify(reply: &str) -> Outcome {
    if reply.contains(ALL_DONE_MARKER) {
        return Outcome::AllDone;
    }
    if reply.contains(STORY_DONE_MARKER) {
        return Outcome::StoryDone;
    }
    if let Some(caps) = BLOCKED_RE.captures(reply) {
        let reason = caps.get(1).map_or("", |m| m.as_str());
        return Outcome::Blocked(reason.trim().to_string());
    }
    Outcome::NoSignal
}
