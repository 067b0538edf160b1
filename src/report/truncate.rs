//! Word-aware message truncation.

/// Appended to messages that were cut.
const ELLIPSIS: &str = "...";

/// Shortens messages to a maximum number of characters, preferring to cut at
/// whitespace.
///
/// # Example
///
/// ```
/// use phpunit_mate::report::MessageTruncator;
///
/// let truncator = MessageTruncator::new();
/// assert_eq!(truncator.truncate("Failed asserting that false is true.", 20), "Failed asserting...");
/// assert_eq!(truncator.truncate("  short  ", 20), "short");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageTruncator;

impl MessageTruncator {
    pub fn new() -> Self {
        Self
    }

    /// Returns `text` trimmed and, if longer than `max` characters, cut to at
    /// most `max` characters including a trailing `...`.
    pub fn truncate(&self, text: &str, max: usize) -> String {
        let text = text.trim();
        if text.chars().count() <= max {
            return text.to_string();
        }

        let ellipsis_len = ELLIPSIS.chars().count();
        if max <= ellipsis_len {
            return text.chars().take(max).collect();
        }

        let budget = max - ellipsis_len;
        let byte_end = text
            .char_indices()
            .nth(budget)
            .map_or(text.len(), |(idx, _)| idx);
        let hard_cut = &text[..byte_end];

        // Back up to the last whitespace, unless that throws away more than
        // half of the budget.
        let cut = match hard_cut.rfind(char::is_whitespace) {
            Some(idx) if hard_cut[..idx].chars().count() >= budget / 2 => &hard_cut[..idx],
            _ => hard_cut,
        };

        format!("{}{}", cut.trim_end(), ELLIPSIS)
    }
}
