//! Output rendering for streamed chat turns.
//!
//! This module provides the [`Renderer`] trait the turn driver writes to and a
//! plain-text implementation for terminals.

use std::io::{self, Stdout, Write};

use crate::types::{RELATED_MARKER, TokenUsage, parse_topics, split_related};

/// ANSI escape code for dim text (used for notices).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for related topics).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (usage between the warning thresholds).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (usage below the warning threshold).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (errors, usage near the limit).
const ANSI_RED: &str = "\x1b[31m";

/// Usage percentage at which the meter turns yellow.
pub const USAGE_WARNING_PERCENT: f64 = 70.0;

/// Usage percentage at which the meter turns red.
pub const USAGE_CRITICAL_PERCENT: f64 = 90.0;

const USAGE_BAR_WIDTH: usize = 20;

/// Trait for rendering a streamed turn.
///
/// Text arrives in fragments exactly as the backend streams them; a renderer
/// must not assume fragments align with words, lines or the related-topics
/// marker.
pub trait Renderer: Send {
    /// Called before the first fragment of a response.
    fn start_response(&mut self) {}

    /// Print a chunk of response text.
    fn print_text(&mut self, text: &str);

    /// Called once the response ends, whether it completed or not.
    fn finish_response(&mut self);

    /// Print a transient failure notice.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the user cancels a response.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
///
/// The related-topics section is held back while streaming and printed as a
/// list when the response finishes.  Output that might be the start of the
/// marker is buffered until the next fragment settles it.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    line_start: bool,
    /// Streamed text that could still turn out to begin the marker.
    pending: String,
    /// Text after the marker, once it has been seen.
    related: Option<String>,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            line_start: true,
            pending: String::new(),
            related: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints a stored message, listing any related topics it carries
    /// after the body instead of the raw marker.
    pub fn print_message(&mut self, speaker: &str, content: &str) {
        let (body, topics) = split_related(content);
        self.ensure_line_start();
        self.write(&format!("{speaker}: {}\n", body.trim_end()));
        self.print_topics(&topics);
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn styled(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn ensure_line_start(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    /// Length of the longest suffix of `pending` that is a proper prefix of
    /// the marker.
    fn marker_prefix_len(&self) -> usize {
        let start = self
            .pending
            .len()
            .saturating_sub(RELATED_MARKER.len() - 1);
        (start..self.pending.len())
            .find(|&i| {
                self.pending.is_char_boundary(i) && RELATED_MARKER.starts_with(&self.pending[i..])
            })
            .map(|i| self.pending.len() - i)
            .unwrap_or(0)
    }

    fn print_related(&mut self, related: &str) {
        self.print_topics(&parse_topics(related));
    }

    fn print_topics(&mut self, topics: &[String]) {
        if topics.is_empty() {
            return;
        }
        self.ensure_line_start();
        let heading = self.styled(ANSI_CYAN, "Related topics:");
        self.write(&format!("\n{heading}\n"));
        for topic in topics {
            self.write(&format!("  - {topic}\n"));
        }
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_response(&mut self) {
        self.pending.clear();
        self.related = None;
    }

    fn print_text(&mut self, text: &str) {
        if let Some(related) = self.related.as_mut() {
            related.push_str(text);
            return;
        }
        self.pending.push_str(text);
        if let Some(idx) = self.pending.find(RELATED_MARKER) {
            let visible = self.pending[..idx].to_string();
            self.related = Some(self.pending[idx + RELATED_MARKER.len()..].to_string());
            self.pending.clear();
            self.write(&visible);
            return;
        }
        let keep = self.marker_prefix_len();
        let visible: String = self.pending.drain(..self.pending.len() - keep).collect();
        self.write(&visible);
    }

    fn finish_response(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.write(&pending);
        if let Some(related) = self.related.take() {
            self.print_related(&related);
        }
        self.ensure_line_start();
    }

    fn print_error(&mut self, error: &str) {
        self.ensure_line_start();
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write(&format!("{line}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_line_start();
        self.write(&format!("{info}\n"));
    }

    fn print_interrupted(&mut self) {
        self.ensure_line_start();
        let line = self.styled(ANSI_DIM, "[interrupted]");
        self.write(&format!("{line}\n"));
    }
}

/// One-line usage meter, e.g.
/// `[####----------------] 4000 / 20000 tokens (20.0%), 16000 remaining`.
///
/// Colored green, yellow at [`USAGE_WARNING_PERCENT`] and red at
/// [`USAGE_CRITICAL_PERCENT`] when `use_color` is set.
pub fn format_usage(usage: &TokenUsage, use_color: bool) -> String {
    let percent = usage.usage_percentage.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * USAGE_BAR_WIDTH as f64).round() as usize;
    let bar = format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(USAGE_BAR_WIDTH - filled)
    );
    let bar = if use_color {
        let color = if percent >= USAGE_CRITICAL_PERCENT {
            ANSI_RED
        } else if percent >= USAGE_WARNING_PERCENT {
            ANSI_YELLOW
        } else {
            ANSI_GREEN
        };
        format!("{color}{bar}{ANSI_RESET}")
    } else {
        bar
    };
    format!(
        "{bar} {} / {} tokens ({:.1}%), {} remaining",
        usage.total_tokens_used, usage.token_limit, usage.usage_percentage, usage.remaining_tokens
    )
}
