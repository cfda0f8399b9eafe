/// Separator the backend's system prompts ask the model to emit before its
/// list of follow-up topics.
pub const RELATED_MARKER: &str = "===RELATED===";

/// Split assistant content into its main body and the trailing follow-up topics.
///
/// Topics are the non-blank lines after the marker with any leading `-`
/// bullet removed.  Content without the marker is returned whole.
pub fn split_related(content: &str) -> (&str, Vec<String>) {
    match content.split_once(RELATED_MARKER) {
        Some((main, related)) => (main, parse_topics(related)),
        None => (content, Vec::new()),
    }
}

/// Parse the text following the marker into topic titles.
pub fn parse_topics(related: &str) -> Vec<String> {
    related
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.trim_start_matches('-').trim().to_string())
        .filter(|topic| !topic.is_empty())
        .collect()
}
