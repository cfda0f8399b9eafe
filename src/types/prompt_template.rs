use serde::{Deserialize, Serialize};

/// Maximum number of templates shown by the slash-command menu.
pub const PROMPT_MENU_LIMIT: usize = 6;

/// A reusable prompt from the user's library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(deserialize_with = "crate::types::ids::deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    /// Template text; `{variable}` placeholders are left for the user to fill.
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub usage_count: u64,
}

impl PromptTemplate {
    /// Case-insensitive match against the title or slug.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query) || self.slug.to_lowercase().contains(&query)
    }
}

/// Templates shown for a slash-menu query, capped at [`PROMPT_MENU_LIMIT`].
pub fn filter_prompts<'a>(prompts: &'a [PromptTemplate], query: &str) -> Vec<&'a PromptTemplate> {
    prompts
        .iter()
        .filter(|p| query.is_empty() || p.matches(query))
        .take(PROMPT_MENU_LIMIT)
        .collect()
}
