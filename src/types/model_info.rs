use serde::{Deserialize, Serialize};

/// A model the backend can route a turn to.
///
/// Records are descriptive only: they are fetched once, listed, and one of
/// them is chosen by the user.  The chosen record's `provider` and `id` go on
/// the wire with every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Routing id, e.g. `openai/gpt-4o`.
    pub id: String,

    /// A human-readable name for the model.
    pub name: String,

    /// Provider family, e.g. `openai`.  Empty when the backend omitted it.
    #[serde(default)]
    pub provider: String,

    /// Context window in tokens, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,

    /// Featured models are listed first and picked as the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

/// Display strings for per-million-token prices, e.g. `$2.50/1M`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt: String,
    pub completion: String,
}

impl ModelInfo {
    /// Create a model record; the provider is inferred from the id prefix.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let provider = provider_for_model_id(&id).to_string();
        Self {
            id,
            name: name.into(),
            provider,
            context_length: None,
            pricing: None,
            is_free: None,
            featured: None,
        }
    }

    pub fn with_featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    pub fn is_featured(&self) -> bool {
        self.featured.unwrap_or(false)
    }

    /// True if `query` appears in the id, name or provider (case-insensitive).
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.id.to_lowercase().contains(&query)
            || self.name.to_lowercase().contains(&query)
            || self.provider.to_lowercase().contains(&query)
    }
}

/// Models offered when the catalog cannot be fetched.
pub fn featured_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("openai/gpt-4o", "GPT-4o").with_featured(true),
        ModelInfo::new("google/gemini-2.0-flash-001", "Gemini 2.0 Flash").with_featured(true),
        ModelInfo::new("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet").with_featured(true),
    ]
}

/// Pick the default model from a catalog: the first featured one, else the first.
pub fn default_model(models: &[ModelInfo]) -> Option<&ModelInfo> {
    models
        .iter()
        .find(|m| m.is_featured())
        .or_else(|| models.first())
}

/// Map a routing id to its provider family.
pub fn provider_for_model_id(id: &str) -> &'static str {
    const PREFIXES: &[(&str, &str)] = &[
        ("openai/", "openai"),
        ("anthropic/", "anthropic"),
        ("google/", "google"),
        ("meta-llama/", "meta"),
        ("mistralai/", "mistral"),
        ("deepseek/", "deepseek"),
        ("cohere/", "cohere"),
        ("qwen/", "qwen"),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| id.starts_with(prefix))
        .map(|(_, provider)| *provider)
        .unwrap_or("other")
}
