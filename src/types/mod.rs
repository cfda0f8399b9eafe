// Public modules
pub mod auth;
pub mod conversation;
pub mod ids;
pub mod message;
pub mod model_info;
pub mod persona;
pub mod prompt_template;
pub mod related;
pub mod stream_frame;
pub mod stream_request;
pub mod token_usage;
pub mod top_up;

// Re-exports
pub use auth::{AuthTokens, LoginRequest};
pub use conversation::{ConversationDetail, ConversationInfo, LastMessage};
pub use ids::{ConversationId, MessageId};
pub use message::{Message, MessageRole};
pub use model_info::{
    ModelInfo, ModelPricing, default_model, featured_models, provider_for_model_id,
};
pub use persona::Persona;
pub use prompt_template::{PROMPT_MENU_LIMIT, PromptTemplate, filter_prompts};
pub use related::{RELATED_MARKER, parse_topics, split_related};
pub use stream_frame::{DonePayload, StreamFrame};
pub use stream_request::StreamRequest;
pub use token_usage::{DEFAULT_TOKEN_LIMIT, TokenUsage, TokenUsageReport};
pub use top_up::{
    TOKENS_PER_UNIT, TOP_UP_PACKAGES, TopUpRequest, TopUpResponse, tokens_for_amount,
};
