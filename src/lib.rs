//! Client library for the ByteForge streaming chat backend.
//!
//! [`ByteForge`] talks to the REST API and opens turn streams, [`sse`] turns
//! the response body into [`StreamFrame`]s, and [`ConversationState`] applies
//! those frames to a transcript.  The [`chat`] module ties the pieces into an
//! interactive terminal client.

pub mod chat;
pub mod client;
pub mod client_logger;
pub mod conversation;
pub mod error;
pub mod gate;
pub mod observability;
pub mod render;
pub mod sse;
pub mod transport;
pub mod turn;
pub mod types;
pub mod utils;

pub use client::ByteForge;
pub use client_logger::ClientLogger;
pub use conversation::{ConversationState, ProvisionalTurn};
pub use error::{CONNECTION_LOST_NOTICE, Error, PAYMENT_REQUIRED_NOTICE, Result};
pub use gate::{SendRefusal, check_send};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use transport::{ChatTransport, FrameStream};
pub use turn::{TurnOutcome, TurnPhase};
pub use types::*;
