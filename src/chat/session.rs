//! Core chat session management.
//!
//! This module provides the [`ChatSession`] struct, which owns one
//! conversation view: its transcript, the composer's model and persona
//! selection, and the lifecycle of the turn in flight.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::to_writer_pretty;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::chat::config::ChatConfig;
use crate::client::ByteForge;
use crate::conversation::ConversationState;
use crate::error::{PAYMENT_REQUIRED_NOTICE, Result};
use crate::gate::{SendRefusal, check_send};
use crate::observability::{
    STREAM_TTFT, TURN_DURATION, TURNS_CANCELLED, TURNS_COMPLETED, TURNS_FAILED, TURNS_REFUSED,
};
use crate::render::Renderer;
use crate::transport::{ChatTransport, FrameStream};
use crate::turn::{TurnOutcome, TurnPhase};
use crate::types::{
    ConversationId, ConversationInfo, Message, ModelInfo, Persona, PromptTemplate, StreamFrame,
    StreamRequest, TokenUsage, TopUpResponse, default_model, featured_models, filter_prompts,
};

/// Notice shown when an `error` frame carries no message.
pub const GENERATION_FAILED_NOTICE: &str = "AI generation failed";

/// Notice shown when the body ends without a `done` or `error` frame.
pub const STREAM_ENDED_NOTICE: &str = "Stream ended before completion.";

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The selected model id, if any.
    pub model: Option<String>,
    pub persona: Persona,
    pub conversation_id: Option<ConversationId>,
    pub title: Option<String>,
    /// The number of messages in the transcript.
    pub message_count: usize,
    pub phase: TurnPhase,
    /// The conversation's aggregate counters.
    pub usage: TokenUsage,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub turns_cancelled: u64,
    pub turns_refused: u64,
    /// The auto-save transcript path, if set.
    pub transcript_path: Option<PathBuf>,
}

/// A chat session over any [`ChatTransport`].
///
/// Turns are driven by [`ChatSession::send_streaming`], which takes `&mut
/// self`; the borrow checker therefore rules out a second turn, or any
/// other mutation, while one is in flight.
pub struct ChatSession<T: ChatTransport> {
    transport: T,
    config: ChatConfig,
    state: ConversationState,
    phase: TurnPhase,
    models: Vec<ModelInfo>,
    model: Option<ModelInfo>,
    persona: Persona,
    prompts: Option<Vec<PromptTemplate>>,
    turns_completed: u64,
    turns_failed: u64,
    turns_cancelled: u64,
    turns_refused: u64,
}

impl<T: ChatTransport> ChatSession<T> {
    /// Creates a session seeded with the featured model catalog.
    pub fn new(transport: T, config: ChatConfig) -> Self {
        let persona = config.persona;
        let mut session = Self {
            transport,
            config,
            state: ConversationState::new(),
            phase: TurnPhase::Idle,
            models: featured_models(),
            model: None,
            persona,
            prompts: None,
            turns_completed: 0,
            turns_failed: 0,
            turns_cancelled: 0,
            turns_refused: 0,
        };
        session.select_configured_model();
        session
    }

    /// Sends a user message and streams the response.
    ///
    /// The turn is raced against `cancel` at every suspension point; once
    /// cancellation is observed the connection is dropped and no further
    /// frame is applied.  Failures are reported to `renderer` as notices and
    /// returned as an outcome, never as an error.
    pub async fn send_streaming(
        &mut self,
        input: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let message = match check_send(input, self.phase, self.state.usage(), self.model.as_ref())
        {
            Ok(message) => message,
            Err(refusal) => return self.refuse(refusal),
        };
        let Some(model) = self.model.clone() else {
            return self.refuse(SendRefusal::NoModelSelected);
        };
        if let Err(refusal) = self.state.begin_turn(&message) {
            return self.refuse(refusal);
        }

        let request = StreamRequest::new(message, self.state.id().cloned(), &model, self.persona);
        tracing::info!(
            conversation_id = ?request.conversation_id,
            model = %request.model,
            persona = %request.persona,
            "turn started"
        );

        let start = Instant::now();
        self.phase = TurnPhase::Sending;
        let outcome = self.drive_turn(&request, renderer, cancel, start).await;
        TURN_DURATION.add(start.elapsed().as_secs_f64());
        if let Some(phase) = outcome.phase() {
            self.phase = phase;
        }
        self.record(&outcome);

        if outcome.is_completed()
            && let Err(err) = self.auto_save_transcript()
        {
            tracing::warn!(error = %err, "transcript auto-save failed");
            renderer.print_error(&format!("Failed to save transcript: {err}"));
        }
        outcome
    }

    async fn drive_turn(
        &mut self,
        request: &StreamRequest,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
        start: Instant,
    ) -> TurnOutcome {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.open_stream(request) => Some(result),
        };
        let mut frames: FrameStream = match opened {
            None => return self.cancel(renderer),
            Some(Err(err)) => return self.fail_before_stream(err, renderer),
            Some(Ok(frames)) => frames,
        };

        self.phase = TurnPhase::Streaming;
        renderer.start_response();
        let mut first_token = true;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = frames.next() => Some(frame),
            };
            match next {
                None => {
                    drop(frames);
                    renderer.finish_response();
                    return self.cancel(renderer);
                }
                Some(Some(Ok(StreamFrame::Token { content }))) => {
                    if first_token {
                        STREAM_TTFT.add(start.elapsed().as_secs_f64());
                        first_token = false;
                    }
                    self.state.apply_token(&content);
                    renderer.print_text(&content);
                }
                Some(Some(Ok(StreamFrame::Done(done)))) => {
                    renderer.finish_response();
                    let conversation_id = done.conversation.id.clone();
                    let assistant_message_id = done.assistant_message.id.clone();
                    self.state.apply_done(*done);
                    tracing::info!(
                        conversation_id = %conversation_id,
                        total_tokens_used = self.state.usage().total_tokens_used,
                        "turn completed"
                    );
                    return TurnOutcome::Completed {
                        conversation_id,
                        assistant_message_id,
                    };
                }
                Some(Some(Ok(StreamFrame::Error { message }))) => {
                    renderer.finish_response();
                    let notice = message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| GENERATION_FAILED_NOTICE.to_string());
                    return self.fail_mid_stream(notice, renderer);
                }
                Some(None) => {
                    renderer.finish_response();
                    return self.fail_mid_stream(STREAM_ENDED_NOTICE.to_string(), renderer);
                }
                Some(Some(Err(err))) => {
                    renderer.finish_response();
                    tracing::warn!(error = %err, "stream interrupted");
                    self.state.abort_turn();
                    let notice = err.notice();
                    renderer.print_error(&notice);
                    return TurnOutcome::Failed {
                        notice,
                        partial_retained: false,
                    };
                }
            }
        }
    }

    fn refuse(&mut self, refusal: SendRefusal) -> TurnOutcome {
        tracing::debug!(?refusal, "send refused");
        let outcome = TurnOutcome::Refused(refusal);
        self.record(&outcome);
        outcome
    }

    fn cancel(&mut self, renderer: &mut dyn Renderer) -> TurnOutcome {
        let partial_retained = self.state.cancel_turn();
        tracing::info!(partial_retained, "turn cancelled");
        renderer.print_interrupted();
        TurnOutcome::Cancelled { partial_retained }
    }

    fn fail_before_stream(&mut self, err: Error, renderer: &mut dyn Renderer) -> TurnOutcome {
        self.state.abort_turn();
        if err.is_payment_required() {
            let usage = err.token_usage().unwrap_or_else(|| {
                // The balance is gone even if the backend did not say by how much.
                TokenUsage {
                    remaining_tokens: 0,
                    usage_percentage: 100.0,
                    ..*self.state.usage()
                }
            });
            self.state.replace_usage(usage);
            tracing::info!(remaining_tokens = usage.remaining_tokens, "payment required");
            renderer.print_error(PAYMENT_REQUIRED_NOTICE);
            return TurnOutcome::PaymentRequired {
                notice: PAYMENT_REQUIRED_NOTICE.to_string(),
            };
        }
        tracing::warn!(error = %err, "turn failed before streaming");
        let notice = err.notice();
        renderer.print_error(&notice);
        TurnOutcome::Failed {
            notice,
            partial_retained: false,
        }
    }

    fn fail_mid_stream(&mut self, notice: String, renderer: &mut dyn Renderer) -> TurnOutcome {
        let partial_retained = self.state.apply_error();
        tracing::warn!(notice = %notice, partial_retained, "turn failed");
        renderer.print_error(&notice);
        TurnOutcome::Failed {
            notice,
            partial_retained,
        }
    }

    fn record(&mut self, outcome: &TurnOutcome) {
        match outcome {
            TurnOutcome::Refused(_) => {
                TURNS_REFUSED.click();
                self.turns_refused += 1;
            }
            TurnOutcome::Completed { .. } => {
                TURNS_COMPLETED.click();
                self.turns_completed += 1;
            }
            TurnOutcome::Failed { .. } | TurnOutcome::PaymentRequired { .. } => {
                TURNS_FAILED.click();
                self.turns_failed += 1;
            }
            TurnOutcome::Cancelled { .. } => {
                TURNS_CANCELLED.click();
                self.turns_cancelled += 1;
            }
        }
    }

    /// The transport turns are sent through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Starts a new conversation; the next turn creates it on the backend.
    pub fn new_conversation(&mut self) {
        self.state.reset();
        self.phase = TurnPhase::Idle;
    }

    /// Returns the number of messages in the transcript.
    pub fn message_count(&self) -> usize {
        self.state.messages().len()
    }

    /// Returns the selected model.
    pub fn model(&self) -> Option<&ModelInfo> {
        self.model.as_ref()
    }

    /// Returns the known models, featured first, filtered by `query`.
    pub fn models(&self, query: Option<&str>) -> Vec<&ModelInfo> {
        let mut models: Vec<&ModelInfo> = self
            .models
            .iter()
            .filter(|m| query.is_none_or(|q| m.matches(q)))
            .collect();
        models.sort_by_key(|m| !m.is_featured());
        models
    }

    /// Changes the model used for the next turn.
    ///
    /// `id` is matched against catalog ids, then names.  An unlisted id of the
    /// form `provider/model` is accepted as-is.
    pub fn set_model(&mut self, id: &str) -> Result<&ModelInfo> {
        let model = self
            .models
            .iter()
            .find(|m| m.id == id)
            .or_else(|| self.models.iter().find(|m| m.name.eq_ignore_ascii_case(id)))
            .cloned();
        let model = match model {
            Some(model) => model,
            None if id.contains('/') => ModelInfo::new(id, id),
            None => {
                return Err(Error::validation(
                    format!("unknown model: {id}"),
                    Some("model".to_string()),
                ));
            }
        };
        let model: &ModelInfo = self.model.insert(model);
        Ok(model)
    }

    /// Replaces the model catalog, keeping a still-listed selection.
    pub fn set_models(&mut self, models: Vec<ModelInfo>) {
        if models.is_empty() {
            return;
        }
        self.models = models;
        let still_listed = self
            .model
            .as_ref()
            .is_some_and(|current| self.models.iter().any(|m| m.id == current.id));
        if !still_listed {
            self.model = None;
            self.select_configured_model();
        }
    }

    fn select_configured_model(&mut self) {
        if self.model.is_some() {
            return;
        }
        if let Some(id) = self.config.model.clone()
            && self.set_model(&id).is_ok()
        {
            return;
        }
        self.model = default_model(&self.models).cloned();
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn set_persona(&mut self, persona: Persona) {
        self.persona = persona;
    }

    /// Replaces the aggregate counters, e.g. from a usage refresh.
    pub fn replace_usage(&mut self, usage: TokenUsage) {
        self.state.replace_usage(usage);
    }

    /// Returns prompt templates matching `query`, from the cached library.
    pub fn matching_prompts(&self, query: &str) -> Vec<&PromptTemplate> {
        self.prompts
            .as_deref()
            .map(|prompts| filter_prompts(prompts, query))
            .unwrap_or_default()
    }

    /// Finds a cached prompt by slug.
    pub fn prompt_by_slug(&self, slug: &str) -> Option<&PromptTemplate> {
        self.prompts
            .as_deref()?
            .iter()
            .find(|p| p.slug.eq_ignore_ascii_case(slug))
    }

    pub fn set_prompts(&mut self, prompts: Vec<PromptTemplate>) {
        self.prompts = Some(prompts);
    }

    /// Sets the auto-save transcript path.
    pub fn set_transcript_path(&mut self, path: Option<PathBuf>) {
        self.config.transcript_path = path;
    }

    /// Returns the configured transcript path, if any.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.config.transcript_path.as_deref()
    }

    /// Saves the transcript to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let transcript = TranscriptFile {
            version: 1,
            conversation_id: self.state.id().cloned(),
            title: self.state.title().map(str::to_string),
            model: self.model.as_ref().map(|m| m.id.clone()),
            persona: self.persona,
            messages: self.state.messages().to_vec(),
        };
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model.as_ref().map(|m| m.id.clone()),
            persona: self.persona,
            conversation_id: self.state.id().cloned(),
            title: self.state.title().map(str::to_string),
            message_count: self.message_count(),
            phase: self.phase,
            usage: *self.state.usage(),
            turns_completed: self.turns_completed,
            turns_failed: self.turns_failed,
            turns_cancelled: self.turns_cancelled,
            turns_refused: self.turns_refused,
            transcript_path: self.config.transcript_path.clone(),
        }
    }

    fn auto_save_transcript(&self) -> Result<()> {
        if let Some(path) = &self.config.transcript_path {
            self.save_transcript_to(path)
        } else {
            Ok(())
        }
    }
}

/// Backend-backed operations that sit outside the streaming core.
impl ChatSession<ByteForge> {
    /// Builds a client from the configuration and wraps it in a session.
    pub fn connect(config: ChatConfig) -> Result<Self> {
        let client = ByteForge::with_options(
            config.access_token.clone(),
            config.base_url.clone(),
            config.timeout,
        )?;
        Ok(Self::new(client, config))
    }

    /// Fetches the model catalog, keeping the featured fallback on failure.
    pub async fn refresh_models(&mut self) -> usize {
        match self.transport.list_models().await {
            Ok(models) if !models.is_empty() => self.set_models(models),
            Ok(_) => tracing::warn!("model catalog is empty, keeping featured models"),
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch models, using defaults")
            }
        }
        self.models.len()
    }

    /// Re-reads the counters of the current conversation.
    pub async fn refresh_usage(&mut self) -> Result<TokenUsage> {
        if let Some(id) = self.state.id().cloned() {
            let report = self.transport.token_usage(Some(&id)).await?;
            self.state.replace_usage(report.usage);
        }
        Ok(*self.state.usage())
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        self.transport.list_conversations().await
    }

    /// Replaces the transcript with a saved conversation.
    pub async fn open_conversation(&mut self, id: &ConversationId) -> Result<()> {
        let detail = self.transport.get_conversation(id).await?;
        self.state.load(detail);
        self.phase = TurnPhase::Idle;
        Ok(())
    }

    /// Deletes a conversation; deleting the open one starts a new one.
    pub async fn delete_conversation(&mut self, id: &ConversationId) -> Result<()> {
        self.transport.delete_conversation(id).await?;
        if self.state.id() == Some(id) {
            self.new_conversation();
        }
        Ok(())
    }

    /// Removes every message from the current conversation.
    pub async fn clear_conversation(&mut self) -> Result<()> {
        if let Some(id) = self.state.id().cloned() {
            self.transport.clear_conversation(&id).await?;
        }
        self.state.clear_messages();
        Ok(())
    }

    /// Buys tokens for the current conversation and applies the new counters.
    pub async fn top_up(&mut self, amount: f64) -> Result<TopUpResponse> {
        let Some(id) = self.state.id().cloned() else {
            return Err(Error::validation(
                "start a conversation before topping up",
                Some("conversation_id".to_string()),
            ));
        };
        let response = self.transport.top_up(&id, amount).await?;
        if !self.state.apply_top_up(&response) {
            self.refresh_usage().await?;
        }
        Ok(response)
    }

    /// Fetches the prompt library once and filters it by `query`.
    pub async fn search_prompts(&mut self, query: &str) -> Result<Vec<PromptTemplate>> {
        if self.prompts.is_none() {
            let prompts = self.transport.list_prompts(None).await?;
            self.prompts = Some(prompts);
        }
        Ok(self
            .matching_prompts(query)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Looks up a prompt template by slug, fetching the library if needed.
    pub async fn find_prompt(&mut self, slug: &str) -> Result<Option<PromptTemplate>> {
        if self.prompts.is_none() {
            let prompts = self.transport.list_prompts(None).await?;
            self.prompts = Some(prompts);
        }
        Ok(self.prompt_by_slug(slug).cloned())
    }
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    model: Option<String>,
    persona: Persona,
    messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CONNECTION_LOST_NOTICE;
    use crate::types::MessageRole;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        /// Yield these items, then end the body.
        Frames(Vec<Result<StreamFrame>>),
        /// Yield these frames, then hang forever.
        Hang(Vec<StreamFrame>),
        /// Fail before streaming.
        Fail(Error),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> StreamRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open_stream(&self, request: &StreamRequest) -> Result<FrameStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("no script left");
            match script {
                Script::Frames(items) => Ok(Box::pin(stream::iter(items))),
                Script::Hang(frames) => Ok(Box::pin(
                    stream::iter(frames.into_iter().map(Ok::<_, Error>))
                        .chain(stream::pending::<Result<StreamFrame>>()),
                )),
                Script::Fail(err) => Err(err),
            }
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        text: String,
        errors: Vec<String>,
        interrupted: bool,
        cancel_on_text: Option<CancellationToken>,
    }

    impl Renderer for RecordingRenderer {
        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
            if let Some(token) = &self.cancel_on_text {
                token.cancel();
            }
        }

        fn finish_response(&mut self) {}

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, _: &str) {}

        fn print_interrupted(&mut self) {
            self.interrupted = true;
        }
    }

    fn done(conversation_id: &str, user: &str, assistant: &str, answer: &str, total: i64) -> StreamFrame {
        serde_json::from_value(json!({
            "type": "done",
            "user_message": {
                "id": user,
                "role": "user",
                "content": "Explain recursion",
                "created_at": "2025-01-01T12:00:00Z"
            },
            "assistant_message": {
                "id": assistant,
                "role": "assistant",
                "content": answer,
                "created_at": "2025-01-01T12:00:02Z"
            },
            "conversation": {"id": conversation_id, "title": "Recursion"},
            "token_usage": {
                "total_tokens_used": total,
                "token_limit": 20000,
                "remaining_tokens": 20000 - total,
                "usage_percentage": total as f64 / 200.0
            }
        }))
        .unwrap()
    }

    fn session(scripts: Vec<Script>) -> ChatSession<ScriptedTransport> {
        ChatSession::new(
            ScriptedTransport::new(scripts),
            ChatConfig::new().with_model("openai/gpt-4o"),
        )
    }

    #[tokio::test]
    async fn explain_recursion() {
        let mut session = session(vec![Script::Frames(vec![
            Ok(StreamFrame::token("Recu")),
            Ok(StreamFrame::token("rsion ")),
            Ok(StreamFrame::token("is...")),
            Ok(done("42", "u1", "a1", "Recursion is...", 37)),
        ])]);
        let mut renderer = RecordingRenderer::default();

        let outcome = session
            .send_streaming("Explain recursion", &mut renderer, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                conversation_id: ConversationId::new("42"),
                assistant_message_id: "a1".into(),
            }
        );
        assert_eq!(renderer.text, "Recursion is...");
        let request = session.transport().last_request();
        assert_eq!(request.message, "Explain recursion");
        assert!(request.conversation_id.is_none());
        assert_eq!(request.provider, "openai");
        assert_eq!(request.model, "openai/gpt-4o");
        assert_eq!(request.persona, Persona::General);

        let messages = session.state().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            (messages[0].id.as_str(), messages[0].role, messages[0].content.as_str()),
            ("u1", MessageRole::User, "Explain recursion")
        );
        assert_eq!(
            (messages[1].id.as_str(), messages[1].role, messages[1].content.as_str()),
            ("a1", MessageRole::Assistant, "Recursion is...")
        );
        assert_eq!(session.state().id().unwrap().as_str(), "42");
        assert_eq!(session.state().usage().total_tokens_used, 37);
        assert_eq!(session.phase(), TurnPhase::Completed);
    }

    #[tokio::test]
    async fn follow_up_turn_reuses_conversation() {
        let mut session = session(vec![
            Script::Frames(vec![Ok(done("42", "u1", "a1", "one", 10))]),
            Script::Frames(vec![Ok(done("42", "u2", "a2", "two", 20))]),
        ]);
        session.set_persona(Persona::Analyst);
        let mut renderer = RecordingRenderer::default();
        let cancel = CancellationToken::new();

        session.send_streaming("first", &mut renderer, &cancel).await;
        session.send_streaming("second", &mut renderer, &cancel).await;

        let request = session.transport().last_request();
        assert_eq!(request.conversation_id, Some(ConversationId::new("42")));
        assert_eq!(request.persona, Persona::Analyst);
        assert_eq!(session.message_count(), 4);
        assert_eq!(session.stats().turns_completed, 2);
    }

    #[tokio::test]
    async fn refusals_never_reach_the_transport() {
        let mut session = session(vec![]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("   ", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(outcome, TurnOutcome::Refused(SendRefusal::EmptyMessage));
        assert_eq!(session.transport().calls(), 0);
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.stats().turns_refused, 1);
    }

    #[tokio::test]
    async fn payment_required_gates_further_sends() {
        let exhausted = TokenUsage::new(20_000, 20_000, 0, 100.0);
        let mut session = session(vec![Script::Fail(Error::payment_required(
            "Token limit reached",
            Some(exhausted),
        ))]);
        let mut renderer = RecordingRenderer::default();
        let cancel = CancellationToken::new();

        let outcome = session.send_streaming("hello", &mut renderer, &cancel).await;
        assert_eq!(
            outcome,
            TurnOutcome::PaymentRequired {
                notice: PAYMENT_REQUIRED_NOTICE.to_string()
            }
        );
        assert_eq!(*session.state().usage(), exhausted);
        assert_eq!(session.message_count(), 0);
        assert_eq!(renderer.errors, vec![PAYMENT_REQUIRED_NOTICE.to_string()]);

        let before = session.state().messages().to_vec();
        let outcome = session.send_streaming("again", &mut renderer, &cancel).await;
        assert_eq!(outcome, TurnOutcome::Refused(SendRefusal::BalanceExhausted));
        assert_eq!(session.transport().calls(), 1);
        assert_eq!(session.state().messages(), before.as_slice());
    }

    #[tokio::test]
    async fn payment_required_without_counters_still_gates() {
        let mut session = session(vec![Script::Fail(Error::payment_required("no", None))]);
        let mut renderer = RecordingRenderer::default();
        session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert!(session.state().usage().is_exhausted());
    }

    #[tokio::test]
    async fn generic_failure_discards_turn() {
        let mut session = session(vec![Script::Fail(Error::internal_server("boom"))]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: "boom".to_string(),
                partial_retained: false
            }
        );
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.phase(), TurnPhase::Failed);
    }

    #[tokio::test]
    async fn error_frame_without_tokens_rolls_back() {
        let mut session = session(vec![Script::Frames(vec![Ok(StreamFrame::Error {
            message: None,
        })])]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: GENERATION_FAILED_NOTICE.to_string(),
                partial_retained: false
            }
        );
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test]
    async fn error_frame_after_tokens_keeps_partial() {
        let mut session = session(vec![Script::Frames(vec![
            Ok(StreamFrame::token("Half an ")),
            Ok(StreamFrame::token("answer")),
            Ok(StreamFrame::error("upstream timeout")),
            Ok(StreamFrame::token("ignored")),
        ])]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: "upstream timeout".to_string(),
                partial_retained: true
            }
        );
        let assistant = &session.state().messages()[1];
        assert_eq!(assistant.content, "Half an answer");
        assert!(!assistant.is_streaming);
        assert_eq!(renderer.text, "Half an answer");
    }

    #[tokio::test]
    async fn transport_error_mid_stream_discards_turn() {
        let mut session = session(vec![Script::Frames(vec![
            Ok(StreamFrame::token("partial")),
            Err(Error::streaming("connection reset", None)),
        ])]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: CONNECTION_LOST_NOTICE.to_string(),
                partial_retained: false
            }
        );
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test]
    async fn body_ending_without_terminal_frame_fails() {
        let mut session = session(vec![Script::Frames(vec![Ok(StreamFrame::token("cut"))])]);
        let mut renderer = RecordingRenderer::default();
        let outcome = session
            .send_streaming("hello", &mut renderer, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: STREAM_ENDED_NOTICE.to_string(),
                partial_retained: true
            }
        );
        assert_eq!(session.state().messages()[1].content, "cut");
    }

    #[tokio::test]
    async fn cancellation_mid_stream_stops_applying_frames() {
        let mut session = session(vec![Script::Hang(vec![
            StreamFrame::token("first"),
            StreamFrame::token("second"),
        ])]);
        let cancel = CancellationToken::new();
        let mut renderer = RecordingRenderer {
            cancel_on_text: Some(cancel.clone()),
            ..RecordingRenderer::default()
        };

        let outcome = session.send_streaming("hello", &mut renderer, &cancel).await;

        assert_eq!(
            outcome,
            TurnOutcome::Cancelled {
                partial_retained: true
            }
        );
        assert!(renderer.interrupted);
        assert_eq!(renderer.text, "first");
        let assistant = &session.state().messages()[1];
        assert_eq!(assistant.content, "first");
        assert!(!assistant.is_streaming);
        assert_eq!(session.phase(), TurnPhase::Cancelled);
        assert!(session.phase().accepts_send());
    }

    #[tokio::test]
    async fn cancellation_before_headers_discards_turn() {
        let mut session = session(vec![Script::Hang(vec![])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut renderer = RecordingRenderer::default();

        let outcome = session.send_streaming("hello", &mut renderer, &cancel).await;
        assert_eq!(
            outcome,
            TurnOutcome::Cancelled {
                partial_retained: false
            }
        );
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn model_selection() {
        let mut session = session(vec![]);
        assert_eq!(session.model().unwrap().id, "openai/gpt-4o");

        session.set_model("Claude 3.5 Sonnet").unwrap();
        assert_eq!(session.model().unwrap().id, "anthropic/claude-3.5-sonnet");

        let custom = session.set_model("mistralai/mistral-large").unwrap();
        assert_eq!(custom.provider, "mistral");

        assert!(session.set_model("nonsense").unwrap_err().is_validation());
        assert_eq!(session.model().unwrap().id, "mistralai/mistral-large");
    }

    #[test]
    fn default_model_is_first_featured() {
        let session = ChatSession::new(ScriptedTransport::default(), ChatConfig::new());
        assert_eq!(session.model().unwrap().id, "openai/gpt-4o");
    }

    #[test]
    fn catalog_replacement_keeps_listed_selection() {
        let mut session = session(vec![]);
        session.set_model("google/gemini-2.0-flash-001").unwrap();
        session.set_models(vec![
            ModelInfo::new("google/gemini-2.0-flash-001", "Gemini"),
            ModelInfo::new("qwen/qwen-2.5", "Qwen").with_featured(true),
        ]);
        assert_eq!(session.model().unwrap().id, "google/gemini-2.0-flash-001");
        assert_eq!(session.models(None)[0].id, "qwen/qwen-2.5");
        assert_eq!(session.models(Some("gem")).len(), 1);
    }

    #[tokio::test]
    async fn transcript_round_trip_on_disk() {
        let path = std::env::temp_dir().join(format!(
            "byteforge-transcript-{}.json",
            std::process::id()
        ));
        let mut session = session(vec![Script::Frames(vec![Ok(done(
            "42", "u1", "a1", "answer", 5,
        ))])]);
        session.set_transcript_path(Some(path.clone()));
        let mut renderer = RecordingRenderer::default();
        session
            .send_streaming("question", &mut renderer, &CancellationToken::new())
            .await;

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(saved["version"], 1);
        assert_eq!(saved["conversation_id"], "42");
        assert_eq!(saved["persona"], "general");
        assert_eq!(saved["messages"].as_array().unwrap().len(), 2);
        assert!(renderer.errors.is_empty());
    }

    #[test]
    fn stats_snapshot() {
        let session = session(vec![]);
        let stats = session.stats();
        assert_eq!(stats.model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(stats.persona, Persona::General);
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.phase, TurnPhase::Idle);
        assert_eq!(stats.usage, TokenUsage::default());
    }
}
