//! Text inference adapter.
//!
//! Turns a conversation into a model call and back:
//! 1. Renders the conversation with the model's chat template
//! 2. Tokenizes the prompt
//! 3. Runs bounded generation
//! 4. Decodes only the newly generated suffix
//! 5. Reports prompt/completion/total token counts
//!
//! [`TextEngine::generate`] runs the same steps on the blocking pool and
//! streams decoded text through a channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::inference::chat_template::ChatTurn;
use crate::inference::model::{ChatModel, GenerationParams, TokenId};

/// A streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Unique request ID.
    pub request_id: String,

    /// Conversation to continue.
    pub conversation: Vec<ChatTurn>,

    /// Generation bounds.
    pub params: GenerationParams,
}

/// A generated token event.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// New text was decoded.
    Token {
        token_id: TokenId,
        text: String,
    },
    /// Generation is complete.
    Done {
        total_tokens: usize,
        prompt_tokens: usize,
        completion_tokens: usize,
    },
    /// An error occurred during generation.
    Error(String),
}

/// Result of a non-streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Adapter between request payloads and a [`ChatModel`].
#[derive(Clone)]
pub struct TextEngine {
    model: Arc<dyn ChatModel>,
}

impl TextEngine {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Run a conversation to completion. Blocks the calling thread.
    pub fn complete(&self, conversation: &[ChatTurn], params: &GenerationParams) -> Result<Completion> {
        let prompt = self.model.apply_chat_template(conversation);
        let input_ids = self.model.encode(&prompt)?;
        let output = self.model.generate(&input_ids, params, &mut |_| true)?;

        let new_tokens = output.get(input_ids.len()..).unwrap_or_default();
        let text = self.model.decode(new_tokens, true)?;

        Ok(Completion {
            text,
            prompt_tokens: input_ids.len(),
            completion_tokens: output.len().saturating_sub(input_ids.len()),
            total_tokens: output.len(),
        })
    }

    /// Run a generation request, streaming decoded text to the returned receiver.
    ///
    /// The model runs on the blocking pool. Dropping the receiver stops
    /// generation at the next token. Must be called within a tokio runtime.
    pub fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<GenerationEvent> {
        let (tx, rx) = mpsc::channel(32);
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            info!(
                request_id = request.request_id,
                max_tokens = request.params.max_new_tokens,
                "Starting generation"
            );

            match stream_tokens(model.as_ref(), &request, &tx) {
                Ok((prompt_tokens, completion_tokens)) => {
                    let _ = tx.blocking_send(GenerationEvent::Done {
                        total_tokens: prompt_tokens + completion_tokens,
                        prompt_tokens,
                        completion_tokens,
                    });
                    info!(
                        request_id = request.request_id,
                        completion_tokens,
                        "Generation complete"
                    );
                }
                Err(e) => {
                    warn!(request_id = request.request_id, error = ?e, "Generation failed");
                    let _ = tx.blocking_send(GenerationEvent::Error(e.to_string()));
                }
            }
        });

        rx
    }
}

/// Drive generation, forwarding decoded text. Returns (prompt, completion) token counts.
fn stream_tokens(
    model: &dyn ChatModel,
    request: &GenerationRequest,
    tx: &mpsc::Sender<GenerationEvent>,
) -> Result<(usize, usize)> {
    let prompt = model.apply_chat_template(&request.conversation);
    let input_ids = model.encode(&prompt)?;

    let mut decoder = IncrementalDecoder::default();
    let mut decode_error = None;

    let output = model.generate(&input_ids, &request.params, &mut |token_id| {
        let text = match decoder.push(model, token_id) {
            Ok(text) => text,
            Err(e) => {
                decode_error = Some(e);
                return false;
            }
        };
        if text.is_empty() {
            return true;
        }
        if tx
            .blocking_send(GenerationEvent::Token { token_id, text })
            .is_err()
        {
            // Receiver dropped, stop generating.
            debug!(request_id = request.request_id, "Client went away");
            return false;
        }
        true
    })?;

    if let Some(e) = decode_error {
        return Err(e);
    }

    Ok((input_ids.len(), output.len().saturating_sub(input_ids.len())))
}

/// Emits text only once the tokens seen so far decode to complete characters.
#[derive(Debug, Default)]
struct IncrementalDecoder {
    tokens: Vec<TokenId>,
    emitted: usize,
}

impl IncrementalDecoder {
    fn push(&mut self, model: &dyn ChatModel, token_id: TokenId) -> Result<String> {
        self.tokens.push(token_id);
        let text = model.decode(&self.tokens, true)?;
        if text.ends_with('\u{FFFD}') || text.len() <= self.emitted {
            return Ok(String::new());
        }
        let delta = text.get(self.emitted..).unwrap_or_default().to_string();
        self.emitted = text.len();
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::error::ServeError;

    /// Emits a fixed byte reply followed by an end marker (id 999).
    struct CannedModel {
        reply: &'static str,
    }

    impl ChatModel for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
            Ok(text.bytes().map(TokenId::from).collect())
        }

        fn generate(
            &self,
            input_ids: &[TokenId],
            params: &GenerationParams,
            on_token: &mut dyn FnMut(TokenId) -> bool,
        ) -> Result<Vec<TokenId>> {
            let mut out = input_ids.to_vec();
            let reply = self.reply.bytes().map(TokenId::from).chain([999]);
            for t in reply.take(params.max_new_tokens) {
                out.push(t);
                if !on_token(t) {
                    break;
                }
            }
            Ok(out)
        }

        fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> Result<String> {
            let bytes: Vec<u8> = tokens
                .iter()
                .filter(|&&t| !(skip_special_tokens && t == 999))
                .map(|&t| t as u8)
                .collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    struct BrokenModel;

    impl ChatModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn encode(&self, _text: &str) -> Result<Vec<TokenId>> {
            Ok(vec![1, 2, 3])
        }

        fn generate(
            &self,
            _input_ids: &[TokenId],
            _params: &GenerationParams,
            _on_token: &mut dyn FnMut(TokenId) -> bool,
        ) -> Result<Vec<TokenId>> {
            Err(ServeError::Inference("CUDA out of memory".to_string()))
        }

        fn decode(&self, _tokens: &[TokenId], _skip: bool) -> Result<String> {
            Ok(String::new())
        }
    }

    fn engine(reply: &'static str) -> TextEngine {
        TextEngine::new(Arc::new(CannedModel { reply }))
    }

    #[test]
    fn test_complete_decodes_only_suffix() {
        let engine = engine("hello");
        let conversation = vec![ChatTurn::user("hi")];
        let prompt_len = engine.model().apply_chat_template(&conversation).len();

        let completion = engine
            .complete(&conversation, &GenerationParams::new(64, 0.0))
            .unwrap();

        assert_eq!(completion.text, "hello");
        assert_eq!(completion.prompt_tokens, prompt_len);
        assert_eq!(completion.completion_tokens, 6);
        assert_eq!(completion.total_tokens, prompt_len + 6);
    }

    #[test]
    fn test_complete_bounded() {
        let completion = engine("hello")
            .complete(&[ChatTurn::user("hi")], &GenerationParams::new(2, 0.0))
            .unwrap();
        assert_eq!(completion.text, "he");
        assert_eq!(completion.completion_tokens, 2);
    }

    #[tokio::test]
    async fn test_stream_joins_multibyte_characters() {
        let mut rx = engine("héllo").generate(GenerationRequest {
            request_id: "stream-1".to_string(),
            conversation: vec![ChatTurn::user("hi")],
            params: GenerationParams::new(64, 0.7),
        });

        let mut text = String::new();
        let mut done = None;
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Token { text: t, .. } => {
                    assert!(!t.contains('\u{FFFD}'));
                    text.push_str(&t);
                }
                GenerationEvent::Done { completion_tokens, .. } => done = Some(completion_tokens),
                GenerationEvent::Error(e) => panic!("Unexpected error: {e}"),
            }
        }

        assert_eq!(text, "héllo");
        // 6 bytes + end marker
        assert_eq!(done, Some(7));
    }

    #[tokio::test]
    async fn test_stream_reports_errors() {
        let engine = TextEngine::new(Arc::new(BrokenModel));
        let mut rx = engine.generate(GenerationRequest {
            request_id: "broken".to_string(),
            conversation: vec![ChatTurn::user("hi")],
            params: GenerationParams::new(8, 0.0),
        });

        match rx.recv().await {
            Some(GenerationEvent::Error(e)) => assert!(e.contains("out of memory")),
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
