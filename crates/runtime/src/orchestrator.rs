//! The multi-round dispatch loop.
//!
//! Each `ask` appends a user message and then alternates between calling the
//! model and dispatching the tool calls it requests, until the model stops
//! or the round fails.
//!
//! ```text
//! AwaitingModel ──Stop──────────────▶ Terminal
//!      │  ▲
//!  ToolCalls                          Failed (truncated, filtered,
//!      ▼  │                                   deprecated call, unknown,
//!   Dispatching                               round limit, cancelled)
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::model::{Backend, Conversation, FinishReason, Message, ModelRequest, ToolCall};
use crate::tools::{ToolRegistry, ToolSchema, binder, schema};
use crate::{Error, Result};

/// Result text handed to the model when it calls a tool that does not exist.
pub const UNKNOWN_TOOL_RESULT: &str = "This tool does not exist! If it is a calculation you can \
do yourself then do it yourself without telling the user. Else tell the user that you currently \
cannot answer the question.";

const DEFAULT_MAX_ROUNDS: usize = 8;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of model calls within one `ask`; zero counts as one.
    pub max_rounds: usize,
    /// Abort a model call that takes longer than this.
    pub model_timeout: Option<Duration>,
    /// Turn a tool call that takes longer than this into a failure result.
    pub tool_timeout: Option<Duration>,
    /// Run the tool calls of one round concurrently.
    pub concurrent_tools: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            model_timeout: None,
            tool_timeout: None,
            concurrent_tools: false,
        }
    }
}

impl OrchestratorConfig {
    /// Set the round limit. A limit of zero is treated as one.
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = Some(timeout);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn concurrent_tools(mut self, concurrent: bool) -> Self {
        self.concurrent_tools = concurrent;
        self
    }
}

#[derive(Debug)]
enum RoundState {
    AwaitingModel,
    Dispatching {
        assistant: Message,
        calls: Vec<ToolCall>,
    },
    Terminal(String),
    Failed(Error),
}

/// Drives conversations against a model backend and a shared tool registry.
pub struct Orchestrator<B> {
    backend: B,
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl<B: Backend> Orchestrator<B> {
    pub fn new(backend: B, registry: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            registry,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a conversation seeded with the system prompt.
    pub fn start_session(&self, system_prompt: impl Into<String>) -> Conversation {
        Conversation::new(system_prompt)
    }

    /// Ask a question and run rounds until the model produces an answer.
    pub async fn ask(&self, conversation: &mut Conversation, text: &str) -> Result<String> {
        self.ask_with_cancel(conversation, text, &CancellationToken::new())
            .await
    }

    /// Like [`ask`](Self::ask), aborting with [`Error::Cancelled`] once the
    /// token fires.
    ///
    /// An abort during tool dispatch discards that round's results, so the
    /// log never holds a tool call without its answer.
    pub async fn ask_with_cancel(
        &self,
        conversation: &mut Conversation,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        conversation.push(Message::user(text));

        let tools = schema::build_all(&self.registry);
        let max_rounds = self.config.max_rounds.max(1);
        let mut rounds = 0;
        let mut state = RoundState::AwaitingModel;

        loop {
            state = match state {
                RoundState::AwaitingModel if rounds >= max_rounds => {
                    RoundState::Failed(Error::RoundLimitExceeded(max_rounds))
                }
                RoundState::AwaitingModel => {
                    rounds += 1;
                    self.await_model(conversation, &tools, rounds, cancel).await
                }
                RoundState::Dispatching { assistant, calls } => {
                    match self.dispatch(&calls, cancel).await {
                        Some(results) => {
                            conversation.push(assistant);
                            conversation.extend(results);
                            RoundState::AwaitingModel
                        }
                        None => RoundState::Failed(Error::Cancelled),
                    }
                }
                RoundState::Terminal(answer) => {
                    tracing::debug!(rounds, "conversation turn complete");
                    return Ok(answer);
                }
                RoundState::Failed(e) => {
                    tracing::warn!(rounds, error = %e, "round failed");
                    return Err(e);
                }
            };
        }
    }

    async fn await_model(
        &self,
        conversation: &mut Conversation,
        tools: &[ToolSchema],
        round: usize,
        cancel: &CancellationToken,
    ) -> RoundState {
        tracing::debug!(round, messages = conversation.len(), "calling model");

        let request = ModelRequest {
            messages: conversation.messages(),
            tools,
        };
        let call = self.backend.call(request);
        let model_call = async {
            match self.config.model_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(Error::from),
                    Err(_) => Err(Error::TimedOut(limit)),
                },
                None => call.await.map_err(Error::from),
            }
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = model_call => result,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => return RoundState::Failed(e),
        };

        conversation.record_usage(response.usage);
        tracing::debug!(round, finish_reason = %response.finish_reason, "model responded");

        match response.finish_reason {
            FinishReason::Stop if response.message.tool_calls().is_empty() => {
                let answer = response.message.text().to_string();
                conversation.push(response.message);
                RoundState::Terminal(answer)
            }
            // Some compatible servers report `stop` alongside tool calls;
            // every call still needs its result before the next request.
            FinishReason::Stop | FinishReason::ToolCalls => RoundState::Dispatching {
                calls: response.message.tool_calls().to_vec(),
                assistant: response.message,
            },
            FinishReason::Length => RoundState::Failed(Error::ModelTruncated),
            FinishReason::ContentFilter => RoundState::Failed(Error::ContentFiltered),
            FinishReason::FunctionCall => RoundState::Failed(Error::DeprecatedCallShape),
            FinishReason::Unknown(reason) => {
                RoundState::Failed(Error::UnknownFinishCondition(reason))
            }
        }
    }

    /// Answer every call, in request order. `None` if cancelled.
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Option<Vec<Message>> {
        let work = async {
            if self.config.concurrent_tools {
                join_all(calls.iter().map(|call| self.run_call(call))).await
            } else {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(self.run_call(call).await);
                }
                results
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            results = work => Some(results),
        }
    }

    async fn run_call(&self, call: &ToolCall) -> Message {
        let Some(descriptor) = self.registry.find(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested an unknown tool");
            return Message::ToolResult {
                call_id: call.id.clone(),
                content: UNKNOWN_TOOL_RESULT.to_string(),
                is_error: false,
            };
        };

        tracing::debug!(tool = %call.name, arguments = ?call.arguments, "executing tool");
        let bound = binder::bind(descriptor, &call.arguments);
        let outcome = binder::invoke(&bound, self.config.tool_timeout).await;
        let is_error = outcome.is_error();

        Message::ToolResult {
            call_id: call.id.clone(),
            content: outcome.into_text(),
            is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelResponse, Usage};
    use crate::tools::{Arguments, BoundArguments, ToolDefinition, ToolError, handler_fn};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records what each request carried.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<ModelResponse>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl Scripted {
        fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                seen: Mutex::default(),
            }
        }
    }

    impl Backend for Scripted {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::Api("script exhausted".into()))
        }
    }

    fn stop(text: &str) -> ModelResponse {
        ModelResponse {
            finish_reason: FinishReason::Stop,
            message: Message::assistant(text),
            usage: Usage {
                input_tokens: 3,
                output_tokens: 1,
            },
        }
    }

    fn calls(calls: Vec<ToolCall>) -> ModelResponse {
        ModelResponse {
            finish_reason: FinishReason::ToolCalls,
            message: Message::assistant_with_calls("", calls),
            usage: Usage::default(),
        }
    }

    fn finish(reason: FinishReason) -> ModelResponse {
        ModelResponse {
            finish_reason: reason,
            message: Message::assistant("partial"),
            usage: Usage::default(),
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDefinition::new("Echo", "Echo the text back")
                    .parameter("Text", "Text to echo")
                    .handler(handler_fn(|args: BoundArguments| async move {
                        Ok::<_, ToolError>(args.get("Text").to_string())
                    })),
            )
            .unwrap();
        registry
            .register(
                ToolDefinition::new("Fail", "Always fails").handler(handler_fn(|_| async {
                    Err::<String, _>(ToolError::Execution("nope".into()))
                })),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn echo(id: &str, text: &str) -> ToolCall {
        ToolCall::new(id, "Echo", Arguments::new().with("Text", text))
    }

    #[tokio::test]
    async fn stop_appends_one_assistant_message() {
        let orchestrator = Orchestrator::new(Scripted::new([stop("4")]), registry());
        let mut conversation = orchestrator.start_session("Be brief");

        let answer = orchestrator.ask(&mut conversation, "2+2?").await.unwrap();

        assert_eq!(answer, "4");
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.messages()[2], Message::assistant("4"));
        assert_eq!(conversation.usage().input_tokens, 3);
    }

    #[tokio::test]
    async fn tool_calls_are_answered_in_order_before_next_round() {
        let backend = Scripted::new([
            calls(vec![echo("a", "one"), echo("b", "two"), echo("c", "three")]),
            stop("done"),
        ]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        orchestrator.ask(&mut conversation, "go").await.unwrap();

        let seen = orchestrator.backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let second = &seen[1];
        // system, user, assistant, 3 results
        assert_eq!(second.len(), 6);
        let results: Vec<_> = second[3..]
            .iter()
            .map(|m| match m {
                Message::ToolResult {
                    call_id, content, ..
                } => (call_id.as_str(), content.as_str()),
                other => panic!("expected tool result, got {other:?}"),
            })
            .collect();
        assert_eq!(results, [("a", "one"), ("b", "two"), ("c", "three")]);
    }

    #[tokio::test]
    async fn concurrent_dispatch_keeps_request_order() {
        let backend = Scripted::new([
            calls(vec![echo("a", "one"), echo("b", "two")]),
            stop("done"),
        ]);
        let orchestrator = Orchestrator::new(backend, registry())
            .with_config(OrchestratorConfig::default().concurrent_tools(true));
        let mut conversation = orchestrator.start_session("sys");

        orchestrator.ask(&mut conversation, "go").await.unwrap();

        let ids: Vec<_> = conversation
            .messages()
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_tool_gets_fallback_text() {
        let backend = Scripted::new([
            calls(vec![ToolCall::new("x", "Missing", Arguments::new())]),
            stop("sorry"),
        ]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        let answer = orchestrator.ask(&mut conversation, "go").await.unwrap();

        assert_eq!(answer, "sorry");
        assert_eq!(
            conversation.messages()[3],
            Message::ToolResult {
                call_id: "x".into(),
                content: UNKNOWN_TOOL_RESULT.into(),
                is_error: false,
            }
        );
    }

    #[tokio::test]
    async fn tool_failure_is_reported_to_the_model() {
        let backend = Scripted::new([
            calls(vec![ToolCall::new("f", "Fail", Arguments::new())]),
            stop("it failed"),
        ]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        orchestrator.ask(&mut conversation, "go").await.unwrap();

        match &conversation.messages()[3] {
            Message::ToolResult {
                content, is_error, ..
            } => {
                assert!(*is_error);
                assert_eq!(content, "Tool 'Fail' failed: execution failed: nope");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn hard_finish_reasons_fail_without_appending() {
        let cases = [
            (FinishReason::Length, "ModelTruncated"),
            (FinishReason::ContentFilter, "ContentFiltered"),
            (FinishReason::FunctionCall, "DeprecatedCallShape"),
            (FinishReason::Unknown("eos".into()), "UnknownFinishCondition"),
        ];
        for (reason, expected) in cases {
            let orchestrator = Orchestrator::new(Scripted::new([finish(reason)]), registry());
            let mut conversation = orchestrator.start_session("sys");

            let err = orchestrator.ask(&mut conversation, "go").await.unwrap_err();

            assert!(format!("{err:?}").starts_with(expected), "{err:?}");
            assert_eq!(conversation.len(), 2);
        }
    }

    #[tokio::test]
    async fn failure_keeps_earlier_rounds() {
        let backend = Scripted::new([
            calls(vec![echo("a", "one")]),
            finish(FinishReason::Length),
        ]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        let err = orchestrator.ask(&mut conversation, "go").await.unwrap_err();

        assert!(matches!(err, Error::ModelTruncated));
        // system, user, assistant with call, tool result
        assert_eq!(conversation.len(), 4);
    }

    #[tokio::test]
    async fn round_limit_is_enforced() {
        let backend = Scripted::new([
            calls(vec![echo("a", "1")]),
            calls(vec![echo("b", "2")]),
            calls(vec![echo("c", "3")]),
        ]);
        let orchestrator = Orchestrator::new(backend, registry())
            .with_config(OrchestratorConfig::default().max_rounds(2));
        let mut conversation = orchestrator.start_session("sys");

        let err = orchestrator.ask(&mut conversation, "go").await.unwrap_err();

        assert!(matches!(err, Error::RoundLimitExceeded(2)));
        assert_eq!(orchestrator.backend.seen.lock().unwrap().len(), 2);
        // system, user, then two assistant + result pairs
        assert_eq!(conversation.len(), 6);
    }

    #[tokio::test]
    async fn backend_error_surfaces_as_model_error() {
        let orchestrator = Orchestrator::new(Scripted::new([]), registry());
        let mut conversation = orchestrator.start_session("sys");

        let err = orchestrator.ask(&mut conversation, "go").await.unwrap_err();

        assert!(matches!(err, Error::Model(ModelError::Api(_))));
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_round_leaves_log_intact() {
        let orchestrator = Orchestrator::new(Scripted::new([stop("never")]), registry());
        let mut conversation = orchestrator.start_session("sys");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .ask_with_cancel(&mut conversation, "go", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn stop_with_tool_calls_still_answers_them() {
        let backend = Scripted::new([
            ModelResponse {
                finish_reason: FinishReason::Stop,
                message: Message::assistant_with_calls("", vec![echo("a", "one")]),
                usage: Usage::default(),
            },
            stop("done"),
        ]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        let answer = orchestrator.ask(&mut conversation, "go").await.unwrap();

        assert_eq!(answer, "done");
        let messages = conversation.messages();
        let call_count: usize = messages.iter().map(|m| m.tool_calls().len()).sum();
        let result_count = messages
            .iter()
            .filter(|m| matches!(m, Message::ToolResult { .. }))
            .count();
        assert_eq!(call_count, 1);
        assert_eq!(result_count, 1);
        assert_eq!(orchestrator.backend.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_round_limit_still_calls_the_model_once() {
        let config = OrchestratorConfig {
            max_rounds: 0,
            ..OrchestratorConfig::default()
        };
        let orchestrator =
            Orchestrator::new(Scripted::new([stop("4")]), registry()).with_config(config);
        let mut conversation = orchestrator.start_session("sys");

        assert_eq!(orchestrator.ask(&mut conversation, "2+2?").await.unwrap(), "4");

        let config = OrchestratorConfig {
            max_rounds: 0,
            ..OrchestratorConfig::default()
        };
        let looping = Orchestrator::new(
            Scripted::new([calls(vec![echo("a", "1")]), stop("late")]),
            registry(),
        )
        .with_config(config);
        let mut conversation = looping.start_session("sys");
        let err = looping.ask(&mut conversation, "go").await.unwrap_err();
        assert!(matches!(err, Error::RoundLimitExceeded(1)));
    }

    /// Never answers within any reasonable test timeout.
    struct Stalled;

    impl Backend for Stalled {
        async fn call(
            &self,
            _request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(stop("too late"))
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let limit = Duration::from_millis(20);
        let orchestrator = Orchestrator::new(Stalled, registry())
            .with_config(OrchestratorConfig::default().model_timeout(limit));
        let mut conversation = orchestrator.start_session("sys");

        let err = orchestrator.ask(&mut conversation, "go").await.unwrap_err();

        assert!(matches!(err, Error::TimedOut(d) if d == limit));
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn cancel_during_dispatch_drops_the_whole_round() {
        let started = Arc::new(tokio::sync::Notify::new());
        let mut slow = ToolRegistry::new();
        slow.register(ToolDefinition::new("Slow", "Takes forever").handler(handler_fn({
            let started = Arc::clone(&started);
            move |_args: BoundArguments| {
                let started = Arc::clone(&started);
                async move {
                    started.notify_one();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, ToolError>("finished".to_string())
                }
            }
        })))
        .unwrap();

        let backend = Scripted::new([
            calls(vec![ToolCall::new("s", "Slow", Arguments::new())]),
            stop("never"),
        ]);
        let orchestrator = Orchestrator::new(backend, Arc::new(slow));
        let mut conversation = orchestrator.start_session("sys");
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(
            orchestrator.ask_with_cancel(&mut conversation, "go", &cancel),
            async {
                started.notified().await;
                cancel.cancel();
            }
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        // system and user only; no assistant call without its result
        assert_eq!(conversation.len(), 2);
        assert_eq!(orchestrator.backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn later_asks_continue_the_log() {
        let backend = Scripted::new([stop("first"), stop("second")]);
        let orchestrator = Orchestrator::new(backend, registry());
        let mut conversation = orchestrator.start_session("sys");

        orchestrator.ask(&mut conversation, "one").await.unwrap();
        let answer = orchestrator.ask(&mut conversation, "two").await.unwrap();

        assert_eq!(answer, "second");
        assert_eq!(conversation.len(), 5);
        let seen = orchestrator.backend.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 4);
    }
}
