use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex, task::JoinSet};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    events::{EventContext, EventDispatcher, SlackEnvelope, SlackEvent},
    web::{open_socket_url, slack_http_client, DEFAULT_SLACK_API_BASE_URL},
};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    #[error("slack asked for a new connection: {0}")]
    RefreshRequested(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Shared flag the health endpoint reads to report socket state.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStatus(Arc<AtomicBool>);

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type SlackSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a real websocket.
///
/// Every `connect` asks `apps.connections.open` for a fresh URL, since Slack
/// URLs are single use. A server close or a `disconnect` frame surfaces as
/// [`TransportError::RefreshRequested`]; the stream never ends with `Ok(None)`.
pub struct WebSocketTransport {
    http: reqwest::Client,
    api_base_url: String,
    app_token: SecretString,
    socket: Mutex<Option<SlackSocket>>,
}

impl WebSocketTransport {
    pub fn new(app_token: SecretString) -> Result<Self, TransportError> {
        let http = slack_http_client().map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self::with_http_client(http, DEFAULT_SLACK_API_BASE_URL, app_token))
    }

    pub fn with_http_client(http: reqwest::Client, api_base_url: &str, app_token: SecretString) -> Self {
        Self {
            http,
            api_base_url: api_base_url.to_owned(),
            app_token,
            socket: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = open_socket_url(&self.http, &self.api_base_url, &self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.socket.lock().await = Some(socket);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.socket.lock().await;
        let Some(socket) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            let Some(message) = socket.next().await else {
                *guard = None;
                return Err(TransportError::RefreshRequested("stream ended".to_owned()));
            };

            match message.map_err(|error| TransportError::Receive(error.to_string()))? {
                Message::Text(text) => match interpret_text_frame(&text) {
                    FrameAction::Deliver(envelope) => return Ok(Some(envelope)),
                    FrameAction::Refresh(reason) => {
                        *guard = None;
                        return Err(TransportError::RefreshRequested(reason));
                    }
                    FrameAction::Skip => {}
                },
                Message::Ping(payload) => socket
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|error| TransportError::Receive(error.to_string()))?,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_owned());
                    *guard = None;
                    return Err(TransportError::RefreshRequested(reason));
                }
                _ => {}
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.socket.lock().await;
        let socket = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("socket is not connected".to_owned()))?;

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        socket
            .send(Message::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut socket) = self.socket.lock().await.take() else {
            return Ok(());
        };
        socket.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FrameAction {
    Deliver(SlackEnvelope),
    Refresh(String),
    Skip,
}

fn interpret_text_frame(text: &str) -> FrameAction {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(error = %error, "discarding socket frame that is not json");
            return FrameAction::Skip;
        }
    };

    match frame.get("type").and_then(Value::as_str) {
        Some("hello") => {
            let connections =
                frame.pointer("/num_connections").and_then(Value::as_u64).unwrap_or(0);
            debug!(connections, "socket mode hello received");
            FrameAction::Skip
        }
        Some("disconnect") => FrameAction::Refresh(
            frame.get("reason").and_then(Value::as_str).unwrap_or("disconnect").to_owned(),
        ),
        _ => match SlackEnvelope::from_socket_frame(&frame) {
            Some(envelope) => FrameAction::Deliver(envelope),
            None => FrameAction::Skip,
        },
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
    status: ConnectionStatus,
    drain_timeout: Duration,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            reconnect_policy,
            status: ConnectionStatus::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    pub async fn start(&self) -> Result<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Runs until the transport ends, retries are exhausted or `shutdown` resolves,
    /// then waits up to the drain timeout for in-flight lookups.
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut tasks = JoinSet::new();
        let result = tokio::select! {
            result = self.run(&mut tasks) => result,
            () = shutdown => {
                info!(event_name = "ingress.slack.shutdown", "shutdown requested; closing socket");
                Ok(())
            }
        };

        self.status.set_connected(false);
        if let Err(error) = self.transport.disconnect().await {
            warn!(error = %error, "socket mode disconnect failed during shutdown");
        }
        self.drain(tasks).await;
        result
    }

    async fn run(&self, tasks: &mut JoinSet<()>) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.connect_and_pump(attempt, tasks).await {
                Ok(()) => return Ok(()),
                Err(TransportError::RefreshRequested(reason)) => {
                    self.status.set_connected(false);
                    info!(
                        event_name = "ingress.slack.refresh",
                        reason = %reason,
                        "socket mode connection refresh; reconnecting"
                    );
                    attempt = 0;
                }
                Err(transport_error) => {
                    if self.status.is_connected() {
                        attempt = 0;
                    }
                    self.status.set_connected(false);
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; stopping runner"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        self.status.set_connected(true);
        info!(attempt, "socket mode transport connected");

        loop {
            reap_finished(tasks);

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.status.set_connected(false);
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel_id, user_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                user_id = user_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move {
                let context = EventContext { correlation_id: envelope.envelope_id.clone() };
                if let Err(error) = dispatcher.dispatch(&envelope, &context).await {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            });
        }
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        info!(in_flight = tasks.len(), "waiting for in-flight slack events");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                log_join_failure(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                drain_timeout_ms = self.drain_timeout.as_millis() as u64,
                "in-flight slack events did not finish before shutdown; aborting"
            );
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        log_join_failure(joined);
    }
}

fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        warn!(error = %error, "slack event task did not complete");
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::SlashCommand(payload) => {
            (Some(payload.channel_id.as_str()), Some(payload.user_id.as_str()))
        }
        SlackEvent::DirectMessage(event) | SlackEvent::AppMention(event) => {
            (Some(event.channel_id.as_str()), Some(event.user_id.as_str()))
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{
        interpret_text_frame, FrameAction, ReconnectPolicy, SocketModeRunner, SocketTransport,
        TransportError,
    };
    use crate::commands::{CompanyCommand, SlashCommandPayload};
    use crate::events::{lookup_dispatcher, EventContext, EventDispatcher, SlackEnvelope, SlackEvent};
    use crate::lookup::{CompanyLookupService, LookupError, LookupOutcome, Origin};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
        reject_acks: bool,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            if state.reject_acks {
                return Err(TransportError::Acknowledge("socket closed".to_owned()));
            }
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    fn unsupported(envelope_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported("env-1"))), Ok(None)],
        ));

        let runner = SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
        assert!(!runner.connection_status().is_connected());
    }

    #[tokio::test]
    async fn refresh_request_reconnects_without_spending_retries() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![
                Ok(Some(unsupported("env-1"))),
                Err(TransportError::RefreshRequested("refresh_requested".to_owned())),
                Ok(Some(unsupported("env-2"))),
                Ok(None),
            ],
        ));

        let runner = SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(0));

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2"]);
    }

    #[tokio::test]
    async fn receive_error_after_connect_resets_backoff() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Receive("reset".to_owned())),
                Err(TransportError::Receive("reset".to_owned())),
                Ok(None),
            ],
        ));

        let runner = SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(1));

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    struct SlowService {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompanyLookupService for SlowService {
        async fn handle_command(
            &self,
            _command: CompanyCommand,
            _origin: &Origin,
            ctx: &EventContext,
        ) -> Result<LookupOutcome, LookupError> {
            self.started.lock().await.push(ctx.correlation_id.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(LookupOutcome::UsageShown)
        }
    }

    fn slash(envelope_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/company".to_owned(),
                text: "acme.com".to_owned(),
                channel_id: "C1".to_owned(),
                user_id: "U1".to_owned(),
                ..SlashCommandPayload::default()
            }),
        }
    }

    #[tokio::test]
    async fn envelopes_are_acknowledged_before_handlers_finish_and_drained_on_exit() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(slash("env-a"))), Ok(Some(slash("env-b"))), Ok(None)],
        ));
        let service = Arc::new(SlowService { started: Mutex::new(Vec::new()) });

        let runner = SocketModeRunner::new(
            transport.clone(),
            lookup_dispatcher(service.clone(), "/company"),
            no_delay(0),
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.acknowledgements().await, vec!["env-a", "env-b"]);
        let mut started = service.started.lock().await.clone();
        started.sort();
        assert_eq!(started, vec!["env-a", "env-b"]);
    }

    #[tokio::test]
    async fn failed_acknowledgement_still_dispatches() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(slash("env-x"))), Ok(None)],
        ));
        transport.state.lock().await.reject_acks = true;
        let service = Arc::new(SlowService { started: Mutex::new(Vec::new()) });

        let runner = SocketModeRunner::new(
            transport.clone(),
            lookup_dispatcher(service.clone(), "/company"),
            no_delay(0),
        );

        runner.start().await.expect("runner should not fail");

        assert!(transport.acknowledgements().await.is_empty());
        assert_eq!(*service.started.lock().await, vec!["env-x"]);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_runner_and_disconnects() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("down".to_owned()))],
            vec![],
        ));
        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 10, base_delay_ms: 60_000, max_delay_ms: 60_000 },
        );

        runner
            .start_with_shutdown(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
            .await
            .expect("shutdown is clean");

        assert_eq!(transport.connect_attempts().await, 1);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn text_frames_are_classified() {
        assert_eq!(interpret_text_frame(r#"{"type":"hello","num_connections":1}"#), FrameAction::Skip);
        assert_eq!(
            interpret_text_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#),
            FrameAction::Refresh("refresh_requested".to_owned())
        );
        assert_eq!(interpret_text_frame("not json"), FrameAction::Skip);

        let frame = r#"{"type":"slash_commands","envelope_id":"env-1","payload":{"command":"/company","text":"acme.com","channel_id":"C1","user_id":"U1"}}"#;
        assert!(matches!(
            interpret_text_frame(frame),
            FrameAction::Deliver(SlackEnvelope { ref envelope_id, .. }) if envelope_id == "env-1"
        ));
    }

    #[test]
    fn correlation_fields_read_channel_and_user() {
        let envelope = slash("env-9");
        let (channel, user) = super::correlation_fields(&envelope);
        assert_eq!(channel, Some("C1"));
        assert_eq!(user, Some("U1"));
        assert_eq!(super::correlation_fields(&unsupported("env-0")), (None, None));
    }
}
