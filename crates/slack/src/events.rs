use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    commands::{parse_message_text, parse_slash_command, CompanyCommand, SlashCommandPayload},
    lookup::{CompanyLookupService, LookupError, Origin, Surface},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    DirectMessage(MessageEvent),
    AppMention(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::DirectMessage(_) => SlackEventType::DirectMessage,
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    DirectMessage,
    AppMention,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "channel")]
    pub channel_id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl MessageEvent {
    /// Replies stay in the existing thread, or start one under the message.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

impl SlackEnvelope {
    /// Decodes a Socket Mode frame carrying an envelope.
    ///
    /// Returns `None` for control frames (`hello`, `disconnect`) and frames
    /// without an `envelope_id`. Payloads that do not decode are still
    /// returned as [`SlackEvent::Unsupported`] so they get acknowledged.
    pub fn from_socket_frame(frame: &Value) -> Option<Self> {
        let envelope_id = frame.get("envelope_id")?.as_str()?.to_owned();
        let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or_default();
        let payload = frame.get("payload").cloned().unwrap_or(Value::Null);

        let event = match frame_type {
            "slash_commands" => serde_json::from_value::<SlashCommandPayload>(payload)
                .map(SlackEvent::SlashCommand)
                .unwrap_or_else(|_| unsupported("slash_commands")),
            "events_api" => decode_events_api(&payload),
            other => unsupported(other),
        };

        Some(Self { envelope_id, event })
    }
}

fn decode_events_api(payload: &Value) -> SlackEvent {
    let Some(event) = payload.get("event") else {
        return unsupported("events_api");
    };
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();

    match event_type {
        "app_mention" => serde_json::from_value::<MessageEvent>(event.clone())
            .map(SlackEvent::AppMention)
            .unwrap_or_else(|_| unsupported("app_mention")),
        "message" => {
            let from_bot = event.get("bot_id").is_some_and(|value| !value.is_null());
            let has_subtype = event.get("subtype").is_some_and(|value| !value.is_null());
            let is_im = event.get("channel_type").and_then(Value::as_str) == Some("im");
            if from_bot || has_subtype || !is_im {
                return unsupported("message");
            }
            serde_json::from_value::<MessageEvent>(event.clone())
                .map(SlackEvent::DirectMessage)
                .unwrap_or_else(|_| unsupported("message"))
        }
        other => unsupported(other),
    }
}

fn unsupported(event_type: &str) -> SlackEvent {
    SlackEvent::Unsupported { event_type: event_type.to_owned() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Routes the slash command, direct messages and mentions to one lookup service.
pub fn lookup_dispatcher<S>(service: Arc<S>, slash_command: impl Into<String>) -> EventDispatcher
where
    S: CompanyLookupService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service.clone(), slash_command));
    dispatcher.register(DirectMessageHandler::new(service.clone()));
    dispatcher.register(AppMentionHandler::new(service));
    dispatcher
}

pub struct SlashCommandHandler<S> {
    service: Arc<S>,
    command: String,
}

impl<S> SlashCommandHandler<S>
where
    S: CompanyLookupService,
{
    pub fn new(service: Arc<S>, command: impl Into<String>) -> Self {
        Self { service, command: command.into() }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: CompanyLookupService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = parse_slash_command(payload, &self.command);
        if let CompanyCommand::Unsupported { command } = &command {
            warn!(
                event_name = "ingress.slack.command_unsupported",
                correlation_id = %ctx.correlation_id,
                command = %command,
                expected = %self.command,
                "slash command name does not match configuration"
            );
        }

        let origin = Origin {
            channel_id: payload.channel_id.clone(),
            user_id: payload.user_id.clone(),
            thread_ts: None,
            response_url: Some(payload.response_url.clone()).filter(|url| !url.is_empty()),
            surface: Surface::SlashCommand,
        };
        self.service.handle_command(command, &origin, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct DirectMessageHandler<S> {
    service: Arc<S>,
}

impl<S> DirectMessageHandler<S>
where
    S: CompanyLookupService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for DirectMessageHandler<S>
where
    S: CompanyLookupService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::DirectMessage
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::DirectMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let Some(command) = parse_message_text(&event.text) else {
            debug!(
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                "direct message is not a company command"
            );
            return Ok(HandlerResult::Ignored);
        };

        let origin = message_origin(event, Surface::DirectMessage);
        self.service.handle_command(command, &origin, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct AppMentionHandler<S> {
    service: Arc<S>,
}

impl<S> AppMentionHandler<S>
where
    S: CompanyLookupService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for AppMentionHandler<S>
where
    S: CompanyLookupService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        // Anything a mention says that is not `company <url>` gets the usage text.
        let command = parse_message_text(&event.text).unwrap_or(CompanyCommand::Help);

        let origin = message_origin(event, Surface::Mention);
        self.service.handle_command(command, &origin, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

fn message_origin(event: &MessageEvent, surface: Surface) -> Origin {
    Origin {
        channel_id: event.channel_id.clone(),
        user_id: event.user_id.clone(),
        thread_ts: Some(event.reply_thread_ts().to_owned()),
        response_url: None,
        surface,
    }
}
