//! The company lookup flow behind `/company`, DMs and mentions.
//!
//! Each invocation walks the same straight line: validate the target, post a
//! status message, call the enrichment API once, upload the JSON into the
//! status thread and edit the status message exactly once with the result.

use std::sync::Arc;

use async_trait::async_trait;
use firmscope_core::{
    ApplicationError, CompanyProfile, EnrichmentProvider, InterfaceError, LookupTarget, TargetError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    blocks::{self, MessageTemplate},
    commands::CompanyCommand,
    events::EventContext,
    web::{FileUpload, MessageRef, SlackApiError, SlackWebApi},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    SlashCommand,
    DirectMessage,
    Mention,
}

impl Surface {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SlashCommand => "slash_command",
            Self::DirectMessage => "direct_message",
            Self::Mention => "mention",
        }
    }
}

/// Where a request came from and where replies belong.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub channel_id: String,
    pub user_id: String,
    /// Thread to reply in. Slash commands have none and start a thread under the status message.
    pub thread_ts: Option<String>,
    /// Slash command webhook for private replies.
    pub response_url: Option<String>,
    pub surface: Surface,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Completed { status: MessageRef, filename: String },
    Failed { status: MessageRef, error: InterfaceError },
    Rejected { reason: TargetError },
    UsageShown,
    UnknownCommand { command: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("failed to reply to the requester: {0}")]
    Reply(SlackApiError),
    #[error("failed to post the status message: {0}")]
    StatusMessage(SlackApiError),
    #[error("failed to update the status message: {0}")]
    StatusUpdate(SlackApiError),
}

#[async_trait]
pub trait CompanyLookupService: Send + Sync {
    async fn handle_command(
        &self,
        command: CompanyCommand,
        origin: &Origin,
        ctx: &EventContext,
    ) -> Result<LookupOutcome, LookupError>;
}

pub struct CompanyLookupFlow {
    provider: Arc<dyn EnrichmentProvider>,
    slack: Arc<dyn SlackWebApi>,
    command: String,
}

struct Delivered {
    filename: String,
    company_name: Option<String>,
}

impl CompanyLookupFlow {
    pub fn new(
        provider: Arc<dyn EnrichmentProvider>,
        slack: Arc<dyn SlackWebApi>,
        command: impl Into<String>,
    ) -> Self {
        Self { provider, slack, command: command.into() }
    }

    pub async fn lookup(
        &self,
        raw: &str,
        origin: &Origin,
        ctx: &EventContext,
    ) -> Result<LookupOutcome, LookupError> {
        let target = match LookupTarget::parse(raw) {
            Ok(target) => target,
            Err(reason) => {
                info!(
                    event_name = "lookup.target_rejected",
                    correlation_id = %ctx.correlation_id,
                    surface = origin.surface.label(),
                    error = %reason,
                    "rejected lookup input before calling enrichment api"
                );
                let prompt =
                    blocks::invalid_target_message(raw, &reason.to_string(), &self.command);
                self.reply(origin, &prompt).await?;
                return Ok(LookupOutcome::Rejected { reason });
            }
        };

        let status = match self
            .slack
            .post_message(
                &origin.channel_id,
                origin.thread_ts.as_deref(),
                &blocks::status_pending(target.as_str()),
            )
            .await
        {
            Ok(status) => status,
            Err(error) => {
                warn!(
                    event_name = "lookup.status_post_failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %origin.channel_id,
                    error = %error,
                    "could not post status message; abandoning lookup"
                );
                let notice = blocks::status_failed(
                    target.as_str(),
                    &status_post_failure_text(&error),
                    &ctx.correlation_id,
                );
                if let Err(reply_error) = self.send_reply(origin, &notice).await {
                    warn!(
                        event_name = "lookup.failure_reply_failed",
                        correlation_id = %ctx.correlation_id,
                        error = %reply_error,
                        "could not tell the requester the lookup was abandoned"
                    );
                }
                return Err(LookupError::StatusMessage(error));
            }
        };
        info!(
            event_name = "lookup.started",
            correlation_id = %ctx.correlation_id,
            surface = origin.surface.label(),
            target_kind = target.kind(),
            target = %target,
            status_ts = %status.ts,
            "company lookup started"
        );

        let thread_ts = origin.thread_ts.clone().unwrap_or_else(|| status.ts.clone());
        let (final_message, outcome) =
            match self.enrich_and_upload(&target, &status.channel, &thread_ts).await {
                Ok(delivered) => {
                    info!(
                        event_name = "lookup.completed",
                        correlation_id = %ctx.correlation_id,
                        target = %target,
                        filename = %delivered.filename,
                        "company lookup completed"
                    );
                    let message = blocks::status_completed(
                        target.as_str(),
                        delivered.company_name.as_deref(),
                        &delivered.filename,
                    );
                    (
                        message,
                        LookupOutcome::Completed {
                            status: status.clone(),
                            filename: delivered.filename,
                        },
                    )
                }
                Err(error) => {
                    warn!(
                        event_name = "lookup.failed",
                        correlation_id = %ctx.correlation_id,
                        target = %target,
                        error = %error,
                        "company lookup failed"
                    );
                    let interface = error.into_interface(ctx.correlation_id.clone());
                    let message = blocks::status_failed(
                        target.as_str(),
                        &interface.user_message(),
                        interface.correlation_id(),
                    );
                    (message, LookupOutcome::Failed { status: status.clone(), error: interface })
                }
            };

        self.slack.update_message(&status, &final_message).await.map_err(|error| {
            warn!(
                event_name = "lookup.status_update_failed",
                correlation_id = %ctx.correlation_id,
                status_ts = %status.ts,
                error = %error,
                "could not update status message"
            );
            LookupError::StatusUpdate(error)
        })?;

        Ok(outcome)
    }

    async fn enrich_and_upload(
        &self,
        target: &LookupTarget,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Delivered, ApplicationError> {
        let profile: CompanyProfile = self.provider.enrich(target).await?;
        let content = profile
            .to_pretty_json()
            .map_err(|error| ApplicationError::Serialization(error.to_string()))?;

        let filename = format!("company-{}.json", target.file_stem());
        let upload = FileUpload {
            channel_id: channel_id.to_owned(),
            thread_ts: Some(thread_ts.to_owned()),
            filename: filename.clone(),
            title: format!("Company enrichment: {target}"),
            content,
        };
        self.slack
            .upload_file(&upload)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        Ok(Delivered { filename, company_name: profile.display_name().map(str::to_owned) })
    }

    async fn reply(&self, origin: &Origin, message: &MessageTemplate) -> Result<(), LookupError> {
        self.send_reply(origin, message).await.map_err(LookupError::Reply)
    }

    /// Slash commands answer privately, preferring `response_url` since it
    /// works in channels the bot has not joined. Messages answer in thread.
    async fn send_reply(
        &self,
        origin: &Origin,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        match (origin.surface, origin.response_url.as_deref()) {
            (Surface::SlashCommand, Some(response_url)) => {
                self.slack.respond(response_url, message).await
            }
            (Surface::SlashCommand, None) => {
                self.slack
                    .post_ephemeral(
                        &origin.channel_id,
                        &origin.user_id,
                        origin.thread_ts.as_deref(),
                        message,
                    )
                    .await
            }
            (Surface::DirectMessage | Surface::Mention, _) => self
                .slack
                .post_message(&origin.channel_id, origin.thread_ts.as_deref(), message)
                .await
                .map(|_| ()),
        }
    }
}

#[async_trait]
impl CompanyLookupService for CompanyLookupFlow {
    async fn handle_command(
        &self,
        command: CompanyCommand,
        origin: &Origin,
        ctx: &EventContext,
    ) -> Result<LookupOutcome, LookupError> {
        match command {
            CompanyCommand::Lookup { raw } => self.lookup(&raw, origin, ctx).await,
            CompanyCommand::Help => {
                self.reply(origin, &blocks::usage_message(&self.command)).await?;
                Ok(LookupOutcome::UsageShown)
            }
            CompanyCommand::Unsupported { command } => {
                let message = blocks::unknown_command_message(&command, &self.command);
                self.reply(origin, &message).await?;
                Ok(LookupOutcome::UnknownCommand { command })
            }
        }
    }
}

fn status_post_failure_text(error: &SlackApiError) -> String {
    match error {
        SlackApiError::Api { error, .. }
            if matches!(error.as_str(), "not_in_channel" | "channel_not_found") =>
        {
            "I can't post in this channel. Invite the app here or send the request as a direct message."
                .to_owned()
        }
        _ => "Slack did not accept the status message, so the lookup was cancelled. Please try again."
            .to_owned(),
    }
}
