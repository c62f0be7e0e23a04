use std::{sync::Arc, time::Duration};

use firmscope_core::config::{AppConfig, ConfigError};
use firmscope_core::EnrichmentError;
use firmscope_enrich::EnrichmentClient;
use firmscope_slack::{
    events::lookup_dispatcher,
    lookup::CompanyLookupFlow,
    socket::{ReconnectPolicy, SocketModeRunner, TransportError, WebSocketTransport},
    web::{HttpSlackWebApi, SlackApiError},
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("enrichment client setup failed: {0}")]
    EnrichmentClient(#[source] EnrichmentError),
    #[error("slack web api client setup failed: {0}")]
    SlackWebApi(#[source] SlackApiError),
    #[error("slack socket transport setup failed: {0}")]
    SlackTransport(#[source] TransportError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        slash_command = %config.slack.command,
        enrichment_base_url = %config.enrichment.base_url,
        "starting application bootstrap"
    );
    config.validate()?;

    let provider = Arc::new(
        EnrichmentClient::from_config(&config.enrichment)
            .map_err(BootstrapError::EnrichmentClient)?,
    );
    let slack = Arc::new(
        HttpSlackWebApi::new(config.slack.bot_token.clone()).map_err(BootstrapError::SlackWebApi)?,
    );
    let flow = Arc::new(CompanyLookupFlow::new(provider, slack, config.slack.command.clone()));
    let dispatcher = lookup_dispatcher(flow, config.slack.command.clone());
    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        handler_count = dispatcher.handler_count(),
        "slack event handlers registered"
    );

    let transport = Arc::new(
        WebSocketTransport::new(config.slack.app_token.clone())
            .map_err(BootstrapError::SlackTransport)?,
    );
    let slack_runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default())
        .with_drain_timeout(Duration::from_secs(config.server.graceful_shutdown_secs));

    Ok(Application { config, slack_runner })
}

#[cfg(test)]
mod tests {
    use firmscope_core::config::AppConfig;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.slack.app_token = "xapp-test".to_string().into();
        config.slack.bot_token = "xoxb-test".to_string().into();
        config.enrichment.api_key = "aviato-test".to_string().into();
        config
    }

    #[test]
    fn bootstrap_fails_fast_on_malformed_slack_token() {
        let mut config = valid_config();
        config.slack.app_token = "invalid-token".to_string().into();

        let message = bootstrap_with_config(config).err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[test]
    fn bootstrap_rejects_config_that_skipped_validation() {
        let result = bootstrap_with_config(AppConfig::default());
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }

    #[tokio::test]
    async fn bootstrap_wires_runner_without_connecting() {
        let app = bootstrap_with_config(valid_config()).expect("bootstrap should succeed");

        assert_eq!(app.config.slack.command, "/company");
        assert!(!app.slack_runner.connection_status().is_connected());
    }
}
