use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use firmscope_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigSource {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let path = resolve_config_path(None);
    let source = ConfigSource { doc: load_config_file_doc(path.as_deref()), path };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(source.line(
        "slack.app_token",
        &redact_token(config.slack.app_token.expose_secret()),
        &["FIRMSCOPE_SLACK_APP_TOKEN", "SLACK_APP_TOKEN"],
    ));
    lines.push(source.line(
        "slack.bot_token",
        &redact_token(config.slack.bot_token.expose_secret()),
        &["FIRMSCOPE_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
    ));
    lines.push(source.line("slack.command", &config.slack.command, &["FIRMSCOPE_SLACK_COMMAND"]));

    let api_key =
        if config.enrichment.api_key.expose_secret().is_empty() { "<unset>" } else { "<redacted>" };
    lines.push(source.line(
        "enrichment.api_key",
        api_key,
        &["FIRMSCOPE_ENRICHMENT_API_KEY", "AVIATO_API_KEY"],
    ));
    lines.push(source.line(
        "enrichment.base_url",
        &config.enrichment.base_url,
        &["FIRMSCOPE_ENRICHMENT_BASE_URL"],
    ));
    lines.push(source.line(
        "enrichment.timeout_secs",
        &config.enrichment.timeout_secs.to_string(),
        &["FIRMSCOPE_ENRICHMENT_TIMEOUT_SECS"],
    ));

    lines.push(source.line(
        "server.bind_address",
        &config.server.bind_address,
        &["FIRMSCOPE_SERVER_BIND_ADDRESS"],
    ));
    lines.push(source.line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        &["FIRMSCOPE_SERVER_HEALTH_CHECK_PORT"],
    ));
    lines.push(source.line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        &["FIRMSCOPE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    ));

    lines.push(source.line(
        "logging.level",
        &config.logging.level,
        &["FIRMSCOPE_LOGGING_LEVEL", "FIRMSCOPE_LOG_LEVEL"],
    ));
    lines.push(source.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["FIRMSCOPE_LOGGING_FORMAT", "FIRMSCOPE_LOG_FORMAT"],
    ));

    lines.join("\n")
}

impl ConfigSource {
    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        render_line(key_path, value, self.field_source(key_path, env_keys))
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        // Same lookup order as the loader: first non-blank variable wins.
        let env_hit = env_keys.iter().find(|key| {
            env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false)
        });
        if let Some(env_key) = env_hit {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token, render_line};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("xapp-1-A0-secret"), "xapp-***");
        assert_eq!(redact_token("  "), "<empty>");
        assert_eq!(redact_token("opaque"), "<redacted>");
    }

    #[test]
    fn nested_keys_are_found_in_file_doc() {
        let doc: Value = "[enrichment]\nbase_url = \"http://localhost\"\n"
            .parse()
            .expect("toml should parse");
        assert!(contains_path(&doc, "enrichment.base_url"));
        assert!(!contains_path(&doc, "enrichment.api_key"));
        assert!(!contains_path(&doc, "slack.command"));
    }

    #[test]
    fn rendered_line_names_its_source() {
        assert_eq!(
            render_line("slack.command", "/company", "default".to_string()),
            "- slack.command = /company (source: default)"
        );
    }
}
