pub mod config;
pub mod doctor;
pub mod lookup;

use std::path::Path;

use firmscope_core::EnrichmentError;
use serde::Serialize;

/// Process exit codes shared by every subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    ChecksFailed,
    Config,
    InvalidTarget,
    Enrichment,
    Runtime,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ChecksFailed => 1,
            Self::Config => 2,
            Self::InvalidTarget => 3,
            Self::Enrichment => 4,
            Self::Runtime => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Default, Serialize)]
struct CommandOutcome {
    command: String,
    status: &'static str,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

impl CommandResult {
    pub fn raw(status: ExitStatus, output: impl Into<String>) -> Self {
        Self { exit_code: status.code(), output: output.into() }
    }

    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok",
            message: message.into(),
            ..CommandOutcome::default()
        };
        Self::raw(ExitStatus::Success, serialize_payload(&payload))
    }

    /// Reports a lookup whose JSON body went to a file rather than stdout.
    pub fn written(command: &str, target: &str, path: &Path, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok",
            message: message.into(),
            target: Some(target.to_string()),
            output_path: Some(path.display().to_string()),
            ..CommandOutcome::default()
        };
        Self::raw(ExitStatus::Success, serialize_payload(&payload))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        status: ExitStatus,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error",
            error_class: Some(error_class.to_string()),
            message: message.into(),
            ..CommandOutcome::default()
        };
        Self::raw(status, serialize_payload(&payload))
    }

    /// Maps an upstream failure to its stable class, keeping any rate-limit hint.
    pub fn enrichment_failure(command: &str, target: &str, error: &EnrichmentError) -> Self {
        let retry_after_secs = match error {
            EnrichmentError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error",
            error_class: Some(error.class().to_string()),
            message: error.to_string(),
            target: Some(target.to_string()),
            retry_after_secs,
            ..CommandOutcome::default()
        };
        Self::raw(ExitStatus::Enrichment, serialize_payload(&payload))
    }
}

fn serialize_payload(payload: &CommandOutcome) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use firmscope_core::EnrichmentError;
    use serde_json::Value;

    use super::{CommandResult, ExitStatus};

    fn payload(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("outcome should be JSON")
    }

    #[test]
    fn rate_limited_lookup_keeps_retry_hint() {
        let error = EnrichmentError::RateLimited { retry_after_secs: Some(30) };
        let result = CommandResult::enrichment_failure("lookup", "https://acme.com", &error);

        assert_eq!(result.exit_code, ExitStatus::Enrichment.code());
        let payload = payload(&result);
        assert_eq!(payload["error_class"], "rate_limited");
        assert_eq!(payload["retry_after_secs"], 30);
        assert_eq!(payload["target"], "https://acme.com");
    }

    #[test]
    fn other_enrichment_failures_omit_retry_hint() {
        let result =
            CommandResult::enrichment_failure("lookup", "acme.com", &EnrichmentError::NotFound);

        let payload = payload(&result);
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload.get("retry_after_secs").is_none());
    }

    #[test]
    fn written_outcome_names_the_output_file() {
        let result = CommandResult::written(
            "lookup",
            "https://acme.com",
            Path::new("out/acme.json"),
            "wrote Acme data",
        );

        assert_eq!(result.exit_code, 0);
        let payload = payload(&result);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["output_path"], "out/acme.json");
        assert_eq!(payload["error_class"], Value::Null);
    }

    #[test]
    fn plain_failure_has_no_lookup_fields() {
        let result =
            CommandResult::failure("lookup", "config_validation", "missing", ExitStatus::Config);

        assert_eq!(result.exit_code, 2);
        let payload = payload(&result);
        assert!(payload.get("target").is_none());
        assert!(payload.get("output_path").is_none());
    }
}
