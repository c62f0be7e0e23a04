use firmscope_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::{CommandResult, ExitStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let status = if report.overall_status == CheckStatus::Pass {
        ExitStatus::Success
    } else {
        ExitStatus::ChecksFailed
    };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::raw(status, output)
}

fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_tokens(&config));
            checks.push(check_enrichment(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_token_readiness", "enrichment_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "slack_token_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "app-level ({}) and bot ({}) token formats validated; listening for `{}`",
            token_prefix(config.slack.app_token.expose_secret()),
            token_prefix(config.slack.bot_token.expose_secret()),
            config.slack.command
        ),
    }
}

fn token_prefix(token: &str) -> &str {
    token.split_once('-').map(|(prefix, _)| prefix).unwrap_or("?")
}

fn check_enrichment(config: &AppConfig) -> DoctorCheck {
    let base_url = config.enrichment.base_url.trim().trim_end_matches('/');
    DoctorCheck {
        name: "enrichment_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "api key present; requests go to `{base_url}/company/enrich` with a {}s timeout",
            config.enrichment.timeout_secs
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use firmscope_core::config::AppConfig;

    use super::{build_report, render_human, CheckStatus};

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.slack.app_token = "xapp-test".to_string().into();
        config.slack.bot_token = "xoxb-test".to_string().into();
        config.enrichment.api_key = "key".to_string().into();
        config
    }

    #[test]
    fn load_failure_skips_dependent_checks() {
        let report = build_report::<&str>(Err("slack.app_token is required"));

        assert_eq!(report.overall_status, CheckStatus::Fail);
        let statuses: Vec<_> = report.checks.iter().map(|check| check.status).collect();
        assert_eq!(statuses, vec![CheckStatus::Fail, CheckStatus::Skipped, CheckStatus::Skipped]);
        assert!(render_human(&report).contains("- [fail] config_validation: slack.app_token"));
    }

    #[test]
    fn valid_config_passes_every_check() {
        let report = build_report::<&str>(Ok(valid_config()));

        assert_eq!(report.overall_status, CheckStatus::Pass);
        assert_eq!(report.checks.len(), 3);
        assert!(report.checks[2].details.contains("https://data.api.aviato.co/company/enrich"));
    }

    #[test]
    fn token_readiness_reports_prefixes_only() {
        let report = build_report::<&str>(Ok(valid_config()));
        let details = &report.checks[1].details;

        assert!(details.contains("(xapp)"));
        assert!(details.contains("(xoxb)"));
        assert!(!details.contains("xapp-test"));
    }
}
