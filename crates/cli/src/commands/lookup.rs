use std::fs;
use std::path::Path;

use firmscope_core::config::{AppConfig, LoadOptions};
use firmscope_core::{EnrichmentProvider, LookupTarget};
use firmscope_enrich::EnrichmentClient;

use super::{CommandResult, ExitStatus};

/// Runs a single enrichment call and prints the JSON body, or writes it to `output`.
pub fn run(raw: &str, output: Option<&Path>) -> CommandResult {
    // Validate before touching config so a typo never needs credentials to diagnose.
    let target = match LookupTarget::parse(raw) {
        Ok(target) => target,
        Err(error) => {
            return CommandResult::failure(
                "lookup",
                "invalid_target",
                error.to_string(),
                ExitStatus::InvalidTarget,
            )
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "lookup",
                "config_validation",
                error.to_string(),
                ExitStatus::Config,
            )
        }
    };

    let client = match EnrichmentClient::from_config(&config.enrichment) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "lookup",
                error.class(),
                error.to_string(),
                ExitStatus::Runtime,
            )
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "lookup",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                ExitStatus::Runtime,
            )
        }
    };

    let profile = match runtime.block_on(client.enrich(&target)) {
        Ok(profile) => profile,
        Err(error) => {
            return CommandResult::enrichment_failure("lookup", &target.to_string(), &error)
        }
    };

    let body = match profile.to_pretty_json() {
        Ok(body) => body,
        Err(error) => {
            return CommandResult::failure(
                "lookup",
                "serialization",
                error.to_string(),
                ExitStatus::Runtime,
            )
        }
    };

    let Some(path) = output else {
        return CommandResult::raw(ExitStatus::Success, body);
    };

    if let Err(error) = fs::write(path, body.as_bytes()) {
        return CommandResult::failure(
            "lookup",
            "write_output",
            format!("could not write `{}`: {error}", path.display()),
            ExitStatus::Runtime,
        );
    }

    let name = profile.display_name().unwrap_or("company");
    CommandResult::written(
        "lookup",
        &target.to_string(),
        path,
        format!("wrote {name} data for {target} to {}", path.display()),
    )
}
