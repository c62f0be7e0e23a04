use serde::Deserialize;

/// Form fields Slack sends for a slash command, as delivered in the Socket Mode payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    /// Webhook for private replies; usable even where the bot is not a member.
    #[serde(default)]
    pub response_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompanyCommand {
    Lookup { raw: String },
    Help,
    Unsupported { command: String },
}

/// Classifies a slash command addressed to `expected_command` (for example `/company`).
pub fn parse_slash_command(payload: &SlashCommandPayload, expected_command: &str) -> CompanyCommand {
    if !payload.command.trim().eq_ignore_ascii_case(expected_command) {
        return CompanyCommand::Unsupported { command: payload.command.clone() };
    }

    classify_argument(payload.text.trim())
}

/// Recognizes `company <url>` and `help` in a direct message or mention.
///
/// Mentions (`<@U123>`) are stripped first. A bare `company` still yields a
/// lookup with an empty argument so the caller can answer with a prompt.
/// Returns `None` for chatter that is not addressed to the bot.
pub fn parse_message_text(text: &str) -> Option<CompanyCommand> {
    let stripped = strip_mentions(text);
    let trimmed = stripped.trim();

    if trimmed.eq_ignore_ascii_case("help") {
        return Some(CompanyCommand::Help);
    }

    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };
    if !verb.eq_ignore_ascii_case("company") {
        return None;
    }

    Some(CompanyCommand::Lookup { raw: rest.to_owned() })
}

fn classify_argument(argument: &str) -> CompanyCommand {
    if argument.is_empty() || argument.eq_ignore_ascii_case("help") {
        CompanyCommand::Help
    } else {
        CompanyCommand::Lookup { raw: argument.to_owned() }
    }
}

fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}
