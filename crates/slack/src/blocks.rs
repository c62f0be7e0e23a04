use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// Message body shared by `chat.postMessage`, `chat.postEphemeral` and `chat.update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(" "))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Escapes the three characters Slack treats as control sequences in mrkdwn.
pub fn escape_mrkdwn(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn status_pending(target: &str) -> MessageTemplate {
    let target = escape_mrkdwn(target);
    MessageBuilder::new(format!("Looking up company data for {target}..."))
        .section("company.status.pending.v1", |section| {
            section.mrkdwn(format!(":hourglass_flowing_sand: Looking up company data for {target}..."));
        })
        .build()
}

pub fn status_completed(target: &str, company_name: Option<&str>, filename: &str) -> MessageTemplate {
    let target = escape_mrkdwn(target);
    let headline = match company_name {
        Some(name) => format!("*{}* ({target})", escape_mrkdwn(name)),
        None => target.clone(),
    };

    MessageBuilder::new(format!("Company data ready for {target}"))
        .section("company.status.completed.v1", |section| {
            section.mrkdwn(format!(":white_check_mark: Company data ready for {headline}"));
        })
        .context("company.status.file.v1", |context| {
            context.mrkdwn(format!("Full response attached in thread as `{}`", escape_mrkdwn(filename)));
        })
        .build()
}

pub fn status_failed(target: &str, error_text: &str, correlation_id: &str) -> MessageTemplate {
    let target = escape_mrkdwn(target);
    let error_text = escape_mrkdwn(error_text);
    MessageBuilder::new(format!("Company lookup failed for {target}: {error_text}"))
        .section("company.status.failed.v1", |section| {
            section.mrkdwn(format!(":warning: Company lookup failed for {target}\n{error_text}"));
        })
        .context("company.status.failed.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn usage_message(command: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Usage: {command} <company website or LinkedIn URL>"))
        .section("company.help.summary.v1", |section| {
            section.mrkdwn(format!(
                "*Look up a company*\n• `{command} https://example.com`\n• `{command} https://www.linkedin.com/company/example`\n\nYou can also DM me `company <url>` or mention me with `company <url>`."
            ));
        })
        .build()
}

pub fn unknown_command_message(received: &str, command: &str) -> MessageTemplate {
    let received = escape_mrkdwn(received.trim());
    MessageBuilder::new(format!("Unknown command: {received}"))
        .section("company.unknown_command.v1", |section| {
            section.mrkdwn(format!(
                ":grey_question: Unknown command: `{received}`. Try `{command} https://example.com`."
            ));
        })
        .build()
}

pub fn invalid_target_message(input: &str, reason: &str, command: &str) -> MessageTemplate {
    let input = escape_mrkdwn(input.trim());
    let reason = escape_mrkdwn(reason);
    MessageBuilder::new(format!("That doesn't look like a company URL: {reason}"))
        .section("company.invalid.summary.v1", |section| {
            if input.is_empty() {
                section.mrkdwn(format!(":grey_question: Please provide a URL, e.g. `{command} https://example.com`."));
            } else {
                section.mrkdwn(format!(
                    ":grey_question: `{input}` doesn't look like a company URL ({reason}).\nTry `{command} https://example.com` or a LinkedIn company page."
                ));
            }
        })
        .build()
}
