//! Lookup target validation.
//!
//! A [`LookupTarget`] is the only thing the enrichment client accepts, so
//! anything that fails [`LookupTarget::parse`] never leaves the process.

use std::fmt;

use thiserror::Error;
use url::{Host, Url};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupTarget {
    Website { url: String },
    LinkedIn { url: String, company_id: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("no URL was provided")]
    Empty,
    #[error("`{input}` is not a valid URL")]
    Malformed { input: String },
    #[error("unsupported URL scheme `{scheme}` (expected http or https)")]
    UnsupportedScheme { scheme: String },
    #[error("`{input}` does not point at a public website")]
    MissingHost { input: String },
    #[error(
        "`{input}` is a LinkedIn URL but not a company page (expected linkedin.com/company/<name>)"
    )]
    LinkedInProfileMissingCompany { input: String },
}

impl LookupTarget {
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let unwrapped = unwrap_slack_link(raw.trim());
        if unwrapped.is_empty() {
            return Err(TargetError::Empty);
        }
        if unwrapped.chars().any(char::is_whitespace) {
            return Err(TargetError::Malformed { input: unwrapped.to_owned() });
        }

        let normalized = if has_scheme(unwrapped) {
            unwrapped.to_owned()
        } else {
            format!("https://{unwrapped}")
        };

        let parsed = Url::parse(&normalized)
            .map_err(|_| TargetError::Malformed { input: unwrapped.to_owned() })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(TargetError::UnsupportedScheme { scheme: other.to_owned() }),
        }

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if is_public_domain(domain) => domain.to_ascii_lowercase(),
            _ => return Err(TargetError::MissingHost { input: unwrapped.to_owned() }),
        };

        if is_linkedin_host(&host) {
            let company_id = linkedin_company_id(&parsed).ok_or_else(|| {
                TargetError::LinkedInProfileMissingCompany { input: unwrapped.to_owned() }
            })?;
            return Ok(Self::LinkedIn { url: normalized, company_id });
        }

        Ok(Self::Website { url: normalized })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Website { url } | Self::LinkedIn { url, .. } => url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Website { .. } => "website",
            Self::LinkedIn { .. } => "linkedin",
        }
    }

    /// Filesystem-safe stem naming the uploaded JSON file.
    pub fn file_stem(&self) -> String {
        match self {
            Self::LinkedIn { company_id, .. } => format!("linkedin-{}", slug(company_id)),
            Self::Website { url } => {
                let host = Url::parse(url)
                    .ok()
                    .and_then(|parsed| parsed.host_str().map(str::to_owned))
                    .unwrap_or_default();
                let host = host.strip_prefix("www.").unwrap_or(&host);
                slug(host)
            }
        }
    }
}

impl fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slack rewrites pasted links as `<https://x|label>` or `<https://x>`.
fn unwrap_slack_link(input: &str) -> &str {
    let Some(inner) = input.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) else {
        return input;
    };
    inner.split('|').next().unwrap_or(inner).trim()
}

fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

fn is_public_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return false;
    }

    let tld = labels[labels.len() - 1];
    tld.starts_with("xn--") || (tld.len() >= 2 && tld.chars().all(|ch| ch.is_ascii_alphabetic()))
}

fn is_linkedin_host(host: &str) -> bool {
    host == "linkedin.com" || host.ends_with(".linkedin.com")
}

fn linkedin_company_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    if segments.next()? != "company" {
        return None;
    }
    let company_id = segments.next()?.trim();
    (!company_id.is_empty()).then(|| company_id.to_owned())
}

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "company".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::{LookupTarget, TargetError};

    #[test]
    fn accepts_website_and_forwards_it_unchanged() {
        let target = LookupTarget::parse("https://www.example.com/about").expect("valid");
        assert_eq!(target, LookupTarget::Website { url: "https://www.example.com/about".into() });
        assert_eq!(target.as_str(), "https://www.example.com/about");
        assert_eq!(target.kind(), "website");
    }

    #[test]
    fn bare_domain_gets_https_prefix() {
        let target = LookupTarget::parse("  openai.com ").expect("valid");
        assert_eq!(target.as_str(), "https://openai.com");
    }

    #[test]
    fn unwraps_slack_link_markup() {
        let labelled = LookupTarget::parse("<https://stripe.com|stripe.com>").expect("valid");
        assert_eq!(labelled.as_str(), "https://stripe.com");

        let bare = LookupTarget::parse("<http://stripe.com>").expect("valid");
        assert_eq!(bare.as_str(), "http://stripe.com");
    }

    #[test]
    fn linkedin_company_url_extracts_company_id() {
        let target =
            LookupTarget::parse("https://www.linkedin.com/company/openai/").expect("valid");
        assert_eq!(
            target,
            LookupTarget::LinkedIn {
                url: "https://www.linkedin.com/company/openai/".into(),
                company_id: "openai".into(),
            }
        );
        assert_eq!(target.kind(), "linkedin");
        assert_eq!(target.file_stem(), "linkedin-openai");
    }

    #[test]
    fn linkedin_subpage_keeps_only_company_segment() {
        let target = LookupTarget::parse("linkedin.com/company/acme-corp/about").expect("valid");
        assert!(matches!(
            target,
            LookupTarget::LinkedIn { ref company_id, .. } if company_id == "acme-corp"
        ));
    }

    #[test]
    fn linkedin_personal_profile_is_rejected() {
        let error = LookupTarget::parse("https://linkedin.com/in/someone").expect_err("invalid");
        assert!(matches!(error, TargetError::LinkedInProfileMissingCompany { .. }));
    }

    #[test]
    fn rejects_empty_and_whitespace_input() {
        assert_eq!(LookupTarget::parse("   "), Err(TargetError::Empty));
        assert_eq!(LookupTarget::parse("<>"), Err(TargetError::Empty));
    }

    #[test]
    fn rejects_free_text() {
        assert!(matches!(
            LookupTarget::parse("acme corp"),
            Err(TargetError::Malformed { .. })
        ));
        assert!(matches!(LookupTarget::parse("notaurl"), Err(TargetError::MissingHost { .. })));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(
            LookupTarget::parse("ftp://example.com"),
            Err(TargetError::UnsupportedScheme { scheme: "ftp".into() })
        );
    }

    #[test]
    fn rejects_ip_literals_and_localhost() {
        assert!(matches!(
            LookupTarget::parse("http://127.0.0.1"),
            Err(TargetError::MissingHost { .. })
        ));
        assert!(matches!(
            LookupTarget::parse("http://localhost:8080"),
            Err(TargetError::MissingHost { .. })
        ));
        assert!(matches!(
            LookupTarget::parse("https://example.c0m"),
            Err(TargetError::MissingHost { .. })
        ));
    }

    #[test]
    fn file_stem_is_derived_from_host() {
        let target = LookupTarget::parse("https://www.Example.co.uk/path?q=1").expect("valid");
        assert_eq!(target.file_stem(), "example-co-uk");
    }
}
