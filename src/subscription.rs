use base64::Engine as _;
use tracing::{debug, warn};

use crate::link::{LinkError, LinkOptions, decode_base64_lenient, generate_link, parse_link};
use crate::outbound::Outbound;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    Link { line: usize, source: LinkError },
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link { line, source } => write!(f, "subscription line {line}: {source}"),
        }
    }
}

impl std::error::Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Link { source, .. } => Some(source),
        }
    }
}

/// A generated subscription in both of its wire forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub raw: String,
    pub base64: String,
}

/// One link per outbound that has a link format, in input order.
pub fn build_raw_lines(outbounds: &[Outbound], options: &LinkOptions) -> Vec<String> {
    outbounds
        .iter()
        .filter_map(|outbound| {
            let link = generate_link(outbound, options);
            if link.is_none() {
                debug!(tag = %outbound.tag, protocol = %outbound.protocol, "outbound skipped in subscription");
            }
            link
        })
        .collect()
}

pub fn build_raw_text(outbounds: &[Outbound], options: &LinkOptions) -> String {
    join_lines_with_trailing_newline(&build_raw_lines(outbounds, options))
}

pub fn build_base64(outbounds: &[Outbound], options: &LinkOptions) -> String {
    let raw = build_raw_text(outbounds, options);
    base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
}

pub fn build_subscription(outbounds: &[Outbound], options: &LinkOptions) -> Subscription {
    let raw = build_raw_text(outbounds, options);
    let base64 = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
    Subscription { raw, base64 }
}

/// Parses raw or base64 subscription text.
///
/// Lines that are not links this codec understands are skipped; a line that breaks the grammar
/// of a known scheme fails the whole parse with its 1-based line number.
pub fn parse_subscription(text: &str) -> Result<Vec<Outbound>, SubscriptionError> {
    let text = decode_subscription_text(text);
    let mut outbounds = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_link(line) {
            Ok(Some(outbound)) => outbounds.push(outbound),
            Ok(None) => warn!(line = idx + 1, "skipping unsupported subscription line"),
            Err(source) => {
                return Err(SubscriptionError::Link {
                    line: idx + 1,
                    source,
                });
            }
        }
    }
    Ok(outbounds)
}

fn decode_subscription_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.contains("://") {
        return text.to_string();
    }
    match decode_base64_lenient(trimmed).map(String::from_utf8) {
        Ok(Ok(decoded)) => decoded,
        _ => text.to_string(),
    }
}

fn join_lines_with_trailing_newline(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(line);
    }
    out.push('\n');
    out
}
