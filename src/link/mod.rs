//! Share links: `vmess://`, `vless://`, `trojan://` and `ss://`.

use base64::Engine as _;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Deserialize;
use tracing::debug;

use crate::outbound::Outbound;
use crate::protocol::{Protocol, ProtocolSettings};
use crate::stream::Security;

pub mod query;
pub mod vmess;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    InvalidPort {
        port: String,
    },
    InvalidBase64 {
        scheme: &'static str,
        reason: String,
    },
    InvalidVmessJson {
        reason: String,
    },
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPort { port } => write!(f, "invalid port in link: {port:?}"),
            Self::InvalidBase64 { scheme, reason } => {
                write!(f, "invalid base64 in {scheme} link: {reason}")
            }
            Self::InvalidVmessJson { reason } => write!(f, "invalid vmess link body: {reason}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Which security layer a generated link advertises.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForceTls {
    /// Whatever the outbound's stream uses.
    #[default]
    Same,
    Tls,
    None,
    Reality,
}

impl ForceTls {
    pub fn resolve(self, stream: Security) -> Security {
        match self {
            Self::Same => stream,
            Self::Tls => Security::Tls,
            Self::None => Security::None,
            Self::Reality => Security::Reality,
        }
    }
}

/// Per-client values that replace the ones stored on the outbound template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientOverrides {
    #[serde(default, alias = "id", alias = "uuid", alias = "password")]
    pub credential: Option<String>,
    #[serde(default)]
    pub flow: Option<String>,
    /// VMess cipher.
    #[serde(default)]
    pub security: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOptions {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub force_tls: ForceTls,
    pub remark: Option<String>,
    pub client: ClientOverrides,
}

/// Address, port and remark after falling back to the outbound's own values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkTarget {
    pub address: String,
    pub port: u16,
    pub remark: String,
    pub security: Security,
}

impl LinkTarget {
    fn resolve(outbound: &Outbound, options: &LinkOptions) -> Option<Self> {
        let address = options
            .address
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| outbound.address().map(str::to_string))
            .filter(|a| !a.is_empty())?;
        let port = options.port.filter(|p| *p != 0).or(outbound.port())?;
        let remark = options
            .remark
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| outbound.tag.clone());
        Some(Self {
            address,
            port,
            remark,
            security: options.force_tls.resolve(outbound.stream.security),
        })
    }
}

/// Parses one share link.
///
/// `Ok(None)` means the text is not a link this codec understands (unknown scheme or shape).
/// `Err` means it claims a known scheme but breaks its grammar.
pub fn parse_link(link: &str) -> Result<Option<Outbound>, LinkError> {
    let link = link.trim();
    let Some((scheme, rest)) = link.split_once("://") else {
        debug!("link has no scheme separator");
        return Ok(None);
    };
    let scheme = scheme.to_ascii_lowercase();
    match (Protocol::from_scheme(&scheme), scheme.as_str()) {
        (Some(Protocol::Vmess), _) => vmess::parse(rest),
        (Some(protocol @ (Protocol::Vless | Protocol::Trojan)), _)
        | (Some(protocol @ Protocol::Shadowsocks), "ss") => query::parse(protocol, link),
        _ => {
            debug!(scheme = %scheme, "unsupported link scheme");
            Ok(None)
        }
    }
}

/// Generates the canonical share link for `outbound`.
///
/// `None` when the protocol has no link format or no address/port can be resolved.
pub fn generate_link(outbound: &Outbound, options: &LinkOptions) -> Option<String> {
    let Some(settings) = outbound.settings.as_ref() else {
        debug!(protocol = %outbound.protocol, "protocol has no share link format");
        return None;
    };
    let Some(target) = LinkTarget::resolve(outbound, options) else {
        debug!(tag = %outbound.tag, "outbound has no address or port to link to");
        return None;
    };
    let client = &options.client;
    match settings {
        ProtocolSettings::Vmess(s) => vmess::generate(&outbound.stream, s, client, &target),
        ProtocolSettings::Vless(s) => Some(query::generate_vless(&outbound.stream, s, client, &target)),
        ProtocolSettings::Trojan(s) => {
            Some(query::generate_trojan(&outbound.stream, s, client, &target))
        }
        ProtocolSettings::Shadowsocks(s) => {
            Some(query::generate_shadowsocks(&outbound.stream, s, client, &target))
        }
    }
}

impl Outbound {
    pub fn from_link(link: &str) -> Result<Option<Self>, LinkError> {
        parse_link(link)
    }

    pub fn generate_link(&self, options: &LinkOptions) -> Option<String> {
        generate_link(self, options)
    }
}

const RFC3986_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encodes everything outside the RFC 3986 unreserved set (a space becomes `%20`, not `+`).
pub(crate) fn percent_encode_rfc3986(input: &str) -> String {
    utf8_percent_encode(input, RFC3986_RESERVED).to_string()
}

pub(crate) fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Accepts padded or unpadded input in either the standard or the URL-safe alphabet.
pub(crate) fn decode_base64_lenient(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = cleaned.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(trimmed))
}

pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub(crate) fn default_tag(protocol: Protocol, port: u16) -> String {
    format!("out-{}-{}", protocol.as_str(), port)
}

/// Brackets bare IPv6 literals for use in `host:port`.
/// A port is a plain run of ASCII digits within `0..=65535`.
pub(crate) fn parse_port_digits(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

pub(crate) fn format_host(address: &str) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]")
    } else {
        address.to_string()
    }
}

pub(crate) fn strip_host_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
