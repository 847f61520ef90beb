use serde_json::{Map, Value, json};
use tracing::debug;

use crate::document::{DocumentCodec, DocumentError, opt_string};

pub mod options;
pub mod security;
pub mod transport;

pub use options::{MuxSettings, SockoptSettings};
pub use security::{RealitySettings, TlsSettings};
pub use transport::{
    GrpcSettings, HttpUpgradeSettings, KcpSettings, RangeValue, TcpSettings, WsSettings,
    XhttpSettings, XmuxSettings,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Network {
    #[default]
    Tcp,
    Kcp,
    Ws,
    Grpc,
    HttpUpgrade,
    Xhttp,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Kcp => "kcp",
            Self::Ws => "ws",
            Self::Grpc => "grpc",
            Self::HttpUpgrade => "httpupgrade",
            Self::Xhttp => "xhttp",
        }
    }

    /// Canonical names plus the aliases Xray still accepts (`raw`, `mkcp`, `splithttp`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "tcp" | "raw" | "none" => Some(Self::Tcp),
            "kcp" | "mkcp" => Some(Self::Kcp),
            "ws" | "websocket" => Some(Self::Ws),
            "grpc" => Some(Self::Grpc),
            "httpupgrade" => Some(Self::HttpUpgrade),
            "xhttp" | "splithttp" => Some(Self::Xhttp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Security {
    #[default]
    None,
    Tls,
    Reality,
}

impl Security {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tls => "tls",
            Self::Reality => "reality",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" | "" => Some(Self::None),
            "tls" => Some(Self::Tls),
            "reality" => Some(Self::Reality),
            _ => None,
        }
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of the transport settings selected by [`StreamSettings::network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSettings<'a> {
    Tcp(&'a TcpSettings),
    Kcp(&'a KcpSettings),
    Ws(&'a WsSettings),
    Grpc(&'a GrpcSettings),
    HttpUpgrade(&'a HttpUpgradeSettings),
    Xhttp(&'a XhttpSettings),
}

impl NetworkSettings<'_> {
    pub fn document_key(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcpSettings",
            Self::Kcp(_) => "kcpSettings",
            Self::Ws(_) => "wsSettings",
            Self::Grpc(_) => "grpcSettings",
            Self::HttpUpgrade(_) => "httpupgradeSettings",
            Self::Xhttp(_) => "xhttpSettings",
        }
    }

    pub fn to_document(&self) -> Value {
        match self {
            Self::Tcp(s) => s.to_document(),
            Self::Kcp(s) => s.to_document(),
            Self::Ws(s) => s.to_document(),
            Self::Grpc(s) => s.to_document(),
            Self::HttpUpgrade(s) => s.to_document(),
            Self::Xhttp(s) => s.to_document(),
        }
    }
}

/// Borrowed view of the security layer selected by [`StreamSettings::security`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySettings<'a> {
    None,
    Tls(&'a TlsSettings),
    Reality(&'a RealitySettings),
}

impl SecuritySettings<'_> {
    pub fn document_key(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Tls(_) => Some("tlsSettings"),
            Self::Reality(_) => Some("realitySettings"),
        }
    }

    pub fn to_document(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Tls(s) => Some(s.to_document()),
            Self::Reality(s) => Some(s.to_document()),
        }
    }
}

/// Transport and security settings of an outbound.
///
/// Every transport keeps its own settings object; only the one matching `network` is written
/// out or used for links. The same holds for `tls`/`reality` against `security`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSettings {
    pub network: Network,
    pub security: Security,
    pub tls: TlsSettings,
    pub reality: RealitySettings,
    pub tcp: TcpSettings,
    pub kcp: KcpSettings,
    pub ws: WsSettings,
    pub grpc: GrpcSettings,
    pub httpupgrade: HttpUpgradeSettings,
    pub xhttp: XhttpSettings,
    pub sockopt: Option<SockoptSettings>,
}

impl StreamSettings {
    pub fn new(network: Network, security: Security) -> Self {
        Self {
            network,
            security,
            ..Self::default()
        }
    }

    pub fn network_settings(&self) -> NetworkSettings<'_> {
        match self.network {
            Network::Tcp => NetworkSettings::Tcp(&self.tcp),
            Network::Kcp => NetworkSettings::Kcp(&self.kcp),
            Network::Ws => NetworkSettings::Ws(&self.ws),
            Network::Grpc => NetworkSettings::Grpc(&self.grpc),
            Network::HttpUpgrade => NetworkSettings::HttpUpgrade(&self.httpupgrade),
            Network::Xhttp => NetworkSettings::Xhttp(&self.xhttp),
        }
    }

    pub fn security_settings(&self) -> SecuritySettings<'_> {
        match self.security {
            Security::None => SecuritySettings::None,
            Security::Tls => SecuritySettings::Tls(&self.tls),
            Security::Reality => SecuritySettings::Reality(&self.reality),
        }
    }

    /// The `{sockopt}`-only document used by outbounds that carry no stream.
    pub fn sockopt_document(&self) -> Option<Value> {
        self.sockopt
            .as_ref()
            .map(|sockopt| json!({ "sockopt": sockopt.to_document() }))
    }
}

fn section(doc: &Value, key: &str) -> Value {
    doc.get(key).cloned().unwrap_or(Value::Null)
}

impl StreamSettings {
    /// Reads a `streamSettings` document. An unknown `network` or `security` name is `Ok(None)`.
    pub fn from_known_document(doc: &Value) -> Result<Option<Self>, DocumentError> {
        let network = match opt_string(doc, "network", "streamSettings.network")? {
            None => Network::default(),
            Some(name) => match Network::parse(&name) {
                Some(network) => network,
                None => {
                    debug!(network = %name, "stream document has unknown network");
                    return Ok(None);
                }
            },
        };
        let security = match opt_string(doc, "security", "streamSettings.security")? {
            None => Security::default(),
            Some(name) => match Security::parse(&name) {
                Some(security) => security,
                None => {
                    debug!(security = %name, "stream document has unknown security");
                    return Ok(None);
                }
            },
        };
        Ok(Some(Self {
            network,
            security,
            tls: TlsSettings::from_document(&section(doc, "tlsSettings"))?,
            reality: RealitySettings::from_document(&section(doc, "realitySettings"))?,
            tcp: TcpSettings::from_document(&section(doc, "tcpSettings"))?,
            kcp: KcpSettings::from_document(&section(doc, "kcpSettings"))?,
            ws: WsSettings::from_document(&section(doc, "wsSettings"))?,
            grpc: GrpcSettings::from_document(&section(doc, "grpcSettings"))?,
            httpupgrade: HttpUpgradeSettings::from_document(&section(doc, "httpupgradeSettings"))?,
            xhttp: XhttpSettings::from_document(&section(doc, "xhttpSettings"))?,
            sockopt: SockoptSettings::from_optional_document(doc.get("sockopt"))?,
        }))
    }
}

impl DocumentCodec for StreamSettings {
    /// Strict form of [`StreamSettings::from_known_document`]: unknown enumeration names are
    /// reported as [`DocumentError::InvalidField`].
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        Self::from_known_document(doc)?.ok_or_else(|| DocumentError::InvalidField {
            field: "streamSettings",
            reason: format!(
                "unknown network {:?} or security {:?}",
                doc.get("network").unwrap_or(&Value::Null),
                doc.get("security").unwrap_or(&Value::Null)
            ),
        })
    }

    fn to_document(&self) -> Value {
        let mut out = Map::new();
        out.insert("network".to_string(), json!(self.network.as_str()));
        out.insert("security".to_string(), json!(self.security.as_str()));

        let security = self.security_settings();
        if let (Some(key), Some(doc)) = (security.document_key(), security.to_document()) {
            out.insert(key.to_string(), doc);
        }

        let network = self.network_settings();
        out.insert(network.document_key().to_string(), network.to_document());

        if let Some(sockopt) = &self.sockopt {
            out.insert("sockopt".to_string(), sockopt.to_document());
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_stream_is_plain_tcp() {
        let stream = StreamSettings::from_document(&json!({})).unwrap();
        assert_eq!(stream, StreamSettings::default());
        assert_eq!(
            stream.to_document(),
            json!({
                "network": "tcp",
                "security": "none",
                "tcpSettings": {"header": {"type": "none"}}
            })
        );
    }

    #[test]
    fn writer_serializes_the_active_network_settings() {
        let mut stream = StreamSettings::new(Network::Ws, Security::None);
        stream.ws = WsSettings {
            path: "/ws".to_string(),
            host: "cdn.example".to_string(),
            heartbeat_period: 10,
        };
        stream.tcp = TcpSettings::new("http", "tcp.example", "/tcp");
        let doc = stream.to_document();
        assert_eq!(
            doc["wsSettings"],
            json!({"path": "/ws", "host": "cdn.example", "heartbeatPeriod": 10})
        );
        assert!(doc.get("tcpSettings").is_none());

        let mut grpc = StreamSettings::new(Network::Grpc, Security::None);
        grpc.grpc.service_name = "svc".to_string();
        assert_eq!(grpc.to_document()["grpcSettings"]["serviceName"], json!("svc"));

        let mut kcp = StreamSettings::new(Network::Kcp, Security::None);
        kcp.kcp.seed = "seed".to_string();
        assert_eq!(kcp.to_document()["kcpSettings"]["seed"], json!("seed"));

        let mut upgrade = StreamSettings::new(Network::HttpUpgrade, Security::None);
        upgrade.httpupgrade.path = "/up".to_string();
        assert_eq!(upgrade.to_document()["httpupgradeSettings"]["path"], json!("/up"));

        let mut xhttp = StreamSettings::new(Network::Xhttp, Security::None);
        xhttp.xhttp.mode = "packet-up".to_string();
        assert_eq!(xhttp.to_document()["xhttpSettings"]["mode"], json!("packet-up"));
    }

    #[test]
    fn only_active_security_is_written() {
        let mut stream = StreamSettings::new(Network::Tcp, Security::Reality);
        stream.tls.server_name = "ignored".to_string();
        stream.reality.public_key = "PBK".to_string();
        let doc = stream.to_document();
        assert!(doc.get("tlsSettings").is_none());
        assert_eq!(doc["realitySettings"]["publicKey"], json!("PBK"));
    }

    #[test]
    fn inactive_settings_are_retained_on_read() {
        let doc = json!({
            "network": "ws",
            "security": "tls",
            "tlsSettings": {"serverName": "example.com"},
            "wsSettings": {"path": "/ws"},
            "grpcSettings": {"serviceName": "kept"}
        });
        let stream = StreamSettings::from_document(&doc).unwrap();
        assert_eq!(stream.network, Network::Ws);
        assert_eq!(stream.tls.server_name, "example.com");
        assert_eq!(stream.grpc.service_name, "kept");
        assert_eq!(
            stream.network_settings(),
            NetworkSettings::Ws(&stream.ws)
        );
    }

    #[test]
    fn stream_documents_are_idempotent() {
        let doc = json!({
            "network": "splithttp",
            "security": "tls",
            "tlsSettings": {"serverName": "x", "alpn": ["h2"]},
            "xhttpSettings": {"path": "/x", "xmux": {"maxConcurrency": 4}},
            "sockopt": {"tcpFastOpen": true}
        });
        let first = StreamSettings::from_document(&doc).unwrap();
        assert_eq!(first.network, Network::Xhttp);
        let second = StreamSettings::from_document(&first.to_document()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_document()["network"], json!("xhttp"));
    }

    #[test]
    fn unknown_network_or_security_is_no_result() {
        assert_eq!(
            StreamSettings::from_known_document(&json!({"network": "quic"})).unwrap(),
            None
        );
        assert_eq!(
            StreamSettings::from_known_document(&json!({"network": "ws", "security": "xtls"}))
                .unwrap(),
            None
        );
        let err = StreamSettings::from_document(&json!({"network": "h2"})).unwrap_err();
        assert!(err.to_string().contains("h2"));
    }

    #[test]
    fn malformed_known_fields_stay_errors() {
        let err = StreamSettings::from_known_document(&json!({"network": 7})).unwrap_err();
        assert!(err.to_string().contains("streamSettings.network"));
    }

    #[test]
    fn sockopt_only_document() {
        let mut stream = StreamSettings::default();
        assert_eq!(stream.sockopt_document(), None);
        stream.sockopt = Some(SockoptSettings {
            dialer_proxy: "chain".to_string(),
            ..SockoptSettings::default()
        });
        assert_eq!(
            stream.sockopt_document().unwrap()["sockopt"]["dialerProxy"],
            json!("chain")
        );
    }
}
