use serde_json::{Map, Value, json};

use crate::document::{
    DocumentCodec, DocumentError, first_of, opt_bool, opt_port, opt_string, opt_u8, put_opt,
};

// Single-user only: the share link carries just the server key.
pub const SS2022_METHOD_2022_BLAKE3_CHACHA20_POLY1305: &str = "2022-blake3-chacha20-poly1305";

pub const VLESS_DEFAULT_ENCRYPTION: &str = "none";

pub fn is_ss2022_method(method: &str) -> bool {
    method.starts_with("2022")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Freedom,
    Blackhole,
    Dns,
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Socks,
    Http,
    Wireguard,
}

impl Protocol {
    pub const ALL: [Protocol; 10] = [
        Self::Freedom,
        Self::Blackhole,
        Self::Dns,
        Self::Vmess,
        Self::Vless,
        Self::Trojan,
        Self::Shadowsocks,
        Self::Socks,
        Self::Http,
        Self::Wireguard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Freedom => "freedom",
            Self::Blackhole => "blackhole",
            Self::Dns => "dns",
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "shadowsocks",
            Self::Socks => "socks",
            Self::Http => "http",
            Self::Wireguard => "wireguard",
        }
    }

    /// Checked lookup; unknown names are `None`, never an error.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Like [`Protocol::parse`] but also accepts the `ss` link scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ss" => Some(Self::Shadowsocks),
            other => Self::parse(other),
        }
    }

    /// Whether outbounds of this protocol negotiate stream (transport + security) settings.
    pub fn can_carry_stream(self) -> bool {
        matches!(
            self,
            Self::Vmess | Self::Vless | Self::Trojan | Self::Shadowsocks
        )
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmessSettings {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub uuid: Option<String>,
    pub security: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlessSettings {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub uuid: Option<String>,
    pub flow: Option<String>,
    pub encryption: String,
}

impl Default for VlessSettings {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            uuid: None,
            flow: None,
            encryption: VLESS_DEFAULT_ENCRYPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrojanSettings {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowsocksSettings {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub method: Option<String>,
    /// UDP-over-TCP.
    pub uot: Option<bool>,
    pub uot_version: Option<u8>,
}

fn vnext_document(address: Option<&str>, port: Option<u16>, user: Map<String, Value>) -> Value {
    let mut server = Map::new();
    put_opt(&mut server, "address", address);
    put_opt(&mut server, "port", port);
    server.insert("users".to_string(), json!([user]));
    json!({ "vnext": [server] })
}

fn servers_document(address: Option<&str>, port: Option<u16>, rest: Map<String, Value>) -> Value {
    let mut server = Map::new();
    put_opt(&mut server, "address", address);
    put_opt(&mut server, "port", port);
    server.extend(rest);
    json!({ "servers": [server] })
}

impl DocumentCodec for VmessSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        let server = first_of(doc, "vnext");
        let user = first_of(server, "users");
        Ok(Self {
            address: opt_string(server, "address", "vnext[0].address")?,
            port: opt_port(server, "port")?,
            uuid: opt_string(user, "id", "vnext[0].users[0].id")?,
            security: opt_string(user, "security", "vnext[0].users[0].security")?,
        })
    }

    fn to_document(&self) -> Value {
        let mut user = Map::new();
        put_opt(&mut user, "id", self.uuid.as_deref());
        put_opt(&mut user, "security", self.security.as_deref());
        vnext_document(self.address.as_deref(), self.port, user)
    }
}

impl DocumentCodec for VlessSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        let server = first_of(doc, "vnext");
        let user = first_of(server, "users");
        Ok(Self {
            address: opt_string(server, "address", "vnext[0].address")?,
            port: opt_port(server, "port")?,
            uuid: opt_string(user, "id", "vnext[0].users[0].id")?,
            flow: opt_string(user, "flow", "vnext[0].users[0].flow")?,
            encryption: opt_string(user, "encryption", "vnext[0].users[0].encryption")?
                .unwrap_or_else(|| VLESS_DEFAULT_ENCRYPTION.to_string()),
        })
    }

    fn to_document(&self) -> Value {
        let mut user = Map::new();
        put_opt(&mut user, "id", self.uuid.as_deref());
        put_opt(&mut user, "flow", self.flow.as_deref());
        user.insert("encryption".to_string(), json!(self.encryption));
        vnext_document(self.address.as_deref(), self.port, user)
    }
}

impl DocumentCodec for TrojanSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        let server = first_of(doc, "servers");
        Ok(Self {
            address: opt_string(server, "address", "servers[0].address")?,
            port: opt_port(server, "port")?,
            password: opt_string(server, "password", "servers[0].password")?,
        })
    }

    fn to_document(&self) -> Value {
        let mut rest = Map::new();
        put_opt(&mut rest, "password", self.password.as_deref());
        servers_document(self.address.as_deref(), self.port, rest)
    }
}

impl DocumentCodec for ShadowsocksSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        let server = first_of(doc, "servers");
        Ok(Self {
            address: opt_string(server, "address", "servers[0].address")?,
            port: opt_port(server, "port")?,
            password: opt_string(server, "password", "servers[0].password")?,
            method: opt_string(server, "method", "servers[0].method")?,
            uot: opt_bool(server, "uot", "servers[0].uot")?,
            uot_version: opt_u8(server, "UoTVersion", "servers[0].UoTVersion")?,
        })
    }

    fn to_document(&self) -> Value {
        let mut rest = Map::new();
        put_opt(&mut rest, "method", self.method.as_deref());
        put_opt(&mut rest, "password", self.password.as_deref());
        put_opt(&mut rest, "uot", self.uot);
        put_opt(&mut rest, "UoTVersion", self.uot_version);
        servers_document(self.address.as_deref(), self.port, rest)
    }
}

/// Per-protocol endpoint and credential settings of an outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolSettings {
    Vmess(VmessSettings),
    Vless(VlessSettings),
    Trojan(TrojanSettings),
    Shadowsocks(ShadowsocksSettings),
}

impl ProtocolSettings {
    /// Empty settings for `protocol`, or `None` for protocols without settings.
    pub fn select_variant(protocol: Protocol) -> Option<Self> {
        match protocol {
            Protocol::Vmess => Some(Self::Vmess(VmessSettings::default())),
            Protocol::Vless => Some(Self::Vless(VlessSettings::default())),
            Protocol::Trojan => Some(Self::Trojan(TrojanSettings::default())),
            Protocol::Shadowsocks => Some(Self::Shadowsocks(ShadowsocksSettings::default())),
            Protocol::Freedom
            | Protocol::Blackhole
            | Protocol::Dns
            | Protocol::Socks
            | Protocol::Http
            | Protocol::Wireguard => None,
        }
    }

    /// [`ProtocolSettings::select_variant`] keyed by protocol name; unknown names are `None`.
    pub fn select_variant_named(name: &str) -> Option<Self> {
        Protocol::parse(name).and_then(Self::select_variant)
    }

    pub fn from_document(protocol: Protocol, doc: &Value) -> Result<Option<Self>, DocumentError> {
        let settings = match protocol {
            Protocol::Vmess => Self::Vmess(VmessSettings::from_document(doc)?),
            Protocol::Vless => Self::Vless(VlessSettings::from_document(doc)?),
            Protocol::Trojan => Self::Trojan(TrojanSettings::from_document(doc)?),
            Protocol::Shadowsocks => Self::Shadowsocks(ShadowsocksSettings::from_document(doc)?),
            _ => return Ok(None),
        };
        Ok(Some(settings))
    }

    pub fn to_document(&self) -> Value {
        match self {
            Self::Vmess(s) => s.to_document(),
            Self::Vless(s) => s.to_document(),
            Self::Trojan(s) => s.to_document(),
            Self::Shadowsocks(s) => s.to_document(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Vmess(_) => Protocol::Vmess,
            Self::Vless(_) => Protocol::Vless,
            Self::Trojan(_) => Protocol::Trojan,
            Self::Shadowsocks(_) => Protocol::Shadowsocks,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Vmess(s) => s.address.as_deref(),
            Self::Vless(s) => s.address.as_deref(),
            Self::Trojan(s) => s.address.as_deref(),
            Self::Shadowsocks(s) => s.address.as_deref(),
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Vmess(s) => s.port,
            Self::Vless(s) => s.port,
            Self::Trojan(s) => s.port,
            Self::Shadowsocks(s) => s.port,
        }
    }

    /// UUID for VMess/VLESS, password for Trojan/Shadowsocks.
    pub fn credential(&self) -> Option<&str> {
        match self {
            Self::Vmess(s) => s.uuid.as_deref(),
            Self::Vless(s) => s.uuid.as_deref(),
            Self::Trojan(s) => s.password.as_deref(),
            Self::Shadowsocks(s) => s.password.as_deref(),
        }
    }

    pub fn set_address(&mut self, address: Option<String>) {
        match self {
            Self::Vmess(s) => s.address = address,
            Self::Vless(s) => s.address = address,
            Self::Trojan(s) => s.address = address,
            Self::Shadowsocks(s) => s.address = address,
        }
    }

    pub fn set_port(&mut self, port: Option<u16>) {
        match self {
            Self::Vmess(s) => s.port = port,
            Self::Vless(s) => s.port = port,
            Self::Trojan(s) => s.port = port,
            Self::Shadowsocks(s) => s.port = port,
        }
    }

    pub fn set_credential(&mut self, credential: Option<String>) {
        match self {
            Self::Vmess(s) => s.uuid = credential,
            Self::Vless(s) => s.uuid = credential,
            Self::Trojan(s) => s.password = credential,
            Self::Shadowsocks(s) => s.password = credential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn protocol_lookup_is_checked() {
        assert_eq!(Protocol::parse("vless"), Some(Protocol::Vless));
        assert_eq!(Protocol::parse("bogus"), None);
        assert_eq!(Protocol::parse("VLESS"), None);
        assert_eq!(Protocol::from_scheme("ss"), Some(Protocol::Shadowsocks));
        for p in Protocol::ALL {
            assert_eq!(Protocol::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn only_proxy_protocols_carry_streams() {
        let carriers: Vec<Protocol> = Protocol::ALL
            .into_iter()
            .filter(|p| p.can_carry_stream())
            .collect();
        assert_eq!(
            carriers,
            vec![
                Protocol::Vmess,
                Protocol::Vless,
                Protocol::Trojan,
                Protocol::Shadowsocks
            ]
        );
    }

    #[test]
    fn select_variant_matches_protocol_and_never_fails() {
        assert!(matches!(
            ProtocolSettings::select_variant_named("vless"),
            Some(ProtocolSettings::Vless(_))
        ));
        assert_eq!(ProtocolSettings::select_variant_named("bogus"), None);
        assert_eq!(ProtocolSettings::select_variant(Protocol::Freedom), None);
        for p in Protocol::ALL {
            if let Some(settings) = ProtocolSettings::select_variant(p) {
                assert_eq!(settings.protocol(), p);
            }
        }
    }

    #[test]
    fn vless_reads_nested_user_and_defaults_encryption() {
        let doc = json!({
            "vnext": [{
                "address": "example.com",
                "port": 443,
                "users": [{"id": "11111111-1111-1111-1111-111111111111", "flow": "xtls-rprx-vision"}]
            }]
        });
        let settings = VlessSettings::from_document(&doc).unwrap();
        assert_eq!(settings.address.as_deref(), Some("example.com"));
        assert_eq!(settings.port, Some(443));
        assert_eq!(settings.flow.as_deref(), Some("xtls-rprx-vision"));
        assert_eq!(settings.encryption, "none");
    }

    #[test]
    fn missing_sections_resolve_to_defaults() {
        assert_eq!(
            VmessSettings::from_document(&json!({})).unwrap(),
            VmessSettings::default()
        );
        assert_eq!(
            ShadowsocksSettings::from_document(&json!({"servers": []})).unwrap(),
            ShadowsocksSettings::default()
        );
        assert_eq!(
            VlessSettings::from_document(&Value::Null).unwrap(),
            VlessSettings::default()
        );
    }

    #[test]
    fn shadowsocks_document_keeps_method_and_uot() {
        let settings = ShadowsocksSettings {
            address: Some("1.2.3.4".to_string()),
            port: Some(8388),
            password: Some("pass".to_string()),
            method: Some("aes-128-gcm".to_string()),
            uot: Some(true),
            uot_version: Some(2),
        };
        let doc = settings.to_document();
        assert_eq!(
            doc,
            json!({"servers": [{
                "address": "1.2.3.4",
                "port": 8388,
                "method": "aes-128-gcm",
                "password": "pass",
                "uot": true,
                "UoTVersion": 2
            }]})
        );
        assert_eq!(ShadowsocksSettings::from_document(&doc).unwrap(), settings);
    }

    #[test]
    fn documents_are_idempotent_after_first_read() {
        let docs = [
            (
                Protocol::Vmess,
                json!({"vnext": [{"address": "a", "port": 1, "users": [{"id": "u", "security": "auto", "alterId": 0}]}]}),
            ),
            (Protocol::Vless, json!({"vnext": [{"users": [{"id": "u", "flow": null}]}]})),
            (Protocol::Trojan, json!({"servers": [{"address": "t", "password": "p"}]})),
            (Protocol::Shadowsocks, json!({"servers": [{"method": "2022-blake3-aes-128-gcm", "password": "a:b"}]})),
        ];
        for (protocol, doc) in docs {
            let first = ProtocolSettings::from_document(protocol, &doc).unwrap().unwrap();
            let second = ProtocolSettings::from_document(protocol, &first.to_document())
                .unwrap()
                .unwrap();
            assert_eq!(first, second, "{protocol}");
        }
    }

    #[test]
    fn credential_accessor_is_polymorphic() {
        let mut trojan = ProtocolSettings::select_variant(Protocol::Trojan).unwrap();
        trojan.set_credential(Some("secret".to_string()));
        trojan.set_address(Some("t.example".to_string()));
        trojan.set_port(Some(443));
        assert_eq!(trojan.credential(), Some("secret"));
        assert_eq!(trojan.address(), Some("t.example"));
        assert_eq!(trojan.port(), Some(443));
        let ProtocolSettings::Trojan(inner) = trojan else {
            panic!("expected trojan settings");
        };
        assert_eq!(inner.password.as_deref(), Some("secret"));
    }

    #[test]
    fn wrong_port_type_is_a_document_error() {
        let doc = json!({"servers": [{"port": "443"}]});
        assert!(TrojanSettings::from_document(&doc).is_err());
    }
}
