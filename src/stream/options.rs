use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DocumentCodec, DocumentError, decode, encode};

/// Socket options. Independent of network and security, and kept even for outbounds that do
/// not negotiate a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SockoptSettings {
    pub dialer_proxy: String,
    pub tcp_fast_open: bool,
    pub tcp_keep_alive_interval: u32,
    pub tcp_mptcp: bool,
    pub penetrate: bool,
    pub address_port_strategy: String,
}

impl Default for SockoptSettings {
    fn default() -> Self {
        Self {
            dialer_proxy: String::new(),
            tcp_fast_open: false,
            tcp_keep_alive_interval: 0,
            tcp_mptcp: false,
            penetrate: false,
            address_port_strategy: "none".to_string(),
        }
    }
}

impl SockoptSettings {
    /// An absent or empty `sockopt` document means no socket options at all.
    pub fn from_optional_document(doc: Option<&Value>) -> Result<Option<Self>, DocumentError> {
        match doc {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(doc) => Self::from_document(doc).map(Some),
        }
    }
}

impl DocumentCodec for SockoptSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

/// Connection multiplexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuxSettings {
    pub enable: bool,
    pub concurrency: i32,
    pub xudp_concurrency: i32,
    #[serde(rename = "xudpProxyUDP443")]
    pub xudp_proxy_udp443: String,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            enable: false,
            concurrency: 8,
            xudp_concurrency: 16,
            xudp_proxy_udp443: "reject".to_string(),
        }
    }
}

impl DocumentCodec for MuxSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}
