use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DocumentCodec, DocumentError, decode, encode};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsSettings {
    pub server_name: String,
    pub alpn: Vec<String>,
    pub fingerprint: String,
    pub allow_insecure: bool,
}

/// REALITY: TLS camouflage keyed by an x25519 public key and a short id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealitySettings {
    pub public_key: String,
    pub fingerprint: String,
    pub server_name: String,
    pub short_id: String,
    pub spider_x: String,
}

impl Default for RealitySettings {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            fingerprint: String::new(),
            server_name: String::new(),
            short_id: String::new(),
            spider_x: "/".to_string(),
        }
    }
}

impl DocumentCodec for TlsSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

impl DocumentCodec for RealitySettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}
