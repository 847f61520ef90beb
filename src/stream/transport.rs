use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::document::{DocumentCodec, DocumentError, decode, encode, opt_string};
use crate::headers::{HeaderEntry, HeaderValue, fold_headers};

pub const HEADER_TYPE_NONE: &str = "none";
pub const HEADER_TYPE_HTTP: &str = "http";

fn default_header_type() -> String {
    HEADER_TYPE_NONE.to_string()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Comma-joins a string list (a bare string is taken as-is).
fn join_list(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn split_list(value: &str) -> Vec<&str> {
    value.split(',').filter(|s| !s.is_empty()).collect()
}

/// Raw TCP with an optional HTTP/1.1 request disguise.
///
/// `host` and `path` hold comma-joined lists; the document form stores them as arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSettings {
    pub header_type: String,
    pub host: String,
    pub path: String,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            header_type: default_header_type(),
            host: String::new(),
            path: String::new(),
        }
    }
}

impl TcpSettings {
    pub fn new(header_type: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            header_type: header_type.into(),
            host: host.into(),
            path: path.into(),
        }
    }

    pub fn is_http(&self) -> bool {
        self.header_type == HEADER_TYPE_HTTP
    }
}

impl DocumentCodec for TcpSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        let Some(header) = doc.get("header").filter(|h| !is_blank(h)) else {
            return Ok(Self::default());
        };
        let header_type = opt_string(header, "type", "tcpSettings.header.type")?
            .unwrap_or_else(default_header_type);
        let request = header.get("request").filter(|r| !is_blank(r));
        match request {
            Some(request) if header_type == HEADER_TYPE_HTTP => Ok(Self {
                header_type,
                host: join_list(request.pointer("/headers/Host")),
                path: join_list(request.get("path")),
            }),
            _ => Ok(Self::new(header_type, "", "")),
        }
    }

    fn to_document(&self) -> Value {
        let mut header = Map::new();
        header.insert("type".to_string(), json!(self.header_type));
        if self.is_http() {
            let hosts: Vec<HeaderEntry> = split_list(&self.host)
                .into_iter()
                .map(|host| HeaderEntry::new("Host", host))
                .collect();
            let mut headers = fold_headers(&hosts, true);
            headers
                .entry("Host".to_string())
                .or_insert_with(|| HeaderValue::List(Vec::new()));
            let path = if self.path.is_empty() {
                vec!["/"]
            } else {
                split_list(&self.path)
            };
            header.insert(
                "request".to_string(),
                json!({ "headers": headers, "path": path }),
            );
        }
        json!({ "header": header })
    }
}

mod nested_header_type {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Header {
        #[serde(rename = "type", default = "super::default_header_type")]
        kind: String,
    }

    pub fn serialize<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
        Header {
            kind: value.to_string(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(Header::deserialize(deserializer)?.kind)
    }
}

/// mKCP. The header type lives under `header.type` in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KcpSettings {
    pub mtu: u32,
    pub tti: u32,
    pub uplink_capacity: u32,
    pub downlink_capacity: u32,
    pub congestion: bool,
    pub read_buffer_size: u32,
    pub write_buffer_size: u32,
    #[serde(rename = "header", with = "nested_header_type")]
    pub header_type: String,
    pub seed: String,
}

impl Default for KcpSettings {
    fn default() -> Self {
        Self {
            mtu: 1350,
            tti: 50,
            uplink_capacity: 5,
            downlink_capacity: 20,
            congestion: false,
            read_buffer_size: 2,
            write_buffer_size: 2,
            header_type: default_header_type(),
            seed: String::new(),
        }
    }
}

impl KcpSettings {
    pub fn with_header(header_type: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            header_type: header_type.into(),
            seed: seed.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsSettings {
    pub path: String,
    pub host: String,
    pub heartbeat_period: u32,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            host: String::new(),
            heartbeat_period: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrpcSettings {
    pub service_name: String,
    pub authority: String,
    pub multi_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpUpgradeSettings {
    pub path: String,
    pub host: String,
}

impl Default for HttpUpgradeSettings {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            host: String::new(),
        }
    }
}

/// An XHTTP knob that Xray accepts either as a plain integer or as a `"min-max"` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeValue {
    Fixed(u64),
    Span(String),
}

impl From<u64> for RangeValue {
    fn from(value: u64) -> Self {
        Self::Fixed(value)
    }
}

impl From<&str> for RangeValue {
    fn from(value: &str) -> Self {
        Self::Span(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmuxSettings {
    pub max_concurrency: RangeValue,
    pub max_connections: RangeValue,
    pub c_max_reuse_times: RangeValue,
    pub h_max_request_times: RangeValue,
    pub h_max_reusable_secs: RangeValue,
    pub h_keep_alive_period: i64,
}

impl Default for XmuxSettings {
    fn default() -> Self {
        Self {
            max_concurrency: "16-32".into(),
            max_connections: RangeValue::Fixed(0),
            c_max_reuse_times: RangeValue::Fixed(0),
            h_max_request_times: "600-900".into(),
            h_max_reusable_secs: "1800-3000".into(),
            h_keep_alive_period: 0,
        }
    }
}

/// XHTTP (formerly SplitHTTP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XhttpSettings {
    pub path: String,
    pub host: String,
    pub mode: String,
    #[serde(rename = "noGRPCHeader")]
    pub no_grpc_header: bool,
    pub sc_min_posts_interval_ms: RangeValue,
    #[serde(rename = "xmux")]
    pub x_mux: XmuxSettings,
}

impl Default for XhttpSettings {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            host: String::new(),
            mode: String::new(),
            no_grpc_header: false,
            sc_min_posts_interval_ms: "30".into(),
            x_mux: XmuxSettings::default(),
        }
    }
}

impl XhttpSettings {
    pub fn new(path: impl Into<String>, host: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            mode: mode.into(),
            ..Self::default()
        }
    }
}

impl DocumentCodec for KcpSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

impl DocumentCodec for WsSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

impl DocumentCodec for GrpcSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

impl DocumentCodec for HttpUpgradeSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}

impl DocumentCodec for XhttpSettings {
    fn from_document(doc: &Value) -> Result<Self, DocumentError> {
        decode(doc)
    }

    fn to_document(&self) -> Value {
        encode(self)
    }
}
