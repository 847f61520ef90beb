use serde_json::{Map, Value, json};
use tracing::debug;

use crate::document::{DocumentCodec, DocumentError, opt_string};
use crate::protocol::{Protocol, ProtocolSettings};
use crate::stream::{MuxSettings, StreamSettings};

/// One configured egress proxy endpoint: protocol, credentials and transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub tag: String,
    pub protocol: Protocol,
    pub settings: Option<ProtocolSettings>,
    /// `settings` document of a protocol without a typed variant, written back verbatim.
    pub passthrough: Option<Value>,
    pub stream: StreamSettings,
    pub send_through: Option<String>,
    pub mux: MuxSettings,
}

impl Default for Outbound {
    fn default() -> Self {
        Self::new("", Protocol::Vless)
    }
}

impl Outbound {
    pub fn new(tag: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            tag: tag.into(),
            protocol,
            settings: ProtocolSettings::select_variant(protocol),
            passthrough: None,
            stream: StreamSettings::default(),
            send_through: None,
            mux: MuxSettings::default(),
        }
    }

    pub fn with_settings(
        tag: impl Into<String>,
        settings: ProtocolSettings,
        stream: StreamSettings,
    ) -> Self {
        Self {
            tag: tag.into(),
            protocol: settings.protocol(),
            settings: Some(settings),
            passthrough: None,
            stream,
            send_through: None,
            mux: MuxSettings::default(),
        }
    }

    pub fn can_carry_stream(&self) -> bool {
        self.protocol.can_carry_stream()
    }

    pub fn address(&self) -> Option<&str> {
        self.settings.as_ref().and_then(ProtocolSettings::address)
    }

    pub fn port(&self) -> Option<u16> {
        self.settings.as_ref().and_then(ProtocolSettings::port)
    }

    pub fn credential(&self) -> Option<&str> {
        self.settings.as_ref().and_then(ProtocolSettings::credential)
    }

    /// Reads an outbound document. An unknown `protocol`, stream `network` or stream `security`
    /// value is `Ok(None)`.
    pub fn from_document(doc: &Value) -> Result<Option<Self>, DocumentError> {
        let protocol_name = opt_string(doc, "protocol", "protocol")?;
        let protocol = match protocol_name.as_deref() {
            None => Protocol::Vless,
            Some(name) => match Protocol::parse(name) {
                Some(protocol) => protocol,
                None => {
                    debug!(protocol = name, "outbound document has unknown protocol");
                    return Ok(None);
                }
            },
        };

        let settings_doc = doc.get("settings").unwrap_or(&Value::Null);
        let settings = ProtocolSettings::from_document(protocol, settings_doc)?;
        let passthrough = match (&settings, settings_doc) {
            (None, Value::Null) | (Some(_), _) => None,
            (None, other) => Some(other.clone()),
        };

        let stream_doc = doc.get("streamSettings").unwrap_or(&Value::Null);
        let Some(stream) = StreamSettings::from_known_document(stream_doc)? else {
            debug!(protocol = protocol.as_str(), "outbound document has unsupported stream settings");
            return Ok(None);
        };

        Ok(Some(Self {
            tag: opt_string(doc, "tag", "tag")?.unwrap_or_default(),
            protocol,
            settings,
            passthrough,
            stream,
            send_through: opt_string(doc, "sendThrough", "sendThrough")?,
            mux: MuxSettings::from_document(doc.get("mux").unwrap_or(&Value::Null))?,
        }))
    }

    pub fn to_document(&self) -> Value {
        let mut out = Map::new();
        out.insert("tag".to_string(), json!(self.tag));
        out.insert("protocol".to_string(), json!(self.protocol.as_str()));

        let settings = match (&self.settings, &self.passthrough) {
            (Some(settings), _) => Some(settings.to_document()),
            (None, passthrough) => passthrough.clone(),
        };
        if let Some(settings) = settings {
            out.insert("settings".to_string(), settings);
        }

        let stream = if self.can_carry_stream() {
            Some(self.stream.to_document())
        } else {
            self.stream.sockopt_document()
        };
        if let Some(stream) = stream {
            out.insert("streamSettings".to_string(), stream);
        }

        if let Some(send_through) = self.send_through.as_deref().filter(|s| !s.is_empty()) {
            out.insert("sendThrough".to_string(), json!(send_through));
        }
        if self.mux.enable {
            out.insert("mux".to_string(), self.mux.to_document());
        }
        Value::Object(out)
    }
}
