//! `vmess://` links: a base64 encoded JSON object in the v2rayN layout.

use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ClientOverrides, LinkError, LinkTarget, decode_base64_lenient, default_tag, is_truthy,
    parse_port_digits,
};
use crate::outbound::Outbound;
use crate::protocol::{Protocol, ProtocolSettings, VmessSettings};
use crate::stream::transport::HEADER_TYPE_NONE;
use crate::stream::{
    GrpcSettings, HttpUpgradeSettings, KcpSettings, Network, NetworkSettings, Security,
    StreamSettings, TcpSettings, TlsSettings, WsSettings, XhttpSettings,
};

const VMESS_LINK_VERSION: &str = "2";
const VMESS_DEFAULT_PORT: u16 = 80;

/// Reads a field that clients write either as a string or as a bare number.
fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_or(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    text(obj, key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_port(obj: &Map<String, Value>) -> Result<u16, LinkError> {
    match obj.get("port") {
        None | Some(Value::Null) => Ok(VMESS_DEFAULT_PORT),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(VMESS_DEFAULT_PORT),
        Some(Value::String(s)) => {
            parse_port_digits(s.trim()).ok_or_else(|| LinkError::InvalidPort { port: s.clone() })
        }
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| LinkError::InvalidPort {
                port: n.to_string(),
            }),
        Some(other) => Err(LinkError::InvalidPort {
            port: other.to_string(),
        }),
    }
}

pub(crate) fn parse(body: &str) -> Result<Option<Outbound>, LinkError> {
    let bytes = decode_base64_lenient(body).map_err(|err| LinkError::InvalidBase64 {
        scheme: "vmess",
        reason: err.to_string(),
    })?;
    let json = String::from_utf8(bytes).map_err(|err| LinkError::InvalidBase64 {
        scheme: "vmess",
        reason: err.to_string(),
    })?;
    let obj = match serde_json::from_str::<Value>(&json) {
        Ok(Value::Object(obj)) => obj,
        Ok(other) => {
            return Err(LinkError::InvalidVmessJson {
                reason: format!("expected an object, got {other}"),
            });
        }
        Err(err) => {
            return Err(LinkError::InvalidVmessJson {
                reason: err.to_string(),
            });
        }
    };

    let port = parse_port(&obj)?;
    let net = text_or(&obj, "net", "tcp");
    let Some(network) = Network::parse(&net) else {
        debug!(network = %net, "vmess link names an unknown network");
        return Ok(None);
    };
    let security = text(&obj, "tls")
        .and_then(|tls| Security::parse(&tls))
        .unwrap_or_default();

    let mut stream = StreamSettings::new(network, security);
    let host = text(&obj, "host").unwrap_or_default();
    let path = text(&obj, "path").unwrap_or_default();
    let kind = text(&obj, "type").unwrap_or_default();
    match network {
        Network::Tcp => {
            let header_type = if kind.is_empty() { HEADER_TYPE_NONE } else { kind.as_str() };
            stream.tcp = TcpSettings::new(header_type, host, path);
        }
        Network::Kcp => {
            let header_type = if kind.is_empty() { HEADER_TYPE_NONE } else { kind.as_str() };
            stream.kcp = KcpSettings::with_header(header_type, path);
        }
        Network::Ws => {
            stream.ws = WsSettings {
                path: text_or(&obj, "path", "/"),
                host,
                ..WsSettings::default()
            };
        }
        Network::Grpc => {
            stream.grpc = GrpcSettings {
                service_name: path,
                authority: text(&obj, "authority").unwrap_or_default(),
                multi_mode: kind == "multi",
            };
        }
        Network::HttpUpgrade => {
            stream.httpupgrade = HttpUpgradeSettings {
                path: text_or(&obj, "path", "/"),
                host,
            };
        }
        Network::Xhttp => {
            let mode = text(&obj, "mode").filter(|m| !m.is_empty()).unwrap_or(kind);
            stream.xhttp = XhttpSettings::new(text_or(&obj, "path", "/"), host, mode);
        }
    }

    if security == Security::Tls {
        stream.tls = TlsSettings {
            server_name: text(&obj, "sni").unwrap_or_default(),
            alpn: text(&obj, "alpn")
                .map(|alpn| {
                    alpn.split(',')
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            fingerprint: text(&obj, "fp").unwrap_or_default(),
            allow_insecure: text(&obj, "allowInsecure").is_some_and(|v| is_truthy(&v)),
        };
    }

    let settings = VmessSettings {
        address: text(&obj, "add"),
        port: Some(port),
        uuid: text(&obj, "id"),
        security: text(&obj, "scy").filter(|s| !s.is_empty()),
    };
    let tag = text(&obj, "ps")
        .filter(|ps| !ps.is_empty())
        .unwrap_or_else(|| default_tag(Protocol::Vmess, port));
    Ok(Some(Outbound::with_settings(
        tag,
        ProtocolSettings::Vmess(settings),
        stream,
    )))
}

/// The JSON body of a generated link. Field order is the order clients expect.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VmessBody<'a> {
    v: &'static str,
    ps: &'a str,
    add: &'a str,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scy: Option<&'a str>,
    net: &'static str,
    tls: &'static str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authority: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sni: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alpn: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    allow_insecure: bool,
}

fn override_or<'a>(client: Option<&'a str>, stored: Option<&'a str>) -> Option<&'a str> {
    client.filter(|c| !c.is_empty()).or(stored)
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

pub(crate) fn generate(
    stream: &StreamSettings,
    settings: &VmessSettings,
    client: &ClientOverrides,
    target: &LinkTarget,
) -> Option<String> {
    let id = override_or(client.credential.as_deref(), settings.uuid.as_deref());
    let scy = override_or(client.security.as_deref(), settings.security.as_deref());

    let mut body = VmessBody {
        v: VMESS_LINK_VERSION,
        ps: &target.remark,
        add: &target.address,
        port: target.port,
        id,
        scy,
        net: stream.network.as_str(),
        tls: target.security.as_str(),
        kind: None,
        path: None,
        host: None,
        authority: None,
        sni: None,
        fp: None,
        alpn: None,
        allow_insecure: false,
    };

    match stream.network_settings() {
        NetworkSettings::Tcp(tcp) => {
            body.kind = Some(tcp.header_type.as_str());
            if tcp.is_http() {
                body.path = Some(tcp.path.as_str());
                body.host = non_empty(&tcp.host);
            }
        }
        NetworkSettings::Kcp(kcp) => {
            body.kind = Some(kcp.header_type.as_str());
            body.path = Some(kcp.seed.as_str());
        }
        NetworkSettings::Ws(ws) => {
            body.path = Some(ws.path.as_str());
            body.host = non_empty(&ws.host);
        }
        NetworkSettings::Grpc(grpc) => {
            body.path = Some(grpc.service_name.as_str());
            body.authority = non_empty(&grpc.authority);
            if grpc.multi_mode {
                body.kind = Some("multi");
            }
        }
        NetworkSettings::HttpUpgrade(upgrade) => {
            body.path = Some(upgrade.path.as_str());
            body.host = non_empty(&upgrade.host);
        }
        NetworkSettings::Xhttp(xhttp) => {
            body.path = Some(xhttp.path.as_str());
            body.host = non_empty(&xhttp.host);
            body.kind = Some(xhttp.mode.as_str());
        }
    }

    if target.security == Security::Tls {
        let tls = &stream.tls;
        body.sni = non_empty(&tls.server_name);
        body.fp = non_empty(&tls.fingerprint);
        body.alpn = (!tls.alpn.is_empty()).then(|| tls.alpn.join(","));
        body.allow_insecure = tls.allow_insecure;
    }

    let json = match serde_json::to_string(&body) {
        Ok(json) => json,
        Err(err) => {
            debug!(error = %err, "failed to serialize vmess link body");
            return None;
        }
    };
    Some(format!(
        "vmess://{}",
        base64::engine::general_purpose::URL_SAFE.encode(json)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use crate::link::{ForceTls, LinkOptions, generate_link, parse_link};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn vmess_link(body: &Value) -> String {
        format!(
            "vmess://{}",
            base64::engine::general_purpose::STANDARD.encode(body.to_string())
        )
    }

    fn decode_body(link: &str) -> Value {
        let body = link.strip_prefix("vmess://").unwrap();
        let bytes = decode_base64_lenient(body).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn parses_ws_tls_body() {
        let link = vmess_link(&json!({
            "v": "2",
            "ps": "node",
            "add": "example.com",
            "port": "443",
            "id": "22222222-2222-2222-2222-222222222222",
            "scy": "auto",
            "net": "ws",
            "path": "/v",
            "host": "cdn.example",
            "tls": "tls",
            "sni": "example.com",
            "alpn": "h2,http/1.1",
            "fp": "chrome",
            "allowInsecure": true
        }));
        let outbound = parse_link(&link).unwrap().unwrap();
        assert_eq!(outbound.protocol, Protocol::Vmess);
        assert_eq!(outbound.tag, "node");
        assert_eq!(outbound.port(), Some(443));
        assert_eq!(outbound.address(), Some("example.com"));
        assert_eq!(outbound.stream.ws.path, "/v");
        assert_eq!(outbound.stream.ws.host, "cdn.example");
        assert_eq!(outbound.stream.tls.alpn, vec!["h2", "http/1.1"]);
        assert!(outbound.stream.tls.allow_insecure);
        let Some(ProtocolSettings::Vmess(settings)) = outbound.settings else {
            panic!("expected vmess settings");
        };
        assert_eq!(settings.security.as_deref(), Some("auto"));
    }

    #[test]
    fn defaults_port_and_tag() {
        let outbound = parse_link(&vmess_link(&json!({"add": "h", "id": "u"})))
            .unwrap()
            .unwrap();
        assert_eq!(outbound.port(), Some(80));
        assert_eq!(outbound.tag, "out-vmess-80");
        assert_eq!(outbound.stream.network, Network::Tcp);
        assert_eq!(outbound.stream.tcp.header_type, "none");
    }

    #[test]
    fn grpc_multi_and_xhttp_mode() {
        let grpc = parse_link(&vmess_link(&json!({
            "add": "h", "port": 1, "net": "grpc", "path": "svc", "type": "multi", "authority": "a"
        })))
        .unwrap()
        .unwrap();
        assert_eq!(grpc.stream.grpc.service_name, "svc");
        assert!(grpc.stream.grpc.multi_mode);
        assert_eq!(grpc.stream.grpc.authority, "a");

        let xhttp = parse_link(&vmess_link(&json!({
            "add": "h", "port": 1, "net": "xhttp", "type": "stream-one"
        })))
        .unwrap()
        .unwrap();
        assert_eq!(xhttp.stream.xhttp.mode, "stream-one");
        assert_eq!(xhttp.stream.xhttp.path, "/");
    }

    #[test]
    fn malformed_bodies_are_errors() {
        assert!(matches!(
            parse_link("vmess://%%%"),
            Err(LinkError::InvalidBase64 { scheme: "vmess", .. })
        ));
        let not_json = format!(
            "vmess://{}",
            base64::engine::general_purpose::STANDARD.encode("not json")
        );
        assert!(matches!(
            parse_link(&not_json),
            Err(LinkError::InvalidVmessJson { .. })
        ));
        let array = vmess_link(&json!([1, 2]));
        assert!(matches!(
            parse_link(&array),
            Err(LinkError::InvalidVmessJson { .. })
        ));
        let bad_port = vmess_link(&json!({"add": "h", "port": "abc"}));
        assert_eq!(
            parse_link(&bad_port).unwrap_err(),
            LinkError::InvalidPort {
                port: "abc".to_string()
            }
        );
        let signed_port = vmess_link(&json!({"add": "h", "port": "+443"}));
        assert_eq!(
            parse_link(&signed_port).unwrap_err(),
            LinkError::InvalidPort {
                port: "+443".to_string()
            }
        );
    }

    #[test]
    fn unknown_network_is_no_result() {
        let link = vmess_link(&json!({"add": "h", "port": 1, "net": "quic"}));
        assert_eq!(parse_link(&link).unwrap(), None);
    }

    #[test]
    fn generated_body_carries_overrides_and_tls_extras() {
        let link = vmess_link(&json!({
            "ps": "node", "add": "example.com", "port": 443, "id": "stored", "scy": "auto",
            "net": "ws", "path": "/v", "tls": "tls", "sni": "example.com", "fp": "chrome"
        }));
        let outbound = parse_link(&link).unwrap().unwrap();
        let options = LinkOptions {
            client: ClientOverrides {
                credential: Some("client".to_string()),
                flow: None,
                security: Some("aes-128-gcm".to_string()),
            },
            ..LinkOptions::default()
        };
        let body = decode_body(&generate_link(&outbound, &options).unwrap());
        assert_eq!(
            body,
            json!({
                "v": "2",
                "ps": "node",
                "add": "example.com",
                "port": 443,
                "id": "client",
                "scy": "aes-128-gcm",
                "net": "ws",
                "tls": "tls",
                "path": "/v",
                "sni": "example.com",
                "fp": "chrome"
            })
        );
    }

    #[test]
    fn forced_none_drops_tls_extras() {
        let link = vmess_link(&json!({
            "add": "example.com", "port": 443, "id": "u", "tls": "tls", "sni": "example.com"
        }));
        let outbound = parse_link(&link).unwrap().unwrap();
        let options = LinkOptions {
            force_tls: ForceTls::None,
            ..LinkOptions::default()
        };
        let body = decode_body(&generate_link(&outbound, &options).unwrap());
        assert_eq!(body["tls"], json!("none"));
        assert!(body.get("sni").is_none());
        assert_eq!(body["type"], json!("none"));
    }

    #[test]
    fn generated_links_parse_back() {
        let link = vmess_link(&json!({
            "ps": "k", "add": "h", "port": 8443, "id": "u", "net": "kcp", "type": "srtp", "path": "seed"
        }));
        let first = parse_link(&link).unwrap().unwrap();
        let regenerated = generate_link(&first, &LinkOptions::default()).unwrap();
        let second = parse_link(&regenerated).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.stream.kcp.seed, "seed");
        assert_eq!(second.stream.kcp.header_type, "srtp");
    }
}
