//! Query-string links: `vless://`, `trojan://` and `ss://`.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine as _;
use regex::Regex;
use tracing::debug;

use super::{
    ClientOverrides, LinkError, LinkTarget, decode_base64_lenient, default_tag, format_host,
    is_truthy, parse_port_digits, percent_decode, percent_encode_rfc3986, strip_host_brackets,
};
use crate::outbound::Outbound;
use crate::protocol::{
    Protocol, ProtocolSettings, SS2022_METHOD_2022_BLAKE3_CHACHA20_POLY1305, ShadowsocksSettings,
    TrojanSettings, VLESS_DEFAULT_ENCRYPTION, VlessSettings, is_ss2022_method,
};
use crate::stream::transport::{HEADER_TYPE_HTTP, HEADER_TYPE_NONE};
use crate::stream::{
    GrpcSettings, HttpUpgradeSettings, KcpSettings, Network, NetworkSettings, RealitySettings,
    Security, StreamSettings, TcpSettings, TlsSettings, WsSettings, XhttpSettings,
};

static LINK_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<userinfo>[^@]+)@(?P<authority>[^/?#]+)(?P<rest>[/?#].*)?$",
    )
    .expect("link shape regex is valid")
});

/// Query parameters as read from a link. The first occurrence of a key wins.
struct Params(HashMap<String, String>);

impl Params {
    fn parse(query: &str) -> Self {
        let mut map = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        Self(map)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or(default).to_string()
    }
}

pub(crate) fn parse(protocol: Protocol, link: &str) -> Result<Option<Outbound>, LinkError> {
    let Some(caps) = LINK_SHAPE.captures(link) else {
        debug!(%protocol, "link does not match userinfo@host:port shape");
        return Ok(None);
    };
    let Some((host, raw_port)) = split_host_port(&caps["authority"]) else {
        debug!(%protocol, "link authority has no port");
        return Ok(None);
    };
    let port = parse_port(raw_port)?;
    let address = strip_host_brackets(host).to_string();

    let rest = caps.name("rest").map_or("", |m| m.as_str());
    let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
    let query = rest.split_once('?').map_or("", |(_, q)| q);
    let params = Params::parse(query);

    let Some(stream) = parse_stream(&params) else {
        debug!(network = params.get("type"), "link names an unknown network");
        return Ok(None);
    };

    let userinfo = &caps["userinfo"];
    let settings = match protocol {
        Protocol::Vless => ProtocolSettings::Vless(VlessSettings {
            address: Some(address),
            port: Some(port),
            uuid: Some(percent_decode(userinfo)),
            flow: params.non_empty("flow").map(str::to_string),
            encryption: params.string_or("encryption", VLESS_DEFAULT_ENCRYPTION),
        }),
        Protocol::Trojan => ProtocolSettings::Trojan(TrojanSettings {
            address: Some(address),
            port: Some(port),
            password: Some(percent_decode(userinfo)),
        }),
        Protocol::Shadowsocks => {
            let (method, password) = parse_ss_userinfo(userinfo)?;
            ProtocolSettings::Shadowsocks(ShadowsocksSettings {
                address: Some(address),
                port: Some(port),
                password: Some(password),
                method: Some(method),
                uot: Some(true),
                uot_version: None,
            })
        }
        _ => return Ok(None),
    };

    let tag = match percent_decode(fragment) {
        tag if tag.is_empty() => default_tag(protocol, port),
        tag => tag,
    };
    Ok(Some(Outbound::with_settings(tag, settings, stream)))
}

/// Splits `host:port` on the last `:`, so unbracketed IPv6 hosts keep their colons.
/// A bracketed host must be followed directly by `:port`.
fn split_host_port(authority: &str) -> Option<(&str, &str)> {
    if authority.starts_with('[') {
        let end = authority.find(']')?;
        let port = authority[end + 1..].strip_prefix(':')?;
        return Some((&authority[..=end], port));
    }
    authority
        .rsplit_once(':')
        .filter(|(host, _)| !host.is_empty())
}

fn parse_port(raw: &str) -> Result<u16, LinkError> {
    parse_port_digits(raw).ok_or_else(|| LinkError::InvalidPort {
        port: raw.to_string(),
    })
}

/// `method:password`, either base64 encoded or percent-encoded plain text.
fn parse_ss_userinfo(userinfo: &str) -> Result<(String, String), LinkError> {
    let decoded = percent_decode(userinfo);
    let plain = if decoded.contains(':') {
        decoded
    } else {
        let bytes = decode_base64_lenient(&decoded).map_err(|err| LinkError::InvalidBase64 {
            scheme: "ss",
            reason: err.to_string(),
        })?;
        String::from_utf8(bytes).map_err(|err| LinkError::InvalidBase64 {
            scheme: "ss",
            reason: err.to_string(),
        })?
    };
    // Everything after the method is the password, including the `server:user` form of 2022 ciphers.
    let (method, password) = plain.split_once(':').unwrap_or((plain.as_str(), ""));
    Ok((method.to_string(), password.to_string()))
}

fn parse_stream(params: &Params) -> Option<StreamSettings> {
    let network = Network::parse(params.non_empty("type").unwrap_or("tcp"))?;
    let security = params
        .non_empty("security")
        .and_then(Security::parse)
        .unwrap_or_default();
    let mut stream = StreamSettings::new(network, security);

    let header_type = params.string_or("headerType", HEADER_TYPE_NONE);
    let host = params.string("host");
    match network {
        Network::Tcp => {
            stream.tcp = TcpSettings::new(header_type, host, params.string("path"));
        }
        Network::Kcp => {
            let seed = params
                .non_empty("seed")
                .or_else(|| params.non_empty("path"))
                .unwrap_or_default();
            stream.kcp = KcpSettings::with_header(header_type, seed);
        }
        Network::Ws => {
            stream.ws = WsSettings {
                path: params.string_or("path", "/"),
                host,
                ..WsSettings::default()
            };
        }
        Network::Grpc => {
            stream.grpc = GrpcSettings {
                service_name: params.string("serviceName"),
                authority: params.string("authority"),
                multi_mode: params.get("mode") == Some("multi"),
            };
        }
        Network::HttpUpgrade => {
            stream.httpupgrade = HttpUpgradeSettings {
                path: params.string_or("path", "/"),
                host,
            };
        }
        Network::Xhttp => {
            stream.xhttp =
                XhttpSettings::new(params.string_or("path", "/"), host, params.string("mode"));
        }
    }

    match security {
        Security::None => {}
        Security::Tls => {
            stream.tls = TlsSettings {
                server_name: params.string("sni"),
                alpn: params
                    .get("alpn")
                    .map(|alpn| {
                        alpn.split(',')
                            .filter(|a| !a.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                fingerprint: params.string("fp"),
                allow_insecure: params.get("allowInsecure").is_some_and(is_truthy),
            };
        }
        Security::Reality => {
            stream.reality = RealitySettings {
                public_key: params.string("pbk"),
                fingerprint: params.string("fp"),
                server_name: params.string("sni"),
                short_id: params.string("sid"),
                spider_x: params.string("spx"),
            };
        }
    }
    Some(stream)
}

/// Ordered query parameters for generation. Setting a key again replaces its value in place.
#[derive(Debug, Default)]
struct QueryParams(Vec<(&'static str, String)>);

impl QueryParams {
    fn set(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    fn set_non_empty(&mut self, key: &'static str, value: &str) {
        if !value.is_empty() {
            self.set(key, value);
        }
    }

    fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter().map(|(k, v)| (*k, v.as_str())))
            .finish()
    }
}

fn network_params(stream: &StreamSettings) -> QueryParams {
    let mut params = QueryParams::default();
    params.set("type", stream.network.as_str());
    match stream.network_settings() {
        NetworkSettings::Tcp(tcp) => {
            if tcp.is_http() {
                params.set("path", tcp.path.as_str());
                params.set_non_empty("host", &tcp.host);
                params.set("headerType", HEADER_TYPE_HTTP);
            }
        }
        NetworkSettings::Kcp(kcp) => {
            params.set("headerType", kcp.header_type.as_str());
            params.set("seed", kcp.seed.as_str());
        }
        NetworkSettings::Ws(ws) => {
            params.set("path", ws.path.as_str());
            params.set_non_empty("host", &ws.host);
        }
        NetworkSettings::Grpc(grpc) => {
            params.set("serviceName", grpc.service_name.as_str());
            params.set_non_empty("authority", &grpc.authority);
            if grpc.multi_mode {
                params.set("mode", "multi");
            }
        }
        NetworkSettings::HttpUpgrade(upgrade) => {
            params.set("path", upgrade.path.as_str());
            params.set_non_empty("host", &upgrade.host);
        }
        NetworkSettings::Xhttp(xhttp) => {
            params.set("path", xhttp.path.as_str());
            params.set_non_empty("host", &xhttp.host);
            params.set("mode", xhttp.mode.as_str());
        }
    }
    params
}

fn tls_params(params: &mut QueryParams, tls: &TlsSettings) {
    params.set("fp", tls.fingerprint.as_str());
    params.set("alpn", tls.alpn.join(","));
    if tls.allow_insecure {
        params.set("allowInsecure", "1");
    }
    params.set_non_empty("sni", &tls.server_name);
}

fn reality_params(params: &mut QueryParams, reality: &RealitySettings) {
    params.set("security", Security::Reality.as_str());
    params.set("pbk", reality.public_key.as_str());
    params.set("fp", reality.fingerprint.as_str());
    params.set_non_empty("sni", &reality.server_name);
    params.set_non_empty("sid", &reality.short_id);
    params.set_non_empty("spx", &reality.spider_x);
}

/// Adds the security parameters for the advertised layer.
///
/// TLS details are only copied when the stream itself is TLS; forcing TLS onto a plain stream
/// advertises `security=tls` alone.
fn security_params(
    params: &mut QueryParams,
    stream: &StreamSettings,
    security: Security,
    emit_none: bool,
) {
    match security {
        Security::Tls => {
            params.set("security", Security::Tls.as_str());
            if stream.security == Security::Tls {
                tls_params(params, &stream.tls);
            }
        }
        Security::Reality => reality_params(params, &stream.reality),
        Security::None => {
            if emit_none {
                params.set("security", Security::None.as_str());
            }
        }
    }
}

fn assemble(scheme: &str, userinfo: &str, target: &LinkTarget, params: &QueryParams) -> String {
    let mut link = format!(
        "{scheme}://{userinfo}@{}:{}?{}",
        format_host(&target.address),
        target.port,
        params.encode()
    );
    if !target.remark.is_empty() {
        link.push('#');
        link.push_str(&percent_encode_rfc3986(&target.remark));
    }
    link
}

fn override_or<'a>(client: Option<&'a str>, stored: Option<&'a str>) -> &'a str {
    client
        .filter(|c| !c.is_empty())
        .or(stored)
        .unwrap_or_default()
}

pub(crate) fn generate_vless(
    stream: &StreamSettings,
    settings: &VlessSettings,
    client: &ClientOverrides,
    target: &LinkTarget,
) -> String {
    let uuid = override_or(client.credential.as_deref(), settings.uuid.as_deref());
    let flow = override_or(client.flow.as_deref(), settings.flow.as_deref());

    let mut params = network_params(stream);
    security_params(&mut params, stream, target.security, true);
    let carries_flow = match target.security {
        Security::Tls => stream.security == Security::Tls,
        Security::Reality => true,
        Security::None => false,
    };
    if carries_flow && stream.network == Network::Tcp {
        params.set_non_empty("flow", flow);
    }
    assemble("vless", &percent_encode_rfc3986(uuid), target, &params)
}

pub(crate) fn generate_trojan(
    stream: &StreamSettings,
    settings: &TrojanSettings,
    client: &ClientOverrides,
    target: &LinkTarget,
) -> String {
    let password = override_or(client.credential.as_deref(), settings.password.as_deref());
    let mut params = network_params(stream);
    security_params(&mut params, stream, target.security, true);
    assemble("trojan", &percent_encode_rfc3986(password), target, &params)
}

pub(crate) fn generate_shadowsocks(
    stream: &StreamSettings,
    settings: &ShadowsocksSettings,
    client: &ClientOverrides,
    target: &LinkTarget,
) -> String {
    let method = settings.method.as_deref().unwrap_or_default();
    let stored = settings.password.as_deref().unwrap_or_default();
    let requested = client.credential.as_deref().filter(|c| !c.is_empty());

    let mut secrets = Vec::with_capacity(2);
    if is_ss2022_method(method) {
        secrets.push(stored);
        if method != SS2022_METHOD_2022_BLAKE3_CHACHA20_POLY1305 {
            if let Some(user) = requested.filter(|user| *user != stored) {
                secrets.push(user);
            }
        }
    } else {
        secrets.push(requested.unwrap_or(stored));
    }
    let plain = format!("{method}:{}", secrets.join(":"));
    let userinfo = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(plain);

    let mut params = network_params(stream);
    security_params(&mut params, stream, target.security, false);
    assemble("ss", &userinfo, target, &params)
}
