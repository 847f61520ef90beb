use pretty_assertions::assert_eq;
use v2link::protocol::{ShadowsocksSettings, TrojanSettings, VlessSettings, VmessSettings};
use v2link::stream::{RealitySettings, TcpSettings, TlsSettings, WsSettings};
use v2link::{
    DocumentCodec, ForceTls, LinkOptions, Network, Outbound, ProtocolSettings, Security,
    StreamSettings, generate_link, parse_link,
};

const NETWORKS: [Network; 6] = [
    Network::Tcp,
    Network::Kcp,
    Network::Ws,
    Network::Grpc,
    Network::HttpUpgrade,
    Network::Xhttp,
];
const SECURITIES: [Security; 3] = [Security::None, Security::Tls, Security::Reality];

fn settings() -> Vec<ProtocolSettings> {
    vec![
        ProtocolSettings::Vmess(VmessSettings {
            address: Some("vmess.example".to_string()),
            port: Some(10086),
            uuid: Some("33333333-3333-3333-3333-333333333333".to_string()),
            security: Some("auto".to_string()),
        }),
        ProtocolSettings::Vless(VlessSettings {
            address: Some("vless.example".to_string()),
            port: Some(443),
            uuid: Some("11111111-1111-1111-1111-111111111111".to_string()),
            flow: Some("xtls-rprx-vision".to_string()),
            ..VlessSettings::default()
        }),
        ProtocolSettings::Trojan(TrojanSettings {
            address: Some("trojan.example".to_string()),
            port: Some(8443),
            password: Some("p@ss:word/?#".to_string()),
        }),
        ProtocolSettings::Shadowsocks(ShadowsocksSettings {
            address: Some("10.0.0.1".to_string()),
            port: Some(8388),
            password: Some("secret".to_string()),
            method: Some("aes-256-gcm".to_string()),
            ..ShadowsocksSettings::default()
        }),
    ]
}

fn stream(network: Network, security: Security) -> StreamSettings {
    let mut stream = StreamSettings::new(network, security);
    stream.tcp = TcpSettings::new("http", "a.example", "/tcp");
    stream.kcp.seed = "kcp-seed".to_string();
    stream.ws = WsSettings {
        path: "/ws".to_string(),
        host: "cdn.example".to_string(),
        ..WsSettings::default()
    };
    stream.grpc.service_name = "svc".to_string();
    stream.grpc.multi_mode = true;
    stream.httpupgrade.path = "/up".to_string();
    stream.xhttp.path = "/x".to_string();
    stream.xhttp.mode = "packet-up".to_string();
    stream.tls = TlsSettings {
        server_name: "sni.example".to_string(),
        alpn: vec!["h2".to_string()],
        fingerprint: "chrome".to_string(),
        allow_insecure: false,
    };
    stream.reality = RealitySettings {
        public_key: "PUBKEY".to_string(),
        fingerprint: "chrome".to_string(),
        server_name: "www.example.com".to_string(),
        short_id: "0123abcd".to_string(),
        spider_x: "/".to_string(),
    };
    stream
}

#[test]
fn credential_address_and_port_survive_every_combination() {
    for settings in settings() {
        for network in NETWORKS {
            for security in SECURITIES {
                let outbound = Outbound::with_settings(
                    "node one",
                    settings.clone(),
                    stream(network, security),
                );
                let context = format!("{} {network} {security}", settings.protocol());
                let link = generate_link(&outbound, &LinkOptions::default())
                    .unwrap_or_else(|| panic!("no link for {context}"));
                let parsed = parse_link(&link)
                    .unwrap_or_else(|err| panic!("{context}: {err}"))
                    .unwrap_or_else(|| panic!("{context}: not parsed back from {link}"));

                assert_eq!(parsed.protocol, outbound.protocol, "{context}");
                assert_eq!(parsed.credential(), outbound.credential(), "{context}");
                assert_eq!(parsed.address(), outbound.address(), "{context}");
                assert_eq!(parsed.port(), outbound.port(), "{context}");
                assert_eq!(parsed.tag, "node one", "{context}");
                assert_eq!(parsed.stream.network, network, "{context}");
                assert_eq!(parsed.stream.security, security, "{context}");
            }
        }
    }
}

#[test]
fn documented_links_parse_to_documents() {
    let vless = parse_link(
        "vless://11111111-1111-1111-1111-111111111111@example.com:443?type=ws&path=%2Fws&security=tls&sni=example.com#My%20Node",
    )
    .unwrap()
    .unwrap();
    let doc = vless.to_document();
    assert_eq!(doc["tag"], "My Node");
    assert_eq!(doc["protocol"], "vless");
    assert_eq!(doc["settings"]["vnext"][0]["address"], "example.com");
    assert_eq!(doc["settings"]["vnext"][0]["port"], 443);
    assert_eq!(doc["streamSettings"]["network"], "ws");
    assert_eq!(doc["streamSettings"]["wsSettings"]["path"], "/ws");
    assert_eq!(doc["streamSettings"]["tlsSettings"]["serverName"], "example.com");
    assert!(doc["streamSettings"].get("tcpSettings").is_none());

    let reread = Outbound::from_document(&doc).unwrap().unwrap();
    assert_eq!(reread, vless);

    let ss = parse_link("ss://YWVzLTEyOC1nY206cGFzcw==@1.2.3.4:8388#test")
        .unwrap()
        .unwrap();
    let doc = ss.to_document();
    let server = &doc["settings"]["servers"][0];
    assert_eq!(server["method"], "aes-128-gcm");
    assert_eq!(server["password"], "pass");
    assert_eq!(server["uot"], true);
}

#[test]
fn tcp_without_header_emits_only_type_as_network_parameter() {
    let outbound = Outbound::with_settings(
        "plain",
        settings().remove(1),
        StreamSettings::new(Network::Tcp, Security::None),
    );
    let link = generate_link(&outbound, &LinkOptions::default()).unwrap();
    assert_eq!(
        link,
        "vless://11111111-1111-1111-1111-111111111111@vless.example:443?type=tcp&security=none#plain"
    );
}

#[test]
fn trojan_forced_reality_is_a_string_link() {
    let outbound = Outbound::with_settings(
        "t",
        settings().remove(2),
        stream(Network::Tcp, Security::None),
    );
    let options = LinkOptions {
        force_tls: ForceTls::Reality,
        ..LinkOptions::default()
    };
    let link = generate_link(&outbound, &options).unwrap();
    assert!(link.starts_with("trojan://"), "{link}");
    assert!(link.contains("sid=0123abcd"), "{link}");
    assert!(link.contains("sni=www.example.com"), "{link}");
}

#[test]
fn document_round_trip_after_link_parse_is_idempotent() {
    let first = parse_link("trojan://pw@example.com:443?type=grpc&serviceName=svc&security=reality&pbk=K&sid=ab#g")
        .unwrap()
        .unwrap();
    let doc = first.to_document();
    let second = Outbound::from_document(&doc).unwrap().unwrap();
    assert_eq!(second.to_document(), doc);
    assert_eq!(second.stream.to_document(), first.stream.to_document());
}
