use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::link::{ClientOverrides, ForceTls, LinkOptions};

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "v2link",
    about = "Convert between Xray outbound documents and share links",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse share links into outbound documents.
    Parse(ParseArgs),

    /// Generate one share link per outbound document.
    Generate(GenerateArgs),

    /// Generate a subscription (newline-joined links, optionally base64 encoded).
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(
        long,
        global = true,
        env = "V2LINK_FORMAT",
        value_enum,
        default_value_t = OutputFormat::Json
    )]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Links to parse.
    #[arg(value_name = "LINK")]
    pub links: Vec<String>,

    /// Also read links from stdin, one per line (raw or base64 subscription text).
    #[arg(long)]
    pub stdin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// JSON or YAML file with one outbound document or a list of them; `-` reads stdin.
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SubscribeArgs {
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Emit the base64 form instead of raw lines.
    #[arg(long)]
    pub base64: bool,

    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Address to advertise instead of the outbound's own.
    #[arg(long, value_name = "HOST")]
    pub address: Option<String>,

    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    #[arg(long, value_enum, default_value_t = ForceTls::Same)]
    pub force_tls: ForceTls,

    #[arg(long, value_name = "NAME")]
    pub remark: Option<String>,

    /// UUID (vmess/vless) or password (trojan/shadowsocks) for the client.
    #[arg(long, value_name = "CREDENTIAL")]
    pub client_id: Option<String>,

    #[arg(long, value_name = "FLOW")]
    pub client_flow: Option<String>,

    /// VMess cipher for the client.
    #[arg(long, value_name = "CIPHER")]
    pub client_security: Option<String>,
}

impl LinkArgs {
    pub fn to_options(&self) -> LinkOptions {
        LinkOptions {
            address: self.address.clone(),
            port: self.port,
            force_tls: self.force_tls,
            remark: self.remark.clone(),
            client: ClientOverrides {
                credential: self.client_id.clone(),
                flow: self.client_flow.clone(),
                security: self.client_security.clone(),
            },
        }
    }
}
