use std::io::Read as _;
use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use v2link::config::{Cli, Command, GenerateArgs, OutputFormat, ParseArgs, SubscribeArgs};
use v2link::{Outbound, generate_link, parse_link, subscription};

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Parse(args) => run_parse(args, cli.output.format),
        Command::Generate(args) => run_generate(args),
        Command::Subscribe(args) => run_subscribe(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run_parse(args: ParseArgs, format: OutputFormat) -> Result<()> {
    let mut outbounds = Vec::new();
    for link in &args.links {
        match parse_link(link).with_context(|| format!("parse link {link:?}"))? {
            Some(outbound) => outbounds.push(outbound),
            None => warn!(link = %link, "unsupported link skipped"),
        }
    }
    if args.stdin {
        let text = read_stdin()?;
        outbounds.extend(subscription::parse_subscription(&text).context("parse stdin links")?);
    }
    if outbounds.is_empty() {
        anyhow::bail!("no supported links given");
    }

    let docs: Vec<Value> = outbounds.iter().map(Outbound::to_document).collect();
    print!("{}", render(&Value::Array(docs), format)?);
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let outbounds = load_outbounds(&args.input)?;
    let options = args.link.to_options();
    let mut generated = 0usize;
    for outbound in &outbounds {
        match generate_link(outbound, &options) {
            Some(link) => {
                println!("{link}");
                generated += 1;
            }
            None => warn!(tag = %outbound.tag, protocol = %outbound.protocol, "no link for outbound"),
        }
    }
    info!(generated, total = outbounds.len(), "links generated");
    Ok(())
}

fn run_subscribe(args: SubscribeArgs) -> Result<()> {
    let outbounds = load_outbounds(&args.input)?;
    let bundle = subscription::build_subscription(&outbounds, &args.link.to_options());
    if args.base64 {
        println!("{}", bundle.base64);
    } else {
        print!("{}", bundle.raw);
    }
    Ok(())
}

fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(value).context("serialize json output")?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("serialize yaml output"),
    }
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("read stdin")?;
    Ok(text)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return read_stdin();
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Accepts JSON or YAML holding one outbound, a list of outbounds, or a config with `outbounds`.
fn load_outbounds(path: &Path) -> Result<Vec<Outbound>> {
    let text = read_input(path)?;
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(json_err) => serde_yaml::from_str(&text).with_context(|| {
            format!(
                "parse {} as json ({json_err}) or yaml",
                path.display()
            )
        })?,
    };

    let docs = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("outbounds") {
            Some(Value::Array(items)) => items,
            Some(other) => anyhow::bail!("`outbounds` must be a list, got {other}"),
            None => vec![Value::Object(map)],
        },
        other => anyhow::bail!("expected an outbound document or a list of them, got {other}"),
    };

    let mut outbounds = Vec::with_capacity(docs.len());
    for (idx, doc) in docs.iter().enumerate() {
        match Outbound::from_document(doc).with_context(|| format!("outbound #{idx}"))? {
            Some(outbound) => outbounds.push(outbound),
            None => warn!(index = idx, "unsupported outbound skipped"),
        }
    }
    Ok(outbounds)
}
