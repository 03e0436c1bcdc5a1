//! pgpwire: OpenPGP payload transcoding CLI
//!
//! Commands:
//!   encrypt [FILE|-]                      - JSON payload → hex wire ciphertext
//!   decrypt [FILE|-]                      - hex wire ciphertext → JSON payload
//!   armor   --marker M [--header K=V]..   - raw bytes → ASCII armor block
//!   dearmor [FILE|-] [--out FILE]         - ASCII armor block → raw bytes
//!   config show                           - display the effective configuration
//!
//! encrypt/decrypt drive the `gpg` binary named in `[gpg] program`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use pgpwire_armor::{unarmor, ArmorHeaders, Armorer, DEFAULT_WRAP_WIDTH, MESSAGE_MARKER};
use pgpwire_core::config::KeysConfig;
use pgpwire_core::{PgpWireConfig, PgpWireError, WireCiphertext};
use pgpwire_engine::GpgEngine;
use pgpwire_pipeline::Pipeline;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pgpwire",
    version,
    about = "OpenPGP payload transcoding",
    long_about = "pgpwire: encrypt JSON payloads to hex wire values, decrypt them back, and (de)armor OpenPGP data"
)]
struct Cli {
    /// Path to pgpwire.toml configuration file
    #[arg(long, short = 'c', env = "PGPWIRE_CONFIG", default_value = "pgpwire.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "PGPWIRE_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "PGPWIRE_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    /// Private key passphrase (else [keys] passphrase_file, else prompt)
    #[arg(long, env = "PGPWIRE_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a JSON payload to the configured public key, print hex
    Encrypt {
        /// JSON input file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Decrypt a hex wire value with the configured private key, print JSON
    Decrypt {
        /// Hex input file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Wrap raw bytes in an ASCII armor block
    Armor {
        /// Block type, e.g. "PGP MESSAGE"
        #[arg(long, short = 'm', default_value = MESSAGE_MARKER)]
        marker: String,

        /// Armor header, repeatable
        #[arg(long = "header", short = 'H', value_name = "KEY=VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Base64 line width
        #[arg(long, default_value_t = DEFAULT_WRAP_WIDTH)]
        width: usize,

        /// Input file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Parse an ASCII armor block and write its decoded body
    Dearmor {
        /// Armored input file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Write the body here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Fail on checksum mismatch instead of warning
        #[arg(long)]
        strict: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(format: &str) -> Result<Self> {
        match format {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => bail!("unknown [log] format {other:?} (expected \"text\" or \"json\")"),
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty header key in {s:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None => LogFormat::from_config(&config.log.format)?,
    };
    init_logging(&level, format);

    if !cli.config.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Encrypt { input } => {
            let pipeline = build_pipeline(&config, cli.passphrase)?;
            cmd_encrypt(&pipeline, &input).await
        }
        Commands::Decrypt { input } => {
            let pipeline = build_pipeline(&config, cli.passphrase)?;
            cmd_decrypt(&pipeline, &input).await
        }
        Commands::Armor {
            marker,
            headers,
            width,
            input,
        } => cmd_armor(&marker, headers, width, &input).await,
        Commands::Dearmor { input, out, strict } => {
            cmd_dearmor(&input, out.as_deref(), strict).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config, logging, passphrase ───────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<PgpWireConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        PgpWireConfig::from_toml_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(PgpWireConfig::default())
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Passphrase precedence: flag / PGPWIRE_PASSPHRASE > passphrase_file > prompt
fn resolve_passphrase(flag: Option<String>, keys: &KeysConfig) -> Result<SecretString> {
    if let Some(passphrase) = flag {
        debug!("passphrase from command line or environment");
        return Ok(SecretString::from(passphrase));
    }
    if let Some(passphrase) = keys.read_passphrase_file()? {
        debug!("passphrase from passphrase_file");
        return Ok(passphrase);
    }
    let prompted = rpassword::prompt_password("Private key passphrase: ")
        .context("reading passphrase from terminal")?;
    Ok(SecretString::from(prompted))
}

fn build_pipeline(config: &PgpWireConfig, passphrase: Option<String>) -> Result<Pipeline> {
    let passphrase = resolve_passphrase(passphrase, &config.keys)?;
    let engine = Arc::new(GpgEngine::from_config(&config.gpg));
    Ok(Pipeline::new(engine, config.keys.with_passphrase(passphrase)))
}

// ── I/O helpers ───────────────────────────────────────────────────────────────

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    if is_stdin(path) {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("reading stdin")?;
        return Ok(buf);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn read_input_text(path: &Path) -> Result<String> {
    let bytes = read_input(path).await?;
    String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8 text", path.display()))
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes).context("writing stdout")?;
    stdout.flush().context("flushing stdout")
}

// ── `pgpwire encrypt` / `pgpwire decrypt` ─────────────────────────────────────

async fn cmd_encrypt(pipeline: &Pipeline, input: &Path) -> Result<()> {
    let text = read_input_text(input).await?;
    let payload: serde_json::Value =
        serde_json::from_str(&text).context("input is not valid JSON")?;

    let wire = pipeline.encrypt(&payload).await?;
    println!("{wire}");
    Ok(())
}

async fn cmd_decrypt(pipeline: &Pipeline, input: &Path) -> Result<()> {
    let text = read_input_text(input).await?;
    let wire = WireCiphertext::new(text.trim());

    let value = pipeline.decrypt_value(&wire).await?;
    let rendered = serde_json::to_string_pretty(&value).context("rendering JSON")?;
    println!("{rendered}");
    Ok(())
}

// ── `pgpwire armor` / `pgpwire dearmor` ───────────────────────────────────────

async fn cmd_armor(
    marker: &str,
    headers: Vec<(String, String)>,
    width: usize,
    input: &Path,
) -> Result<()> {
    let data = read_input(input).await?;
    let headers = ArmorHeaders::from_pairs(headers).context("invalid --header")?;

    let armored = Armorer::with_wrap_width(width).armor(&data, marker, &headers);
    write_stdout(armored.as_bytes())
}

async fn cmd_dearmor(input: &Path, out: Option<&Path>, strict: bool) -> Result<()> {
    let text = read_input_text(input).await?;
    let message = unarmor(&text)?;

    match message.verify_checksum() {
        Ok(()) => {}
        Err(err @ PgpWireError::ChecksumMismatch { .. }) if !strict => {
            warn!("{err}; writing body anyway (use --strict to fail)");
        }
        Err(err) => return Err(err.into()),
    }

    for (key, value) in message.headers().iter() {
        debug!(key, value, "armor header");
    }

    match out {
        Some(path) => {
            tokio::fs::write(path, message.body())
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{}: {} bytes written to {}",
                message.marker(),
                message.body().len(),
                path.display()
            );
            Ok(())
        }
        None => write_stdout(message.body()),
    }
}

// ── `pgpwire config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &PgpWireConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = config
        .to_toml_string()
        .context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
