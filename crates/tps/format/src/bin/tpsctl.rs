//! Operator tool for inspecting token format inputs
//!
//! Decodes CPLC blocks and session frames, prints the effective format
//! settings of a configuration and runs its token profile resolver.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tps_apdu_core::{Buffer, OpType, session::codec};
use tps_format::{FormatSettings, TokenIdentity, state::DEFAULT_TOKEN_TYPE};
use tps_policy::{ConfigStore, ResolverParams, ResolverRegistry};
use tracing::{debug, info};

#[derive(Parser)]
#[command(version, about = "Inspect token format configuration and card data")]
struct Cli {
    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CUID and MSN of a CPLC block
    Identity {
        /// CPLC block in hex, status word included
        cplc: String,
    },

    /// Print the effective format settings
    Settings {
        /// Configuration file (key=value or JSON)
        config: PathBuf,

        /// Token type to show settings for
        #[arg(short, long, default_value = DEFAULT_TOKEN_TYPE)]
        token_type: String,
    },

    /// Run the configured token profile resolver
    Resolve {
        /// Configuration file (key=value or JSON)
        config: PathBuf,

        /// Card unique id in hex
        #[arg(long)]
        cuid: String,

        /// Manufacturer serial number in hex
        #[arg(long, default_value = "")]
        msn: String,

        /// Applet major version
        #[arg(long, default_value_t = 0)]
        major: u8,

        /// Applet minor version
        #[arg(long, default_value_t = 0)]
        minor: u8,

        /// Token type hinted by the client
        #[arg(long)]
        ext_token_type: Option<String>,

        /// Token ATR reported by the client
        #[arg(long)]
        atr: Option<String>,
    },

    /// Decode a session frame
    Decode {
        /// Frame text, e.g. `s=20&msg_type=15&status=100`
        frame: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Identity { cplc } => {
            let block = Buffer::from_hex(&cplc).wrap_err("CPLC block is not valid hex")?;
            let identity = TokenIdentity::from_cplc(&block)?;
            println!("CUID: {}", identity.cuid_hex());
            println!("MSN:  {}", identity.msn_hex());
        }
        Commands::Settings { config, token_type } => {
            let config = load_config(&config)?;
            let snapshot = FormatSettings::new(&config).snapshot(&token_type)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Resolve {
            config,
            cuid,
            msn,
            major,
            minor,
            ext_token_type,
            atr,
        } => {
            let config = load_config(&config)?;
            let resolver = FormatSettings::new(&config).resolver_name();
            let registry = ResolverRegistry::from_config(&config)?;
            let params = ResolverParams {
                op: OpType::Format.to_string(),
                cuid,
                msn,
                major_version: major,
                minor_version: minor,
                ext_token_type,
                ext_token_atr: atr,
            };
            debug!(?params, resolver, "Resolving token type");
            println!("{}", registry.resolve(&resolver, &params)?);
        }
        Commands::Decode { frame } => {
            let message = codec::decode(frame.trim()).wrap_err("cannot decode frame")?;
            println!("{} (msg_type {})", message.name(), message.msg_type());
            println!("{message:#?}");
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> Result<ConfigStore> {
    let config = ConfigStore::load(path)
        .wrap_err_with(|| format!("cannot load configuration {}", path.display()))?;
    info!(path = %path.display(), entries = config.len(), "Configuration loaded");
    Ok(config)
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();
}
