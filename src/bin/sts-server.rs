//! Lab server: answers the hello, AES, DH, STS and CTF demos.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use log::{info, warn};

use sts_lab::security::GroupParams;
use sts_lab::server::Server;
use sts_lab::transport::{Endpoint, TcpTransport};
use sts_lab::PartyConfig;

#[derive(Parser)]
#[command(name = "sts-server", version, about = "Station-to-Station lab server")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Host name advertised as our return address
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// Port to listen on
    #[arg(long, default_value_t = 31415)]
    listen: u16,

    /// Seconds an unfinished handshake may stay idle
    #[arg(long, default_value_t = 30)]
    session_timeout: u64,

    /// Use the 128-bit lab group instead of the 512-bit default
    #[arg(long)]
    lab_group: bool,

    /// RNG seed, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Server certificate (required for STS and CTF)
    certificate: Option<PathBuf>,

    /// Server secret key
    secret_key: Option<PathBuf>,

    /// The issuing authority's public key
    authority_key: Option<PathBuf>,
}

fn run(cli: &Cli) -> Result<()> {
    let group = if cli.lab_group {
        GroupParams::lab_128()
    } else {
        GroupParams::default()
    };

    let party = match (&cli.certificate, &cli.secret_key, &cli.authority_key) {
        (Some(cert), Some(sk), Some(auth)) => {
            let party = PartyConfig::load(cert, sk, auth)
                .with_context(|| format!("loading identity from {}", cert.display()))?;
            info!("STS enabled as {:?}", party.name());
            Some(Arc::new(party.with_group(group.clone())))
        }
        (None, None, None) => {
            warn!("no identity files given: STS and CTF are disabled");
            None
        }
        _ => bail!("give all of <certificate> <secret-key> <authority-key>, or none"),
    };

    let transport = TcpTransport::bind(Endpoint::new(cli.hostname.clone(), cli.listen))
        .with_context(|| format!("cannot listen on port {}", cli.listen))?;
    let mut server = Server::new(transport, party, cli.seed)
        .with_dh_group(group)
        .with_session_timeout(Duration::from_secs(cli.session_timeout));

    println!("Listening on {}", server.local_endpoint());
    server.run()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::from(2)
        }
    }
}
