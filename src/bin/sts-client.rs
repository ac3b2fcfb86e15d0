//! Lab client: runs one demo mode against an `sts-server`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, info};

use sts_lab::client::{aes_round_trip, Client};
use sts_lab::demo::DEMO_PLAINTEXT;
use sts_lab::security::{seeded_rng, GroupParams};
use sts_lab::transport::{Endpoint, TcpTransport};
use sts_lab::{Error, PartyConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Send a greeting and print the reply.
    #[value(name = "try_send")]
    Send,
    /// Encrypt and decrypt locally with the demo AES key. Sends nothing.
    #[value(name = "try_aes")]
    Aes,
    /// Send a message encrypted with the demo AES key.
    #[value(name = "try_send_aes")]
    SendAes,
    /// Unauthenticated Diffie-Hellman, then one encrypted message.
    #[value(name = "try_DH")]
    Dh,
    /// Station-to-Station handshake with the server.
    #[value(name = "try_STS")]
    Sts,
    /// Retrieve the flag prepared for --name.
    #[value(name = "try_CTF")]
    Ctf,
}

#[derive(Parser)]
#[command(name = "sts-client", version, about = "Station-to-Station lab client")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Server host
    #[arg(long, default_value = "localhost")]
    sendto: String,

    /// Server port
    #[arg(long, default_value_t = 31415)]
    port: u16,

    /// Our own host name, used as the return address
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// Local port to receive replies on
    #[arg(long, default_value_t = 1789)]
    listen: u16,

    /// User name (try_send greeting, try_CTF claim)
    #[arg(long, default_value = "john.smith")]
    name: String,

    /// Expected server name for try_STS
    #[arg(long)]
    expect: Option<String>,

    /// Use the 128-bit lab group instead of the 512-bit default
    #[arg(long)]
    lab_group: bool,

    /// RNG seed, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    #[arg(value_enum)]
    mode: Mode,

    /// Our certificate (try_STS, try_CTF)
    certificate: Option<PathBuf>,

    /// Our secret key
    secret_key: Option<PathBuf>,

    /// The issuing authority's public key
    authority_key: Option<PathBuf>,
}

impl Cli {
    fn group(&self) -> GroupParams {
        if self.lab_group {
            GroupParams::lab_128()
        } else {
            GroupParams::default()
        }
    }

    fn party(&self) -> Result<Arc<PartyConfig>> {
        let (Some(cert), Some(sk), Some(auth)) =
            (&self.certificate, &self.secret_key, &self.authority_key)
        else {
            bail!("{:?} needs <certificate> <secret-key> <authority-key>", self.mode);
        };
        let party = PartyConfig::load(cert, sk, auth)
            .with_context(|| format!("loading identity from {}", cert.display()))?;
        Ok(Arc::new(party.with_group(self.group())))
    }
}

fn connect(cli: &Cli) -> Result<Client<TcpTransport>> {
    let transport = TcpTransport::bind(Endpoint::new(cli.hostname.clone(), cli.listen))
        .with_context(|| format!("cannot listen on port {}", cli.listen))?;
    let server = Endpoint::new(cli.sendto.clone(), cli.port);
    debug!("talking to {}", server);
    Ok(Client::new(transport, server, cli.seed))
}

fn run(cli: &Cli) -> Result<bool> {
    let outcome = match cli.mode {
        Mode::Aes => aes_round_trip(DEMO_PLAINTEXT, &mut seeded_rng(cli.seed)).and_then(|ok| {
            if ok {
                Ok(())
            } else {
                Err(Error::Crypto("local round trip mismatch".into()))
            }
        }),
        Mode::Send => connect(cli)?.hello(&cli.name).map(|reply| {
            println!("Received \"{}\"", reply);
        }),
        Mode::SendAes => connect(cli)?.send_aes(DEMO_PLAINTEXT).and_then(|ok| {
            if ok {
                Ok(())
            } else {
                Err(Error::Crypto("server could not decrypt".into()))
            }
        }),
        Mode::Dh => connect(cli)?.diffie_hellman(&cli.group()).map(|_| ()),
        Mode::Sts => {
            let party = cli.party()?;
            connect(cli)?
                .station_to_station(party, cli.expect.clone())
                .map(|session| {
                    info!("session {} with {:?}", session.id(), session.peer_name());
                })
        }
        Mode::Ctf => {
            let party = cli.party()?;
            connect(cli)?.capture_the_flag(party, &cli.name).map(|flag| {
                println!("[CTF] Congratulations! You captured your flag!\nSecret={}", flag);
            })
        }
    };

    let label = cli.mode.to_possible_value().map(|v| v.get_name().to_string());
    let label = label.unwrap_or_default();
    match outcome {
        Ok(()) => {
            println!("{}: [OK]", label);
            Ok(true)
        }
        // Protocol level failures are a failed demo, not a broken setup.
        Err(Error::Handshake(reason)) => {
            println!("{}: [FAILED] ({})", label, reason);
            Ok(false)
        }
        Err(Error::Crypto(reason)) | Err(Error::Parse(reason)) => {
            println!("{}: [FAILED] ({})", label, reason);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::from(2)
        }
    }
}
