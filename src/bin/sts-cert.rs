//! Issue and check identity certificates.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::debug;

use sts_lab::security::{RsaPrivateKey, RsaPublicKey};
use sts_lab::Certificate;

#[derive(Parser)]
#[command(name = "sts-cert", version, about = "Certificate authority tool")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign <pub-key> for <subject>; writes <subject>_certificate.txt
    Create {
        /// The authority's secret key
        authority_key: PathBuf,
        /// The subject's public key
        public_key: PathBuf,
        subject: String,
        issuer: String,
    },
    /// Check a certificate against the authority's public key
    Verify {
        authority_key: PathBuf,
        certificate: PathBuf,
    },
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Create {
            authority_key,
            public_key,
            subject,
            issuer,
        } => {
            let authority = RsaPrivateKey::load(&authority_key)
                .with_context(|| format!("reading {}", authority_key.display()))?;
            let subject_key = RsaPublicKey::load(&public_key)
                .with_context(|| format!("reading {}", public_key.display()))?;

            let cert = Certificate::create(&subject, &issuer, &subject_key, &authority)?;
            let path = format!("{}_certificate.txt", subject);
            cert.save(&path).with_context(|| format!("writing {}", path))?;
            println!("{}", path);
            Ok(true)
        }
        Commands::Verify {
            authority_key,
            certificate,
        } => {
            let authority = RsaPublicKey::load(&authority_key)
                .with_context(|| format!("reading {}", authority_key.display()))?;
            let cert = Certificate::load(&certificate)
                .with_context(|| format!("reading {}", certificate.display()))?;
            debug!("checking {:?} issued by {:?}", cert.subject(), cert.issuer());

            let valid = cert.is_valid(&authority);
            if valid {
                println!("[ VALID CERTIFICATE ]");
            } else {
                println!("[ INVALID CERTIFICATE ]");
            }
            Ok(valid)
        }
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

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::from(2)
        }
    }
}
