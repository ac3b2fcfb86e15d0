//! Generate an RSA key pair as `<prefix>_pub.txt` and `<prefix>_sec.txt`.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::info;

use sts_lab::security::{RsaKeyGenConfig, RsaKeyPair};

#[derive(Parser)]
#[command(name = "sts-keygen", version, about = "RSA key pair generator")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Modulus size in bits
    bits: usize,

    /// Output file prefix
    prefix: String,

    /// Public exponent
    #[arg(short, long, default_value_t = 65537)]
    exponent: u64,

    /// RNG seed, for reproducible keys
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
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

    let config = RsaKeyGenConfig {
        key_size: cli.bits,
        public_exponent: cli.exponent,
        seed: cli.seed,
    };
    let keys = RsaKeyPair::generate(&config).context("key generation failed")?;
    keys.save(&cli.prefix)
        .with_context(|| format!("cannot write {}_pub.txt / {}_sec.txt", cli.prefix, cli.prefix))?;

    info!("wrote {}-bit key pair", keys.public_key.n.bits());
    println!("{}_pub.txt", cli.prefix);
    println!("{}_sec.txt", cli.prefix);
    Ok(())
}
