use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::time::Duration;
use tracing::{error, info};

use sentinel_chain::chain::{
    check, recover, ChainStore, ReadOutcome, Recovery, StoreOptions, VerifyReport,
};
use sentinel_chain::config::AppConfig;

fn main() -> Result<()> {
    let matches = Command::new("verify-chain")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify the integrity of a Zero-Day Sentinel chain document")
        .arg(
            Arg::new("chain-file")
                .short('c')
                .long("chain-file")
                .value_name("PATH")
                .help("Path to the chain document (defaults to the configured chain_file)"),
        )
        .arg(
            Arg::new("lock-timeout-ms")
                .long("lock-timeout-ms")
                .value_name("MILLIS")
                .value_parser(clap::value_parser!(u64))
                .default_value("5000")
                .help("How long to wait for the document lock"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let chain_file = match matches.get_one::<String>("chain-file") {
        Some(path) => path.clone(),
        None => AppConfig::load()?.chain_file,
    };
    let lock_timeout = matches
        .get_one::<u64>("lock-timeout-ms")
        .copied()
        .unwrap_or(5000);

    let store = ChainStore::new(
        &chain_file,
        StoreOptions {
            lock_timeout: Duration::from_millis(lock_timeout),
            fsync_writes: false,
        },
    );

    if let Err(e) = verify_chain_file(&store, verbose, quiet) {
        error!("Chain verification failed: {}", e);
        if !quiet {
            eprintln!("✗ {}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Check the stored document and describe what a reload would keep.
/// Creates neither the document, its directory nor the lock sidecar.
fn verify_chain_file(store: &ChainStore, verbose: bool, quiet: bool) -> Result<()> {
    info!("Verifying chain document: {}", store.path().display());

    let outcome = store.read_only()?;
    if let (true, ReadOutcome::Loaded(doc)) = (verbose, &outcome) {
        println!("Loaded {} entries (version {})", doc.chain.len(), doc.version);
    }

    let report = check(outcome.clone(), store.version());
    match report {
        VerifyReport::Valid { length } => {
            if !quiet {
                println!("✓ Chain is valid ({} entries)", length);
            }
            Ok(())
        }
        VerifyReport::Invalid { reason, .. } => {
            let kept = match recover(outcome, store.version()) {
                Recovery::Truncated { entries, .. } => entries.len(),
                _ => 0,
            };
            if verbose {
                println!("A reload would keep {} entries", kept);
            }
            Err(anyhow!("{}", reason))
        }
    }
}
