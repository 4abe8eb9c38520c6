//! feeswap - fee-splitting swap transaction builder
//!
//! Command line entry point.
//!
//! ## Commands
//!
//! - **serve**: run the HTTP API
//! - **quote**: price and store one quote, print it as JSON
//! - **build**: reprice and build a transaction for a user, print it as JSON
//! - **keygen-check**: load the fee-vault secret and confirm it owns the vault

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feeswap::aggregator::JupiterClient;
use feeswap::api::{self, AppState};
use feeswap::config::{Config, QuoteStoreKind};
use feeswap::ledger::SolanaLedger;
use feeswap::lifecycle::{QuoteParams, ServiceDeps, SwapService};
use feeswap::metrics::Metrics;
use feeswap::observability::TraceContext;
use feeswap::quote::SystemClock;
use feeswap::store::{IdentityStore, MemoryIdentityStore, MemoryQuoteStore, QuoteStore, SledQuoteStore};
use feeswap::tx_builder::SwapTxBuilder;
use feeswap::wallet::{load_keypair, EnvSecret};
use solana_sdk::signature::Signer;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "feeswap.toml", env = "FEESWAP_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Price a route and store the quote
    Quote(TradeArgs),
    /// Reprice and build a partially signed swap transaction
    Build {
        #[command(flatten)]
        trade: TradeArgs,
    },
    /// Check the fee-vault secret against the configured owner
    KeygenCheck,
}

#[derive(Args, Debug)]
struct TradeArgs {
    #[arg(long)]
    input_mint: String,
    #[arg(long)]
    output_mint: String,
    /// Input amount in atoms
    #[arg(long)]
    amount: u128,
    #[arg(long, default_value_t = 50)]
    slippage_bps: u16,
    #[arg(long)]
    dynamic_slippage: bool,
    #[arg(long)]
    referral: Option<String>,
    /// End user wallet; required for `build`
    #[arg(long)]
    user: Option<String>,
}

impl TradeArgs {
    fn into_params(self) -> QuoteParams {
        QuoteParams {
            user_public_key: self.user,
            input_mint: self.input_mint,
            output_mint: self.output_mint,
            amount: self.amount,
            slippage_bps: self.slippage_bps,
            dynamic_slippage: self.dynamic_slippage,
            referral_slug: self.referral,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting feeswap");
    let config = Config::from_file_with_env(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Quote(trade) => {
            let (service, _) = build_service(&config).await?;
            let quote = service
                .get_and_store_quote(&trade.into_params(), &TraceContext::new("cli_quote"))
                .await
                .context("Quote request failed")?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
            Ok(())
        }
        Command::Build { trade } => {
            if trade.user.is_none() {
                bail!("--user is required to build a transaction");
            }
            let (service, _) = build_service(&config).await?;
            let response = service
                .build_swap_fresh(&trade.into_params(), &TraceContext::new("cli_build"))
                .await
                .context("Swap build failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::KeygenCheck => keygen_check(&config).await,
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "feeswap=debug,info"
    } else {
        "feeswap=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }
    Ok(())
}

/// Wire collaborators from config
async fn build_service(config: &Config) -> Result<(Arc<SwapService>, Arc<Metrics>)> {
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let ledger = Arc::new(SolanaLedger::new(
        config.rpc.url.clone(),
        config.commitment()?,
        config.rpc_timeout(),
    ));
    let aggregator = Arc::new(JupiterClient::new(
        config.aggregator.base_url.clone(),
        config.aggregator.api_key.clone(),
        config.aggregator_timeout(),
    ));

    let quotes: Arc<dyn QuoteStore> = match config.quotes.store {
        QuoteStoreKind::Memory => Arc::new(MemoryQuoteStore::new()),
        QuoteStoreKind::Sled => Arc::new(
            SledQuoteStore::open(&config.quotes.sled_path).with_context(|| {
                format!("Failed to open quote store at {}", config.quotes.sled_path.display())
            })?,
        ),
    };
    let identities: Arc<dyn IdentityStore> = match &config.identity.seed_file {
        Some(path) => Arc::new(
            MemoryIdentityStore::from_seed_file(path)
                .await
                .with_context(|| format!("Failed to load identities from {}", path.display()))?,
        ),
        None => {
            warn!("No identity seed file configured; every referral slug will be unknown");
            Arc::new(MemoryIdentityStore::new())
        }
    };

    let builder = SwapTxBuilder::new(
        ledger,
        aggregator.clone(),
        Arc::clone(&metrics),
        config.builder_options(),
    );
    let service = SwapService::new(
        ServiceDeps {
            quotes,
            identities,
            aggregator,
            builder,
            custody: Arc::new(EnvSecret {
                var: config.fees.fee_vault_secret_env.clone(),
            }),
            clock: Arc::new(SystemClock),
            metrics: Arc::clone(&metrics),
        },
        config.service_settings()?,
    );

    info!(
        rpc = %config.rpc.url,
        aggregator = %config.aggregator.base_url,
        fee_side = ?config.fees.fee_side,
        simulation = ?config.simulation.policy,
        quote_store = ?config.quotes.store,
        "Service initialized"
    );
    Ok((Arc::new(service), metrics))
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let (service, metrics) = build_service(&config).await?;
    let api_tokens: HashSet<String> = config.server.api_tokens.iter().cloned().collect();
    if api_tokens.is_empty() {
        warn!("No API tokens configured; swap routes will reject every request");
    }

    let app = api::router(AppState {
        service,
        metrics,
        api_tokens: Arc::new(api_tokens),
    });
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
    };
    api::endpoint_server(&addr, app, shutdown).await
}

async fn keygen_check(config: &Config) -> Result<()> {
    let expected = config.fee_vault_owner()?;
    let source = EnvSecret {
        var: config.fees.fee_vault_secret_env.clone(),
    };
    let keypair = load_keypair(&source)
        .await
        .context("Failed to load fee-vault secret")?;
    let actual = keypair.pubkey();
    if actual != expected {
        bail!("fee-vault secret belongs to {actual}, config expects {expected}");
    }
    info!(fee_vault_owner = %actual, "Fee-vault secret matches configured owner");
    println!("{actual}");
    Ok(())
}
