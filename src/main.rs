use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ethers::types::Address;
use tracing_subscriber::EnvFilter;

use defai::agent::{CommandRouter, LlmClassifier, RouterDeps};
use defai::chain::{ChainClient, EthersChainClient};
use defai::channels::{ReplChannel, run_session};
use defai::config::Config;
use defai::defi::{
    ConfirmationQueue, LegacyRatioTable, LiquidityQuoteMode, NonceSequencer, PriceOracle,
    QuoteService, ReserveOracle, TransactionBuilder,
};
use defai::llm::{OpenAiCompatibleGenerator, RetryingGenerator, TextGenerator, prompts};
use defai::network::{NetworkRegistry, TokenRegistry, parse_address};
use defai::signer::{LocalKeySigner, Signer};

#[derive(Parser, Debug)]
#[command(name = "defai", version, about = "Flare DeFi command router")]
struct Cli {
    /// TOML config file (defaults to ~/.defai/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wallet to bind for this session, overriding WALLET_ADDRESS.
    #[arg(long)]
    wallet: Option<String>,

    /// Send one message and exit.
    #[arg(short, long)]
    message: Option<String>,

    /// Print replies as JSON instead of rendered markdown.
    #[arg(long)]
    raw: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("defai=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_router(config: &Config) -> anyhow::Result<CommandRouter> {
    let registry = NetworkRegistry::builtin()?;
    let network = Arc::new(
        registry
            .profile(config.network.id)
            .cloned()
            .with_context(|| format!("no profile for {}", config.network.id))?,
    );
    let tokens = Arc::new(TokenRegistry::builtin(network.id)?);

    let chain: Arc<dyn ChainClient> =
        Arc::new(EthersChainClient::connect(&config.network.rpc_url, config.rpc)?);
    match chain.chain_id().await {
        Ok(id) if id != network.chain_id => tracing::warn!(
            expected = network.chain_id,
            reported = id,
            "RPC endpoint reports a different chain id; plans use the profile's"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not read chain id from RPC endpoint: {}", e),
    }

    let wrapped = tokens.resolve(network.wrapped_symbol)?.clone();
    let oracle: Arc<dyn PriceOracle> = match config.liquidity_mode {
        LiquidityQuoteMode::Reserves => {
            let wrapped_address = wrapped
                .address()
                .with_context(|| format!("{} has no contract address", wrapped.symbol))?;
            Arc::new(ReserveOracle::new(
                Arc::clone(&chain),
                network.factory,
                wrapped_address,
            ))
        }
        LiquidityQuoteMode::Legacy => Arc::new(LegacyRatioTable),
    };
    let quotes = Arc::new(QuoteService::new(
        Arc::clone(&chain),
        Arc::clone(&network),
        wrapped,
        oracle,
    ));
    let nonces = Arc::new(NonceSequencer::new(Arc::clone(&chain)));
    let builder = Arc::new(TransactionBuilder::new(
        Arc::clone(&chain),
        Arc::clone(&network),
        Arc::clone(&tokens),
        quotes,
        Arc::clone(&nonces),
    ));
    let confirmations = Arc::new(ConfirmationQueue::new(
        config.confirmation.capacity,
        config.confirmation.ttl,
    ));

    if config.llm.api_key.is_none() {
        tracing::warn!("No LLM API key configured; free-form messages will fail to classify");
    }
    let backend: Arc<dyn TextGenerator> = Arc::new(OpenAiCompatibleGenerator::new(
        config.llm.generator_config(prompts::PERSONA),
    )?);
    let llm_retry = config.llm.retry_policy(config.rpc);
    let generator: Arc<dyn TextGenerator> =
        Arc::new(RetryingGenerator::new(Arc::clone(&backend), llm_retry));
    let symbols = tokens.supported_symbols();
    let classifier = Arc::new(
        LlmClassifier::new(backend, Arc::clone(&network), &symbols).with_retry_policy(llm_retry),
    );

    let signer: Option<Arc<dyn Signer>> = match &config.wallet.signer_key {
        Some(key) => Some(Arc::new(LocalKeySigner::new(
            key,
            &config.network.rpc_url,
            network.chain_id,
            config.rpc,
        )?)),
        None => None,
    };

    tracing::info!(
        network = %network.id,
        chain_id = network.chain_id,
        tokens = symbols.len(),
        signer = signer.is_some(),
        "Router ready"
    );

    Ok(CommandRouter::new(RouterDeps {
        network,
        tokens,
        chain,
        builder,
        nonces,
        confirmations,
        classifier,
        generator,
        signer,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::from_env_with_toml(cli.config.as_deref())?;

    let wallet: Option<Address> = match &cli.wallet {
        Some(raw) => Some(parse_address(raw).map_err(anyhow::Error::msg)?),
        None => config.wallet.address,
    };

    let router = Arc::new(build_router(&config).await?);

    let channel = match cli.message {
        Some(message) => ReplChannel::with_message(message),
        None => ReplChannel::new(),
    };
    channel.set_raw_output(cli.raw);

    run_session(&channel, router, wallet, |address| {
        defai::bootstrap::save_bootstrap_env(&[("WALLET_ADDRESS", address)])
    })
    .await?;

    Ok(())
}
