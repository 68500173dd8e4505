use clap::Parser;
use relayd::config::Config;
use relayd::context::RuntimeContext;
use relayd::enclave::{Enclave, SoftwareEnclave};
use relayd::error::AppError;
use relayd::network::client::RestP2pClient;
use relayd::network::discovery;
use relayd::network::helper::DiscoveryHelper;
use relayd::network::key_synchroniser::EnclaveKeySynchroniser;
use relayd::network::publish::{RestPayloadPublisher, RestResendBatchPublisher};
use relayd::network::store::NetworkStore;
use relayd::payload::BincodeCodec;
use relayd::recovery::batch_resend::BatchResendManager;
use relayd::recovery::batch_workflow::BatchWorkflowFactory;
use relayd::recovery::legacy_resend::LegacyResendManager;
use relayd::recovery::ResendServices;
use relayd::storage::SledTransactionStore;
use relayd::sync::poller::SyncPoller;
use relayd::sync::resend_party_store::ResendPartyStore;
use relayd::sync::transaction_requester::TransactionRequester;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(about = "Private transaction relay daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "relayd.toml")]
    config: String,

    #[arg(long)]
    generate_config: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        match Config::default().save_to_file(&args.config) {
            Ok(_) => {
                println!("Generated default config at: {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("Failed to generate config: {e}");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_or_create(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config {}: {e}", args.config);
            std::process::exit(1);
        }
    };

    setup_logging(&config.logging, args.verbose);

    if let Err(e) = run(config).await {
        tracing::error!("Fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let ctx = RuntimeContext::from_config(&config)?;
    tracing::info!(
        "Starting relayd v{} as {}",
        env!("CARGO_PKG_VERSION"),
        ctx.p2p_server_uri()
    );

    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db = sled::open(format!("{}/relayd.db", config.storage.data_dir))
        .map_err(relayd::error::StoreError::from)?;
    let transaction_store = Arc::new(SledTransactionStore::open(&db, "transactions")?);
    let staging_store = Arc::new(SledTransactionStore::open(&db, "staging")?);

    let enclave = Arc::new(load_enclave(&config)?);
    for key in enclave.public_keys() {
        tracing::info!("Managing key {key}");
    }

    let network_store = Arc::new(NetworkStore::new());
    let helper = Arc::new(DiscoveryHelper::new(
        network_store.clone(),
        enclave.clone(),
        ctx.p2p_server_uri().clone(),
    ));
    helper.on_create();

    let discovery = discovery::create(&ctx, network_store.clone(), helper.clone());
    let key_synchroniser = Arc::new(EnclaveKeySynchroniser::new(
        enclave.clone(),
        network_store.clone(),
        ctx.p2p_server_uri().clone(),
    ));

    let request_timeout = Duration::from_secs(config.network.request_timeout_secs.max(1));
    let p2p_client = Arc::new(RestP2pClient::with_timeout(request_timeout));
    let codec = Arc::new(BincodeCodec);

    let resend_party_store = Arc::new(ResendPartyStore::new());
    // configured peers are first-round candidates even before any inbound
    // announcement arrives
    resend_party_store.add_unseen_parties(
        ctx.peers()
            .iter()
            .map(|uri| relayd::types::Party::new(uri.as_str())),
    );

    let transaction_requester = Arc::new(TransactionRequester::new(
        enclave.clone(),
        p2p_client.clone(),
    ));
    let poller = Arc::new(SyncPoller::new(
        resend_party_store,
        transaction_requester,
        discovery.clone(),
        p2p_client.clone(),
    ));

    let batch_publisher = Arc::new(RestResendBatchPublisher::new(
        p2p_client.clone(),
        codec.clone(),
    ));
    let payload_publisher = Arc::new(RestPayloadPublisher::new(
        p2p_client.clone(),
        codec.clone(),
        helper.clone(),
    ));
    let workflow_factory =
        BatchWorkflowFactory::new(enclave.clone(), network_store.clone(), batch_publisher);
    let resend_services = ResendServices::new(
        Arc::new(BatchResendManager::new(
            transaction_store.clone(),
            staging_store,
            codec.clone(),
            workflow_factory,
            config.sync.max_batch_size,
        )),
        Arc::new(LegacyResendManager::new(
            enclave.clone(),
            transaction_store,
            codec,
            payload_publisher,
            config.sync.resend_fetch_size,
        )),
    );

    // anything a previous run staged but never committed goes into the
    // main store before the first sync round
    let promoted = resend_services.promote_staged().await?;
    if promoted > 0 {
        tracing::info!("Promoted {promoted} staged transaction(s)");
    }

    // periodic peer sync rounds
    let sync_poller = poller.clone();
    let sync_interval = Duration::from_secs(config.sync.interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sync_interval);
        loop {
            ticker.tick().await;
            sync_poller.run().await;
        }
    });

    // keep our own advertised keys in lockstep with the enclave
    let key_sync_interval = Duration::from_secs(config.sync.key_sync_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(key_sync_interval);
        loop {
            ticker.tick().await;
            key_synchroniser.sync_keys();
        }
    });

    tracing::info!("relayd running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

fn load_enclave(config: &Config) -> Result<SoftwareEnclave, AppError> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    if config.keys.secrets.is_empty() {
        tracing::warn!("No keys configured; generating an ephemeral keypair");
        return Ok(SoftwareEnclave::generate(1));
    }

    let mut secrets = Vec::with_capacity(config.keys.secrets.len());
    for encoded in &config.keys.secrets {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| AppError::KeyLoad(format!("invalid base64 secret: {e}")))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AppError::KeyLoad("secret must be exactly 32 bytes".to_string()))?;
        secrets.push(secret);
    }
    Ok(SoftwareEnclave::from_secrets(secrets))
}

fn setup_logging(config: &relayd::config::LoggingConfig, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt().with_env_filter(filter).with_target(false).init();
}
