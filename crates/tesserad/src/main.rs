//! `tesserad` — the Tessera daemon.
//!
//! Binary entrypoint that ties all Tessera components together into a
//! running transparency-log node with a public HTTP API.
//!
//! # Usage
//!
//! ```text
//! tesserad start                              # start the node
//! tesserad start -c tessera.toml              # start with a config file
//! tesserad start -d ./node2 -l 127.0.0.1:4921 # second instance
//! tesserad start --peer <endpoint_id>         # join an existing cluster
//! tesserad keygen -n 5 -o ./keys              # deal a signer set
//! tesserad status                             # query a running node
//! ```

mod api;
mod config;
mod handler;
mod keys;
mod node;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tessera_dht::{DhtConfig, DhtNode};
use tessera_log::{LogStore, TransparencyLogService};
use tessera_net::{TesseraRpc, TesseraTransport};
use tessera_store::{FjallStore, MemoryStore, RecordStore};
use tessera_types::{NodeEvent, PeerId};
use tokio::sync::broadcast;
use tracing::{info, warn};

use config::CliConfig;
use handler::TesseraProtocol;
use node::SignerContext;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "tesserad",
    version,
    about = "Tessera election transparency log daemon"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Tessera node.
    Start {
        /// Override data directory (useful for running multiple instances).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Override HTTP API listen address (e.g. "127.0.0.1:4921").
        #[arg(short = 'l', long)]
        api_listen_addr: Option<String>,

        /// Peer node(s) to connect to on startup.
        ///
        /// Format: `<endpoint_id>` or `<endpoint_id>@<host:port>`.
        /// Can be specified multiple times.
        #[arg(short, long)]
        peer: Vec<String>,

        /// Cluster secret for authentication (nodes must share the same secret).
        ///
        /// Can also be set via TESSERA_SECRET env var or `[cluster] secret` in
        /// the config file. If none is provided, a random secret is generated
        /// and displayed.
        #[arg(long, env = "TESSERA_SECRET")]
        secret: Option<String>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },

    /// Deal a threshold signer set (trusted dealer, run once).
    Keygen {
        /// Number of signers in the set.
        #[arg(short = 'n', long, default_value = "5")]
        nodes: u16,

        /// Directory to write the roster and share files into.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Show node status over the HTTP API.
    Status {
        /// Base URL of the node's API.
        #[arg(long, default_value = "http://127.0.0.1:4920")]
        url: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            data_dir,
            api_listen_addr,
            peer,
            secret,
            memory,
        } => {
            // CLI args override config file values.
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(addr) = api_listen_addr {
                config.node.api_listen_addr = addr;
            }
            if !peer.is_empty() {
                config.cluster.peers = peer;
            }
            if let Some(s) = secret {
                config.cluster.secret = s;
            }
            if memory {
                config.storage.backend = "memory".to_string();
            }
            cmd_start(config).await
        }
        Commands::Keygen { nodes, output_dir } => keys::keygen(&output_dir, nodes),
        Commands::Status { url } => cmd_status(&url).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// tesserad start
// -----------------------------------------------------------------------

async fn cmd_start(mut config: CliConfig) -> Result<()> {
    info!("starting tesserad");
    info!(
        data_dir = %config.node.data_dir.display(),
        api_addr = %config.node.api_listen_addr,
        backend = %config.storage.backend,
        retention_days = config.retention.days,
        "node configuration"
    );

    let memory_mode = config.storage.backend == "memory";

    // Create data directory (skip in memory mode).
    if !memory_mode {
        std::fs::create_dir_all(&config.node.data_dir)
            .context("failed to create data directory")?;
    }

    // --- Node identity (iroh SecretKey) ---
    let secret_key = if memory_mode {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key = SecretKey::from(bytes);
        info!("generated ephemeral node key (memory mode)");
        key
    } else {
        load_or_create_secret_key(&config.node.data_dir)?
    };
    let public_key = secret_key.public();
    let local_peer = PeerId::from_data(public_key.as_bytes());
    info!(%local_peer, endpoint_id = %public_key.fmt_short(), "node identity");

    // --- Cluster secret ---
    // If no secret was provided (CLI flag, env var, or config file), generate
    // a random one and display it so the operator can pass it to other nodes.
    let generated_secret = config.cluster.secret.is_empty();
    if generated_secret {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        config.cluster.secret = bytes.iter().map(|b| format!("{b:02x}")).collect();
    }

    // --- Network transport (iroh QUIC) ---
    // Derive a cluster-specific ALPN from the shared secret so that nodes
    // with different secrets cannot even establish QUIC connections.
    let cluster_alpn = tessera_net::cluster_alpn(config.cluster.secret.as_bytes());
    info!(
        cluster_id = %&blake3::hash(config.cluster.secret.as_bytes()).to_hex()[..16],
        "cluster identity derived from secret"
    );

    // Create the iroh endpoint directly. The Router will manage the accept
    // loop for incoming connections; the TesseraTransport is used only for
    // outgoing connections (DHT RPCs, share requests, announcements).
    let endpoint = Endpoint::builder()
        .secret_key(secret_key)
        .alpns(vec![cluster_alpn.clone()])
        .relay_mode(iroh::RelayMode::Default)
        .bind()
        .await
        .context("failed to bind iroh endpoint")?;

    let transport = Arc::new(TesseraTransport::from_endpoint_with_alpn(
        endpoint.clone(),
        cluster_alpn.clone(),
    ));
    let rpc = Arc::new(TesseraRpc::new(transport.clone()));

    info!(endpoint_id = %endpoint.id().fmt_short(), "iroh endpoint ready");
    for addr in endpoint.addr().ip_addrs() {
        info!(%addr, "listening on");
    }

    // --- Transparency log ---
    let log_store = if memory_mode {
        info!("using in-memory log store");
        LogStore::in_memory()
    } else {
        let log_path = config.node.data_dir.join("log");
        LogStore::open(&log_path).context("failed to open log store")?
    };
    let log = Arc::new(
        TransparencyLogService::open(log_store, config.max_payload_bytes())
            .context("failed to open transparency log")?,
    );
    info!(tree_size = log.tree_size(), "transparency log ready");

    // --- Record store ---
    let record_store: Arc<dyn RecordStore> = if memory_mode {
        info!("using in-memory record store");
        Arc::new(MemoryStore::new())
    } else {
        let store_path = config.node.data_dir.join("records");
        info!(path = %store_path.display(), "using persistent record store");
        Arc::new(FjallStore::open(&store_path).context("failed to open record store")?)
    };

    // --- Distributed value store ---
    let dht = Arc::new(DhtNode::new(
        local_peer,
        DhtConfig {
            retention_secs: config.retention_secs(),
            ..DhtConfig::default()
        },
        record_store,
        rpc.clone(),
    ));

    // --- Connect to peer nodes ---
    let mut seeds = Vec::new();
    for peer_str in &config.cluster.peers {
        match parse_peer(peer_str) {
            Ok(addr) => {
                info!(peer = %peer_str, "adding seed peer");
                seeds.push(rpc.add_peer_addr(addr));
            }
            Err(e) => {
                warn!(peer = %peer_str, %e, "invalid peer format, skipping");
            }
        }
    }
    if !seeds.is_empty() {
        dht.bootstrap(&seeds).await;
    }

    // --- Signer identity and quorum coordinator ---
    let events: broadcast::Sender<NodeEvent> = broadcast::channel(64).0;
    let signer = load_signer_context(&config)?;
    let quorum = signer.as_ref().map(|ctx| {
        let quorum_config = tessera_quorum::QuorumConfig {
            group_key: ctx.roster.group_key.clone(),
            signers: ctx.roster.public_shares.clone(),
            session_ttl: Duration::from_secs(config.session_ttl_secs()),
            sweep_interval: Duration::from_secs(1),
        };
        info!(
            signer_index = ctx.index,
            threshold = quorum_config.threshold(),
            signers = quorum_config.signers.len(),
            "signing enabled"
        );
        Arc::new(tessera_quorum::start(quorum_config, events.clone()))
    });

    // --- Incoming connection handler (iroh Router) ---
    let protocol = TesseraProtocol::new(
        log.clone(),
        dht.clone(),
        rpc.clone(),
        signer.clone(),
        events.clone(),
    );
    let router = Router::builder(endpoint.clone())
        .accept(cluster_alpn, protocol)
        .spawn();

    // Print join command for other nodes.
    if generated_secret {
        info!("cluster secret (generated): {}", config.cluster.secret);
    }
    info!(
        "to join this node: tesserad start --secret {} --peer {}",
        config.cluster.secret,
        endpoint.id()
    );

    // --- Background loops ---
    node::spawn_event_loop(
        log.clone(),
        dht.clone(),
        transport.clone(),
        rpc.clone(),
        events.subscribe(),
    );
    if let (Some(ctx), Some(quorum)) = (&signer, &quorum) {
        node::spawn_checkpoint_loop(
            log.clone(),
            quorum.clone(),
            transport.clone(),
            rpc.clone(),
            ctx.clone(),
            Duration::from_secs(config.checkpoint_interval_secs()),
        );
    }
    node::spawn_sweep_loop(dht.clone(), Duration::from_secs(3600));

    // --- Public HTTP API ---
    let state = api::AppState {
        log,
        dht,
        local_peer,
    };
    let listener = tokio::net::TcpListener::bind(&config.node.api_listen_addr)
        .await
        .with_context(|| format!("failed to bind API on {}", config.node.api_listen_addr))?;
    info!(addr = %config.node.api_listen_addr, "HTTP API ready");
    axum::serve(listener, api::router(state))
        .await
        .context("API server failed")?;

    // Gracefully shut down the iroh router (stops accepting new connections,
    // waits for in-flight handlers, then closes the endpoint).
    info!("shutting down iroh router");
    router.shutdown().await.context("router shutdown failed")?;
    if let Some(quorum) = quorum {
        quorum.shutdown();
    }

    Ok(())
}

/// Load this node's signing identity, if configured.
///
/// A node signs only when both a roster and a signer index are present;
/// everything else runs as a non-signing replica.
fn load_signer_context(config: &CliConfig) -> Result<Option<Arc<SignerContext>>> {
    let Some(index) = config.signing.signer_index else {
        return Ok(None);
    };
    let roster = keys::load_roster(&config.roster_file())?;
    anyhow::ensure!(
        roster.public_shares.iter().any(|s| s.signer() == index),
        "signer index {index} is not in the roster"
    );
    let share = keys::load_secret_share(&config.share_file(), index)?;
    Ok(Some(Arc::new(SignerContext {
        index,
        share,
        roster,
    })))
}

// -----------------------------------------------------------------------
// Networking helpers
// -----------------------------------------------------------------------

/// Parse a peer node string.
///
/// Formats:
/// - `<endpoint_id>` — hex-encoded 32-byte public key (iroh relay used for discovery)
/// - `<endpoint_id>@<host:port>` — with an explicit direct address
fn parse_peer(s: &str) -> Result<EndpointAddr> {
    let (id_str, addr_str) = match s.split_once('@') {
        Some((id, addr)) => (id, Some(addr)),
        None => (s, None),
    };

    let endpoint_id: iroh::EndpointId = id_str
        .parse()
        .context("invalid endpoint ID (expected hex-encoded public key)")?;

    let mut endpoint_addr = EndpointAddr::new(endpoint_id);
    if let Some(addr) = addr_str {
        let socket_addr: SocketAddr = addr
            .parse()
            .context("invalid socket address in peer (expected host:port)")?;
        endpoint_addr = endpoint_addr.with_ip_addr(socket_addr);
    }

    Ok(endpoint_addr)
}

// -----------------------------------------------------------------------
// Key management
// -----------------------------------------------------------------------

/// Load or create a persistent iroh secret key from `data_dir/node.key`.
///
/// On first run, generates a new random ed25519 key and writes it to
/// `node.key`. On subsequent runs, reads the existing key. This gives each
/// node a stable iroh identity across restarts, and different `data_dir`s
/// get different identities.
fn load_or_create_secret_key(data_dir: &Path) -> Result<SecretKey> {
    let key_path = data_dir.join("node.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("failed to read node.key")?;
        anyhow::ensure!(bytes.len() == 32, "node.key must be exactly 32 bytes");
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        let key = SecretKey::from_bytes(&arr);
        info!(
            endpoint_id = %key.public().fmt_short(),
            "loaded existing node key"
        );
        Ok(key)
    } else {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key = SecretKey::from(bytes);
        std::fs::write(&key_path, key.to_bytes()).context("failed to write node.key")?;
        info!(
            path = %key_path.display(),
            endpoint_id = %key.public().fmt_short(),
            "generated new node key"
        );
        Ok(key)
    }
}

// -----------------------------------------------------------------------
// tesserad status
// -----------------------------------------------------------------------

async fn cmd_status(url: &str) -> Result<()> {
    let client = tessera_audit::AuditClient::new(url);
    let status = client
        .fetch_status()
        .await
        .with_context(|| format!("cannot reach node at {url}. Is it running?"))?;

    println!("Node:      {}", status.peer_id);
    println!("Tree size: {}", status.tree_size);
    println!("Peers:     {}", status.peer_count);
    match status.latest_checkpoint {
        Some(cp) => {
            println!(
                "Latest checkpoint: size={} signers={:?}",
                cp.tree_size, cp.signer_set
            );
            println!("  root: {}", cp.root_hash);
        }
        None => println!("Latest checkpoint: none"),
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn random_endpoint_id() -> String {
        use rand::RngCore;
        let mut b = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut b);
        SecretKey::from(b).public().to_string()
    }

    #[test]
    fn test_parse_peer_endpoint_id_only() {
        let id_str = random_endpoint_id();
        let addr = parse_peer(&id_str).unwrap();
        assert_eq!(addr.id.to_string(), id_str);
        assert!(addr.is_empty()); // no direct addresses, relay-only
    }

    #[test]
    fn test_parse_peer_with_address() {
        let id_str = random_endpoint_id();
        let seed = format!("{id_str}@127.0.0.1:4920");

        let addr = parse_peer(&seed).unwrap();
        assert_eq!(addr.id.to_string(), id_str);
        assert!(!addr.is_empty()); // has a direct address
    }

    #[test]
    fn test_parse_peer_invalid() {
        assert!(parse_peer("not-a-valid-key").is_err());
        assert!(parse_peer("abc123@not-a-valid-addr").is_err());
    }

    #[test]
    fn test_cli_secret_flag_overrides_config() {
        let cli = Cli::try_parse_from(["tesserad", "start", "--secret", "my-unique-secret"])
            .expect("CLI should parse with --secret flag");

        match cli.command {
            Commands::Start { secret, .. } => {
                assert_eq!(secret.as_deref(), Some("my-unique-secret"));
            }
            _ => panic!("expected Start command"),
        }
    }

    #[test]
    fn test_cli_peer_flag() {
        let cli = Cli::try_parse_from(["tesserad", "start", "--peer", "abc123", "--peer", "def456"])
            .expect("CLI should parse with --peer flags");

        match cli.command {
            Commands::Start { peer, .. } => {
                assert_eq!(peer, vec!["abc123", "def456"]);
            }
            _ => panic!("expected Start command"),
        }
    }

    #[test]
    fn test_cli_keygen_defaults() {
        let cli = Cli::try_parse_from(["tesserad", "keygen"]).unwrap();
        match cli.command {
            Commands::Keygen { nodes, output_dir } => {
                assert_eq!(nodes, 5);
                assert_eq!(output_dir, PathBuf::from("."));
            }
            _ => panic!("expected Keygen command"),
        }
    }

    #[test]
    fn test_default_secret_is_empty() {
        // When no secret is configured, cmd_start generates a random one.
        let config = CliConfig::load(None).unwrap();
        assert!(config.cluster.secret.is_empty());
    }

    #[test]
    fn test_secret_key_persistence() {
        let dir = tempfile::tempdir().unwrap();

        // First call generates a new key.
        let key1 = load_or_create_secret_key(dir.path()).unwrap();

        // Second call loads the same key.
        let key2 = load_or_create_secret_key(dir.path()).unwrap();

        assert_eq!(key1.to_bytes(), key2.to_bytes());
        assert_eq!(key1.public(), key2.public());
    }

    #[test]
    fn test_signer_context_requires_roster_membership() {
        let dir = tempfile::tempdir().unwrap();
        keys::keygen(dir.path(), 4).unwrap();

        let toml = format!(
            r#"
[node]
data_dir = "{}"

[signing]
signer_index = 9
share_file = "signer-1.key"
"#,
            dir.path().display()
        );
        let config = CliConfig::from_toml(&toml).unwrap();
        assert!(load_signer_context(&config).is_err());
    }

    #[test]
    fn test_signer_context_loads_from_key_files() {
        let dir = tempfile::tempdir().unwrap();
        keys::keygen(dir.path(), 4).unwrap();

        let toml = format!(
            r#"
[node]
data_dir = "{}"

[signing]
signer_index = 2
share_file = "signer-2.key"
"#,
            dir.path().display()
        );
        let config = CliConfig::from_toml(&toml).unwrap();
        let ctx = load_signer_context(&config).unwrap().unwrap();
        assert_eq!(ctx.index, 2);
        assert_eq!(ctx.roster.public_shares.len(), 4);
    }
}
