use rusty_raft::applier::Applier;
use rusty_raft::config::Config;
use rusty_raft::error::RaftError;
use rusty_raft::node_state::NodeState;
use rusty_raft::role_controller::{ElectionConfig, RoleController};
use rusty_raft::rpc::NullPeerClient;
use rusty_raft::store::{DataStore, SledDataStore};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config at {config_path}: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let data_dir = std::path::Path::new(&config.data_dir);
    let node_state_store: Arc<dyn DataStore> = match SledDataStore::open(data_dir.join("node.sled"), "node_state") {
        Ok(store) => Arc::new(store),
        Err(err) => rusty_raft::error::fatal(format!("cannot open node-state store: {err}")),
    };
    let storage_store: Arc<dyn DataStore> = match SledDataStore::open(data_dir.join("applied.sled"), "storage") {
        Ok(store) => Arc::new(store),
        Err(err) => rusty_raft::error::fatal(format!("cannot open storage store: {err}")),
    };

    let node = match NodeState::load(config.node_id.clone(), node_state_store) {
        Ok(node) => Arc::new(node),
        Err(RaftError::Corrupt(msg)) => rusty_raft::error::fatal(format!("corrupt persisted state: {msg}")),
        Err(err) => rusty_raft::error::fatal(format!("cannot load node state: {err}")),
    };

    let shutdown = Arc::new(AtomicBool::new(false));

    // The real transport is an external collaborator (see rpc::PeerClient);
    // a cluster that wants actual replication wires in an implementation
    // that dials `node_hosts` over the wire protocol.
    let peer_client = Arc::new(NullPeerClient);

    let election_config = ElectionConfig {
        election_timeout: Duration::from_millis(config.election_timeout as u64),
        election_timeout_jitter: Duration::from_millis(config.election_timeout_jitter as u64),
        leader_heartbeat_period: Duration::from_millis(config.leader_heartbeat_period as u64),
        outbound_rpc_timeout: Duration::from_millis(config.outbound_rpc_timeout as u64),
    };

    let (role_controller, timer_reset_tx) = RoleController::new(
        config.node_id.clone(),
        node.clone(),
        config.peer_ids(),
        peer_client,
        election_config,
        shutdown.clone(),
    );

    let applier = Applier::new(node.clone(), storage_store, shutdown.clone());
    let applier_handle = std::thread::spawn(move || applier.run());
    let role_controller_handle = std::thread::spawn(move || role_controller.run());

    tracing::info!(node_id = %config.node_id, "raft node started");

    // The RPC server that would deliver AppendEntries/RequestVote into
    // rusty_raft::handlers, and that would hold `timer_reset_tx`, lives
    // outside this crate; transport is external.
    // Hold the sender here so the channel isn't torn down mid-flight.
    // Dropping it would make every `recv_timeout` below return
    // `Disconnected` immediately instead of waiting out the timeout.
    let _timer_reset_tx = timer_reset_tx;

    let _ = role_controller_handle.join();
    let _ = applier_handle.join();
}

/// `RUST_LOG` takes priority when set, matching the corpus's own
/// environment-override convention for container deployments; the
/// configured `log_level` is the fallback otherwise.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
