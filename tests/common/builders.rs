//! Universe builders and a wired-up service harness.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use commissioner_core::config::CommissionerConfig;
use commissioner_core::database::{InMemoryStore, UniverseStore};
use commissioner_core::models::{NodeDetails, NodeState, Universe, UniverseDefinition, UserIntent};
use commissioner_core::orchestration::{Commissioner, CommissionerServices, TaskRegistry, TaskStatus};

use super::fakes::{FakeClusterFactory, RecordingNotifier};

/// Running node that hosts both a master and a tserver
pub fn master_node(name: &str, ip: &str) -> NodeDetails {
    NodeDetails::new(name, ip)
        .with_state(NodeState::Running)
        .as_master()
}

pub fn universe_with_nodes(name: &str, nodes: Vec<NodeDetails>) -> Universe {
    let definition = UniverseDefinition {
        user_intent: UserIntent {
            universe_name: name.to_string(),
            replication_factor: 3,
            num_nodes: nodes.len() as u32,
        },
        nodes,
        ..Default::default()
    };
    Universe::new(name, definition)
}

/// n1..n3, all running masters with addresses 10.0.0.1..3
pub fn three_node_universe(name: &str) -> Universe {
    universe_with_nodes(
        name,
        vec![
            master_node("n1", "10.0.0.1"),
            master_node("n2", "10.0.0.2"),
            master_node("n3", "10.0.0.3"),
        ],
    )
}

/// Every wait shortened so task runs finish quickly under a paused clock
pub fn fast_config() -> CommissionerConfig {
    let mut config = CommissionerConfig::default();
    config.executor.task_threads = 4;
    config.executor.shutdown_timeout_ms = 1_000;
    config.data_move.wait_each_attempt_ms = 10;
    config.data_move.max_errors_to_ignore = 2;
    config.data_move.max_wait_ms = 60_000;
    config.load_balance.initial_delay_ms = 0;
    config.load_balance.wait_each_attempt_ms = 10;
    config.load_balance.max_wait_ms = 60_000;
    config.server_ready.wait_each_attempt_ms = 10;
    config.server_ready.max_total_wait_ms = 1_000;
    config.server_ready.default_sleep_after_restart_ms = 0;
    config
}

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub cluster: Arc<FakeClusterFactory>,
    pub notifier: Arc<RecordingNotifier>,
    pub services: CommissionerServices,
}

impl TestHarness {
    pub fn new(config: CommissionerConfig) -> Self {
        Self::with_notifier(config, RecordingNotifier::default())
    }

    pub fn with_notifier(config: CommissionerConfig, notifier: RecordingNotifier) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cluster = Arc::new(FakeClusterFactory::new());
        let notifier = Arc::new(notifier);
        let services =
            CommissionerServices::new(store.clone(), store.clone(), cluster.clone(), config)
                .with_notifier(notifier.clone());
        Self {
            store,
            cluster,
            notifier,
            services,
        }
    }

    pub async fn insert(&self, universe: &Universe) -> Uuid {
        self.store
            .insert_universe(universe)
            .await
            .expect("insert universe");
        universe.id()
    }

    pub async fn universe(&self, id: Uuid) -> Universe {
        self.store
            .find_universe(id)
            .await
            .expect("find universe")
            .expect("universe exists")
    }

    pub fn commissioner(&self) -> Commissioner {
        Commissioner::new(self.services.clone(), TaskRegistry::default())
    }
}

/// Poll the status query until the run reaches a terminal state
pub async fn wait_for_terminal(commissioner: &Commissioner, run_id: Uuid) -> TaskStatus {
    for _ in 0..10_000 {
        let status = commissioner.get_status(run_id).await.expect("status");
        if status.state.is_terminal() && !commissioner.is_live(run_id) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {run_id} did not finish");
}
