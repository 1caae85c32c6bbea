//! Scripted stand-ins for the cluster, the notifier and the KMS.
//!
//! Each scripted call pops its next queued result; an empty queue answers with
//! a healthy default (keys missing, data fully moved, balancer idle, server
//! ready).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use commissioner_core::cluster::{
    AddUniverseKeysResponse, ChangeConfigResponse, ClusterClient, ClusterClientFactory,
    KeyStatusResponse, LoadBalancerStateResponse, LoadMoveCompletionResponse, MasterChange,
    ServerReadyResponse,
};
use commissioner_core::encryption::{ActiveKey, KeyMaterialProvider};
use commissioner_core::models::ServerType;
use commissioner_core::notification::Notifier;
use commissioner_core::{CommissionerError, Result};

type Script<T> = Mutex<VecDeque<Result<T>>>;

fn next_or<T>(script: &Script<T>, default: impl FnOnce() -> T) -> Result<T> {
    script.lock().pop_front().unwrap_or_else(|| Ok(default()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterChangeCall {
    pub host: String,
    pub port: u16,
    pub change: MasterChange,
    pub use_host_port: bool,
}

#[derive(Default)]
pub struct FakeClusterClient {
    pub change_script: Script<ChangeConfigResponse>,
    pub data_move_script: Script<LoadMoveCompletionResponse>,
    pub load_balancer_script: Script<LoadBalancerStateResponse>,
    pub server_ready_script: Script<ServerReadyResponse>,
    pub add_keys_script: Script<AddUniverseKeysResponse>,
    /// Masters that already hold the universe key
    pub masters_with_key: Mutex<Vec<String>>,
    pub master_changes: Mutex<Vec<MasterChangeCall>>,
    pub keys_added: Mutex<Vec<String>>,
    pub data_move_calls: AtomicUsize,
}

impl FakeClusterClient {
    pub fn script_change(&self, result: Result<ChangeConfigResponse>) {
        self.change_script.lock().push_back(result);
    }

    pub fn script_data_move(&self, result: Result<LoadMoveCompletionResponse>) {
        self.data_move_script.lock().push_back(result);
    }

    pub fn script_data_move_percentages(&self, percentages: &[f64]) {
        for percent in percentages {
            self.script_data_move(Ok(LoadMoveCompletionResponse {
                percent_completed: *percent,
                error: None,
            }));
        }
    }

    pub fn script_load_balancer(&self, result: Result<LoadBalancerStateResponse>) {
        self.load_balancer_script.lock().push_back(result);
    }

    pub fn script_server_ready(&self, result: Result<ServerReadyResponse>) {
        self.server_ready_script.lock().push_back(result);
    }

    pub fn script_add_keys(&self, result: Result<AddUniverseKeysResponse>) {
        self.add_keys_script.lock().push_back(result);
    }

    pub fn master_changes(&self) -> Vec<MasterChangeCall> {
        self.master_changes.lock().clone()
    }

    pub fn keys_added(&self) -> Vec<String> {
        let mut added = self.keys_added.lock().clone();
        added.sort();
        added
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn change_master_config(
        &self,
        host: &str,
        port: u16,
        change: MasterChange,
        use_host_port: bool,
    ) -> Result<ChangeConfigResponse> {
        self.master_changes.lock().push(MasterChangeCall {
            host: host.to_string(),
            port,
            change,
            use_host_port,
        });
        next_or(&self.change_script, ChangeConfigResponse::default)
    }

    async fn get_load_move_completion(&self) -> Result<LoadMoveCompletionResponse> {
        self.data_move_calls.fetch_add(1, Ordering::SeqCst);
        next_or(&self.data_move_script, || LoadMoveCompletionResponse {
            percent_completed: 100.0,
            error: None,
        })
    }

    async fn get_load_balancer_state(&self) -> Result<LoadBalancerStateResponse> {
        next_or(&self.load_balancer_script, LoadBalancerStateResponse::default)
    }

    async fn is_server_ready(
        &self,
        _host_port: &str,
        _server_type: ServerType,
    ) -> Result<ServerReadyResponse> {
        next_or(&self.server_ready_script, ServerReadyResponse::default)
    }

    async fn has_universe_key_in_memory(
        &self,
        host_port: &str,
        _key_ref: &[u8],
    ) -> Result<KeyStatusResponse> {
        let has_key = self.masters_with_key.lock().iter().any(|m| m == host_port);
        Ok(KeyStatusResponse {
            has_key,
            error: None,
        })
    }

    async fn add_universe_keys(
        &self,
        host_port: &str,
        _key_ref: &[u8],
        _key_material: &[u8],
    ) -> Result<AddUniverseKeysResponse> {
        let result = next_or(&self.add_keys_script, AddUniverseKeysResponse::default);
        if matches!(&result, Ok(response) if response.error.is_none()) {
            self.keys_added.lock().push(host_port.to_string());
        }
        result
    }
}

#[derive(Default)]
pub struct FakeClusterFactory {
    pub client: Arc<FakeClusterClient>,
    pub refuse_connections: AtomicBool,
    pub connects: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeClusterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterClientFactory for FakeClusterFactory {
    async fn connect(
        &self,
        master_addresses: &str,
        _certificate: Option<&str>,
    ) -> Result<Arc<dyn ClusterClient>> {
        if self.refuse_connections.load(Ordering::SeqCst) {
            return Err(CommissionerError::RemoteUnavailable(format!(
                "connection to {master_addresses} refused"
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn ClusterClient> = self.client.clone();
        Ok(client)
    }

    fn release(&self, _client: Arc<dyn ClusterClient>, _master_addresses: &str) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub tag: String,
    pub destinations: Vec<String>,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        tag: &str,
        destinations: &[String],
        template_data: &serde_json::Value,
    ) -> Result<()> {
        self.sent.lock().push(SentNotification {
            tag: tag.to_string(),
            destinations: destinations.to_vec(),
            payload: template_data.clone(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(CommissionerError::RemoteUnavailable("smtp down".to_string()));
        }
        Ok(())
    }
}

/// KMS that knows exactly one key for every universe
pub struct StaticKeyProvider {
    pub key: Option<ActiveKey>,
    pub material: Vec<u8>,
    pub resolves: AtomicUsize,
}

impl StaticKeyProvider {
    pub fn new(config_id: Uuid, key_ref: &[u8]) -> Self {
        Self {
            key: Some(ActiveKey {
                config_id,
                key_ref: key_ref.to_vec(),
            }),
            material: b"decrypted-key-bytes".to_vec(),
            resolves: AtomicUsize::new(0),
        }
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyMaterialProvider for StaticKeyProvider {
    async fn active_key(&self, _universe_id: Uuid) -> Result<Option<ActiveKey>> {
        Ok(self.key.clone())
    }

    async fn resolve_key(
        &self,
        _universe_id: Uuid,
        _config_id: Uuid,
        _key_ref: &[u8],
    ) -> Result<Vec<u8>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.material.clone())
    }
}
