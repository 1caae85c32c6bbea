//! Periodic loop that keeps every master of every encrypted universe supplied
//! with its active key material, e.g. after a master restart wiped its memory.
//!
//! Failures are per-master: they are logged and the pass moves on. A tick that
//! fires while the previous pass is still running is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{hex, push_key_to_master, resolve_cached, KeyMaterialCache, KeyMaterialProvider};
use crate::cluster::{ClusterClientFactory, ClusterClientGuard};
use crate::config::EncryptionConfig;
use crate::database::UniverseStore;
use crate::error::{CommissionerError, Result};
use crate::models::{ServerType, Universe};

/// Outcome of one pass over all universes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySetterReport {
    /// The pass did not run because another was still in progress
    pub skipped: bool,
    pub universes_checked: usize,
    pub keys_pushed: usize,
    pub failures: usize,
}

pub struct UniverseKeySetter {
    universes: Arc<dyn UniverseStore>,
    cluster: Arc<dyn ClusterClientFactory>,
    provider: Arc<dyn KeyMaterialProvider>,
    cache: Arc<KeyMaterialCache>,
    config: EncryptionConfig,
    running: AtomicBool,
    pass_in_progress: AtomicBool,
    shutdown_notify: Notify,
}

/// Clears the re-entrancy flag however the pass ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl UniverseKeySetter {
    pub fn new(
        universes: Arc<dyn UniverseStore>,
        cluster: Arc<dyn ClusterClientFactory>,
        provider: Arc<dyn KeyMaterialProvider>,
        cache: Arc<KeyMaterialCache>,
        config: EncryptionConfig,
    ) -> Self {
        Self {
            universes,
            cluster,
            provider,
            cache,
            config,
            running: AtomicBool::new(false),
            pass_in_progress: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the periodic loop. Returns `None` when the key setter is disabled.
    pub fn start(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>> {
        if !self.config.key_setter_enabled {
            info!("Universe key setter disabled");
            return Ok(None);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(CommissionerError::Internal(
                "universe key setter is already running".to_string(),
            ));
        }

        let setter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(setter.config.key_setter_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval_ms = setter.config.key_setter_interval_ms,
                "🔑 Universe key setter started"
            );

            while setter.is_running() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = setter.run_once().await;
                        debug!(?report, "Universe key setter pass finished");
                    }
                    _ = setter.shutdown_notify.notified() => {
                        debug!("Shutdown notification received");
                        break;
                    }
                }
            }

            setter.running.store(false, Ordering::Release);
            info!("Universe key setter stopped");
        });

        Ok(Some(handle))
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.shutdown_notify.notify_one();
        }
    }

    /// One pass over all universes
    pub async fn run_once(&self) -> KeySetterReport {
        if self.pass_in_progress.swap(true, Ordering::AcqRel) {
            debug!("Previous key setter pass still running, skipping");
            return KeySetterReport {
                skipped: true,
                ..Default::default()
            };
        }
        let _guard = PassGuard(&self.pass_in_progress);

        let mut report = KeySetterReport::default();
        let universes = match self.universes.find_universes().await {
            Ok(universes) => universes,
            Err(e) => {
                warn!(error = %e, "Key setter could not list universes");
                report.failures += 1;
                return report;
            }
        };

        for universe in universes {
            if universe.is_update_in_progress() {
                continue;
            }
            report.universes_checked += 1;
            if let Err(e) = self.set_universe_key(&universe, &mut report).await {
                report.failures += 1;
                warn!(
                    universe_id = %universe.id(),
                    universe = %universe.name(),
                    error = %e,
                    "Key setter failed for universe"
                );
            }
        }

        report
    }

    async fn set_universe_key(&self, universe: &Universe, report: &mut KeySetterReport) -> Result<()> {
        let Some(key) = self.provider.active_key(universe.id()).await? else {
            return Ok(());
        };
        let material =
            resolve_cached(&self.cache, self.provider.as_ref(), universe.id(), &key).await?;

        let client = ClusterClientGuard::acquire(
            Arc::clone(&self.cluster),
            &universe.master_addresses(),
            universe.certificate(),
        )
        .await?;

        for master in universe.definition().masters() {
            let Some(host_port) = master.host_port(ServerType::Master) else {
                continue;
            };
            match push_key_to_master(&*client, &host_port, &key.key_ref, &material).await {
                Ok(true) => report.keys_pushed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        universe_id = %universe.id(),
                        master = %host_port,
                        key_ref = %hex(&key.key_ref),
                        error = %e,
                        "Could not set universe key on master"
                    );
                }
            }
        }
        Ok(())
    }
}
