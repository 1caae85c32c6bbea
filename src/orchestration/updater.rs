//! # Versioned Universe Updater
//!
//! The only write path for a universe. [`mutate`] reads the current record,
//! hands a mutable copy of its definition to the caller's closure, and persists
//! the result with a compare-and-swap on the version it read.
//!
//! A lost race surfaces as `Conflict(VersionMismatch)` and is never retried
//! here; the calling task decides whether to re-read or give up.
//!
//! ```rust,no_run
//! use commissioner_core::orchestration::updater::mutate;
//! # use commissioner_core::database::UniverseStore;
//! # async fn example(store: &dyn UniverseStore, universe_id: uuid::Uuid) -> commissioner_core::Result<()> {
//! let updated = mutate(store, universe_id, |definition| {
//!     definition.update_succeeded = true;
//!     Ok(())
//! })
//! .await?;
//! assert!(updated.definition().update_succeeded);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::universe_task::check_universe_version;
use crate::database::UniverseStore;
use crate::error::{CommissionerError, Result};
use crate::models::{Universe, UniverseDefinition};

/// Apply `updater` to the current definition and save it under a version CAS.
///
/// Returns the universe as stored after the write. If `updater` fails nothing is
/// written and its error is returned unchanged.
pub async fn mutate<F>(store: &dyn UniverseStore, universe_id: Uuid, updater: F) -> Result<Universe>
where
    F: FnOnce(&mut UniverseDefinition) -> Result<()> + Send,
{
    mutate_at(store, universe_id, None, updater).await
}

/// Like [`mutate`], but first requires the stored version to equal
/// `expected_version` when one is given.
pub async fn mutate_at<F>(
    store: &dyn UniverseStore,
    universe_id: Uuid,
    expected_version: Option<i64>,
    updater: F,
) -> Result<Universe>
where
    F: FnOnce(&mut UniverseDefinition) -> Result<()> + Send,
{
    let mut universe = store
        .find_universe(universe_id)
        .await?
        .ok_or_else(|| CommissionerError::not_found("universe", universe_id))?;
    check_universe_version(&universe, expected_version)?;

    let read_version = universe.version();
    updater(universe.definition_mut())?;

    let new_version = store.save_universe(&universe, read_version).await?;
    universe.advance(new_version, Utc::now());

    debug!(
        universe_id = %universe_id,
        from_version = read_version,
        to_version = new_version,
        "Universe updated"
    );
    Ok(universe)
}
