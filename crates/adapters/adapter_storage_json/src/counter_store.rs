//! Per-pack counters in `state.json`.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use nudge_app::ports::CounterStore;
use nudge_domain::error::NudgeError;
use nudge_domain::interaction::PersistedCounters;

use crate::error::StorageError;
use crate::manifest::PackLocator;

pub const STATE_FILE: &str = "state.json";

/// Keeps counters next to the pack manifest.
///
/// Saving rewrites only the counter keys. Anything else already in the file
/// is preserved.
#[derive(Debug, Clone)]
pub struct JsonCounterStore {
    locator: PackLocator,
}

impl JsonCounterStore {
    #[must_use]
    pub fn new(locator: PackLocator) -> Self {
        Self { locator }
    }
}

async fn state_path(locator: &PackLocator, pack_id: &str) -> Result<PathBuf, NudgeError> {
    Ok(locator.locate(pack_id).await?.root.join(STATE_FILE))
}

/// Current file contents as an object. Missing or corrupt files read as empty.
async fn read_state(path: &Path) -> Map<String, Value> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(path = %path.display(), "ignoring malformed state file");
                Map::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "state file unreadable");
            Map::new()
        }
    }
}

impl CounterStore for JsonCounterStore {
    fn load(&self, pack_id: &str) -> impl Future<Output = Result<PersistedCounters, NudgeError>> + Send {
        let locator = self.locator.clone();
        let pack_id = pack_id.to_string();
        async move {
            let path = state_path(&locator, &pack_id).await?;
            let state = read_state(&path).await;
            let counters = serde_json::from_value(Value::Object(state)).unwrap_or_default();
            Ok(counters)
        }
    }

    fn save(
        &self,
        pack_id: &str,
        counters: PersistedCounters,
    ) -> impl Future<Output = Result<(), NudgeError>> + Send {
        let locator = self.locator.clone();
        let pack_id = pack_id.to_string();
        async move {
            let path = state_path(&locator, &pack_id).await?;
            let mut state = read_state(&path).await;
            if let Value::Object(fields) =
                serde_json::to_value(counters).map_err(|err| StorageError::json(&path, err))?
            {
                state.extend(fields);
            }
            let body = serde_json::to_vec_pretty(&Value::Object(state))
                .map_err(|err| StorageError::json(&path, err))?;
            tokio::fs::write(&path, body)
                .await
                .map_err(|err| StorageError::io(&path, err))?;
            Ok(())
        }
    }
}
