use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use syncdash_core::{Instance, InstanceId};
use syncdash_engine::{ensure_state_dir, AtomicFileWriter};
use syncdash_logging::{sync_debug, sync_error, sync_warn};

const STATE_FILENAME: &str = "state.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedInstance {
    id: InstanceId,
    name: String,
    woocommerce_url: String,
    odoo_url: String,
    #[serde(default)]
    odoo_db: Option<String>,
    #[serde(default)]
    odoo_language: Option<String>,
}

/// What survives between runs: the login token and the last known active
/// instance. The instance is only a hint until the backend confirms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub(crate) struct PersistedState {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    active_instance: Option<PersistedInstance>,
}

impl PersistedState {
    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub(crate) fn active_id(&self) -> Option<InstanceId> {
        self.active_instance.as_ref().map(|instance| instance.id)
    }

    pub(crate) fn active_instance(&self) -> Option<Instance> {
        self.active_instance.as_ref().map(|persisted| Instance {
            id: persisted.id,
            name: persisted.name.clone(),
            woocommerce_url: persisted.woocommerce_url.clone(),
            odoo_url: persisted.odoo_url.clone(),
            odoo_db: persisted.odoo_db.clone(),
            odoo_language: persisted.odoo_language.clone(),
            is_active: true,
        })
    }

    pub(crate) fn set_active_instance(&mut self, instance: Option<&Instance>) {
        self.active_instance = instance.map(|instance| PersistedInstance {
            id: instance.id,
            name: instance.name.clone(),
            woocommerce_url: instance.woocommerce_url.clone(),
            odoo_url: instance.odoo_url.clone(),
            odoo_db: instance.odoo_db.clone(),
            odoo_language: instance.odoo_language.clone(),
        });
    }
}

pub(crate) fn load_state(state_dir: &Path) -> PersistedState {
    let path = state_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return PersistedState::default();
        }
        Err(err) => {
            sync_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return PersistedState::default();
        }
    };

    match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            sync_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            PersistedState::default()
        }
    }
}

pub(crate) fn save_state(state_dir: &Path, state: &PersistedState) {
    if let Err(err) = ensure_state_dir(state_dir) {
        sync_error!("Failed to ensure state dir {:?}: {}", state_dir, err);
        return;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(state, pretty) {
        Ok(text) => text,
        Err(err) => {
            sync_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(state_dir.to_path_buf());
    match writer.write(STATE_FILENAME, &content) {
        Ok(path) => sync_debug!("Saved state to {:?}", path),
        Err(err) => sync_error!("Failed to write persisted state to {:?}: {}", state_dir, err),
    }
}
