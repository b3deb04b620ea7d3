//! On-disk mirror of the wizard progress

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::state::WizardState;
use crate::persist::{self, Loaded, StoreError};

/// Namespace of the single persisted wizard entry
pub const STORAGE_KEY: &str = "labsexplained-patient-wizard";

pub struct WizardStore {
    path: PathBuf,
}

impl WizardStore {
    pub fn open(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved progress, or `None` when absent or unreadable. A damaged entry
    /// means a fresh wizard, never an error.
    pub fn load(&self) -> Option<WizardState> {
        match persist::read_json::<WizardState>(&self.path) {
            Ok(Loaded::Value(state)) => Some(state),
            Ok(Loaded::Missing) => None,
            Ok(Loaded::Corrupt(e)) => {
                warn!(error = %e, "Failed to parse wizard state, starting fresh");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read wizard state, starting fresh");
                None
            }
        }
    }

    pub fn save(&self, state: &WizardState) -> Result<(), StoreError> {
        debug!(step = %state.current_step, "Saving wizard state");
        persist::write_json(&self.path, state)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        debug!("Clearing wizard state");
        persist::remove(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::state::{PatientData, WizardStep};
    use tempfile::TempDir;

    fn sample(step: WizardStep) -> WizardState {
        WizardState {
            current_step: step,
            patient_data: PatientData {
                email: "a@b.com".to_string(),
                password: "Abcd123!".to_string(),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                date_of_birth: "1990-01-01".to_string(),
                gender: "female".to_string(),
                file: None,
                test_date: "2024-01-01".to_string(),
            },
            submission_key: Some(uuid::Uuid::new_v4()),
        }
    }

    #[test]
    fn test_save_then_load_returns_equal_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = WizardStore::open(temp_dir.path());

        for step in WizardStep::ALL {
            let state = sample(step);
            store.save(&state).unwrap();
            let reopened = WizardStore::open(temp_dir.path());
            assert_eq!(reopened.load(), Some(state));
        }
    }

    #[test]
    fn test_file_name_uses_storage_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = WizardStore::open(temp_dir.path());
        assert!(store
            .path()
            .ends_with("labsexplained-patient-wizard.json"));
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(WizardStore::open(temp_dir.path()).load().is_none());
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = WizardStore::open(temp_dir.path());
        std::fs::write(store.path(), r#"{"currentStep": "nowhere"}"#).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_removes_entry() {
        let temp_dir = TempDir::new().unwrap();
        let store = WizardStore::open(temp_dir.path());
        store.save(&sample(WizardStep::Name)).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }
}
