//! Wizard data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::api::types::LabUpload;

/// Onboarding steps in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    #[default]
    Welcome,
    Account,
    Name,
    Demographics,
    Upload,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Welcome,
        WizardStep::Account,
        WizardStep::Name,
        WizardStep::Demographics,
        WizardStep::Upload,
    ];

    pub fn index(self) -> usize {
        match self {
            WizardStep::Welcome => 0,
            WizardStep::Account => 1,
            WizardStep::Name => 2,
            WizardStep::Demographics => 3,
            WizardStep::Upload => 4,
        }
    }

    pub fn next(self) -> Option<WizardStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<WizardStep> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Path segment under `/wizard`
    pub fn slug(self) -> &'static str {
        match self {
            WizardStep::Welcome => "welcome",
            WizardStep::Account => "account",
            WizardStep::Name => "name",
            WizardStep::Demographics => "demographics",
            WizardStep::Upload => "upload",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::Welcome => "Welcome",
            WizardStep::Account => "Create your account",
            WizardStep::Name => "Your name",
            WizardStep::Demographics => "About you",
            WizardStep::Upload => "Upload lab results",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for WizardStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.slug() == s)
            .ok_or_else(|| format!("unknown wizard step '{s}'"))
    }
}

/// A lab file picked on the upload step. Never serialized: a selection does
/// not survive a restart even though the rest of the wizard does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

impl LabFile {
    /// Stat a file on disk and guess its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            content_type,
        })
    }

    pub async fn read(&self) -> std::io::Result<LabUpload> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(LabUpload {
            file_name: self.name.clone(),
            content_type: self.content_type.clone(),
            bytes,
        })
    }
}

/// Everything the user has entered so far. Dates are kept as typed
/// (`YYYY-MM-DD`) and parsed when the step is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientData {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    #[serde(skip)]
    pub file: Option<LabFile>,
    pub test_date: String,
}

/// Partial update merged into [`PatientData`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct PatientDataPatch {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub file: Option<Option<LabFile>>,
    pub test_date: Option<String>,
}

impl PatientDataPatch {
    pub fn apply(self, data: &mut PatientData) {
        if let Some(v) = self.email {
            data.email = v;
        }
        if let Some(v) = self.password {
            data.password = v;
        }
        if let Some(v) = self.first_name {
            data.first_name = v;
        }
        if let Some(v) = self.last_name {
            data.last_name = v;
        }
        if let Some(v) = self.date_of_birth {
            data.date_of_birth = v;
        }
        if let Some(v) = self.gender {
            data.gender = v;
        }
        if let Some(v) = self.file {
            data.file = v;
        }
        if let Some(v) = self.test_date {
            data.test_date = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.file.is_none()
            && self.test_date.is_none()
    }
}

/// The persisted wizard blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub current_step: WizardStep,
    #[serde(default)]
    pub patient_data: PatientData,
    /// Sent as `Idempotency-Key` when creating the patient; reused on retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_key: Option<Uuid>,
}
