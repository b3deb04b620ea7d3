//! Three-stage submission: create patient, upload lab file, interpret.
//!
//! Stages run strictly in order; each stage's output feeds the next. Any
//! failure stops the run and leaves the [`ProcessingState`] as it was so the
//! failed stage stays visible. Progress is published on a `watch` channel.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::types::CreatePatientRequest;
use crate::api::{ApiError, LabApi};
use crate::session::SessionManager;
use crate::wizard::LabFile;

pub const MISSING_FHIR_ID: &str = "Patient creation succeeded but no FHIR ID was returned";
pub const MISSING_LAB_SET_ID: &str = "Lab test upload succeeded but no lab set ID was returned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Loading,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    CreatePatient,
    UploadLabTest,
    InterpretResults,
}

impl Stage {
    pub const ALL: [Stage; 3] = [
        Stage::CreatePatient,
        Stage::UploadLabTest,
        Stage::InterpretResults,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::CreatePatient => "Creating your account",
            Stage::UploadLabTest => "Uploading lab results",
            Stage::InterpretResults => "Interpreting results",
        }
    }

    fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::CreatePatient => None,
            Stage::UploadLabTest => Some(Stage::CreatePatient),
            Stage::InterpretResults => Some(Stage::UploadLabTest),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CreatePatient => "createPatient",
            Stage::UploadLabTest => "uploadLabTest",
            Stage::InterpretResults => "interpretResults",
        })
    }
}

/// Per-stage status of one submission attempt. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub create_patient: StageStatus,
    pub upload_lab_test: StageStatus,
    pub interpret_results: StageStatus,
    pub error: Option<String>,
}

impl ProcessingState {
    /// Start of an attempt. A known patient skips creation.
    pub fn fresh(patient_exists: bool) -> Self {
        Self {
            create_patient: if patient_exists {
                StageStatus::Completed
            } else {
                StageStatus::Pending
            },
            ..Default::default()
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::CreatePatient => self.create_patient,
            Stage::UploadLabTest => self.upload_lab_test,
            Stage::InterpretResults => self.interpret_results,
        }
    }

    fn set(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::CreatePatient => self.create_patient = status,
            Stage::UploadLabTest => self.upload_lab_test = status,
            Stage::InterpretResults => self.interpret_results = status,
        }
    }

    /// Move `stage` to loading. Refused unless its predecessor completed.
    pub fn begin(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if let Some(before) = stage.predecessor() {
            if self.status(before) != StageStatus::Completed {
                return Err(PipelineError::OutOfOrder {
                    stage,
                    blocked_by: before,
                });
            }
        }
        self.set(stage, StageStatus::Loading);
        Ok(())
    }

    pub fn complete(&mut self, stage: Stage) {
        self.set(stage, StageStatus::Completed);
    }

    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        self.set(stage, StageStatus::Error);
        self.error = Some(message.into());
    }

    pub fn is_busy(&self) -> bool {
        Stage::ALL
            .iter()
            .any(|s| self.status(*s) == StageStatus::Loading)
    }

    pub fn is_complete(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|s| self.status(*s) == StageStatus::Completed)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|s| self.status(*s) == StageStatus::Error)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("A submission is already in progress")]
    AlreadyRunning,
    #[error("{stage} cannot start before {blocked_by} completes")]
    OutOfOrder { stage: Stage, blocked_by: Stage },
    #[error("{0}")]
    MissingIdentifier(&'static str),
    #[error("Could not read {name}: {source}")]
    File {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ApiError,
    },
}

/// Everything a run needs. `new_patient` is `None` exactly when
/// `existing_fhir_id` is set.
#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub existing_fhir_id: Option<String>,
    pub new_patient: Option<CreatePatientRequest>,
    pub idempotency_key: Option<Uuid>,
    pub test_date: NaiveDate,
    pub file: LabFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub fhir_id: String,
    pub lab_set_id: String,
    pub interpretation: String,
}

pub struct SubmissionPipeline {
    api: Arc<dyn LabApi>,
    session: Arc<SessionManager>,
    progress: watch::Sender<ProcessingState>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a run ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SubmissionPipeline {
    pub fn new(api: Arc<dyn LabApi>, session: Arc<SessionManager>) -> Self {
        let (progress, _) = watch::channel(ProcessingState::default());
        Self {
            api,
            session,
            progress,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.progress.subscribe()
    }

    pub fn snapshot(&self) -> ProcessingState {
        self.progress.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn publish(&self, state: &ProcessingState) {
        self.progress.send_replace(state.clone());
    }

    fn fail(&self, state: &mut ProcessingState, stage: Stage, err: PipelineError) -> PipelineError {
        error!(%stage, error = %err, "Submission stage failed");
        state.fail(stage, err.to_string());
        self.publish(state);
        err
    }

    /// Run all stages. A second call while one is running is refused.
    pub async fn run(&self, input: SubmissionInput) -> Result<SubmissionOutcome, PipelineError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut state = ProcessingState::fresh(input.existing_fhir_id.is_some());
        self.publish(&state);

        let fhir_id = match (&input.existing_fhir_id, &input.new_patient) {
            (Some(id), _) => id.clone(),
            (None, Some(request)) => {
                state.begin(Stage::CreatePatient)?;
                self.publish(&state);
                match self.create_patient(request, input.idempotency_key).await {
                    Ok(id) => id,
                    Err(e) => return Err(self.fail(&mut state, Stage::CreatePatient, e)),
                }
            }
            (None, None) => {
                return Err(self.fail(
                    &mut state,
                    Stage::CreatePatient,
                    PipelineError::MissingIdentifier(MISSING_FHIR_ID),
                ))
            }
        };
        state.complete(Stage::CreatePatient);

        state.begin(Stage::UploadLabTest)?;
        self.publish(&state);
        let lab_set_id = match self.upload(&fhir_id, input.test_date, &input.file).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(&mut state, Stage::UploadLabTest, e)),
        };
        state.complete(Stage::UploadLabTest);

        state.begin(Stage::InterpretResults)?;
        self.publish(&state);
        let interpretation = match self.api.interpret_lab_set(&lab_set_id).await {
            Ok(resp) => resp.interpretation,
            Err(source) => {
                let err = PipelineError::Stage {
                    stage: Stage::InterpretResults,
                    source,
                };
                return Err(self.fail(&mut state, Stage::InterpretResults, err));
            }
        };
        state.complete(Stage::InterpretResults);
        self.publish(&state);

        info!(%fhir_id, %lab_set_id, "Submission complete");
        Ok(SubmissionOutcome {
            fhir_id,
            lab_set_id,
            interpretation,
        })
    }

    /// Create the account, then sign in as it
    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
        idempotency_key: Option<Uuid>,
    ) -> Result<String, PipelineError> {
        let stage_err = |source| PipelineError::Stage {
            stage: Stage::CreatePatient,
            source,
        };
        let created = self
            .api
            .create_patient(request, idempotency_key)
            .await
            .map_err(stage_err)?;
        let fhir_id = created
            .fhir_id
            .filter(|id| !id.is_empty())
            .ok_or(PipelineError::MissingIdentifier(MISSING_FHIR_ID))?;
        info!(%fhir_id, "Patient created");

        self.session
            .login(self.api.as_ref(), &request.email, &request.password)
            .await
            .map_err(stage_err)?;
        Ok(fhir_id)
    }

    async fn upload(
        &self,
        fhir_id: &str,
        test_date: NaiveDate,
        file: &LabFile,
    ) -> Result<String, PipelineError> {
        let upload = file.read().await.map_err(|source| PipelineError::File {
            name: file.name.clone(),
            source,
        })?;
        let response = self
            .api
            .upload_lab_set(fhir_id, test_date, upload)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: Stage::UploadLabTest,
                source,
            })?;
        response
            .id
            .filter(|id| !id.is_empty())
            .ok_or(PipelineError::MissingIdentifier(MISSING_LAB_SET_ID))
    }
}

#[cfg(test)]
mod tests;
