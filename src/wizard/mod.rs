//! Resumable onboarding wizard.
//!
//! The wizard's step is always read from its [`Route`]; moving between
//! steps means navigating to another route, after which the step is
//! mirrored into the persisted [`WizardState`].

pub mod sequencer;
pub mod state;
pub mod steps;
pub mod store;
pub mod validation;

pub use sequencer::{Event, Transition};
pub use state::{LabFile, PatientData, PatientDataPatch, WizardState, WizardStep};
pub use store::WizardStore;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::types::CreatePatientRequest;
use crate::api::{ApiError, LabApi};
use crate::persist::StoreError;
use crate::pipeline::{PipelineError, SubmissionInput, SubmissionOutcome, SubmissionPipeline};
use crate::routes::Route;
use steps::{component_for, furthest_reachable, StepContext};
use validation::{parse_past_date, FieldError};

pub const EMAIL_EXISTS_MESSAGE: &str = "Email already exists. Please log in instead.";
pub const EMAIL_CHECK_FAILED_MESSAGE: &str =
    "An error occurred while checking your email. Please try again.";

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("{}", first_message(.0))]
    Invalid(Vec<FieldError>),
    #[error("Email already exists. Please log in instead.")]
    EmailExists,
    #[error("An error occurred while checking your email. Please try again.")]
    EmailCheckFailed(#[source] ApiError),
    #[error("{0} is not a wizard route")]
    NotWizardRoute(Route),
    #[error(transparent)]
    Submission(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn first_message(errors: &[FieldError]) -> &str {
    errors
        .first()
        .map(|e| e.message.as_str())
        .unwrap_or("Please complete the required fields")
}

/// Wizard bound to one route.
///
/// Without a bound patient the progress is persisted through the
/// [`WizardStore`] on every change. With one (the "add more results" flow)
/// nothing is persisted so an unfinished onboarding is left untouched.
pub struct Wizard {
    store: WizardStore,
    state: WizardState,
    route: Route,
    privacy_accepted: bool,
    field_errors: Vec<FieldError>,
    error: Option<String>,
    max_file_bytes: u64,
}

impl Wizard {
    /// Open the wizard at `route`, resuming saved progress.
    ///
    /// The returned wizard's route may differ from the requested one: the
    /// bare `/wizard` resumes at the saved step, and a deep link past the
    /// first incomplete step is pulled back to it.
    pub fn open(
        store: WizardStore,
        route: &Route,
        max_file_bytes: u64,
        today: NaiveDate,
    ) -> Result<Self, WizardError> {
        let Route::Wizard { step, fhir_id } = route else {
            return Err(WizardError::NotWizardRoute(route.clone()));
        };

        let state = match fhir_id {
            Some(_) => WizardState::default(),
            None => store.load().unwrap_or_default(),
        };
        let requested = match (step, fhir_id) {
            (WizardStep::Welcome, None) => state.current_step,
            _ => *step,
        };
        let reachable = furthest_reachable(&state.patient_data, today, max_file_bytes);
        let step = sequencer::initial_step(requested, fhir_id.as_deref(), reachable);

        let mut wizard = Self {
            store,
            state,
            route: Route::wizard(step, fhir_id.clone()),
            privacy_accepted: false,
            field_errors: Vec::new(),
            error: None,
            max_file_bytes,
        };
        if step != requested {
            debug!(%requested, opened = %step, "Wizard opened at an earlier step");
        }
        wizard.state.current_step = step;
        wizard.persist()?;
        Ok(wizard)
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn step(&self) -> WizardStep {
        match &self.route {
            Route::Wizard { step, .. } => *step,
            _ => WizardStep::Welcome,
        }
    }

    pub fn fhir_id(&self) -> Option<&str> {
        self.route.fhir_id()
    }

    pub fn data(&self) -> &PatientData {
        &self.state.patient_data
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn privacy_accepted(&self) -> bool {
        self.privacy_accepted
    }

    pub fn set_privacy_accepted(&mut self, accepted: bool) {
        self.privacy_accepted = accepted;
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// Banner message from the last failed remote action
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Merge a change into the entered data and save immediately
    pub fn update(&mut self, patch: PatientDataPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        patch.apply(&mut self.state.patient_data);
        self.persist()
    }

    /// Prefill from an existing patient record (add-more-results flow)
    pub fn prefill(&mut self, patient: &crate::api::types::Patient) {
        PatientDataPatch {
            first_name: Some(patient.first_name.clone()),
            last_name: Some(patient.last_name.clone()),
            date_of_birth: Some(patient.birth_date.clone()),
            gender: Some(patient.gender.clone()),
            ..Default::default()
        }
        .apply(&mut self.state.patient_data);
    }

    pub fn validate_current(&self, today: NaiveDate) -> Vec<FieldError> {
        component_for(self.step()).validate(&self.context(today))
    }

    /// Leave the current step forwards. The account step also asks the
    /// server whether the email is taken.
    pub async fn advance(
        &mut self,
        api: &dyn LabApi,
        today: NaiveDate,
    ) -> Result<Transition, WizardError> {
        self.error = None;
        self.field_errors = self.validate_current(today);
        if !self.field_errors.is_empty() {
            return Err(WizardError::Invalid(self.field_errors.clone()));
        }

        if self.step() == WizardStep::Account {
            match api.check_email(self.data().email.trim()).await {
                Ok(false) => {}
                Ok(true) => {
                    self.error = Some(EMAIL_EXISTS_MESSAGE.to_string());
                    return Err(WizardError::EmailExists);
                }
                Err(e) => {
                    warn!(error = %e, "Email check failed");
                    self.error = Some(EMAIL_CHECK_FAILED_MESSAGE.to_string());
                    return Err(WizardError::EmailCheckFailed(e));
                }
            }
        }

        let transition = sequencer::transition(self.step(), Event::Next, self.fhir_id())
            .ok_or_else(|| {
                WizardError::Invalid(vec![FieldError::new(
                    "step",
                    "This is the last step; submit to finish",
                )])
            })?;
        self.follow(&transition)?;
        Ok(transition)
    }

    /// Go one step back; `None` at the first step
    pub fn back(&mut self) -> Result<Option<Transition>, WizardError> {
        self.error = None;
        self.field_errors.clear();
        let Some(transition) = sequencer::transition(self.step(), Event::Back, self.fhir_id())
        else {
            return Ok(None);
        };
        self.follow(&transition)?;
        Ok(Some(transition))
    }

    /// Validate everything the pipeline needs and build its input. A new
    /// patient gets a submission key that is saved so a retry reuses it.
    pub fn submission_input(&mut self, today: NaiveDate) -> Result<SubmissionInput, WizardError> {
        self.error = None;
        let ctx = self.context(today);
        let required: &[WizardStep] = match self.fhir_id() {
            Some(_) => &[WizardStep::Upload],
            None => &WizardStep::ALL,
        };
        let errors: Vec<FieldError> = required
            .iter()
            .flat_map(|step| component_for(*step).validate(&StepContext {
                // The privacy box was ticked to get past the account step
                privacy_accepted: true,
                ..ctx
            }))
            .collect();
        if !errors.is_empty() {
            self.field_errors = errors.clone();
            return Err(WizardError::Invalid(errors));
        }

        let data = &self.state.patient_data;
        let invalid = |field: &'static str, message: String| {
            WizardError::Invalid(vec![FieldError::new(field, message)])
        };
        let test_date = parse_past_date("Test date", &data.test_date, today)
            .map_err(|m| invalid("test_date", m))?;
        let file = data
            .file
            .clone()
            .ok_or_else(|| invalid("file", "Please select a lab results file".to_string()))?;

        let new_patient = match self.fhir_id() {
            Some(_) => None,
            None => Some(CreatePatientRequest {
                email: data.email.trim().to_string(),
                password: data.password.clone(),
                first_name: data.first_name.trim().to_string(),
                last_name: data.last_name.trim().to_string(),
                date_of_birth: parse_past_date("Date of birth", &data.date_of_birth, today)
                    .map_err(|m| invalid("date_of_birth", m))?,
                gender: data.gender.clone(),
            }),
        };

        let idempotency_key = match (&new_patient, self.state.submission_key) {
            (None, _) => None,
            (Some(_), Some(key)) => Some(key),
            (Some(_), None) => {
                let key = Uuid::new_v4();
                self.state.submission_key = Some(key);
                self.persist()?;
                Some(key)
            }
        };

        Ok(SubmissionInput {
            existing_fhir_id: self.fhir_id().map(String::from),
            new_patient,
            idempotency_key,
            test_date,
            file,
        })
    }

    /// Run the pipeline. On success the saved progress is cleared and the
    /// patient dashboard route is returned.
    pub async fn submit(
        &mut self,
        pipeline: &SubmissionPipeline,
        today: NaiveDate,
    ) -> Result<(SubmissionOutcome, Route), WizardError> {
        self.error = None;
        let input = self.submission_input(today)?;
        let result = pipeline.run(input).await;
        self.finish_submission(result)
    }

    /// Apply the result of a pipeline run started from
    /// [`Wizard::submission_input`].
    pub fn finish_submission(
        &mut self,
        result: Result<SubmissionOutcome, PipelineError>,
    ) -> Result<(SubmissionOutcome, Route), WizardError> {
        match result {
            Ok(outcome) => {
                info!(fhir_id = %outcome.fhir_id, "Wizard finished");
                if self.fhir_id().is_none() {
                    self.clear()?;
                }
                let route = Route::patient(outcome.fhir_id.clone());
                Ok((outcome, route))
            }
            Err(e) => {
                // A refused re-entry says nothing about the attempt in flight
                if !matches!(e, PipelineError::AlreadyRunning) {
                    self.error = Some(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    /// Forget all progress and return to the welcome step
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.state = WizardState::default();
        self.privacy_accepted = false;
        self.field_errors.clear();
        self.error = None;
        self.route = Route::wizard_start();
        self.store.clear()
    }

    fn follow(&mut self, transition: &Transition) -> Result<(), StoreError> {
        self.route = transition.route().clone();
        if let Transition::Step(step, _) = transition {
            self.state.current_step = *step;
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {
        if self.fhir_id().is_some() {
            return Ok(());
        }
        self.store.save(&self.state)
    }

    fn context(&self, today: NaiveDate) -> StepContext<'_> {
        StepContext {
            data: &self.state.patient_data,
            today,
            max_file_bytes: self.max_file_bytes,
            privacy_accepted: self.privacy_accepted,
        }
    }
}

#[cfg(test)]
mod tests;
