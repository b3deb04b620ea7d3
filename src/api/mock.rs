//! In-memory [`LabApi`] for tests

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use uuid::Uuid;

use super::types::{
    CreatePatientRequest, CreatePatientResponse, InterpretationResponse, LabSetPage, LabTestSet,
    LabUpload, LoginResponse, MessageResponse, Observation, ObservationRef, PageRequest,
    Pagination, Patient, PatientPage, UploadResponse,
};
use super::{is_public_endpoint, ApiError, LabApi};
use crate::session::SessionNotifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: String,
    pub args: Vec<String>,
}

type CallHook = Arc<dyn Fn(&MockCall) + Send + Sync>;

/// Handle on a call held by [`MockLabApi::hold`]
#[derive(Clone, Default)]
pub struct MockGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl MockGate {
    /// Wait until the held call has been made
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call continue
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug, Clone)]
struct MockAccount {
    password: String,
    role: &'static str,
    fhir_id: Option<String>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    patients: Vec<Patient>,
    lab_sets: Vec<LabTestSet>,
    observations: HashMap<String, Observation>,
    uploads: Vec<(String, NaiveDate, LabUpload)>,
    idempotency: HashMap<Uuid, String>,
    failures: HashMap<String, VecDeque<ApiError>>,
    reset_tokens: HashSet<String>,
    next_fhir_ids: VecDeque<String>,
    next_lab_set_ids: VecDeque<String>,
    omit_identifiers: bool,
    interpretation: String,
    counter: u32,
    calls: Vec<MockCall>,
    on_call: Option<CallHook>,
    gates: HashMap<String, MockGate>,
}

/// Mock lab API backed by in-memory collections.
///
/// Every call is recorded; failures can be queued per operation with
/// [`MockLabApi::fail_next`]. [`MockLabApi::on_call`] observes calls as they
/// happen and [`MockLabApi::hold`] parks the next call of an operation.
#[derive(Clone, Default)]
pub struct MockLabApi {
    state: Arc<Mutex<MockState>>,
    notifier: Option<SessionNotifier>,
}

impl MockLabApi {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.lock().interpretation = "All values are within normal ranges.".to_string();
        mock
    }

    /// Broadcast session expiry for queued 401 failures on non-public
    /// operations, as the real client does.
    pub fn with_notifier(mut self, notifier: SessionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_admin(&self, email: &str, password: &str) {
        self.lock().accounts.insert(
            email.to_string(),
            MockAccount {
                password: password.to_string(),
                role: "admin",
                fhir_id: None,
            },
        );
    }

    /// Register a patient account and its record
    pub fn add_patient(&self, email: &str, password: &str, patient: Patient) {
        let mut state = self.lock();
        state.accounts.insert(
            email.to_string(),
            MockAccount {
                password: password.to_string(),
                role: "patient",
                fhir_id: Some(patient.fhir_id.clone()),
            },
        );
        state.patients.push(patient);
    }

    pub fn add_lab_set(&self, lab_set: LabTestSet) {
        self.lock().lab_sets.push(lab_set);
    }

    pub fn add_observation(&self, observation: Observation) {
        self.lock()
            .observations
            .insert(observation.id.clone(), observation);
    }

    pub fn add_reset_token(&self, token: &str) {
        self.lock().reset_tokens.insert(token.to_string());
    }

    pub fn set_next_fhir_id(&self, fhir_id: &str) {
        self.lock().next_fhir_ids.push_back(fhir_id.to_string());
    }

    pub fn set_next_lab_set_id(&self, id: &str) {
        self.lock().next_lab_set_ids.push_back(id.to_string());
    }

    pub fn set_interpretation(&self, text: &str) {
        self.lock().interpretation = text.to_string();
    }

    /// Answer create/upload with success bodies that lack the new identifier
    pub fn omit_identifiers(&self) {
        self.lock().omit_identifiers = true;
    }

    /// Queue a failure for the next call of `operation` (e.g. "upload_lab_set")
    pub fn fail_next(&self, operation: &str, error: ApiError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Run `hook` on every call, before any queued failure is returned
    pub fn on_call(&self, hook: impl Fn(&MockCall) + Send + Sync + 'static) {
        self.lock().on_call = Some(Arc::new(hook));
    }

    /// Park the next call of `operation` until the returned gate is released
    pub fn hold(&self, operation: &str) -> MockGate {
        let gate = MockGate::default();
        self.lock()
            .gates
            .insert(operation.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|c| c.operation.clone())
            .collect()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn patients(&self) -> Vec<Patient> {
        self.lock().patients.clone()
    }

    pub fn lab_sets(&self) -> Vec<LabTestSet> {
        self.lock().lab_sets.clone()
    }

    pub fn uploads(&self) -> Vec<(String, NaiveDate, LabUpload)> {
        self.lock().uploads.clone()
    }

    /// Record the call, run the hooks and pop a queued failure, if any
    async fn enter(&self, operation: &str, path: &str, args: &[&str]) -> Result<(), ApiError> {
        let call = MockCall {
            operation: operation.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        let (hook, gate) = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            (state.on_call.clone(), state.gates.remove(operation))
        };
        if let Some(hook) = hook {
            hook(&call);
        }
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let queued = self
            .lock()
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front());
        match queued {
            Some(error) => {
                if let (true, Some(notifier)) = (
                    error.is_session_expired() && !is_public_endpoint(path),
                    &self.notifier,
                ) {
                    notifier.notify_expired(path);
                }
                Err(error)
            }
            None => Ok(()),
        }
    }
}

fn not_found(message: &str) -> ApiError {
    ApiError::from_status(404, Some(message.to_string()), false)
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> (Vec<T>, Pagination) {
    let total = items.len() as u64;
    let page_size = page.page_size.max(1) as usize;
    let total_pages = items.len().div_ceil(page_size) as u32;
    let start = (page.page.max(1) as usize - 1) * page_size;
    let slice = items.iter().skip(start).take(page_size).cloned().collect();
    (
        slice,
        Pagination {
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages,
        },
    )
}

#[async_trait]
impl LabApi for MockLabApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.enter("login", "/auth/login", &[email]).await?;
        let state = self.lock();
        match state.accounts.get(email) {
            Some(account) if account.password == password => Ok(LoginResponse {
                token: format!("mock-token-{email}"),
                role: Some(account.role.to_string()),
                fhir_id: account.fhir_id.clone(),
            }),
            _ => Err(ApiError::from_status(401, None, true)),
        }
    }

    async fn check_email(&self, email: &str) -> Result<bool, ApiError> {
        self.enter("check_email", "/auth/check-email", &[email]).await?;
        Ok(self.lock().accounts.contains_key(email))
    }

    async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ApiError> {
        self.enter("forgot_password", "/auth/forgot-password", &[email]).await?;
        Ok(MessageResponse {
            message: "If the email exists, a reset link has been sent".to_string(),
        })
    }

    async fn reset_password(
        &self,
        token: &str,
        _new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        self.enter("reset_password", "/auth/reset-password", &[token]).await?;
        if self.lock().reset_tokens.remove(token) {
            Ok(MessageResponse {
                message: "Password has been reset".to_string(),
            })
        } else {
            Err(ApiError::from_status(
                400,
                Some("Invalid or expired reset token".to_string()),
                true,
            ))
        }
    }

    async fn list_patients(&self, page: PageRequest) -> Result<PatientPage, ApiError> {
        self.enter(
            "list_patients",
            "/api/patients",
            &[&page.page.to_string(), &page.page_size.to_string()],
        )
        .await?;
        let (patients, pagination) = paginate(&self.lock().patients, page);
        Ok(PatientPage {
            patients,
            pagination,
        })
    }

    async fn get_patient(&self, fhir_id: &str) -> Result<Patient, ApiError> {
        self.enter("get_patient", "/api/patients/:id", &[fhir_id]).await?;
        self.lock()
            .patients
            .iter()
            .find(|p| p.fhir_id == fhir_id)
            .cloned()
            .ok_or_else(|| not_found("Patient not found"))
    }

    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
        idempotency_key: Option<Uuid>,
    ) -> Result<CreatePatientResponse, ApiError> {
        let key = idempotency_key.map(|k| k.to_string()).unwrap_or_default();
        self.enter("create_patient", "/api/patients", &[&request.email, &key])
            .await?;
        let mut state = self.lock();

        if let Some(existing) = idempotency_key.and_then(|k| state.idempotency.get(&k)) {
            return Ok(CreatePatientResponse {
                fhir_id: Some(existing.clone()),
                message: None,
            });
        }
        if state.accounts.contains_key(&request.email) {
            return Err(ApiError::from_status(
                409,
                Some("Email already registered".to_string()),
                false,
            ));
        }

        state.counter += 1;
        let counter = state.counter;
        let fhir_id = state
            .next_fhir_ids
            .pop_front()
            .unwrap_or_else(|| format!("patient-{counter}"));
        state.accounts.insert(
            request.email.clone(),
            MockAccount {
                password: request.password.clone(),
                role: "patient",
                fhir_id: Some(fhir_id.clone()),
            },
        );
        state.patients.push(Patient {
            id: fhir_id.clone(),
            fhir_id: fhir_id.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            birth_date: request.date_of_birth.format("%Y-%m-%d").to_string(),
            gender: request.gender.clone(),
            lab_test_count: 0,
            interpreted_count: 0,
        });
        if let Some(key) = idempotency_key {
            state.idempotency.insert(key, fhir_id.clone());
        }

        Ok(CreatePatientResponse {
            fhir_id: (!state.omit_identifiers).then_some(fhir_id),
            message: Some("Patient created successfully".to_string()),
        })
    }

    async fn delete_patient(&self, fhir_id: &str) -> Result<(), ApiError> {
        self.enter("delete_patient", "/api/patients/:id", &[fhir_id]).await?;
        let mut state = self.lock();
        let before = state.patients.len();
        state.patients.retain(|p| p.fhir_id != fhir_id);
        if state.patients.len() == before {
            return Err(not_found("Patient not found"));
        }
        state.lab_sets.retain(|s| s.patient_fhir_id != fhir_id);
        state
            .accounts
            .retain(|_, account| account.fhir_id.as_deref() != Some(fhir_id));
        Ok(())
    }

    async fn list_lab_sets(
        &self,
        fhir_id: &str,
        page: PageRequest,
    ) -> Result<LabSetPage, ApiError> {
        self.enter(
            "list_lab_sets",
            "/api/patients/:id/lab-tests",
            &[fhir_id, &page.page.to_string()],
        )
        .await?;
        let state = self.lock();
        let owned: Vec<LabTestSet> = state
            .lab_sets
            .iter()
            .filter(|s| s.patient_fhir_id == fhir_id)
            .cloned()
            .collect();
        let (lab_test_sets, pagination) = paginate(&owned, page);
        Ok(LabSetPage {
            lab_test_sets,
            pagination,
        })
    }

    async fn upload_lab_set(
        &self,
        fhir_id: &str,
        test_date: NaiveDate,
        file: LabUpload,
    ) -> Result<UploadResponse, ApiError> {
        let date = test_date.to_string();
        self.enter(
            "upload_lab_set",
            "/api/patients/:id/lab-tests",
            &[fhir_id, &date, &file.file_name],
        )
        .await?;
        let mut state = self.lock();
        if !state.patients.iter().any(|p| p.fhir_id == fhir_id) {
            return Err(not_found("Patient not found"));
        }

        state.counter += 1;
        let counter = state.counter;
        let id = state
            .next_lab_set_ids
            .pop_front()
            .unwrap_or_else(|| format!("ls-{counter}"));
        let observations = state
            .observations
            .values()
            .map(|o| ObservationRef {
                id: o.id.clone(),
                name: o.code.text.clone(),
            })
            .collect();
        state.lab_sets.push(LabTestSet {
            id: id.clone(),
            patient_fhir_id: fhir_id.to_string(),
            test_date: date,
            observations,
            interpretation: None,
        });
        state.uploads.push((fhir_id.to_string(), test_date, file));

        Ok(UploadResponse {
            id: (!state.omit_identifiers).then_some(id),
        })
    }

    async fn delete_lab_set(&self, lab_set_id: &str) -> Result<(), ApiError> {
        self.enter("delete_lab_set", "/api/lab-tests/:id", &[lab_set_id]).await?;
        let mut state = self.lock();
        let before = state.lab_sets.len();
        state.lab_sets.retain(|s| s.id != lab_set_id);
        if state.lab_sets.len() == before {
            return Err(not_found("Lab test set not found"));
        }
        Ok(())
    }

    async fn interpret_lab_set(
        &self,
        lab_set_id: &str,
    ) -> Result<InterpretationResponse, ApiError> {
        self.enter(
            "interpret_lab_set",
            "/api/lab-tests/:id/interpret",
            &[lab_set_id],
        )
        .await?;
        let mut state = self.lock();
        let interpretation = state.interpretation.clone();
        let set = state
            .lab_sets
            .iter_mut()
            .find(|s| s.id == lab_set_id)
            .ok_or_else(|| not_found("Lab test set not found"))?;
        set.interpretation = Some(interpretation.clone());
        Ok(InterpretationResponse { interpretation })
    }

    async fn observations(&self, observation_id: &str) -> Result<Vec<Observation>, ApiError> {
        self.enter("observations", "/api/observations/:id", &[observation_id])
            .await?;
        Ok(self
            .lock()
            .observations
            .get(observation_id)
            .cloned()
            .into_iter()
            .collect())
    }
}
