//! Client for the remote lab API
//!
//! - [`LabApi`]: one method per remote endpoint
//! - [`ApiClient`]: the reqwest implementation (bearer, CSRF, cookie jar)
//! - [`MockLabApi`]: in-memory implementation for tests
//! - [`ApiError`]: the closed error shape every call fails with

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use mock::{MockCall, MockGate, MockLabApi};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use types::{
    CreatePatientRequest, CreatePatientResponse, InterpretationResponse, LabSetPage, LabUpload,
    LoginResponse, MessageResponse, Observation, PageRequest, Patient, PatientPage,
    UploadResponse,
};

/// Endpoints that never carry a session; a 401 from them means bad
/// credentials, not an expired session.
pub const PUBLIC_ENDPOINTS: &[&str] = &[
    "/auth/login",
    "/auth/forgot-password",
    "/auth/reset-password",
    "/auth/check-email",
];

pub fn is_public_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    PUBLIC_ENDPOINTS.contains(&path)
}

/// The remote lab API
#[async_trait]
pub trait LabApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// Whether an account already exists for `email`
    async fn check_email(&self, email: &str) -> Result<bool, ApiError>;

    async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ApiError>;

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError>;

    async fn list_patients(&self, page: PageRequest) -> Result<PatientPage, ApiError>;

    async fn get_patient(&self, fhir_id: &str) -> Result<Patient, ApiError>;

    /// Create a patient account. `idempotency_key` is sent as the
    /// `Idempotency-Key` header so a retried submission can be deduplicated.
    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
        idempotency_key: Option<Uuid>,
    ) -> Result<CreatePatientResponse, ApiError>;

    async fn delete_patient(&self, fhir_id: &str) -> Result<(), ApiError>;

    async fn list_lab_sets(&self, fhir_id: &str, page: PageRequest)
        -> Result<LabSetPage, ApiError>;

    async fn upload_lab_set(
        &self,
        fhir_id: &str,
        test_date: NaiveDate,
        file: LabUpload,
    ) -> Result<UploadResponse, ApiError>;

    async fn delete_lab_set(&self, lab_set_id: &str) -> Result<(), ApiError>;

    async fn interpret_lab_set(&self, lab_set_id: &str)
        -> Result<InterpretationResponse, ApiError>;

    async fn observations(&self, observation_id: &str) -> Result<Vec<Observation>, ApiError>;
}
