//! Request and response bodies for the lab API

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Auth ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response from `POST /auth/login`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    /// Signed bearer token (older servers call it `access_token`)
    #[serde(alias = "access_token")]
    pub token: String,
    /// "admin" or "patient"
    #[serde(default)]
    pub role: Option<String>,
    /// Present only for patient accounts
    #[serde(default)]
    pub fhir_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EmailCheckResponse {
    pub exists: bool,
}

#[derive(Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Serialize)]
pub struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub new_password: &'a str,
}

/// Generic `{message}` acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Error body of a non-2xx response. `detail` may also be a list (FastAPI
/// validation errors); only a string detail is shown to the user.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub(crate) fn detail_message(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

// ─── Pagination ─────────────────────────────────────────────────────────────

/// 1-based page request sent as `?page=&page_size=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    pub fn with_page(self, page: u32) -> Self {
        Self::new(page, self.page_size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

// ─── Patients ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default)]
    pub id: String,
    pub fhir_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub lab_test_count: u32,
    #[serde(default)]
    pub interpreted_count: u32,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PatientEnvelope {
    pub patient: Patient,
}

/// Response from `GET /api/patients`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatientPage {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Body of `POST /api/patients`
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
}

impl fmt::Debug for CreatePatientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatePatientRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("date_of_birth", &self.date_of_birth)
            .field("gender", &self.gender)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatePatientResponse {
    #[serde(default)]
    pub fhir_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ─── Lab sets ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A dated collection of observations belonging to one patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabTestSet {
    pub id: String,
    #[serde(default)]
    pub patient_fhir_id: String,
    #[serde(default)]
    pub test_date: String,
    #[serde(default)]
    pub observations: Vec<ObservationRef>,
    #[serde(default)]
    pub interpretation: Option<String>,
}

/// Response from `GET /api/patients/:fhirId/lab-tests`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabSetPage {
    #[serde(default)]
    pub lab_test_sets: Vec<LabTestSet>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpretationResponse {
    pub interpretation: String,
}

/// File bytes ready to be sent as the `file` multipart part
#[derive(Clone, PartialEq, Eq)]
pub struct LabUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for LabUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ─── Observations (FHIR) ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    #[serde(default)]
    pub low: Option<Quantity>,
    #[serde(default)]
    pub high: Option<Quantity>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A single measured lab value with optional reference range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    #[serde(default)]
    pub code: CodeableConcept,
    #[serde(rename = "valueQuantity", default)]
    pub value_quantity: Option<Quantity>,
    #[serde(rename = "valueString", default)]
    pub value_string: Option<String>,
    #[serde(rename = "referenceRange", default)]
    pub reference_range: Vec<ReferenceRange>,
}

impl Observation {
    pub fn name(&self) -> &str {
        &self.code.text
    }

    /// Whether a quantity value falls outside its first reference range.
    /// `None` when there is nothing numeric to compare.
    pub fn is_out_of_range(&self) -> Option<bool> {
        let value = self.value_quantity.as_ref()?.value;
        let range = self.reference_range.first()?;
        if range.low.is_none() && range.high.is_none() {
            return None;
        }
        let below = range.low.as_ref().is_some_and(|low| value < low.value);
        let above = range.high.as_ref().is_some_and(|high| value > high.value);
        Some(below || above)
    }
}

/// The observation endpoint answers with either a bare list or `{observations}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ObservationsBody {
    List(Vec<Observation>),
    Wrapped { observations: Vec<Observation> },
}

impl ObservationsBody {
    pub(crate) fn into_vec(self) -> Vec<Observation> {
        match self {
            ObservationsBody::List(list) => list,
            ObservationsBody::Wrapped { observations } => observations,
        }
    }
}
