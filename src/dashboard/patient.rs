//! Patient dashboard: one patient's record and paginated lab sets

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::{LabTestSet, Observation, PageRequest, Pagination, Patient};
use crate::api::{ApiError, LabApi};

pub struct PatientDashboard {
    api: Arc<dyn LabApi>,
    fhir_id: String,
    page: PageRequest,
    patient: Option<Patient>,
    lab_sets: Vec<LabTestSet>,
    pagination: Pagination,
    observations: HashMap<String, Vec<Observation>>,
    expanded: Option<String>,
    error: Option<String>,
}

impl PatientDashboard {
    pub fn new(api: Arc<dyn LabApi>, fhir_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            api,
            fhir_id: fhir_id.into(),
            page: PageRequest::first(page_size),
            patient: None,
            lab_sets: Vec::new(),
            pagination: Pagination::default(),
            observations: HashMap::new(),
            expanded: None,
            error: None,
        }
    }

    pub fn fhir_id(&self) -> &str {
        &self.fhir_id
    }

    pub fn patient(&self) -> Option<&Patient> {
        self.patient.as_ref()
    }

    pub fn lab_sets(&self) -> &[LabTestSet] {
        &self.lab_sets
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn expanded(&self) -> Option<&str> {
        self.expanded.as_deref()
    }

    pub fn observations(&self, lab_set_id: &str) -> Option<&[Observation]> {
        self.observations.get(lab_set_id).map(Vec::as_slice)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    fn record<T>(&mut self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(e) = &result {
            self.error = Some(e.to_string());
        }
        result
    }

    /// Fetch the patient, the current page of lab sets and the observations
    /// of the newest set, which starts expanded.
    pub async fn load(&mut self) -> Result<(), ApiError> {
        self.error = None;
        let patient = self.api.get_patient(&self.fhir_id).await;
        self.patient = Some(self.record(patient)?);
        self.load_page().await
    }

    async fn load_page(&mut self) -> Result<(), ApiError> {
        let page = self.api.list_lab_sets(&self.fhir_id, self.page).await;
        let page = self.record(page)?;
        self.lab_sets = page.lab_test_sets;
        self.pagination = page.pagination;
        self.observations.clear();
        self.expanded = None;

        if let Some(first) = self.lab_sets.first().map(|s| s.id.clone()) {
            self.expand(&first).await;
        }
        Ok(())
    }

    pub async fn go_to_page(&mut self, page: u32) -> Result<(), ApiError> {
        let last = self.pagination.total_pages.max(1);
        self.page = self.page.with_page(page.clamp(1, last));
        self.load_page().await
    }

    pub async fn next_page(&mut self) -> Result<(), ApiError> {
        if !self.pagination.has_next() {
            return Ok(());
        }
        self.go_to_page(self.page.page + 1).await
    }

    pub async fn prev_page(&mut self) -> Result<(), ApiError> {
        if !self.pagination.has_prev() {
            return Ok(());
        }
        self.go_to_page(self.page.page - 1).await
    }

    /// Expand or collapse a lab set, loading its observations on first open
    pub async fn toggle(&mut self, lab_set_id: &str) {
        if self.expanded.as_deref() == Some(lab_set_id) {
            self.expanded = None;
        } else {
            self.expand(lab_set_id).await;
        }
    }

    /// Observations are fetched one at a time; a failed fetch shows the set
    /// as empty rather than failing the dashboard.
    async fn expand(&mut self, lab_set_id: &str) {
        self.expanded = Some(lab_set_id.to_string());
        if self.observations.contains_key(lab_set_id) {
            return;
        }
        let Some(set) = self.lab_sets.iter().find(|s| s.id == lab_set_id) else {
            warn!(lab_set_id, "Lab set not on the current page");
            return;
        };
        let ids: Vec<String> = set.observations.iter().map(|o| o.id.clone()).collect();

        let mut loaded = Vec::new();
        for id in ids {
            match self.api.observations(&id).await {
                Ok(mut list) => loaded.append(&mut list),
                Err(e) => {
                    warn!(lab_set_id, observation = %id, error = %e, "Failed to load observations");
                    loaded.clear();
                    break;
                }
            }
        }
        self.observations.insert(lab_set_id.to_string(), loaded);
    }

    pub async fn interpret(&mut self, lab_set_id: &str) -> Result<String, ApiError> {
        self.error = None;
        let result = self.api.interpret_lab_set(lab_set_id).await;
        let text = self.record(result)?.interpretation;
        if let Some(set) = self.lab_sets.iter_mut().find(|s| s.id == lab_set_id) {
            set.interpretation = Some(text.clone());
        }
        info!(lab_set_id, "Interpretation generated");
        Ok(text)
    }

    /// Delete a lab set (after the user confirmed) and refresh the page
    pub async fn delete_lab_set(&mut self, lab_set_id: &str) -> Result<(), ApiError> {
        self.error = None;
        let result = self.api.delete_lab_set(lab_set_id).await;
        self.record(result)?;
        info!(lab_set_id, "Lab set deleted");

        // Step back when the last set on a later page went away
        let emptied = self.lab_sets.len() == 1 && self.page.page > 1;
        if emptied {
            self.page = self.page.with_page(self.page.page - 1);
        }
        self.load_page().await
    }
}
