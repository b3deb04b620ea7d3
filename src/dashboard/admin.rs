//! Admin dashboard: paginated list of all patients

use std::sync::Arc;
use tracing::info;

use crate::api::types::{PageRequest, Pagination, Patient};
use crate::api::{ApiError, LabApi};

pub struct AdminDashboard {
    api: Arc<dyn LabApi>,
    page: PageRequest,
    patients: Vec<Patient>,
    pagination: Pagination,
    error: Option<String>,
}

impl AdminDashboard {
    pub fn new(api: Arc<dyn LabApi>, page_size: u32) -> Self {
        Self {
            api,
            page: PageRequest::first(page_size),
            patients: Vec::new(),
            pagination: Pagination::default(),
            error: None,
        }
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub async fn load(&mut self) -> Result<(), ApiError> {
        self.error = None;
        match self.api.list_patients(self.page).await {
            Ok(page) => {
                self.patients = page.patients;
                self.pagination = page.pagination;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn go_to_page(&mut self, page: u32) -> Result<(), ApiError> {
        let last = self.pagination.total_pages.max(1);
        self.page = self.page.with_page(page.clamp(1, last));
        self.load().await
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

    /// Delete a patient and reload the current page
    pub async fn delete_patient(&mut self, fhir_id: &str) -> Result<(), ApiError> {
        self.error = None;
        if let Err(e) = self.api.delete_patient(fhir_id).await {
            self.error = Some(e.to_string());
            return Err(e);
        }
        info!(fhir_id, "Patient deleted");

        if self.patients.len() == 1 && self.page.page > 1 {
            self.page = self.page.with_page(self.page.page - 1);
        }
        self.load().await
    }
}
