//! Per-step form rules.
//!
//! Each step names the fields it edits and checks them against the current
//! [`PatientData`]. Rendering lives in the UI; these only decide whether the
//! step may be left forwards.

use chrono::NaiveDate;

use super::state::{PatientData, WizardStep};
use super::validation::{
    self, is_known_gender, is_valid_email, is_valid_password, parse_past_date, FieldError,
};

/// What a step needs to know besides the entered data
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub data: &'a PatientData,
    pub today: NaiveDate,
    pub max_file_bytes: u64,
    pub privacy_accepted: bool,
}

pub trait StepComponent: Send + Sync {
    fn step(&self) -> WizardStep;

    /// Field keys edited on this step, in display order
    fn fields(&self) -> &'static [&'static str];

    /// Empty when the step may advance
    fn validate(&self, ctx: &StepContext<'_>) -> Vec<FieldError>;
}

pub struct WelcomeStep;
pub struct AccountStep;
pub struct NameStep;
pub struct DemographicsStep;
pub struct UploadStep;

impl StepComponent for WelcomeStep {
    fn step(&self) -> WizardStep {
        WizardStep::Welcome
    }

    fn fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn validate(&self, _ctx: &StepContext<'_>) -> Vec<FieldError> {
        Vec::new()
    }
}

impl StepComponent for AccountStep {
    fn step(&self) -> WizardStep {
        WizardStep::Account
    }

    fn fields(&self) -> &'static [&'static str] {
        &["email", "password", "privacy"]
    }

    fn validate(&self, ctx: &StepContext<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if !is_valid_email(&ctx.data.email) {
            errors.push(FieldError::new(
                "email",
                "Please enter a valid email address",
            ));
        }
        if !is_valid_password(&ctx.data.password) {
            errors.push(FieldError::new(
                "password",
                "Password does not meet the requirements",
            ));
        }
        if !ctx.privacy_accepted {
            errors.push(FieldError::new("privacy", validation::PRIVACY_REQUIRED));
        }
        errors
    }
}

impl StepComponent for NameStep {
    fn step(&self) -> WizardStep {
        WizardStep::Name
    }

    fn fields(&self) -> &'static [&'static str] {
        &["first_name", "last_name"]
    }

    fn validate(&self, ctx: &StepContext<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if ctx.data.first_name.trim().is_empty() {
            errors.push(FieldError::new("first_name", "First name is required"));
        }
        if ctx.data.last_name.trim().is_empty() {
            errors.push(FieldError::new("last_name", "Last name is required"));
        }
        errors
    }
}

impl StepComponent for DemographicsStep {
    fn step(&self) -> WizardStep {
        WizardStep::Demographics
    }

    fn fields(&self) -> &'static [&'static str] {
        &["date_of_birth", "gender"]
    }

    fn validate(&self, ctx: &StepContext<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let Err(message) = parse_past_date("Date of birth", &ctx.data.date_of_birth, ctx.today)
        {
            errors.push(FieldError::new("date_of_birth", message));
        }
        if ctx.data.gender.is_empty() {
            errors.push(FieldError::new("gender", "Gender is required"));
        } else if !is_known_gender(&ctx.data.gender) {
            errors.push(FieldError::new(
                "gender",
                "Gender must be one of male, female or other",
            ));
        }
        errors
    }
}

impl StepComponent for UploadStep {
    fn step(&self) -> WizardStep {
        WizardStep::Upload
    }

    fn fields(&self) -> &'static [&'static str] {
        &["test_date", "file"]
    }

    fn validate(&self, ctx: &StepContext<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let Err(message) = parse_past_date("Test date", &ctx.data.test_date, ctx.today) {
            errors.push(FieldError::new("test_date", message));
        }
        if let Err(message) = validation::validate_lab_file(ctx.data.file.as_ref(), ctx.max_file_bytes)
        {
            errors.push(FieldError::new("file", message));
        }
        errors
    }
}

pub fn component_for(step: WizardStep) -> &'static dyn StepComponent {
    match step {
        WizardStep::Welcome => &WelcomeStep,
        WizardStep::Account => &AccountStep,
        WizardStep::Name => &NameStep,
        WizardStep::Demographics => &DemographicsStep,
        WizardStep::Upload => &UploadStep,
    }
}

/// First step whose fields are incomplete, i.e. the furthest step a fresh
/// (unbound) wizard may open at. The privacy box is not persisted, so a
/// resumed account step is judged on its fields alone.
pub fn furthest_reachable(data: &PatientData, today: NaiveDate, max_file_bytes: u64) -> WizardStep {
    let ctx = StepContext {
        data,
        today,
        max_file_bytes,
        privacy_accepted: true,
    };
    WizardStep::ALL
        .into_iter()
        .find(|step| !component_for(*step).validate(&ctx).is_empty())
        .unwrap_or(WizardStep::Upload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::state::LabFile;
    use std::path::PathBuf;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn ctx(data: &PatientData, privacy_accepted: bool) -> StepContext<'_> {
        StepContext {
            data,
            today: today(),
            max_file_bytes: 1024 * 1024,
            privacy_accepted,
        }
    }

    fn complete() -> PatientData {
        PatientData {
            email: "a@b.com".to_string(),
            password: "Abcd123!".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            gender: "female".to_string(),
            file: Some(LabFile {
                path: PathBuf::from("/tmp/results.pdf"),
                name: "results.pdf".to_string(),
                size: 200 * 1024,
                content_type: "application/pdf".to_string(),
            }),
            test_date: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn test_complete_data_passes_every_step() {
        let data = complete();
        for step in WizardStep::ALL {
            let component = component_for(step);
            assert_eq!(component.step(), step);
            assert!(component.validate(&ctx(&data, true)).is_empty(), "{step}");
        }
    }

    #[test]
    fn test_account_requires_privacy() {
        let data = complete();
        let errors = AccountStep.validate(&ctx(&data, false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "privacy");
        assert_eq!(errors[0].message, validation::PRIVACY_REQUIRED);
    }

    #[test]
    fn test_account_reports_each_bad_field() {
        let data = PatientData {
            email: "nope".to_string(),
            password: "short".to_string(),
            ..Default::default()
        };
        let fields: Vec<_> = AccountStep
            .validate(&ctx(&data, true))
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["email", "password"]);
    }

    #[test]
    fn test_name_rejects_blank() {
        let data = PatientData {
            first_name: "  ".to_string(),
            last_name: "Doe".to_string(),
            ..Default::default()
        };
        let errors = NameStep.validate(&ctx(&data, true));
        assert_eq!(errors, vec![FieldError::new("first_name", "First name is required")]);
    }

    #[test]
    fn test_demographics_rules() {
        let mut data = complete();
        data.gender = "unknown".to_string();
        data.date_of_birth = "2099-01-01".to_string();
        let errors = DemographicsStep.validate(&ctx(&data, true));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_upload_requires_file_and_date() {
        let mut data = complete();
        data.file = None;
        data.test_date.clear();
        let fields: Vec<_> = UploadStep
            .validate(&ctx(&data, true))
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["test_date", "file"]);
    }

    #[test]
    fn test_furthest_reachable() {
        assert_eq!(
            furthest_reachable(&PatientData::default(), today(), 1024),
            WizardStep::Account
        );

        let mut data = complete();
        data.gender.clear();
        assert_eq!(
            furthest_reachable(&data, today(), 1024 * 1024),
            WizardStep::Demographics
        );
        assert_eq!(
            furthest_reachable(&complete(), today(), 1024 * 1024),
            WizardStep::Upload
        );
    }
}
