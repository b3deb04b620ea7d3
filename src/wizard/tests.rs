use super::*;
use crate::api::types::Patient;
use crate::api::MockLabApi;
use crate::pipeline::StageStatus;
use crate::session::{SessionManager, SessionNotifier, TokenStore};
use std::sync::Arc;
use tempfile::TempDir;

const MAX: u64 = 1024 * 1024;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn open(dir: &TempDir, path: &str) -> Wizard {
    let route: Route = path.parse().unwrap();
    Wizard::open(WizardStore::open(dir.path()), &route, MAX, today()).unwrap()
}

fn account_patch() -> PatientDataPatch {
    PatientDataPatch {
        email: Some("a@b.com".to_string()),
        password: Some("Abcd123!".to_string()),
        ..Default::default()
    }
}

async fn pdf(dir: &TempDir, size: usize) -> LabFile {
    let path = dir.path().join("results.pdf");
    tokio::fs::write(&path, vec![b'%'; size]).await.unwrap();
    LabFile::from_path(&path).await.unwrap()
}

fn pipeline(api: &MockLabApi) -> SubmissionPipeline {
    let session = Arc::new(SessionManager::new(
        Arc::new(TokenStore::in_memory()),
        SessionNotifier::new(),
        chrono::Duration::hours(1),
    ));
    SubmissionPipeline::new(Arc::new(api.clone()), session)
}

/// Walk a fresh wizard to the upload step with the example data
async fn walk_to_upload(dir: &TempDir, api: &MockLabApi) -> Wizard {
    let mut wizard = open(dir, "/wizard");
    wizard.advance(api, today()).await.unwrap();

    wizard.update(account_patch()).unwrap();
    wizard.set_privacy_accepted(true);
    wizard.advance(api, today()).await.unwrap();

    wizard
        .update(PatientDataPatch {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            ..Default::default()
        })
        .unwrap();
    wizard.advance(api, today()).await.unwrap();

    wizard
        .update(PatientDataPatch {
            date_of_birth: Some("1990-01-01".to_string()),
            gender: Some("female".to_string()),
            ..Default::default()
        })
        .unwrap();
    wizard.advance(api, today()).await.unwrap();
    wizard
}

#[test]
fn test_fresh_wizard_starts_at_welcome() {
    let dir = TempDir::new().unwrap();
    let wizard = open(&dir, "/wizard");
    assert_eq!(wizard.step(), WizardStep::Welcome);
    assert_eq!(wizard.route(), &Route::wizard_start());
    assert_eq!(wizard.data(), &PatientData::default());
}

#[test]
fn test_open_rejects_non_wizard_route() {
    let dir = TempDir::new().unwrap();
    let result = Wizard::open(WizardStore::open(dir.path()), &Route::Login, MAX, today());
    assert!(matches!(result, Err(WizardError::NotWizardRoute(_))));
}

#[tokio::test]
async fn test_account_step_blocks_invalid_fields() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let mut wizard = open(&dir, "/wizard/account");

    wizard
        .update(PatientDataPatch {
            email: Some("not-an-email".to_string()),
            password: Some("weak".to_string()),
            ..Default::default()
        })
        .unwrap();
    let err = wizard.advance(&api, today()).await.unwrap_err();

    assert!(matches!(err, WizardError::Invalid(_)));
    assert_eq!(wizard.step(), WizardStep::Account);
    assert_eq!(
        wizard.field_error("email"),
        Some("Please enter a valid email address")
    );
    assert!(wizard.field_error("privacy").is_some());
    assert_eq!(api.call_count("check_email"), 0);
}

#[tokio::test]
async fn test_existing_email_is_a_conflict() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.add_admin("a@b.com", "whatever");
    let mut wizard = open(&dir, "/wizard/account");
    wizard.update(account_patch()).unwrap();
    wizard.set_privacy_accepted(true);

    let err = wizard.advance(&api, today()).await.unwrap_err();

    assert!(matches!(err, WizardError::EmailExists));
    assert_eq!(wizard.error(), Some(EMAIL_EXISTS_MESSAGE));
    assert_eq!(wizard.step(), WizardStep::Account);
}

#[tokio::test]
async fn test_email_check_failure_message() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.fail_next("check_email", ApiError::network("timeout"));
    let mut wizard = open(&dir, "/wizard/account");
    wizard.update(account_patch()).unwrap();
    wizard.set_privacy_accepted(true);

    let err = wizard.advance(&api, today()).await.unwrap_err();
    assert!(matches!(err, WizardError::EmailCheckFailed(_)));
    assert_eq!(wizard.error(), Some(EMAIL_CHECK_FAILED_MESSAGE));
}

#[tokio::test]
async fn test_progress_survives_restart_except_file() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let mut wizard = walk_to_upload(&dir, &api).await;
    wizard
        .update(PatientDataPatch {
            file: Some(Some(pdf(&dir, 100).await)),
            test_date: Some("2024-01-01".to_string()),
            ..Default::default()
        })
        .unwrap();
    drop(wizard);

    let resumed = open(&dir, "/wizard");
    assert_eq!(resumed.step(), WizardStep::Upload);
    assert_eq!(resumed.route().path(), "/wizard/upload");
    assert_eq!(resumed.data().first_name, "Jane");
    assert_eq!(resumed.data().test_date, "2024-01-01");
    assert!(resumed.data().file.is_none());
}

#[test]
fn test_deep_link_past_incomplete_step_is_pulled_back() {
    let dir = TempDir::new().unwrap();
    let wizard = open(&dir, "/wizard/demographics");
    assert_eq!(wizard.step(), WizardStep::Account);
    assert_eq!(wizard.route().path(), "/wizard/account");
}

#[tokio::test]
async fn test_back_walks_linearly_and_stops_at_welcome() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let mut wizard = walk_to_upload(&dir, &api).await;

    let mut visited = vec![wizard.step()];
    while let Some(transition) = wizard.back().unwrap() {
        assert!(matches!(transition, Transition::Step(..)));
        visited.push(wizard.step());
    }
    assert_eq!(
        visited,
        vec![
            WizardStep::Upload,
            WizardStep::Demographics,
            WizardStep::Name,
            WizardStep::Account,
            WizardStep::Welcome
        ]
    );
    assert_eq!(
        WizardStore::open(dir.path()).load().unwrap().current_step,
        WizardStep::Welcome
    );
}

#[tokio::test]
async fn test_example_scenario_submits_and_clears() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.set_next_fhir_id("123");
    api.set_next_lab_set_id("ls1");
    let mut wizard = walk_to_upload(&dir, &api).await;
    wizard
        .update(PatientDataPatch {
            file: Some(Some(pdf(&dir, 200 * 1024).await)),
            test_date: Some("2024-01-01".to_string()),
            ..Default::default()
        })
        .unwrap();

    let pipeline = pipeline(&api);
    let (outcome, route) = wizard.submit(&pipeline, today()).await.unwrap();

    assert_eq!(outcome.lab_set_id, "ls1");
    assert_eq!(route.path(), "/patient/123");
    assert_eq!(
        api.operations(),
        vec![
            "check_email",
            "create_patient",
            "login",
            "upload_lab_set",
            "interpret_lab_set"
        ]
    );
    assert!(WizardStore::open(dir.path()).load().is_none());
    assert_eq!(wizard.step(), WizardStep::Welcome);
    assert_eq!(wizard.data(), &PatientData::default());
}

#[tokio::test]
async fn test_failed_submit_keeps_state_and_key() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.fail_next(
        "upload_lab_set",
        ApiError::from_status(413, Some("File too large".to_string()), false),
    );
    let mut wizard = walk_to_upload(&dir, &api).await;
    wizard
        .update(PatientDataPatch {
            file: Some(Some(pdf(&dir, 1000).await)),
            test_date: Some("2024-01-01".to_string()),
            ..Default::default()
        })
        .unwrap();
    let pipeline = pipeline(&api);

    let err = wizard.submit(&pipeline, today()).await.unwrap_err();
    assert_eq!(err.to_string(), "File too large");
    assert_eq!(wizard.error(), Some("File too large"));
    assert_eq!(pipeline.snapshot().upload_lab_test, StageStatus::Error);

    let saved = WizardStore::open(dir.path()).load().unwrap();
    let key = saved.submission_key.unwrap();
    assert_eq!(saved.current_step, WizardStep::Upload);

    // The retry reuses the key and the patient is not duplicated
    wizard.submit(&pipeline, today()).await.unwrap();
    let keys: Vec<_> = api
        .calls()
        .into_iter()
        .filter(|c| c.operation == "create_patient")
        .map(|c| c.args[1].clone())
        .collect();
    assert_eq!(keys, vec![key.to_string(), key.to_string()]);
    assert_eq!(api.patients().len(), 1);
}

#[tokio::test]
async fn test_submit_requires_file() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let mut wizard = walk_to_upload(&dir, &api).await;
    wizard
        .update(PatientDataPatch {
            test_date: Some("2024-01-01".to_string()),
            ..Default::default()
        })
        .unwrap();

    let err = wizard.submit(&pipeline(&api), today()).await.unwrap_err();
    assert!(matches!(err, WizardError::Invalid(_)));
    assert!(wizard.field_error("file").is_some());
    assert_eq!(api.call_count("create_patient"), 0);
}

#[tokio::test]
async fn test_existing_patient_flow() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let patient = Patient {
        id: "1".to_string(),
        fhir_id: "456".to_string(),
        first_name: "Old".to_string(),
        last_name: "Timer".to_string(),
        birth_date: "1970-05-05".to_string(),
        gender: "male".to_string(),
        lab_test_count: 1,
        interpreted_count: 1,
    };
    api.add_patient("old@b.com", "Abcd123!", patient.clone());

    // A half-finished onboarding on this machine must survive
    let draft = WizardStore::open(dir.path());
    draft
        .save(&WizardState {
            current_step: WizardStep::Name,
            patient_data: PatientData {
                email: "new@b.com".to_string(),
                ..Default::default()
            },
            submission_key: None,
        })
        .unwrap();

    let mut wizard = open(&dir, "/wizard/upload/456");
    assert_eq!(wizard.step(), WizardStep::Upload);
    wizard.prefill(&patient);
    wizard
        .update(PatientDataPatch {
            file: Some(Some(pdf(&dir, 1000).await)),
            test_date: Some("2024-03-03".to_string()),
            ..Default::default()
        })
        .unwrap();

    let (_, route) = wizard.submit(&pipeline(&api), today()).await.unwrap();
    assert_eq!(route, Route::patient("456"));
    assert_eq!(api.operations(), vec!["upload_lab_set", "interpret_lab_set"]);
    assert_eq!(draft.load().unwrap().patient_data.email, "new@b.com");
}

#[test]
fn test_back_from_bound_upload_leaves_wizard() {
    let dir = TempDir::new().unwrap();
    let mut wizard = open(&dir, "/wizard/upload/456");
    let transition = wizard.back().unwrap().unwrap();
    assert_eq!(transition, Transition::Exit(Route::patient("456")));
    assert_eq!(wizard.route(), &Route::patient("456"));
}

#[test]
fn test_clear_resets_everything() {
    let dir = TempDir::new().unwrap();
    let mut wizard = open(&dir, "/wizard");
    wizard.update(account_patch()).unwrap();
    wizard.set_privacy_accepted(true);

    wizard.clear().unwrap();
    assert_eq!(wizard.state(), &WizardState::default());
    assert!(!wizard.privacy_accepted());
    assert!(WizardStore::open(dir.path()).load().is_none());
}
