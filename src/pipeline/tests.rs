use super::*;
use crate::api::types::Patient;
use crate::api::{MockCall, MockLabApi};
use crate::session::{SessionNotifier, TokenStore};
use std::sync::Mutex;
use tempfile::TempDir;

fn session() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Arc::new(TokenStore::in_memory()),
        SessionNotifier::new(),
        chrono::Duration::hours(1),
    ))
}

async fn pdf(dir: &TempDir, size: usize) -> LabFile {
    let path = dir.path().join("results.pdf");
    tokio::fs::write(&path, vec![b'%'; size]).await.unwrap();
    LabFile::from_path(&path).await.unwrap()
}

fn new_patient() -> CreatePatientRequest {
    CreatePatientRequest {
        email: "a@b.com".to_string(),
        password: "Abcd123!".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        gender: "female".to_string(),
    }
}

async fn new_patient_input(dir: &TempDir) -> SubmissionInput {
    SubmissionInput {
        existing_fhir_id: None,
        new_patient: Some(new_patient()),
        idempotency_key: Some(Uuid::new_v4()),
        test_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        file: pdf(dir, 200 * 1024).await,
    }
}

fn existing_patient(api: &MockLabApi) {
    api.add_patient(
        "old@b.com",
        "Abcd123!",
        Patient {
            id: "1".to_string(),
            fhir_id: "456".to_string(),
            first_name: "Old".to_string(),
            last_name: "Timer".to_string(),
            birth_date: "1970-05-05".to_string(),
            gender: "male".to_string(),
            lab_test_count: 1,
            interpreted_count: 1,
        },
    );
}

#[test]
fn test_fresh_state() {
    let state = ProcessingState::fresh(false);
    assert_eq!(state.create_patient, StageStatus::Pending);
    assert!(!state.is_busy());

    let state = ProcessingState::fresh(true);
    assert_eq!(state.create_patient, StageStatus::Completed);
    assert_eq!(state.upload_lab_test, StageStatus::Pending);
}

#[test]
fn test_begin_refuses_out_of_order() {
    let mut state = ProcessingState::fresh(false);
    assert!(matches!(
        state.begin(Stage::UploadLabTest),
        Err(PipelineError::OutOfOrder {
            stage: Stage::UploadLabTest,
            blocked_by: Stage::CreatePatient
        })
    ));
    assert!(state.begin(Stage::InterpretResults).is_err());

    state.begin(Stage::CreatePatient).unwrap();
    assert!(state.is_busy());
    assert!(state.begin(Stage::UploadLabTest).is_err());
    state.complete(Stage::CreatePatient);
    state.begin(Stage::UploadLabTest).unwrap();
}

#[tokio::test]
async fn test_new_patient_end_to_end() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.set_next_fhir_id("123");
    api.set_next_lab_set_id("ls1");
    api.set_interpretation("Your hemoglobin is slightly low.");
    let session = session();
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), Arc::clone(&session));

    let outcome = pipeline.run(new_patient_input(&dir).await).await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome {
            fhir_id: "123".to_string(),
            lab_set_id: "ls1".to_string(),
            interpretation: "Your hemoglobin is slightly low.".to_string(),
        }
    );
    assert_eq!(
        api.operations(),
        vec!["create_patient", "login", "upload_lab_set", "interpret_lab_set"]
    );
    assert!(pipeline.snapshot().is_complete());
    assert!(!pipeline.is_running());

    let auth = session.state();
    assert!(auth.is_authenticated);
    assert_eq!(auth.fhir_id.as_deref(), Some("123"));

    let uploads = api.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "123");
    assert_eq!(uploads[0].2.bytes.len(), 200 * 1024);
    assert_eq!(uploads[0].2.content_type, "application/pdf");
}

#[tokio::test]
async fn test_existing_patient_skips_creation() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    existing_patient(&api);
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());

    let input = SubmissionInput {
        existing_fhir_id: Some("456".to_string()),
        new_patient: None,
        idempotency_key: None,
        test_date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
        file: pdf(&dir, 1000).await,
    };
    let outcome = pipeline.run(input).await.unwrap();

    assert_eq!(outcome.fhir_id, "456");
    assert_eq!(api.operations(), vec!["upload_lab_set", "interpret_lab_set"]);
}

#[tokio::test]
async fn test_upload_failure_leaves_partial_state() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.fail_next(
        "upload_lab_set",
        ApiError::from_status(500, Some("FHIR server unavailable".to_string()), false),
    );
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());

    let err = pipeline
        .run(new_patient_input(&dir).await)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "FHIR server unavailable");
    let state = pipeline.snapshot();
    assert_eq!(state.create_patient, StageStatus::Completed);
    assert_eq!(state.upload_lab_test, StageStatus::Error);
    assert_eq!(state.interpret_results, StageStatus::Pending);
    assert_eq!(state.error.as_deref(), Some("FHIR server unavailable"));
    assert_eq!(state.failed_stage(), Some(Stage::UploadLabTest));
    assert_eq!(api.call_count("interpret_lab_set"), 0);
}

#[tokio::test]
async fn test_failure_without_detail_uses_generic_message() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.fail_next("interpret_lab_set", ApiError::from_status(502, None, false));
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());

    let err = pipeline
        .run(new_patient_input(&dir).await)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), crate::api::error::GENERIC_ERROR_MESSAGE);
    assert_eq!(pipeline.snapshot().interpret_results, StageStatus::Error);
    assert_eq!(pipeline.snapshot().upload_lab_test, StageStatus::Completed);
}

#[tokio::test]
async fn test_missing_identifiers_fail_their_stage() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.omit_identifiers();
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());

    let err = pipeline
        .run(new_patient_input(&dir).await)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), MISSING_FHIR_ID);
    assert_eq!(pipeline.snapshot().create_patient, StageStatus::Error);
    assert_eq!(api.call_count("login"), 0);

    let api = MockLabApi::new();
    existing_patient(&api);
    api.omit_identifiers();
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());
    let input = SubmissionInput {
        existing_fhir_id: Some("456".to_string()),
        new_patient: None,
        idempotency_key: None,
        test_date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
        file: pdf(&dir, 10).await,
    };
    let err = pipeline.run(input).await.unwrap_err();
    assert_eq!(err.to_string(), MISSING_LAB_SET_ID);
    assert_eq!(pipeline.snapshot().upload_lab_test, StageStatus::Error);
}

#[tokio::test]
async fn test_retry_with_same_key_does_not_duplicate_patient() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    api.fail_next("upload_lab_set", ApiError::network("connection reset"));
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());
    let input = new_patient_input(&dir).await;

    assert!(pipeline.run(input.clone()).await.is_err());
    pipeline.run(input).await.unwrap();

    assert_eq!(api.patients().len(), 1);
    assert_eq!(api.call_count("create_patient"), 2);
}

#[tokio::test]
async fn test_unreadable_file_fails_upload_stage() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    existing_patient(&api);
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());
    let mut file = pdf(&dir, 10).await;
    file.path = dir.path().join("deleted.pdf");

    let err = pipeline
        .run(SubmissionInput {
            existing_fhir_id: Some("456".to_string()),
            new_patient: None,
            idempotency_key: None,
            test_date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            file,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::File { .. }));
    assert_eq!(pipeline.snapshot().upload_lab_test, StageStatus::Error);
    assert_eq!(api.call_count("upload_lab_set"), 0);
}

#[tokio::test]
async fn test_each_stage_loads_only_after_predecessor_completes() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    let pipeline = SubmissionPipeline::new(Arc::new(api.clone()), session());
    let progress = pipeline.subscribe();
    // The pipeline's published state at the moment of every remote call
    let seen = Arc::new(Mutex::new(Vec::new()));
    api.on_call({
        let seen = Arc::clone(&seen);
        move |call: &MockCall| {
            let state = progress.borrow().clone();
            seen.lock().unwrap().push((call.operation.clone(), state));
        }
    });

    pipeline.run(new_patient_input(&dir).await).await.unwrap();

    let seen: Vec<(String, ProcessingState)> = seen.lock().unwrap().clone();
    let ops: Vec<_> = seen.iter().map(|(op, _)| op.as_str()).collect();
    assert_eq!(
        ops,
        vec!["create_patient", "login", "upload_lab_set", "interpret_lab_set"]
    );
    for (op, state) in &seen {
        match op.as_str() {
            "create_patient" | "login" => {
                assert_eq!(state.create_patient, StageStatus::Loading);
                assert_eq!(state.upload_lab_test, StageStatus::Pending);
            }
            "upload_lab_set" => {
                assert_eq!(state.create_patient, StageStatus::Completed);
                assert_eq!(state.upload_lab_test, StageStatus::Loading);
                assert_eq!(state.interpret_results, StageStatus::Pending);
            }
            "interpret_lab_set" => {
                assert_eq!(state.upload_lab_test, StageStatus::Completed);
                assert_eq!(state.interpret_results, StageStatus::Loading);
            }
            other => panic!("unexpected call {other}"),
        }
    }
}

#[tokio::test]
async fn test_second_run_while_in_flight_is_refused() {
    let dir = TempDir::new().unwrap();
    let api = MockLabApi::new();
    existing_patient(&api);
    let upload = api.hold("upload_lab_set");
    let pipeline = Arc::new(SubmissionPipeline::new(Arc::new(api.clone()), session()));
    let input = SubmissionInput {
        existing_fhir_id: Some("456".to_string()),
        new_patient: None,
        idempotency_key: None,
        test_date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
        file: pdf(&dir, 10).await,
    };

    let first = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let input = input.clone();
        async move { pipeline.run(input).await }
    });
    upload.entered().await;

    assert!(pipeline.is_running());
    assert!(pipeline.snapshot().is_busy());
    assert!(matches!(
        pipeline.run(input).await,
        Err(PipelineError::AlreadyRunning)
    ));

    upload.release();
    first.await.unwrap().unwrap();
    assert!(!pipeline.is_running());
    assert_eq!(api.call_count("upload_lab_set"), 1);
}
