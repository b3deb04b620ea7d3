use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::LabApi;
use crate::config::Config;
use crate::dashboard::{format_date, request_reset, AdminDashboard, PasswordResetForm, PatientDashboard};
use crate::pipeline::{PipelineError, ProcessingState, SubmissionOutcome, SubmissionPipeline};
use crate::routes::Route;
use crate::session::{self, ExpiryWatcher, SessionManager};
use crate::ui::dashboard_view::{render_admin, render_patient};
use crate::ui::dialogs::render_session_expired;
use crate::ui::terminal_guard::{install_panic_hook, TerminalGuard};
use crate::ui::{
    ConfirmAction, ConfirmDialog, LoginView, ResetPasswordView, Selection, WizardView,
};
use crate::wizard::{
    LabFile, PatientDataPatch, Transition, Wizard, WizardError, WizardStep, WizardStore,
};

type SubmissionTask = JoinHandle<Result<SubmissionOutcome, PipelineError>>;

/// Shown when the submission task ends without a result
const SUBMISSION_ABORTED_MESSAGE: &str =
    "The submission stopped unexpectedly. Please try again.";

enum Screen {
    Wizard {
        wizard: Box<Wizard>,
        view: WizardView,
    },
    Patient {
        dashboard: PatientDashboard,
        selection: Selection,
        admin_view: bool,
    },
    Admin {
        dashboard: AdminDashboard,
        selection: Selection,
    },
    Login(LoginView),
    ResetPassword(ResetPasswordView),
}

pub struct App {
    config: Config,
    api: Arc<dyn LabApi>,
    session: Arc<SessionManager>,
    pipeline: Arc<SubmissionPipeline>,
    progress: watch::Receiver<ProcessingState>,
    /// Progress belongs to the wizard on screen, not to an earlier visit
    progress_visible: bool,
    submission: Option<SubmissionTask>,
    expiry: ExpiryWatcher,
    screen: Screen,
    confirm_dialog: ConfirmDialog,
    should_quit: bool,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl App {
    pub fn new(config: Config, api: Arc<dyn LabApi>, session: Arc<SessionManager>) -> Self {
        let pipeline = Arc::new(SubmissionPipeline::new(api.clone(), session.clone()));
        let progress = pipeline.subscribe();
        let expiry = session.expiry_watcher();
        Self {
            config,
            api,
            session,
            pipeline,
            progress,
            progress_visible: false,
            submission: None,
            expiry,
            screen: Screen::Login(LoginView::new()),
            confirm_dialog: ConfirmDialog::new(),
            should_quit: false,
        }
    }

    pub async fn run(&mut self, initial: Route) -> Result<()> {
        self.navigate(initial).await?;

        install_panic_hook();
        let mut guard = TerminalGuard::enter()?;
        let tick_rate = Duration::from_millis(self.config.ui.refresh_rate_ms);

        while !self.should_quit {
            guard.terminal().draw(|f| self.render(f))?;

            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key).await?;
                    }
                }
            }

            self.collect_submission().await?;

            if self.expiry.poll() {
                warn!("Session expired; waiting for the user to log in again");
            }
        }

        if let Some(task) = self.submission.take() {
            task.abort();
        }
        Ok(())
    }

    /// Show `requested`, or wherever the session gate sends the user instead
    pub async fn navigate(&mut self, requested: Route) -> Result<()> {
        let auth = self.session.state();
        let route = session::resolve(requested.clone(), &auth);
        if route != requested {
            debug!(from = %requested, to = %route, "Route redirected");
        }
        self.progress_visible = false;
        self.confirm_dialog.hide();

        self.screen = match route {
            Route::Wizard { .. } => {
                let store = WizardStore::open(&self.config.state_path());
                let mut wizard =
                    Wizard::open(store, &route, self.config.upload.max_file_bytes, today())?;
                if let Some(fhir_id) = wizard.fhir_id().map(String::from) {
                    match self.api.get_patient(&fhir_id).await {
                        Ok(patient) => wizard.prefill(&patient),
                        Err(e) => warn!(%fhir_id, error = %e, "Could not prefill wizard"),
                    }
                }
                let view = WizardView::new(&wizard);
                Screen::Wizard {
                    wizard: Box::new(wizard),
                    view,
                }
            }
            Route::Patient { fhir_id } => self.patient_screen(fhir_id, false).await,
            Route::AdminPatient { fhir_id } => self.patient_screen(fhir_id, true).await,
            Route::AdminPatients => {
                let mut dashboard =
                    AdminDashboard::new(self.api.clone(), self.config.ui.patients_page_size);
                if let Err(e) = dashboard.load().await {
                    warn!(error = %e, "Could not load patients");
                }
                Screen::Admin {
                    dashboard,
                    selection: Selection::default(),
                }
            }
            Route::Login => Screen::Login(LoginView::new()),
            Route::ResetPassword { token } => {
                Screen::ResetPassword(ResetPasswordView::new(PasswordResetForm::new(token)))
            }
        };
        Ok(())
    }

    async fn patient_screen(&self, fhir_id: String, admin_view: bool) -> Screen {
        let mut dashboard = PatientDashboard::new(
            self.api.clone(),
            fhir_id.clone(),
            self.config.ui.lab_sets_page_size,
        );
        if let Err(e) = dashboard.load().await {
            warn!(%fhir_id, error = %e, "Could not load patient dashboard");
        }
        Screen::Patient {
            dashboard,
            selection: Selection::default(),
            admin_view,
        }
    }

    fn render(&self, frame: &mut Frame) {
        match &self.screen {
            Screen::Wizard { wizard, view } => {
                let processing = if self.progress_visible {
                    self.progress.borrow().clone()
                } else {
                    ProcessingState::default()
                };
                view.render(
                    frame,
                    wizard,
                    &processing,
                    self.submission.is_some(),
                    self.config.ui.privacy_policy_url.as_deref(),
                );
            }
            Screen::Patient {
                dashboard,
                selection,
                admin_view,
            } => render_patient(frame, dashboard, *selection, *admin_view),
            Screen::Admin {
                dashboard,
                selection,
            } => render_admin(frame, dashboard, *selection),
            Screen::Login(view) => view.render(frame),
            Screen::ResetPassword(view) => view.render(frame),
        }

        self.confirm_dialog.render(frame);
        if self.expiry.is_showing() {
            render_session_expired(frame);
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return Ok(());
        }

        // The expiry overlay blocks everything else; its only action is to log in again
        if self.expiry.is_showing() {
            if key.code == KeyCode::Enter {
                self.expiry.acknowledge();
                if let Err(e) = self.session.logout() {
                    warn!(error = %e, "Could not remove stored session");
                }
                self.navigate(Route::Login).await?;
            }
            return Ok(());
        }

        if self.confirm_dialog.visible {
            if let Some(action) = self.confirm_dialog.handle_key(key.code) {
                self.perform(action).await?;
            }
            return Ok(());
        }

        let next = match self.screen {
            Screen::Wizard { .. } => self.handle_wizard_key(key).await?,
            Screen::Patient { .. } => self.handle_patient_key(key.code).await,
            Screen::Admin { .. } => self.handle_admin_key(key.code).await,
            Screen::Login(_) => self.handle_login_key(key).await,
            Screen::ResetPassword(_) => self.handle_reset_key(key.code).await,
        };
        if let Some(route) = next {
            self.navigate(route).await?;
        }
        Ok(())
    }

    async fn handle_wizard_key(&mut self, key: KeyEvent) -> Result<Option<Route>> {
        if self.submission.is_some() {
            return Ok(None);
        }
        let Screen::Wizard { wizard, view } = &mut self.screen else {
            return Ok(None);
        };

        match key.code {
            KeyCode::Char('l') if wizard.step() == WizardStep::Welcome => {
                return Ok(Some(Route::Login));
            }
            KeyCode::Tab => view.form.next_field(),
            KeyCode::BackTab => view.form.prev_field(),
            KeyCode::Esc => match wizard.back() {
                Ok(Some(Transition::Exit(route))) => return Ok(Some(route)),
                Ok(_) => {}
                Err(e) => wizard.set_error(e.to_string()),
            },
            KeyCode::Enter if wizard.step() == WizardStep::Upload => {
                if !attach_file(wizard, view).await {
                    return Ok(None);
                }
                if let Some(task) = spawn_submission(wizard, &self.pipeline) {
                    self.progress_visible = true;
                    self.submission = Some(task);
                }
            }
            KeyCode::Enter => match wizard.advance(self.api.as_ref(), today()).await {
                Ok(Transition::Exit(route)) => return Ok(Some(route)),
                Ok(Transition::Step(..)) => {}
                Err(
                    WizardError::Invalid(_)
                    | WizardError::EmailExists
                    | WizardError::EmailCheckFailed(_),
                ) => {}
                Err(e) => wizard.set_error(e.to_string()),
            },
            code => {
                if let Some(field) = view.form.handle_key(code) {
                    match field {
                        "privacy" => {
                            let accepted = view.form.get(field).is_some_and(|f| f.is_checked());
                            wizard.set_privacy_accepted(accepted);
                        }
                        // Resolved when the step is submitted
                        "file" => {}
                        _ => {
                            if let Err(e) = wizard.update(view.patch_for(field)) {
                                wizard.set_error(e.to_string());
                            }
                        }
                    }
                }
            }
        }

        if !view.is_current(wizard) {
            *view = WizardView::new(wizard);
        }
        Ok(None)
    }

    /// Pick up a finished submission and move on or show its error
    async fn collect_submission(&mut self) -> Result<()> {
        if !self.submission.as_ref().is_some_and(JoinHandle::is_finished) {
            return Ok(());
        }
        let Some(task) = self.submission.take() else {
            return Ok(());
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Submission task failed");
                self.progress_visible = false;
                if let Screen::Wizard { wizard, .. } = &mut self.screen {
                    wizard.set_error(SUBMISSION_ABORTED_MESSAGE);
                }
                return Ok(());
            }
        };

        let Screen::Wizard { wizard, .. } = &mut self.screen else {
            debug!("Submission finished after leaving the wizard");
            return Ok(());
        };
        match wizard.finish_submission(result) {
            Ok((outcome, route)) => {
                info!(lab_set_id = %outcome.lab_set_id, "Results interpreted");
                self.navigate(route).await?;
            }
            Err(e) => debug!(error = %e, "Submission failed"),
        }
        Ok(())
    }

    async fn handle_patient_key(&mut self, code: KeyCode) -> Option<Route> {
        let Screen::Patient {
            dashboard,
            selection,
            admin_view,
        } = &mut self.screen
        else {
            return None;
        };
        let selected = dashboard
            .lab_sets()
            .get(selection.index)
            .map(|s| (s.id.clone(), s.test_date.clone()));

        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => selection.prev(),
            KeyCode::Down | KeyCode::Char('j') => selection.next(dashboard.lab_sets().len()),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some((id, _)) = selected {
                    dashboard.toggle(&id).await;
                }
            }
            KeyCode::Char('i') => {
                if let Some((id, _)) = selected {
                    let _ = dashboard.interpret(&id).await;
                }
            }
            KeyCode::Char('d') => {
                if let Some((id, test_date)) = selected {
                    self.confirm_dialog.show(ConfirmAction::DeleteLabSet {
                        id,
                        test_date: format_date(&test_date),
                    });
                }
            }
            KeyCode::Char('n') => {
                if dashboard.next_page().await.is_ok() {
                    *selection = Selection::default();
                }
            }
            KeyCode::Char('p') => {
                if dashboard.prev_page().await.is_ok() {
                    *selection = Selection::default();
                }
            }
            KeyCode::Char('r') => {
                let _ = dashboard.load().await;
                selection.clamp(dashboard.lab_sets().len());
            }
            KeyCode::Char('u') if !*admin_view => {
                return Some(Route::wizard(
                    WizardStep::Upload,
                    Some(dashboard.fhir_id().to_string()),
                ));
            }
            KeyCode::Esc if *admin_view => return Some(Route::AdminPatients),
            KeyCode::Char('L') => self.confirm_dialog.show(ConfirmAction::Logout),
            _ => {}
        }
        None
    }

    async fn handle_admin_key(&mut self, code: KeyCode) -> Option<Route> {
        let Screen::Admin {
            dashboard,
            selection,
        } = &mut self.screen
        else {
            return None;
        };
        let selected = dashboard.patients().get(selection.index).cloned();

        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => selection.prev(),
            KeyCode::Down | KeyCode::Char('j') => selection.next(dashboard.patients().len()),
            KeyCode::Enter => {
                if let Some(patient) = selected {
                    return Some(Route::AdminPatient {
                        fhir_id: patient.fhir_id,
                    });
                }
            }
            KeyCode::Char('d') => {
                if let Some(patient) = selected {
                    self.confirm_dialog.show(ConfirmAction::DeletePatient {
                        name: patient.full_name(),
                        fhir_id: patient.fhir_id,
                    });
                }
            }
            KeyCode::Char('n') => {
                if dashboard.next_page().await.is_ok() {
                    *selection = Selection::default();
                }
            }
            KeyCode::Char('p') => {
                if dashboard.prev_page().await.is_ok() {
                    *selection = Selection::default();
                }
            }
            KeyCode::Char('r') => {
                let _ = dashboard.load().await;
                selection.clamp(dashboard.patients().len());
            }
            KeyCode::Char('L') => self.confirm_dialog.show(ConfirmAction::Logout),
            _ => {}
        }
        None
    }

    async fn handle_login_key(&mut self, key: KeyEvent) -> Option<Route> {
        let Screen::Login(view) = &mut self.screen else {
            return None;
        };

        match key.code {
            KeyCode::Char('f') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                view.error = None;
                view.notice = None;
                match request_reset(self.api.as_ref(), &view.email()).await {
                    Ok(message) => view.notice = Some(message),
                    Err(message) => view.error = Some(message),
                }
            }
            KeyCode::Esc => return Some(Route::wizard_start()),
            KeyCode::Tab | KeyCode::Down => view.form.next_field(),
            KeyCode::BackTab | KeyCode::Up => view.form.prev_field(),
            KeyCode::Enter => {
                view.error = None;
                view.notice = None;
                match self
                    .session
                    .login(self.api.as_ref(), &view.email(), &view.password())
                    .await
                {
                    Ok(auth) => return Some(session::home_route(&auth)),
                    Err(e) => view.error = Some(e.message().to_string()),
                }
            }
            code => {
                view.form.handle_key(code);
            }
        }
        None
    }

    async fn handle_reset_key(&mut self, code: KeyCode) -> Option<Route> {
        let Screen::ResetPassword(view) = &mut self.screen else {
            return None;
        };
        if view.reset.succeeded() {
            return matches!(code, KeyCode::Enter | KeyCode::Esc).then_some(Route::Login);
        }

        match code {
            KeyCode::Esc => return Some(Route::Login),
            KeyCode::Tab | KeyCode::Down => view.form.next_field(),
            KeyCode::BackTab | KeyCode::Up => view.form.prev_field(),
            KeyCode::Enter => {
                view.sync();
                // Success is shown in place until the user moves on
                let _ = view.reset.submit(self.api.as_ref()).await;
            }
            code => {
                view.form.handle_key(code);
            }
        }
        None
    }

    async fn perform(&mut self, action: ConfirmAction) -> Result<()> {
        if action == ConfirmAction::Logout {
            if let Err(e) = self.session.logout() {
                warn!(error = %e, "Could not remove stored session");
            }
            return self.navigate(Route::Login).await;
        }

        match (action, &mut self.screen) {
            (
                ConfirmAction::DeleteLabSet { id, .. },
                Screen::Patient {
                    dashboard,
                    selection,
                    ..
                },
            ) => {
                if dashboard.delete_lab_set(&id).await.is_ok() {
                    selection.clamp(dashboard.lab_sets().len());
                }
            }
            (
                ConfirmAction::DeletePatient { fhir_id, .. },
                Screen::Admin {
                    dashboard,
                    selection,
                },
            ) => {
                if dashboard.delete_patient(&fhir_id).await.is_ok() {
                    selection.clamp(dashboard.patients().len());
                }
            }
            (action, _) => debug!(?action, "Confirmed action no longer applies"),
        }
        Ok(())
    }
}

/// Stat the path typed on the upload step and attach it to the wizard.
/// Returns false (with a banner) when the file cannot be opened.
/// Build the pipeline input and start the run in the background. Field
/// errors are already on the form; anything else goes to the banner.
fn spawn_submission(
    wizard: &mut Wizard,
    pipeline: &Arc<SubmissionPipeline>,
) -> Option<SubmissionTask> {
    match wizard.submission_input(today()) {
        Ok(input) => {
            let pipeline = Arc::clone(pipeline);
            Some(tokio::spawn(async move { pipeline.run(input).await }))
        }
        Err(WizardError::Invalid(_)) => None,
        Err(e) => {
            warn!(error = %e, "Could not start submission");
            wizard.set_error(e.to_string());
            None
        }
    }
}

async fn attach_file(wizard: &mut Wizard, view: &WizardView) -> bool {
    let path = view.form.value("file").trim().to_string();
    let file = if path.is_empty() {
        None
    } else {
        match LabFile::from_path(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                wizard.set_error(format!("Could not open {path}: {e}"));
                return false;
            }
        }
    };
    let patch = PatientDataPatch {
        file: Some(file),
        ..Default::default()
    };
    if let Err(e) = wizard.update(patch) {
        wizard.set_error(e.to_string());
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Patient;
    use crate::api::MockLabApi;
    use crate::session::{SessionNotifier, TokenStore};
    use tempfile::TempDir;

    fn app(dir: &TempDir, api: MockLabApi) -> App {
        let mut config = Config::default();
        config.paths.state = dir.path().to_string_lossy().to_string();
        let session = Arc::new(SessionManager::new(
            Arc::new(TokenStore::in_memory()),
            SessionNotifier::new(),
            chrono::Duration::hours(1),
        ));
        App::new(config, Arc::new(api), session)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn seeded() -> MockLabApi {
        let api = MockLabApi::new();
        api.add_patient(
            "a@b.com",
            "Abcd123!",
            Patient {
                id: "1".to_string(),
                fhir_id: "123".to_string(),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                birth_date: "1990-01-01".to_string(),
                gender: "female".to_string(),
                lab_test_count: 0,
                interpreted_count: 0,
            },
        );
        api
    }

    #[tokio::test]
    async fn test_private_route_redirects_to_login() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, seeded());
        app.navigate(Route::patient("123")).await.unwrap();
        assert!(matches!(app.screen, Screen::Login(_)));
    }

    #[tokio::test]
    async fn test_login_lands_on_patient_dashboard() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, seeded());
        app.navigate(Route::Login).await.unwrap();
        if let Screen::Login(view) = &mut app.screen {
            view.form.set("email", "a@b.com");
            view.form.set("password", "Abcd123!");
        }
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        match &app.screen {
            Screen::Patient { dashboard, .. } => assert_eq!(dashboard.fhir_id(), "123"),
            _ => panic!("expected the patient dashboard"),
        }
    }

    #[tokio::test]
    async fn test_bad_login_shows_error() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, seeded());
        app.navigate(Route::Login).await.unwrap();
        if let Screen::Login(view) = &mut app.screen {
            view.form.set("email", "a@b.com");
            view.form.set("password", "wrong");
        }
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        match &app.screen {
            Screen::Login(view) => assert_eq!(view.error.as_deref(), Some("Invalid credentials")),
            _ => panic!("expected to stay on login"),
        }
    }

    #[tokio::test]
    async fn test_logout_needs_confirmation() {
        let dir = TempDir::new().unwrap();
        let api = seeded();
        let mut app = app(&dir, api.clone());
        app.session.login(&api, "a@b.com", "Abcd123!").await.unwrap();
        app.navigate(Route::patient("123")).await.unwrap();

        app.handle_key(key(KeyCode::Char('L'))).await.unwrap();
        assert!(app.confirm_dialog.visible);
        app.handle_key(key(KeyCode::Char('n'))).await.unwrap();
        assert!(matches!(app.screen, Screen::Patient { .. }));

        app.handle_key(key(KeyCode::Char('L'))).await.unwrap();
        app.handle_key(key(KeyCode::Char('y'))).await.unwrap();
        assert!(matches!(app.screen, Screen::Login(_)));
        assert!(!app.session.state().is_authenticated);
    }

    #[tokio::test]
    async fn test_expiry_overlay_routes_to_login() {
        let dir = TempDir::new().unwrap();
        let api = seeded();
        let mut app = app(&dir, api.clone());
        app.session.login(&api, "a@b.com", "Abcd123!").await.unwrap();
        app.navigate(Route::patient("123")).await.unwrap();

        app.session.notifier().notify_expired("/api/patients/123");
        assert!(app.expiry.poll());
        // Other keys are swallowed while the overlay is up
        app.handle_key(key(KeyCode::Char('L'))).await.unwrap();
        assert!(!app.confirm_dialog.visible);

        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        assert!(matches!(app.screen, Screen::Login(_)));
        assert!(!app.expiry.is_showing());
        assert!(!app.session.state().is_authenticated);
    }

    #[tokio::test]
    async fn test_welcome_enter_moves_to_account() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, MockLabApi::new());
        app.navigate(Route::wizard_start()).await.unwrap();
        app.handle_key(key(KeyCode::Enter)).await.unwrap();
        match &app.screen {
            Screen::Wizard { wizard, view } => {
                assert_eq!(wizard.step(), WizardStep::Account);
                assert_eq!(view.step, WizardStep::Account);
            }
            _ => panic!("expected the wizard"),
        }
    }

    async fn complete_wizard(dir: &TempDir) -> Wizard {
        let path = dir.path().join("results.pdf");
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();
        let file = LabFile::from_path(&path).await.unwrap();

        let mut wizard = Wizard::open(
            WizardStore::open(dir.path()),
            &Route::wizard_start(),
            1024 * 1024,
            today(),
        )
        .unwrap();
        wizard
            .update(PatientDataPatch {
                email: Some("new@b.com".to_string()),
                password: Some("Abcd123!".to_string()),
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                date_of_birth: Some("1990-01-01".to_string()),
                gender: Some("female".to_string()),
                file: Some(Some(file)),
                test_date: Some("2024-03-01".to_string()),
            })
            .unwrap();
        wizard
    }

    #[tokio::test]
    async fn test_unsaved_submission_key_shows_banner() {
        let dir = TempDir::new().unwrap();
        let mut wizard = complete_wizard(&dir).await;
        // A directory in place of the progress file makes the next save fail
        let store_path = WizardStore::open(dir.path()).path().to_path_buf();
        std::fs::remove_file(&store_path).unwrap();
        std::fs::create_dir(&store_path).unwrap();

        let api = MockLabApi::new();
        let session = Arc::new(SessionManager::new(
            Arc::new(TokenStore::in_memory()),
            SessionNotifier::new(),
            chrono::Duration::hours(1),
        ));
        let pipeline = Arc::new(SubmissionPipeline::new(Arc::new(api.clone()), session));

        assert!(spawn_submission(&mut wizard, &pipeline).is_none());
        assert!(wizard.error().is_some());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_fields_do_not_start_submission() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, MockLabApi::new());
        let mut wizard = Wizard::open(
            WizardStore::open(dir.path()),
            &Route::wizard_start(),
            1024 * 1024,
            today(),
        )
        .unwrap();

        assert!(spawn_submission(&mut wizard, &app.pipeline).is_none());
        assert!(wizard.error().is_none());
        assert!(!wizard.field_errors().is_empty());
    }

    async fn crashed_submission() -> Result<SubmissionOutcome, PipelineError> {
        panic!("submission task crashed")
    }

    #[tokio::test]
    async fn test_crashed_submission_shows_banner() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, MockLabApi::new());
        app.navigate(Route::wizard_start()).await.unwrap();

        let task = tokio::spawn(crashed_submission());
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        app.progress_visible = true;
        app.submission = Some(task);
        app.collect_submission().await.unwrap();

        assert!(app.submission.is_none());
        assert!(!app.progress_visible);
        match &app.screen {
            Screen::Wizard { wizard, .. } => {
                assert_eq!(wizard.error(), Some(SUBMISSION_ABORTED_MESSAGE));
            }
            _ => panic!("expected to stay in the wizard"),
        }
    }
}
