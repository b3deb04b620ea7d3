use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use labsexplained::api::types::{LabTestSet, PageRequest};
use labsexplained::api::{ApiClient, LabApi};
use labsexplained::app::App;
use labsexplained::config::Config;
use labsexplained::dashboard::{
    format_date, format_reference_range, format_value, request_reset, PasswordResetForm,
};
use labsexplained::logging;
use labsexplained::pipeline::{Stage, StageStatus, SubmissionInput, SubmissionPipeline};
use labsexplained::routes::Route;
use labsexplained::session::{self, Role, SessionManager, SessionNotifier, TokenStore};
use labsexplained::wizard::{LabFile, WizardStore};

#[derive(Parser)]
#[command(name = "labsexplained")]
#[command(about = "Upload lab results and read what they mean")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a workspace config file (.labsexplained/config.toml)
    Init {
        /// Base URL of the lab API
        #[arg(long)]
        api_url: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Open the terminal UI at a route (e.g. /wizard, /patient/123)
    Open { route: String },

    /// Log in and store the session token
    Login {
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Whoami,

    /// Check whether an email is already registered
    CheckEmail { email: String },

    /// Request a password reset link
    ForgotPassword { email: String },

    /// Set a new password with a reset token
    ResetPassword {
        #[arg(long)]
        token: String,
    },

    /// List patients (admin)
    Patients {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// Show a patient (defaults to the logged-in patient)
    Patient { fhir_id: Option<String> },

    /// List a patient's lab test sets
    LabSets {
        fhir_id: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// Show the observations of a lab test set
    Observations {
        lab_set_id: String,
        /// Owner of the lab set (defaults to the logged-in patient)
        #[arg(long)]
        patient: Option<String>,
    },

    /// Generate the interpretation of a lab test set
    Interpret { lab_set_id: String },

    /// Upload a lab results file for an existing patient and interpret it
    Upload {
        file: PathBuf,
        /// Date the test was taken (YYYY-MM-DD)
        #[arg(long)]
        test_date: NaiveDate,
        /// Defaults to the logged-in patient
        #[arg(long)]
        patient: Option<String>,
    },

    /// Delete a patient and all of their results (admin)
    DeletePatient {
        fhir_id: String,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Delete a lab test set
    DeleteLabSet {
        lab_set_id: String,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show saved wizard progress
    WizardStatus,

    /// Discard saved wizard progress
    WizardReset {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Shared handles for one process
struct Services {
    config: Config,
    session: Arc<SessionManager>,
    api: Arc<ApiClient>,
}

impl Services {
    fn connect(config: Config) -> Result<Self> {
        let tokens = Arc::new(
            TokenStore::open(&config.state_path()).context("Failed to open session store")?,
        );
        let notifier = SessionNotifier::new();
        let api = Arc::new(
            ApiClient::from_config(&config, tokens.clone(), notifier.clone())
                .context("Failed to create API client")?,
        );
        let session = Arc::new(SessionManager::new(tokens, notifier, config.token_ttl()));
        Ok(Self {
            config,
            session,
            api,
        })
    }

    /// `explicit`, else the logged-in patient's own id
    fn patient_id(&self, explicit: Option<String>) -> Result<String> {
        if let Some(id) = explicit {
            return Ok(id);
        }
        let auth = self.session.state();
        if !auth.is_authenticated {
            bail!("Not logged in. Run 'labsexplained login <email>' first.");
        }
        auth.fhir_id
            .context("No patient is linked to this login; pass a patient id")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let is_tui_mode = matches!(cli.command, None | Some(Commands::Open { .. }));
    let logging_handle = logging::init_logging(&config, is_tui_mode, cli.debug)?;

    let services = Services::connect(config)?;

    match cli.command {
        None => run_tui(services, None, logging_handle.log_file_path).await?,
        Some(Commands::Init { api_url, force }) => cmd_init(services.config, api_url, force)?,
        Some(Commands::Open { route }) => {
            let route: Route = route.parse()?;
            run_tui(services, Some(route), logging_handle.log_file_path).await?;
        }
        Some(Commands::Login { email, password }) => cmd_login(&services, email, password).await?,
        Some(Commands::Logout) => cmd_logout(&services)?,
        Some(Commands::Whoami) => cmd_whoami(&services),
        Some(Commands::CheckEmail { email }) => cmd_check_email(&services, email).await?,
        Some(Commands::ForgotPassword { email }) => {
            let message = request_reset(services.api.as_ref(), &email)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{message}");
        }
        Some(Commands::ResetPassword { token }) => cmd_reset_password(&services, token).await?,
        Some(Commands::Patients { page }) => cmd_patients(&services, page).await?,
        Some(Commands::Patient { fhir_id }) => cmd_patient(&services, fhir_id).await?,
        Some(Commands::LabSets { fhir_id, page }) => cmd_lab_sets(&services, fhir_id, page).await?,
        Some(Commands::Observations {
            lab_set_id,
            patient,
        }) => cmd_observations(&services, lab_set_id, patient).await?,
        Some(Commands::Interpret { lab_set_id }) => {
            let response = services.api.interpret_lab_set(&lab_set_id).await?;
            println!("{}", response.interpretation);
        }
        Some(Commands::Upload {
            file,
            test_date,
            patient,
        }) => cmd_upload(&services, file, test_date, patient).await?,
        Some(Commands::DeletePatient { fhir_id, yes }) => {
            if yes || confirm(&format!("Delete patient {fhir_id} and all of their results?"))? {
                services.api.delete_patient(&fhir_id).await?;
                println!("Deleted patient {fhir_id}");
            } else {
                println!("Cancelled");
            }
        }
        Some(Commands::DeleteLabSet { lab_set_id, yes }) => {
            if yes || confirm(&format!("Delete lab test set {lab_set_id}?"))? {
                services.api.delete_lab_set(&lab_set_id).await?;
                println!("Deleted lab test set {lab_set_id}");
            } else {
                println!("Cancelled");
            }
        }
        Some(Commands::WizardStatus) => cmd_wizard_status(&services.config),
        Some(Commands::WizardReset { yes }) => {
            if yes || confirm("Discard saved wizard progress?")? {
                WizardStore::open(&services.config.state_path()).clear()?;
                println!("Wizard progress cleared");
            } else {
                println!("Cancelled");
            }
        }
    }

    Ok(())
}

async fn run_tui(
    services: Services,
    route: Option<Route>,
    log_file_path: Option<PathBuf>,
) -> Result<()> {
    let initial = route.unwrap_or_else(|| session::home_route(&services.session.state()));
    let api: Arc<dyn LabApi> = services.api.clone();
    let mut app = App::new(services.config, api, services.session);
    let result = app.run(initial).await;

    // Print log file path on exit if logs were written
    if let Some(log_path) = log_file_path {
        if log_path.metadata().is_ok_and(|m| m.len() > 0) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

fn cmd_init(mut config: Config, api_url: Option<String>, force: bool) -> Result<()> {
    let path = Config::local_config_path();
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    if let Some(url) = api_url {
        config.api.base_url = url;
    }
    config.save()?;
    println!("Wrote {}", path.display());
    println!("API: {}", config.api.base_url);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N] "))?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

async fn cmd_login(services: &Services, email: String, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };
    let auth = services
        .session
        .login(services.api.as_ref(), email.trim(), &password)
        .await?;
    let role = auth.role.map_or("unknown".to_string(), |r| r.to_string());
    println!("Logged in as {} ({role})", email.trim());
    println!("Home: {}", session::home_route(&auth));
    Ok(())
}

fn cmd_logout(services: &Services) -> Result<()> {
    services.session.logout()?;
    println!("Logged out");
    Ok(())
}

fn cmd_whoami(services: &Services) {
    let auth = services.session.state();
    if !auth.is_authenticated {
        println!("Not logged in");
        return;
    }
    match (auth.role, auth.fhir_id.as_deref()) {
        (Some(Role::Admin), _) => println!("Admin"),
        (_, Some(id)) => println!("Patient {id}"),
        (_, None) => println!("Logged in (no patient linked)"),
    }
}

async fn cmd_check_email(services: &Services, email: String) -> Result<()> {
    if services.api.check_email(email.trim()).await? {
        println!("{} is registered", email.trim());
    } else {
        println!("{} is available", email.trim());
    }
    Ok(())
}

async fn cmd_reset_password(services: &Services, token: String) -> Result<()> {
    let mut form = PasswordResetForm::new(Some(token));
    form.new_password = prompt("New password: ")?;
    form.confirm_password = prompt("Confirm password: ")?;
    form.submit(services.api.as_ref())
        .await
        .map_err(anyhow::Error::msg)?;
    println!("Password reset. Log in with 'labsexplained login <email>'.");
    Ok(())
}

async fn cmd_patients(services: &Services, page: u32) -> Result<()> {
    let request = PageRequest::new(page, services.config.ui.patients_page_size);
    let result = services.api.list_patients(request).await?;

    if result.patients.is_empty() {
        println!("No patients");
        return Ok(());
    }

    println!(
        "Patients (page {} of {}, {} total)",
        result.pagination.page,
        result.pagination.total_pages.max(1),
        result.pagination.total
    );
    println!("{}", "─".repeat(60));
    for p in &result.patients {
        println!(
            "{:<24} {:<12} {:<8} {:>3} tests {:>3} interpreted  [{}]",
            p.full_name(),
            format_date(&p.birth_date),
            p.gender,
            p.lab_test_count,
            p.interpreted_count,
            p.fhir_id
        );
    }
    if result.pagination.has_next() {
        println!("... more on page {}", result.pagination.page + 1);
    }
    Ok(())
}

async fn cmd_patient(services: &Services, fhir_id: Option<String>) -> Result<()> {
    let fhir_id = services.patient_id(fhir_id)?;
    let p = services.api.get_patient(&fhir_id).await?;
    println!("{}", p.full_name());
    println!("  Born:        {}", format_date(&p.birth_date));
    println!("  Gender:      {}", p.gender);
    println!("  Lab tests:   {}", p.lab_test_count);
    println!("  Interpreted: {}", p.interpreted_count);
    println!("  FHIR ID:     {}", p.fhir_id);
    Ok(())
}

async fn cmd_lab_sets(services: &Services, fhir_id: Option<String>, page: u32) -> Result<()> {
    let fhir_id = services.patient_id(fhir_id)?;
    let request = PageRequest::new(page, services.config.ui.lab_sets_page_size);
    let result = services.api.list_lab_sets(&fhir_id, request).await?;

    if result.lab_test_sets.is_empty() {
        println!("No lab tests");
        return Ok(());
    }
    println!(
        "Lab tests (page {} of {})",
        result.pagination.page,
        result.pagination.total_pages.max(1)
    );
    println!("{}", "─".repeat(60));
    for set in &result.lab_test_sets {
        let mark = if set.interpretation.is_some() { "✓" } else { " " };
        println!(
            "{mark} {}  {:>3} values  [{}]",
            format_date(&set.test_date),
            set.observations.len(),
            set.id
        );
    }
    Ok(())
}

/// Walk the patient's pages until the lab set turns up
async fn find_lab_set(api: &dyn LabApi, fhir_id: &str, lab_set_id: &str) -> Result<LabTestSet> {
    let mut request = PageRequest::first(20);
    loop {
        let page = api.list_lab_sets(fhir_id, request).await?;
        if let Some(set) = page.lab_test_sets.into_iter().find(|s| s.id == lab_set_id) {
            return Ok(set);
        }
        if !page.pagination.has_next() {
            bail!("Lab test set {lab_set_id} not found for patient {fhir_id}");
        }
        request = request.with_page(request.page + 1);
    }
}

async fn cmd_observations(
    services: &Services,
    lab_set_id: String,
    patient: Option<String>,
) -> Result<()> {
    let fhir_id = services.patient_id(patient)?;
    let set = find_lab_set(services.api.as_ref(), &fhir_id, &lab_set_id).await?;

    println!("Lab test {}", format_date(&set.test_date));
    println!("{}", "─".repeat(60));
    for reference in &set.observations {
        for obs in services.api.observations(&reference.id).await? {
            let flag = match obs.is_out_of_range() {
                Some(true) => "!",
                _ => " ",
            };
            println!(
                "{flag} {:<28} {:<16} {}",
                obs.name(),
                format_value(&obs),
                format_reference_range(&obs).unwrap_or_default()
            );
        }
    }
    if let Some(text) = &set.interpretation {
        println!();
        println!("{text}");
    }
    Ok(())
}

async fn cmd_upload(
    services: &Services,
    file: PathBuf,
    test_date: NaiveDate,
    patient: Option<String>,
) -> Result<()> {
    let fhir_id = services.patient_id(patient)?;
    let file = LabFile::from_path(&file)
        .await
        .with_context(|| format!("Could not open {}", file.display()))?;
    labsexplained::wizard::validation::validate_lab_file(
        Some(&file),
        services.config.upload.max_file_bytes,
    )
    .map_err(anyhow::Error::msg)?;

    let api: Arc<dyn LabApi> = services.api.clone();
    let pipeline = SubmissionPipeline::new(api, services.session.clone());
    let mut progress = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = Vec::new();
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            for stage in Stage::ALL {
                let status = state.status(stage);
                if matches!(status, StageStatus::Loading | StageStatus::Completed)
                    && !printed.contains(&(stage, status))
                {
                    printed.push((stage, status));
                    let mark = if status == StageStatus::Completed { "✓" } else { "…" };
                    println!("{mark} {}", stage.label());
                }
            }
        }
    });

    let result = pipeline
        .run(SubmissionInput {
            existing_fhir_id: Some(fhir_id),
            new_patient: None,
            idempotency_key: None,
            test_date,
            file,
        })
        .await;
    drop(pipeline);
    let _ = printer.await;

    let outcome = result?;
    println!();
    println!("{}", outcome.interpretation);
    println!();
    println!("Lab test set: {}", outcome.lab_set_id);
    Ok(())
}

fn cmd_wizard_status(config: &Config) {
    let store = WizardStore::open(&config.state_path());
    let Some(state) = store.load() else {
        println!("No saved wizard progress");
        return;
    };
    let data = &state.patient_data;
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    println!("Wizard at step: {}", state.current_step.title());
    println!("  Email:         {}", or_dash(&data.email));
    println!(
        "  Password:      {}",
        if data.password.is_empty() { "-" } else { "(set)" }
    );
    println!(
        "  Name:          {}",
        or_dash(format!("{} {}", data.first_name, data.last_name).trim())
    );
    println!("  Date of birth: {}", or_dash(&data.date_of_birth));
    println!("  Gender:        {}", or_dash(&data.gender));
    println!("  Test date:     {}", or_dash(&data.test_date));
    if let Some(key) = state.submission_key {
        println!("  Submission key: {key}");
    }
    println!("Saved in {}", store.path().display());
}
