use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use greseller::config::Manifest;
use greseller::gcp::auth::{validate_credentials, GcpCredentials};
use greseller::gcp::billing::BillingClient;
use greseller::gcp::client::GcpClient;
use greseller::gcp::http::format_remote_error;
use greseller::reconcile::{
    Controller, Outcome, PlanAction, ReconcileError, ResourceIdentity, Warning,
};
use greseller::resource::billing_account;
use greseller::state::StateFile;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Reconcile a Google Cloud reseller billing account with its declared state
#[derive(Parser, Debug)]
#[command(name = "greseller", version = greseller::VERSION, about, long_about = None)]
struct Args {
    /// Manifest declaring the provider settings and the billing account
    #[arg(short, long, default_value = "greseller.yaml")]
    manifest: PathBuf,

    /// State file tracking the bound billing account
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Also write logs to the log file under the user config directory
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what apply would change, without calling the API
    Plan,
    /// Create or update the billing account to match the manifest
    Apply,
    /// Re-read the tracked billing account from the API
    Refresh,
    /// Start tracking an existing billing account
    Import {
        /// Billing account id or resource name (billingAccounts/...)
        id: String,
    },
    /// Stop tracking the billing account; it is not deleted or closed
    Forget,
    /// Check the configured credentials payload without calling the API
    ValidateCredentials,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel, to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return None;
    }

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr.and(non_blocking))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("greseller started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("greseller").join("greseller.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".greseller").join("greseller.log");
    }
    PathBuf::from("greseller.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<ReconcileError>() {
        Some(ReconcileError::Remote { operation, source, .. }) => {
            eprintln!("Error: {} failed: {}", operation, format_remote_error(source));
            tracing::debug!("{:#}", err);
        }
        Some(reconcile) => eprintln!("Error ({:?}): {}", reconcile.kind(), reconcile),
        None => eprintln!("Error: {:#}", err),
    }
}

async fn run(args: Args) -> Result<()> {
    let manifest = if args.manifest.exists() {
        Manifest::load(&args.manifest)?
    } else if matches!(args.command, Command::ValidateCredentials) {
        Manifest::default()
    } else {
        anyhow::bail!("Manifest {} not found", args.manifest.display());
    };

    if matches!(args.command, Command::ValidateCredentials) {
        return check_credentials(&manifest);
    }

    let provider = &manifest.provider;
    let credentials = GcpCredentials::resolve(
        provider.effective_credentials().as_deref(),
        provider.effective_access_token().as_deref(),
    )?;
    let gcp = GcpClient::new(credentials, provider.endpoint_url()?)?;
    let mut controller = Controller::new(
        BillingClient::new(gcp),
        billing_account::schema(),
        provider.retry.to_policy(),
    )
    .with_operation_timeout(provider.operation_timeout());

    let state = StateFile::new(args.state.unwrap_or_else(StateFile::default_path));
    controller.restore(state.load()?);

    let result = match args.command {
        Command::ValidateCredentials => return check_credentials(&manifest),
        Command::Plan => {
            let desired = manifest.desired(controller.schema())?;
            let plan = controller.plan(&desired)?;
            print_plan(&plan.action);
            print_warnings(&plan.warnings);
            return Ok(());
        }
        Command::Apply => {
            let desired = manifest.desired(controller.schema())?;
            controller.reconcile(&desired).await
        }
        Command::Refresh => controller.read().await,
        Command::Import { id } => controller.import(ResourceIdentity::new(id)).await,
        Command::Forget => controller.delete(),
    };

    // Tracking may have changed even when the operation failed part way
    state
        .save(controller.tracked())
        .context("Failed to persist state")?;

    let outcome = result?;
    print_outcome(&outcome, controller.identity());
    Ok(())
}

fn check_credentials(manifest: &Manifest) -> Result<()> {
    match manifest.provider.effective_credentials() {
        Some(payload) => {
            validate_credentials(&payload)?;
            println!("Credentials are valid.");
        }
        None => println!("No credentials configured; Application Default Credentials will be used."),
    }
    Ok(())
}

fn print_plan(action: &PlanAction) {
    match action {
        PlanAction::Noop => println!("No changes. The billing account matches the manifest."),
        PlanAction::Create { fields } => {
            println!("A billing account will be created:");
            for (field, value) in fields {
                println!("  + {} = {}", field, value);
            }
        }
        PlanAction::Patch { fields, mask } => {
            println!("The billing account will be updated (mask: {}):", mask.join(","));
            for (field, value) in fields {
                println!("  ~ {} = {}", field, value);
            }
        }
        PlanAction::Forbidden {
            field,
            current,
            desired,
        } => println!(
            "Cannot apply: {} is fixed after creation ({} -> {}).",
            field, current, desired
        ),
    }
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
}

fn print_outcome(outcome: &Outcome, identity: Option<&ResourceIdentity>) {
    print_warnings(&outcome.warnings);
    match identity {
        Some(id) => println!("Tracking {} ({} change(s) applied).", id, outcome.mutations),
        None if outcome.removed => println!("No billing account is tracked any more."),
        None => println!("No billing account is tracked."),
    }
}
