use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gdrive_backup::app::{App, BackupManifest};
use gdrive_backup::auth::BearerTokenAuthenticator;
use gdrive_backup::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use gdrive_backup::domain::BackupMode;
use gdrive_backup::error::BackupError;
use gdrive_backup::layout::RunStamp;
use gdrive_backup::output::{JsonOutput, OutputMode};
use gdrive_backup::tui::Tui;
use gdrive_backup::worker::Worker;

#[derive(Parser)]
#[command(name = "gdrive-backup")]
#[command(about = "Back up a Google Drive account into a dated local directory tree")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Job file; defaults to ./gdrive-backup.json when present.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Back up every object visible to the subject")]
    Full(CommonArgs),
    #[command(about = "Back up only the objects with the given names")]
    Files(FilesArgs),
}

#[derive(Args, Clone, Default)]
struct CommonArgs {
    /// Account to back up, e.g. someone@example.com.
    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    backup_root: Option<String>,

    #[arg(long)]
    access_token_file: Option<String>,
}

#[derive(Args, Clone)]
struct FilesArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Comma separated file names.
    #[arg(long)]
    names: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<BackupError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BackupError) -> u8 {
    match error {
        BackupError::InvalidSubject(_)
        | BackupError::InvalidObjectId(_)
        | BackupError::EmptyNameList
        | BackupError::MissingConfig
        | BackupError::ConfigRead(_)
        | BackupError::ConfigParse(_)
        | BackupError::MissingCredentials(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let (mode, overrides) = match cli.command {
        Some(Commands::Full(args)) => (Some(BackupMode::Full), overrides(args, None)),
        Some(Commands::Files(args)) => (
            Some(BackupMode::Targeted),
            overrides(args.common, args.names),
        ),
        None => (None, ConfigOverrides::default()),
    };

    let resolved = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    // Without a subcommand, a job file that lists names means a targeted run.
    let mode = mode.unwrap_or(if resolved.names.is_empty() {
        BackupMode::Full
    } else {
        BackupMode::Targeted
    });
    if mode == BackupMode::Targeted && resolved.names.is_empty() {
        return Err(BackupError::EmptyNameList.into());
    }

    let auth = BearerTokenAuthenticator::from_sources(resolved.access_token_file.as_deref())?;
    let app = App::new(resolved.layout(), auth);

    let manifest = match output_mode {
        OutputMode::NonInteractive => {
            let worker = spawn_backup(app, mode, resolved);
            let manifest = worker.wait(&JsonOutput)?;
            JsonOutput::print_manifest(&manifest).into_diagnostic()?;
            manifest
        }
        OutputMode::Interactive => {
            let stamp = match mode {
                BackupMode::Full => RunStamp::today(),
                BackupMode::Targeted => RunStamp::SpecificFiles,
            };
            let destination = app.layout().run_root(&resolved.subject, stamp);
            let mut tui = Tui::new(mode, &resolved.subject, destination.to_string());
            let manifest = tui.run(move |sink| match mode {
                BackupMode::Full => app.full_backup(&resolved.subject, sink),
                BackupMode::Targeted => {
                    app.targeted_backup(&resolved.subject, &resolved.names, sink)
                }
            })?;
            print_summary(&manifest);
            manifest
        }
    };

    tracing::debug!(failed = manifest.failed, "backup finished");
    Ok(())
}

fn overrides(args: CommonArgs, names: Option<String>) -> ConfigOverrides {
    ConfigOverrides {
        subject: args.subject,
        backup_root: args.backup_root,
        access_token_file: args.access_token_file,
        names,
    }
}

fn spawn_backup(
    app: App<BearerTokenAuthenticator>,
    mode: BackupMode,
    resolved: ResolvedConfig,
) -> Worker<BackupManifest> {
    Worker::spawn(move |sink| match mode {
        BackupMode::Full => app.full_backup(&resolved.subject, sink),
        BackupMode::Targeted => app.targeted_backup(&resolved.subject, &resolved.names, sink),
    })
}

fn print_summary(manifest: &BackupManifest) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}gdrive-backup summary ({}){reset}", manifest.mode);
    println!("{cyan}Destination: {}{reset}", manifest.run_root);
    println!(
        "{green}Saved: {} of {} objects{reset}",
        manifest.succeeded, manifest.found
    );
    println!("{yellow}Skipped (unsupported type): {}{reset}", manifest.skipped);
    println!("{red}Failed: {}{reset}", manifest.failed);
    for failure in &manifest.failures {
        let location = failure.path.as_deref().unwrap_or(failure.name.as_str());
        println!("{red}  - {location} ({}): {}{reset}", failure.id, failure.reason);
    }
}
