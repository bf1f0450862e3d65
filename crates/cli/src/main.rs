//! `lens-sorter`: move camera files from an inbox into a date-partitioned
//! archive, then optionally name the days as events.

mod error;
mod log;
mod prompt;

use crate::error::{ErrorKind, Result};
use crate::prompt::Prompt;
use clap::{Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use lens_config::{Config, ConfigLoader};
use lens_library::{Context, DiscardReason, Disposition, FileOutcome, Issue, OrganizeEvent, RunReport, Session, Severity};
use lens_storage::BackendHandle;
use lens_storage::backend::LocalBackend;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Conventional exit status after SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "lens-sorter", version)]
#[command(about = "Organize camera files into a date-partitioned archive", long_about = None)]
struct Args {
    /// Inbox to empty (default: ./_inbox)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,
    /// Archive root (default: current directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    /// Show what would happen without moving or writing anything
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,
    /// Don't generate photo thumbnails
    #[arg(long)]
    no_thumbnail: bool,
    /// Log debug detail, also to the console
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Additional configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Don't ask for event names after the run
    #[arg(long)]
    no_events: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Label an archived date with an event name
    Annotate {
        /// Date as YYYY-MM-DD
        date: String,
        label: String,
    },
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut loader = ConfigLoader::new()
            .set_some("input", self.input.clone())
            .set_some("output", self.output.clone());
        if self.dry_run {
            loader = loader.set("dry_run", true);
        }
        if self.no_thumbnail {
            loader = loader.set("thumbnails.enabled", false);
        }
        if let Some(file) = &self.config {
            loader = loader.with_file(file);
        }
        loader.load().or_raise(|| ErrorKind::Config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "Fatal");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = args.load_config()?;
    let root = config.output_dir().or_raise(|| ErrorKind::Config)?;
    let archive = LocalBackend::new("archive", &root).or_raise(|| ErrorKind::Archive)?;
    // A dry run leaves no trace in the archive, log included.
    let log_file = (!config.dry_run).then(|| root.join(&config.log_file));
    log::init(log_file.as_deref(), args.verbose)?;
    let archive: BackendHandle = Arc::new(archive);

    match &args.command {
        Some(Command::Annotate { date, label }) => annotate(&config, archive, date, label).await,
        None => organize(&config, archive, &args, log_file).await,
    }
}

async fn annotate(config: &Config, archive: BackendHandle, date: &str, label: &str) -> Result<ExitCode> {
    let mut session =
        Session::open(archive, &config.index_file, config.dry_run).await.or_raise(|| ErrorKind::Archive)?;
    let annotation = lens_library::annotate(&mut session, date, label).await.or_raise(|| ErrorKind::Annotate)?;
    session.close().await.or_raise(|| ErrorKind::Annotate)?;
    println!("{} -> {} ({} files)", annotation.from, annotation.to, annotation.records);
    Ok(ExitCode::SUCCESS)
}

async fn organize(config: &Config, archive: BackendHandle, args: &Args, log_file: Option<PathBuf>) -> Result<ExitCode> {
    let input = config.input_dir().or_raise(|| ErrorKind::Config)?;
    tracing::info!("Organizing {} into {}", input.display(), archive.name());
    // Everything that can stop the run is checked before any file is touched.
    let ctx = Context::discover(config).or_raise(|| ErrorKind::Setup)?;
    let inbox = lens_library::open_inbox(&input).or_raise(|| ErrorKind::Setup)?;
    let mut session = Session::open(archive, &config.index_file, config.dry_run).await.or_raise(|| ErrorKind::Setup)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current file");
                cancel.cancel();
            }
        }
    });

    let mut report = None;
    {
        let mut events = pin!(lens_library::organize(&mut session, &ctx, &inbox, cancel));
        while let Some(event) = events.next().await {
            match event.or_raise(|| ErrorKind::Organize)? {
                OrganizeEvent::Started => {},
                OrganizeEvent::DiscoveryComplete(count) => tracing::info!("Found {count} files"),
                OrganizeEvent::Processed(outcome) => log_outcome(&outcome),
                OrganizeEvent::Complete(done) => report = Some(done),
            }
        }
    }
    let Some(mut report) = report else {
        exn::bail!(ErrorKind::Organize);
    };

    let ask = !args.no_events && !report.cancelled && !config.dry_run && std::io::stdin().is_terminal();
    if ask && !report.touched.is_empty() {
        name_events(&mut session, &mut report).await;
    }
    session.close().await.or_raise(|| ErrorKind::Organize)?;

    report.log_file = log_file;
    tracing::info!(
        photos = report.photos,
        videos = report.videos,
        warnings = report.warnings,
        errors = report.errors,
        "Run finished"
    );
    println!("{report}");
    Ok(match report.cancelled {
        true => ExitCode::from(EXIT_CANCELLED),
        false => ExitCode::SUCCESS,
    })
}

async fn name_events(session: &mut Session, report: &mut RunReport) {
    let prompt = Prompt::stdio();
    let touched = report.touched.clone();
    for (date, result) in lens_library::name_events(session, &touched, &prompt).await {
        match result {
            Ok(annotation) => tracing::info!("{date}: labelled {}", annotation.to),
            Err(e) => {
                let issue = Issue::AnnotationFailed(e.to_string());
                tracing::error!("{date}: {issue}");
                report.count_issues([&issue]);
            },
        }
    }
}

/// One run-log line per outcome, plus one per issue.
fn log_outcome(outcome: &FileOutcome) {
    let file = outcome.source.display();
    match &outcome.disposition {
        Disposition::Archived(record) => tracing::info!("{file} -> {}", record.path),
        Disposition::AlreadyArchived => tracing::info!("{file}: already archived; left in inbox"),
        Disposition::Discarded(reason @ DiscardReason::UnreadableName) => tracing::warn!("{file}: skipped ({reason})"),
        Disposition::Discarded(reason) => tracing::debug!("{file}: skipped ({reason})"),
        // Orphans explain themselves through their issue.
        Disposition::LeftInPlace if outcome.issues.is_empty() => tracing::info!("{file}: left in inbox"),
        Disposition::LeftInPlace | Disposition::Failed => {},
    }
    for issue in &outcome.issues {
        match issue.severity() {
            Severity::Debug => tracing::debug!("{file}: {issue}"),
            Severity::Warning => tracing::warn!("{file}: {issue}"),
            Severity::Error => tracing::error!("{file}: {issue}"),
        }
    }
}
