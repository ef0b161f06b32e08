//! CLI entry point for the attendance hub.
//!
//! Provides subcommands for listing aggregated reports, building the
//! subject/batch overview and the daily dashboard, marking a session from
//! group photos, and enrolling students.

use anyhow::Result;
use attendance_hub::config::AppConfig;
use attendance_hub::dashboard::build_dashboard;
use attendance_hub::enroll::enroll_student;
use attendance_hub::marking::mark_batch_attendance;
use attendance_hub::overview::build_overview;
use attendance_hub::recognition::RekognitionService;
use attendance_hub::reports::aggregate::{calculate_attendance, summary_rows};
use attendance_hub::reports::loader::load_reports;
use attendance_hub::roster::load_master_roster;
use attendance_hub::store::s3::S3Store;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "attendance_hub")]
#[command(about = "Attendance reports, dashboards and session marking over S3", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored reports grouped by batch and section, with per-student percentages
    Attendance,
    /// Build the per-subject/batch overview with the monthly trend
    Overview,
    /// Build the per-student daily dashboard from the combined session sheets
    Dashboard,
    /// Mark a session by matching group photos against a batch's stored photos
    Mark {
        /// Batch the session belongs to (e.g. "2021-25")
        #[arg(long)]
        batch: String,

        /// Class or section label written into the report
        #[arg(long)]
        section: String,

        /// Subject code or name written into the report
        #[arg(long)]
        subject: String,

        /// Group photo files taken in the classroom
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },
    /// Enroll a student by uploading and indexing reference photos
    Enroll {
        /// Batch to enroll the student into
        #[arg(long)]
        batch: String,

        /// Enrollment (ER) number
        #[arg(long)]
        er_number: String,

        /// Student's full name
        #[arg(long)]
        name: String,

        /// Reference photo files (jpg, jpeg or png, up to 5 MB each)
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/attendance_hub.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("attendance_hub.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env();
    let store = S3Store::from_config(&cfg).await;

    match cli.command {
        Commands::Attendance => {
            let roster = load_master_roster(&store, &cfg.roster_key).await;
            let mut grouped = load_reports(&store, &cfg).await?;
            let summary = calculate_attendance(&mut grouped, &roster);

            print_json(&json!({
                "sections": summary_rows(&summary),
                "reports": grouped,
            }))?;
        }
        Commands::Overview => {
            let overview = build_overview(&store, &cfg).await?;
            print_json(&overview)?;
        }
        Commands::Dashboard => {
            let dashboard = build_dashboard(&store, &cfg).await?;
            print_json(&dashboard)?;
        }
        Commands::Mark {
            batch,
            section,
            subject,
            images,
        } => {
            let faces = RekognitionService::from_config(&cfg).await;
            let group_images = read_files(&images)?;

            let outcome = mark_batch_attendance(
                &store, &faces, &cfg, &batch, &section, &subject, &group_images,
            )
            .await?;

            info!(
                present = outcome.present.len(),
                absent = outcome.absent.len(),
                report = %outcome.report_url,
                "Session report written"
            );
            print_json(&outcome)?;
        }
        Commands::Enroll {
            batch,
            er_number,
            name,
            images,
        } => {
            let faces = RekognitionService::from_config(&cfg).await;
            let photos: Vec<(String, Vec<u8>)> = images
                .iter()
                .map(|path| Ok((file_name_of(path), std::fs::read(path)?)))
                .collect::<Result<_>>()?;

            let results =
                enroll_student(&store, &faces, &cfg, &batch, &er_number, &name, &photos).await?;

            let indexed = results.iter().filter(|r| r.indexed).count();
            info!(indexed, total = results.len(), "Enrollment finished");
            print_json(&results)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths.iter().map(|path| Ok(std::fs::read(path)?)).collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
