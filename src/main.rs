use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use automark::classifier::ClassificationMode;
use automark::config::GraderConfig;
use automark::gradebook::GradebookFix;
use automark::grader::Grader;
use automark::runner::ProcessRunner;
use automark::scorer::SubmissionFile;
use automark::splice::{self, Markers};
use automark::validator::{OutputFormat, ValidatorTarget};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Checker configuration (TOML); the built-in table is used when absent
    #[arg(long, global = true, env = "AUTOMARK_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade submissions with the checker configured for their kind
    Grade {
        /// Override the configured classification mode
        #[arg(long)]
        mode: Option<ClassificationMode>,
        /// Submission files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Send a file to the HTML or CSS validator
    Validate {
        /// html or css
        #[arg(long)]
        target: ValidatorTarget,
        /// Response format requested from the validator
        #[arg(long, default_value = "json")]
        format: OutputFormat,
        file: PathBuf,
    },
    /// Put the student region of a submission into a template
    Splice {
        /// Template providing the scaffolding
        #[arg(long)]
        base: PathBuf,
        /// Submission providing the student region
        #[arg(long)]
        overlay: PathBuf,
        /// Write here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = splice::DEFAULT_START_MARKER)]
        start_marker: String,
        #[arg(long, default_value = splice::DEFAULT_END_MARKER)]
        end_marker: String,
    },
    /// Repair a downloaded gradebook archive
    Gradebook {
        #[command(subcommand)]
        action: GradebookAction,
    },
}

#[derive(Subcommand)]
enum GradebookAction {
    /// Flatten nested or duplicated submission zips
    FixZips(GradebookArgs),
    /// Keep only each student's latest attempt
    LatestAttempts(GradebookArgs),
}

#[derive(clap::Args)]
struct GradebookArgs {
    #[arg(long)]
    task_id: String,
    #[arg(long)]
    module_code: String,
    /// Suffix of the files making up a submission (repeatable)
    #[arg(long = "extension", required = true)]
    extensions: Vec<String>,
    /// Directory receiving the repaired gradebook
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
    gradebook: PathBuf,
}

impl GradebookArgs {
    fn into_fix(self) -> GradebookFix {
        GradebookFix {
            task_id: self.task_id,
            module_code: self.module_code,
            task_file_extensions: self.extensions,
            gradebook_path: self.gradebook,
            work_dir: self.work_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("automark=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GraderConfig::load(cli.config.as_deref())?;
    match &cli.config {
        Some(path) => info!("Loaded checker configuration from {:?}", path),
        None => info!("Using built-in checker configuration"),
    }

    match cli.command {
        Commands::Grade { mode, files } => {
            let grader = Grader::new(ProcessRunner::new(), config);
            let mut graded = Vec::with_capacity(files.len());

            for file in files {
                let mut submission = SubmissionFile::new(file);
                match (mode, grader.config().spec_for(submission.kind())) {
                    (Some(mode), Some(spec)) => {
                        let mut spec = spec.clone();
                        spec.mode = mode;
                        grader.grade_with(&spec, &mut submission).await;
                    }
                    _ => grader.grade(&mut submission).await,
                }
                graded.push(submission);
            }

            println!("{}", serde_json::to_string_pretty(&graded)?);
        }
        Commands::Validate {
            target,
            format,
            file,
        } => {
            let grader = Grader::new(ProcessRunner::new(), config);
            let mut submission = SubmissionFile::new(file);
            grader.validate(&mut submission, target, format).await;
            println!("{}", serde_json::to_string_pretty(&submission)?);
        }
        Commands::Splice {
            base,
            overlay,
            output,
            start_marker,
            end_marker,
        } => {
            let markers = Markers {
                start: &start_marker,
                end: &end_marker,
            };
            let base_raw =
                std::fs::read(&base).with_context(|| format!("Failed to read {:?}", base))?;
            let overlay_raw =
                std::fs::read(&overlay).with_context(|| format!("Failed to read {:?}", overlay))?;
            let merged = splice::merge_code(
                &automark::decoder::decode_bytes(&base_raw),
                &automark::decoder::decode_bytes(&overlay_raw),
                markers,
            );

            match output {
                Some(path) => {
                    std::fs::write(&path, merged)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Wrote merged source to {:?}", path);
                }
                None => print!("{}", merged),
            }
        }
        Commands::Gradebook { action } => {
            let output = match action {
                GradebookAction::FixZips(args) => args.into_fix().fix_zips()?,
                GradebookAction::LatestAttempts(args) => args.into_fix().keep_latest_attempts()?,
            };
            println!("{}", output.display());
        }
    }

    Ok(())
}
