use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;

use mear_lib::backend::{HttpBackend, RegistryBackend};
use mear_lib::clinical::{activated_protocols, build_guidance, calculate_all, generate_alerts, summarize_severity};
use mear_lib::config::{self, AppConfig};
use mear_lib::models::{DraftId, FormSnapshot};
use mear_lib::report::{export_report, render_report_pdf, ReportOptions, ReportPayload};
use mear_lib::store::{FormStore, LoadOutcome};
use mear_lib::validation::validate_submission;

#[derive(Parser)]
#[command(name = "mear")]
#[command(version, about = "Emergency airway registry tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print derived values, alerts, protocols and guidance for a form
    Assess {
        /// Form snapshot JSON file
        snapshot: PathBuf,
    },
    /// Check a form against the submission rules
    Validate {
        /// Form snapshot JSON file
        snapshot: PathBuf,
    },
    /// Render a PDF case report
    Report {
        /// Form snapshot JSON file
        snapshot: PathBuf,
        /// Output file (defaults to the exports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Leave out the alerts section
        #[arg(long)]
        no_alerts: bool,
        /// Leave out the calculated values section
        #[arg(long)]
        no_calculations: bool,
    },
    /// Sign in to the registry and print the token
    Login {
        username: String,
        #[arg(long, env = "MEAR_PASSWORD")]
        password: String,
    },
    /// List submitted cases
    Cases {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Load a draft from the registry or local mirror and print it
    Resume {
        #[arg(long)]
        draft_id: Option<String>,
        #[arg(long)]
        hospital_no: Option<String>,
    },
}

fn read_snapshot(path: &PathBuf) -> Result<FormSnapshot> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    mear_lib::init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    tracing::debug!(api = %config.api_base_url, "MEAR v{}", config::APP_VERSION);

    match cli.command {
        Commands::Assess { snapshot } => {
            let form = read_snapshot(&snapshot)?;
            let alerts = generate_alerts(&form, Utc::now());
            print_json(&json!({
                "calculatedValues": calculate_all(&form),
                "severity": summarize_severity(&alerts),
                "alerts": alerts,
                "protocols": activated_protocols(&form),
                "guidance": build_guidance(&form),
            }))?;
        }
        Commands::Validate { snapshot } => {
            let form = read_snapshot(&snapshot)?;
            match validate_submission(&form) {
                Ok(()) => println!("Form is ready to submit."),
                Err(errors) => {
                    for error in errors.errors() {
                        eprintln!("{error}");
                    }
                    bail!("{} field(s) failed validation", errors.len());
                }
            }
        }
        Commands::Report {
            snapshot,
            output,
            no_alerts,
            no_calculations,
        } => {
            let form = read_snapshot(&snapshot)?;
            let now = Utc::now();
            let payload = ReportPayload::new(&form, calculate_all(&form), generate_alerts(&form, now), now);
            let options = ReportOptions {
                include_alerts: !no_alerts,
                include_calculations: !no_calculations,
            };
            let bytes = render_report_pdf(&payload, &options)?;

            let path = match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    path
                }
                None => export_report(&bytes, &config::exports_dir(), &payload.file_name())?,
            };
            println!("{}", path.display());
        }
        Commands::Login { username, password } => {
            let backend = HttpBackend::from_config(&config)?;
            let response = backend.login(&username, &password).await?;
            println!("{}", response.token);
        }
        Commands::Cases { limit } => {
            let backend = HttpBackend::from_config(&config)?;
            let cases = backend.list_cases(limit).await?;
            if cases.is_empty() {
                println!("No cases found.");
            }
            for case in cases {
                let created = case
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}\t{}\t{}",
                    case.id,
                    case.form.hospital_no().unwrap_or("unidentified"),
                    created
                );
            }
        }
        Commands::Resume {
            draft_id,
            hospital_no,
        } => {
            let backend = Arc::new(HttpBackend::from_config(&config)?);
            let store = FormStore::from_config(backend, &config);
            let outcome = store
                .load_draft(draft_id.map(DraftId::new), hospital_no)
                .await;
            if outcome == LoadOutcome::NotFound {
                bail!("no draft found");
            }
            print_json(&json!({
                "source": outcome,
                "currentPhase": store.current_phase()?,
                "form": store.snapshot()?,
                "calculatedValues": store.calculated_values()?,
            }))?;
        }
    }

    Ok(())
}
