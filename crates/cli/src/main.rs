use anyhow::Context;
use clap::{Parser, Subcommand};
use cds_core::config::config_from_env_values;
use cds_core::{CdsClient, EncounterContext, PanelOutcome, ServicePanel};
use fhir::{PatientResource, PractitionerResource};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cds")]
#[command(about = "CDS Hooks patient-view client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the services the CDS backend advertises
    Services,
    /// Run the patient-view hook for a patient and print the cards
    Cards {
        /// Path to a FHIR Patient resource (JSON)
        patient: PathBuf,
        /// Path to a FHIR Practitioner resource (JSON)
        #[arg(long)]
        practitioner: Option<PathBuf>,
    },
    /// Hide an assessment card
    Dismiss {
        /// Encounter id (the part after `Encounter/`)
        encounter_id: String,
        /// Assessment type
        assessment_type: String,
        /// Service to re-invoke after hiding (optional)
        #[arg(long, requires = "patient")]
        service: Option<String>,
        /// Patient resource for the re-invocation
        #[arg(long, requires = "service")]
        patient: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("cds_core=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'cds --help' for commands");
        return Ok(());
    };

    let cfg = config_from_env_values(
        std::env::var("CDS_BASE_URL").ok(),
        std::env::var("CDS_REQUEST_TIMEOUT_SECS").ok(),
        std::env::var("CDS_APP_REGISTRY_FILE").ok(),
    )?;
    let client = CdsClient::from_config(cfg)?;

    match command {
        Commands::Services => {
            let services = client.catalog().fetch_catalog().await?;
            if services.is_empty() {
                println!("No services advertised.");
            }
            for service in services {
                println!("ID: {}, Hook: {}, Title: {}", service.id, service.hook, service.title);
            }
        }
        Commands::Cards {
            patient,
            practitioner,
        } => {
            let patient = read_patient(&patient)?;
            let practitioner = practitioner
                .as_deref()
                .map(read_practitioner)
                .transpose()?;

            println!(
                "Cards for {} ({})",
                patient.display_name().unwrap_or_else(|| "unnamed patient".into()),
                patient.reference()
            );
            if let Some(practitioner) = &practitioner {
                println!(
                    "Practitioner: {} ({})",
                    practitioner
                        .display_name()
                        .unwrap_or_else(|| "unnamed practitioner".into()),
                    practitioner.reference()
                );
            }

            let view = client.patient_view(patient, practitioner);
            let cards = view.load().await?;
            for panel in &cards.panels {
                print_panel(panel);
            }
        }
        Commands::Dismiss {
            encounter_id,
            assessment_type,
            service,
            patient,
        } => {
            let context = EncounterContext::new(encounter_id, assessment_type)
                .context("encounter id cannot be blank")?;

            match (service, patient) {
                (Some(service), Some(patient)) => {
                    let view = client.patient_view(read_patient(&patient)?, None);
                    view.dismiss(&service, &context).await?;
                    println!("Hid card for Encounter/{}", context.encounter_id());
                    for refreshed in view.process_pending_refreshes().await {
                        print_panel(&refreshed?);
                    }
                }
                _ => {
                    client.dismissal().dismiss(&context).await?;
                    println!("Hid card for Encounter/{}", context.encounter_id());
                }
            }
        }
    }

    Ok(())
}

fn read_patient(path: &Path) -> anyhow::Result<PatientResource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(PatientResource::from_json_str(&text)?)
}

fn read_practitioner(path: &Path) -> anyhow::Result<PractitionerResource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(PractitionerResource::from_json_str(&text)?)
}

fn print_panel(panel: &ServicePanel) {
    println!("== {} ({})", panel.service.id, panel.service.title);
    match &panel.outcome {
        PanelOutcome::Failed { diagnostic } => println!("   failed: {diagnostic}"),
        PanelOutcome::Cards { cards } if cards.is_empty() => println!("   no cards"),
        PanelOutcome::Cards { cards } => {
            for rendered in cards {
                println!("   [{}] {}", rendered.colour, rendered.card.summary);
                if !rendered.card.detail.is_empty() {
                    println!("       {}", rendered.card.detail);
                }
                if let Some(ctx) = &rendered.card.encounter_context {
                    println!(
                        "       dismiss: cds dismiss {} {}",
                        ctx.encounter_id(),
                        ctx.assessment_type()
                    );
                }
                for action in &rendered.actions {
                    match &action.app {
                        Some(app) => println!("       launch: {} ({})", action.link.label, app.name),
                        None => println!("       link: {} {}", action.link.label, action.link.url),
                    }
                }
            }
        }
    }
}
