use crate::infra::{load_matrix, InMemoryApplicationStore, InMemoryDocumentRegistry};
use admission_workflow::config::{AppConfig, WorkflowConfig};
use admission_workflow::error::AppError;
use admission_workflow::workflows::admission::{
    Actor, ActorRole, Application, ApplicationId, ApplicationStatus, DomainEvent, NewApplication,
    TransitionOutcome, WorkflowEngine,
};
use chrono::SecondsFormat;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

type DemoEngine = WorkflowEngine<InMemoryApplicationStore, InMemoryDocumentRegistry>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Authority matrix JSON file (built-in table when omitted)
    #[arg(long)]
    pub(crate) matrix: Option<PathBuf>,
    /// Identifier for the sample application
    #[arg(long, default_value = "demo-0001")]
    pub(crate) application_id: String,
    /// Skip the hold, resume and cancellation walkthrough
    #[arg(long)]
    pub(crate) skip_controls: bool,
}

pub(crate) fn run_demo(mut args: DemoArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = args.matrix.take() {
        config.workflow.matrix_path = Some(path);
    }

    let (engine, documents) = demo_engine(&config.workflow)?;
    let required = config.workflow.required_documents.clone();

    let admin = Actor::verified(ActorRole::Admin, "admin-demo");
    let partner = Actor::verified(ActorRole::Partner, "partner-demo");

    println!("Admission workflow demo");
    println!("  Matrix entries: {}", engine.matrix().len());
    println!(
        "  Required documents: {}",
        required
            .iter()
            .map(|tag| tag.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let id = ApplicationId(args.application_id.clone());
    println!("\nIntake for {id}");
    let submitted = engine.submit(
        NewApplication {
            id: id.clone(),
            documents_required: None,
        },
        &partner,
    )?;
    println!("  Submission trigger: {:?}", submitted.result);

    for tag in &required {
        documents.upload(&id, tag.clone());
    }
    let uploaded = engine.dispatch(&id, &DomainEvent::DocumentUploaded, &partner)?;
    if let Some(outcome) = &uploaded.committed {
        print_outcome("Documents uploaded", outcome);
    }

    for tag in &required {
        documents.approve(&id, tag.clone());
    }
    let approved = engine.transition(&id, ApplicationStatus::DocumentsApproved, &admin, None)?;
    print_outcome("Documents approved", &approved);
    if let Some(applied) = &approved.system_trigger {
        println!("  Chained trigger: {}", applied.trigger);
    }

    print_history(&engine.get(&id)?);

    if !args.skip_controls {
        run_controls(&engine, &admin, &partner, &args.application_id)?;
    }

    Ok(())
}

/// Engine over fresh in-memory infra, configured the same way `serve` configures it.
fn demo_engine(
    workflow: &WorkflowConfig,
) -> Result<(DemoEngine, Arc<InMemoryDocumentRegistry>), AppError> {
    let matrix = Arc::new(load_matrix(workflow.matrix_path.as_deref())?);
    let documents = Arc::new(InMemoryDocumentRegistry::default());
    let engine = WorkflowEngine::new(
        Arc::new(InMemoryApplicationStore::default()),
        documents.clone(),
        matrix,
    )
    .with_required_documents(workflow.required_documents.clone());
    Ok((engine, documents))
}

fn run_controls(
    engine: &DemoEngine,
    admin: &Actor,
    partner: &Actor,
    base_id: &str,
) -> Result<(), AppError> {
    let id = ApplicationId(format!("{base_id}-controls"));
    println!("\nHold, resume and cancel for {id}");
    engine.submit(
        NewApplication {
            id: id.clone(),
            documents_required: None,
        },
        partner,
    )?;
    engine.transition(&id, ApplicationStatus::UnderReviewAdmin, admin, None)?;

    let held = engine.hold(&id, admin, Some("awaiting sponsor confirmation"))?;
    print_outcome("Held", &held);

    match engine.transition(&id, ApplicationStatus::DocumentsUnderReview, admin, None) {
        Ok(_) => println!("  Unexpected: held application accepted a transition"),
        Err(err) => println!("  Blocked while held: {err}"),
    }

    let resumed = engine.resume(&id, admin, None)?;
    print_outcome("Resumed", &resumed);

    let cancelled = engine.cancel(&id, partner, Some("student withdrew"))?;
    print_outcome("Cancelled", &cancelled);

    print_history(&engine.get(&id)?);
    Ok(())
}

fn print_outcome(label: &str, outcome: &TransitionOutcome) {
    println!(
        "  {label}: {} -> {} (next: {}, {} notice(s))",
        outcome.before,
        outcome.after,
        outcome.application.next_actor,
        outcome.notices.len()
    );
}

fn print_history(application: &Application) {
    println!(
        "  History for {} (version {}):",
        application.id, application.version
    );
    for entry in &application.stage_history {
        let reason = entry
            .reason
            .as_deref()
            .map(|reason| format!(" [{reason}]"))
            .unwrap_or_default();
        println!(
            "    {} {}/{} by {} ({}){}",
            entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.stage,
            entry.status,
            entry.actor_id,
            entry.actor,
            reason
        );
    }
    if let Some(approved_by) = &application.approved_by {
        println!("  Approved by: {approved_by}");
    }
    if let Some(reason) = &application.cancel_reason {
        println!("  Cancel reason: {reason}");
    }
}
