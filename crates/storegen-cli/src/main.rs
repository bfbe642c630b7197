use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use storegen_contracts::assistant::apply_action;
use storegen_contracts::catalog::{Brief, Catalog, ReferenceImage};
use storegen_contracts::errors::SynthesisError;
use storegen_contracts::events::EventWriter;
use storegen_contracts::models::{ModelRegistry, ModelSelector};
use storegen_contracts::session::{login, Credentials, SessionStore};
use storegen_engine::images::load_reference_image;
use storegen_engine::{
    AssistantInterpreter, InlineImage, ModelService, Orchestrator, ServiceRouter,
    SynthesisConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "storegen", version, about = "Generate a complete store from a brief")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the synthesis pipeline and write `catalog.json`.
    Generate(GenerateArgs),
    /// Ask the assistant to interpret an instruction against a catalog.
    Assist(AssistArgs),
    /// Check credentials against the login boundary.
    Login(LoginArgs),
    /// List known models.
    Models,
}

#[derive(Debug, Args)]
struct ModelArgs {
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    text_fallback_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    image_fallback_model: Option<String>,
    /// Use the offline dryrun models.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Restarts allowed after a failed run.
    #[arg(long, default_value_t = 0)]
    retries: u32,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct AssistArgs {
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    image: Option<PathBuf>,
    /// Apply the action and write the catalog back.
    #[arg(long)]
    apply: bool,
    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Debug, Parser)]
struct LoginArgs {
    /// Generated catalog whose owner may log in.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("storegen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("STOREGEN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Assist(args) => run_assist(args),
        Command::Login(args) => run_login(args),
        Command::Models => run_models(),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let registry = ModelRegistry::default();
    let config = synthesis_config(&args.models, &registry)?;
    let references = args
        .images
        .iter()
        .map(|path| load_reference_image(path))
        .collect::<Result<Vec<ReferenceImage>>>()?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(&events_path, uuid::Uuid::new_v4().to_string());
    let service: Arc<dyn ModelService> =
        Arc::new(ServiceRouter::with_default_services(registry.clone()));

    let mut orchestrator = Orchestrator::new(service, config, Brief::new(args.prompt, references))
        .with_registry(registry);
    let mut session = SessionStore::new();
    let mut retries_left = args.retries;
    let outcome = loop {
        match orchestrator.run(&mut session, &events) {
            Ok(outcome) => break outcome,
            Err(err) if retries_left > 0 && err != SynthesisError::Cancelled => {
                retries_left -= 1;
                eprintln!("{}", orchestrator.state().current_action_label());
                orchestrator.restart(&events)?;
            }
            Err(err) => {
                eprintln!("{}", orchestrator.state().current_action_label());
                return Err(err).context("store synthesis failed");
            }
        }
    };

    let catalog_path = args.out.join("catalog.json");
    outcome.catalog.save(&catalog_path)?;
    println!("Store: {}", outcome.catalog.identity.name);
    println!("Products: {}", outcome.catalog.products.len());
    if outcome.degraded_slots > 0 {
        println!("Degraded product slots: {}", outcome.degraded_slots);
    }
    println!("Catalog: {}", catalog_path.display());
    println!("Events: {}", events.path().display());
    println!(
        "Login: {} / {}",
        outcome.credentials.email, outcome.credentials.password
    );
    Ok(0)
}

fn run_assist(args: AssistArgs) -> Result<i32> {
    let registry = ModelRegistry::default();
    let config = synthesis_config(&args.models, &registry)?;
    let mut catalog = load_catalog(&args.catalog)?;
    let reference = args
        .image
        .as_deref()
        .map(load_reference_image)
        .transpose()?;
    let inline = reference.as_ref().map(InlineImage::from);

    let service: Arc<dyn ModelService> =
        Arc::new(ServiceRouter::with_default_services(registry.clone()));
    let interpreter = AssistantInterpreter::new(service, config.text_policy(&registry));
    let envelope = interpreter.interpret(&args.instruction, &catalog, inline.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if args.apply {
        let applied = apply_action(
            &mut catalog,
            &envelope,
            reference.map(|image| image.source),
        );
        if applied.changed {
            catalog.save(&args.catalog)?;
        }
        println!("{}", applied.message);
    }
    Ok(0)
}

fn run_login(args: LoginArgs) -> Result<i32> {
    let mut session = SessionStore::new();
    if let Some(path) = args.catalog.as_deref() {
        let catalog = load_catalog(path)?;
        let credentials = Credentials::for_store(&catalog.identity.name);
        session.set_catalog(catalog, credentials);
    }
    match login(&mut session, &args.email, &args.password) {
        Some(grant) => {
            println!("{}", serde_json::to_string(&grant)?);
            if let Some(catalog) = session.catalog() {
                println!("Store: {}", catalog.identity.name);
            }
            Ok(0)
        }
        None => {
            eprintln!("Invalid credentials.");
            Ok(1)
        }
    }
}

fn run_models() -> Result<i32> {
    let registry = ModelRegistry::default();
    for spec in registry.list() {
        let capabilities: Vec<&str> = spec
            .capabilities
            .iter()
            .map(|capability| capability.as_str())
            .collect();
        let fallback = spec
            .fallback
            .as_deref()
            .map(|model| format!(" -> {model}"))
            .unwrap_or_default();
        println!(
            "{:<28} {:<8} {}{}",
            spec.name,
            spec.provider,
            capabilities.join(","),
            fallback
        );
    }
    Ok(0)
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path).with_context(|| format!("failed to load catalog {}", path.display()))
}

/// Environment first, then `--dryrun`, then explicit model flags.
fn synthesis_config(args: &ModelArgs, registry: &ModelRegistry) -> Result<SynthesisConfig> {
    let mut config = if args.dryrun {
        SynthesisConfig::dryrun()
    } else {
        SynthesisConfig::from_env()
    };
    if let Some(model) = args.text_model.as_ref() {
        config.text_model = model.clone();
    }
    if let Some(model) = args.text_fallback_model.as_ref() {
        config.text_fallback_model = Some(model.clone());
    }
    if let Some(model) = args.image_model.as_ref() {
        config.image_model = model.clone();
    }
    if let Some(model) = args.image_fallback_model.as_ref() {
        config.image_fallback_model = Some(model.clone());
    }
    let selector = ModelSelector::new(Some(registry.clone()));
    for warning in config.resolve(&selector).map_err(anyhow::Error::msg)? {
        tracing::warn!("{warning}");
    }
    Ok(config)
}
