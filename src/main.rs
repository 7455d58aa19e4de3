use anyhow::{Context, Result};
use podnet::cli::{Args, ConfigDiscovery, ExecConfig, ExecutionMode, LifecycleAction, LifecycleConfig};
use podnet::{ContainerController, ExecutionCommand, OrchestratorConfig};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podnet=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::Lifecycle(config) => run_lifecycle(config).await,
        ExecutionMode::Exec(config) => run_exec(config).await,
        ExecutionMode::ShowConfig { config_override } => show_config(config_override.as_deref()),
    }
}

fn load_controller(config_override: Option<&Path>) -> Result<ContainerController> {
    let config = ConfigDiscovery::load(config_override)?;
    let controller = ContainerController::from_config(&config);

    let missing = controller.missing_tools();
    if !missing.is_empty() {
        warn!("Required tools not found: {}", missing.join(", "));
    }

    Ok(controller)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn run_lifecycle(config: LifecycleConfig) -> Result<()> {
    let controller = load_controller(config.config_override.as_deref())?;
    let name = config.name.as_str();
    info!("Running {:?} for {}", config.action, name);

    match config.action {
        LifecycleAction::Start => print_json(&controller.start(name).await?),
        LifecycleAction::Stop => print_json(&controller.stop(name).await?),
        LifecycleAction::CreateNetwork => print_json(&controller.create_overlay_network(name).await?),
        LifecycleAction::DeleteNetwork => print_json(&controller.delete_overlay_network(name).await?),
        LifecycleAction::Status => {
            let state = controller.status(name).await?;
            print_json(&serde_json::json!({ "name": name, "state": state }))
        }
        LifecycleAction::Dump => print_json(&controller.dump(name)?),
        LifecycleAction::Render => {
            print!("{}", controller.render_container_unit(name)?);
            Ok(())
        }
    }
}

async fn run_exec(config: ExecConfig) -> Result<()> {
    let controller = load_controller(config.config_override.as_deref())?;
    let spec = controller.load(&config.name)?;

    let (program, args) = config
        .command
        .split_first()
        .context("exec requires a command to run")?;
    let command = ExecutionCommand::new(program.as_str(), args.iter().cloned());

    let result = if config.on_host {
        controller.execute(&spec, command).await?
    } else {
        controller.container_execute(&spec, command).await?
    };

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if !result.success() {
        std::process::exit(result.exit_code.clamp(1, 255));
    }
    Ok(())
}

fn show_config(config_override: Option<&Path>) -> Result<()> {
    ConfigDiscovery::show_discovery_info();

    let config: OrchestratorConfig = ConfigDiscovery::load(config_override)?;
    println!();
    println!("Effective configuration:");
    println!("{}", config.to_toml_string()?);
    Ok(())
}
