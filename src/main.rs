use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

use philoop::LoopCycleResult;
use philoop::config::Config;

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("philoop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("philoop.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    // RUST_LOG wins over the config file
    builder
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_pipeline_command(config),
        Some(Commands::Run {
            cycles,
            metrics_every,
            output,
            seed,
        }) => handle_run_command(config, *cycles, *metrics_every, output.as_ref(), *seed, cli.is_verbose()),
        Some(Commands::Pipeline) => handle_pipeline_command(config),
        Some(Commands::Validate) => handle_validate_command(config),
    }
}

fn handle_run_command(
    config: &Config,
    cycles: Option<usize>,
    metrics_every: Option<usize>,
    output: Option<&PathBuf>,
    seed: Option<u64>,
    verbose: bool,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(seed) = seed {
        config.integration.seed = Some(seed);
    }
    if let Some(k) = metrics_every {
        config.run.collect_metrics_every = k;
    }
    config.validate().context("Invalid configuration")?;

    let cycles = cycles.unwrap_or(config.run.cycles);
    let every = config.run.collect_metrics_every;
    info!("Running {} cycles, metrics every {}", cycles, every);

    let mut integration_loop = config.build_loop().context("Failed to build pipeline")?;

    let mut report = |done: usize, total: usize, result: &LoopCycleResult| {
        if verbose {
            print_cycle(result);
        } else if done == total || done % 10 == 0 {
            println!("{} {}/{}", "Progress:".cyan(), done, total);
        }
    };
    integration_loop
        .run_cycles(cycles, every, Some(&mut report))
        .context("Cycle batch aborted")?;

    let stats = integration_loop.get_statistics();
    println!();
    println!("{}", "Summary".green().bold());
    println!("  cycles:        {}", stats.total_cycles);
    println!("  successful:    {} ({:.1}%)", stats.successful_cycles, stats.success_rate * 100.0);
    println!("  avg duration:  {:.3} ms", stats.avg_cycle_duration_ms);
    println!(
        "  phi:           mean {:.4}  min {:.4}  max {:.4}  nonzero {}",
        stats.phi.mean, stats.phi.min, stats.phi.max, stats.phi.nonzero_count
    );
    for module in &stats.module_statistics {
        let errors = if module.error_count > 0 {
            module.error_count.to_string().red()
        } else {
            module.error_count.to_string().normal()
        };
        println!(
            "  {:<14} calls {:<6} errors {:<6} avg {:.3} ms",
            module.module_name, module.call_count, errors, module.avg_execution_time_ms
        );
    }

    if let Some(path) = output.or(config.run.output.as_ref()) {
        integration_loop
            .save_state(path)
            .context(format!("Failed to save state to {}", path.display()))?;
        println!("{} {}", "Saved:".green(), path.display());
    }

    Ok(())
}

fn print_cycle(result: &LoopCycleResult) {
    let status = if result.success() { "ok".green() } else { "--".yellow() };
    println!(
        "[{}] cycle {:>5}  phi {:.4}  modules {}  pairs {}  {:.3} ms",
        status,
        result.cycle_number,
        result.phi_estimate,
        result.modules_executed.len(),
        result.cross_prediction_count(),
        result.cycle_duration_ms
    );
    for (module, message) in &result.errors_occurred {
        println!("      {} {}: {}", "error".red(), module, message);
    }
}

fn handle_pipeline_command(config: &Config) -> Result<()> {
    info!("Listing pipeline with {} modules", config.pipeline.len());
    println!("{}", "Pipeline".cyan().bold());
    for (index, module) in config.pipeline.iter().enumerate() {
        let definition = module
            .to_definition()
            .context(format!("Invalid module '{}'", module.name))?;
        let inputs = if module.inputs.is_empty() {
            "-".to_string()
        } else {
            module.inputs.join(", ")
        };
        println!(
            "  {}. {:<14} dim {:<4} inputs [{}]  {}",
            index + 1,
            module.name,
            module.embedding_dim,
            inputs,
            definition.capability.label()
        );
    }
    Ok(())
}

fn handle_validate_command(config: &Config) -> Result<()> {
    config.validate()?;
    println!("{} {} modules", "Configuration OK:".green(), config.pipeline.len());
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
