mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use stagehand::action::{Action, CooldownSnapshot, NullPerception};
use stagehand::config::Config;
use stagehand::runner::{Phase, Runner, SimulationRunner};
use stagehand::state_machine::Trigger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Check => check(cli.config.as_deref()),
        Command::Simulate { once } => simulate(cli.config.as_deref(), once).await,
        Command::Cooldowns { snapshot } => cooldowns(&snapshot),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("stagehand=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stagehand=info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn check(path: Option<&Path>) -> Result<()> {
    let config = Config::load(path).context("invalid configuration")?;
    ui::print_config(&config);
    Ok(())
}

/// "gather_resources" → "Gather Resources".
fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn simulate(path: Option<&Path>, once: bool) -> Result<()> {
    let mut config = Config::load(path).context("invalid configuration")?;
    config.runner.test_mode.enabled = true;
    if once {
        config.runner.continuous_running = false;
    }
    if config.actions.is_empty() {
        warn!("no actions configured, nothing to simulate");
        return Ok(());
    }

    let runner = SimulationRunner::new(config.runner.clone());
    for (key, settings) in &config.actions {
        let action = Action::builder(display_name(key), Arc::new(NullPerception))
            .key(key.clone())
            .settings(settings.clone())
            .on(Trigger::START, |_| Some(Trigger::SUCCEED))
            .build()
            .with_context(|| format!("building action `{key}`"))?;
        runner.add_action(Arc::new(action));
    }

    let progress = Arc::new(ui::RunProgress::start("simulating"));
    let sink = progress.clone();
    runner.set_status_callback(Some(Arc::new(move |name: &str, phase: Phase| {
        sink.phase(name, phase);
    })));

    runner.start()?;
    tokio::select! {
        result = runner.join() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
            runner.stop().await?;
        }
    }
    runner.set_status_callback(None);
    progress.finish();

    info!(cycles = runner.cycles(), "simulation finished");
    ui::print_statuses(&runner.statuses());
    Ok(())
}

fn cooldowns(path: &Path) -> Result<()> {
    let snapshot = CooldownSnapshot::load(path)
        .with_context(|| format!("reading cooldown snapshot {}", path.display()))?;
    ui::print_snapshot(&snapshot, Utc::now());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_from_key() {
        assert_eq!(display_name("gather_resources"), "Gather Resources");
        assert_eq!(display_name("open__mails"), "Open Mails");
        assert_eq!(display_name("vip"), "Vip");
    }
}
