// shard-invalidator - Selective cache-shard invalidation for PostgreSQL-backed parameters
// Copyright (C) 2025 shard-invalidator contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::{CommandFactory, Parser};
use shard_invalidator::cli::{Cli, Commands, ConfigAction};
use shard_invalidator::core::config::{generate_default_config, Config};
use shard_invalidator::core::error::{InvalidatorError, Result, ResultExt};
use shard_invalidator::core::timestamp::TimestampParser;
use shard_invalidator::engine::{EngineSettings, InvalidationEngine};
use shard_invalidator::listener::Listener;
use shard_invalidator::logging;
use shard_invalidator::shard::ShardRegistry;
use shard_invalidator::store::postgres::{schema_sql, PostgresStore};
use shard_invalidator::ui::Output;
use tracing::info;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = Output::new(cli.output).no_colors(!console::colors_enabled());

    if let Err(e) = run(&cli, &output).await {
        output.print_fatal(&e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, output: &Output) -> Result<()> {
    match &cli.command {
        None | Some(Commands::Run) => run_daemon(cli, output).await,
        Some(Commands::Config { action }) => config_command(cli, action, output),
        Some(Commands::Schema) => {
            let config = effective_config(cli)?;
            print!("{}", schema_sql(&config.listener.channel));
            Ok(())
        }
        Some(Commands::ParseTime { text }) => {
            let config = effective_config(cli)?;
            let parser = TimestampParser::new(config.engine.reference_offset()?);
            output.print_timestamp(text, parser.parse(text)?);
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(clap_complete::Shell::from(*shell), &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Defaults, then the config file, then environment, then flags
fn effective_config(cli: &Cli) -> Result<Config> {
    let config = Config::load(cli.config.as_deref())?.with_env_overrides();
    Ok(cli.apply_to(config))
}

async fn run_daemon(cli: &Cli, output: &Output) -> Result<()> {
    let config = effective_config(cli)?;
    let _guard = logging::init(&config.general.log_level, config.general.log_file.as_deref())?;
    config.validate()?;

    let specs = config.shard_specs()?;
    let shards = ShardRegistry::open(&specs, config.store.connect_timeout())?;
    let (store, mut events) = PostgresStore::connect(&config.store, &config.listener.channel).await?;

    let settings = EngineSettings::from_config(&config.engine)?;
    let mut engine = InvalidationEngine::new(store, shards, settings);
    let listener = Listener::new(config.listener.event_limit());

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            // Without a signal handler only the event limit or channel close can stop us.
            Err(e) => {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    let summary = listener.run(&mut events, &mut engine, shutdown).await;
    let report = engine.report();
    info!(
        total_shard_checks = report.total_shard_checks,
        saved_checks = report.saved_checks,
        "Shutting down"
    );
    output.print_report(&report, Some(&summary));
    summary.check()
}

fn config_command(cli: &Cli, action: &ConfigAction, output: &Output) -> Result<()> {
    match action {
        ConfigAction::Show => {
            output.print_config(&effective_config(cli)?);
        }
        ConfigAction::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(Config::config_path);
            if path.exists() && !force {
                return Err(InvalidatorError::Config(format!(
                    "{} already exists, use --force to overwrite",
                    path.display()
                )));
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
            std::fs::write(&path, generate_default_config()).with_context(|| format!("writing {}", path.display()))?;
            output.success(&format!("wrote default configuration to {}", path.display()));
        }
        ConfigAction::Validate => {
            let config = effective_config(cli)?;
            config.validate()?;
            output.success(&format!(
                "configuration is valid: {} shard(s), channel '{}'",
                config.shards.servers.len(),
                config.listener.channel
            ));
        }
        ConfigAction::Path => {
            println!("{}", cli.config.clone().unwrap_or_else(Config::config_path).display());
        }
    }
    Ok(())
}
