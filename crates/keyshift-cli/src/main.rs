//! KeyShift CLI
//!
//! Edits the per-application switching conditions. `add` and `set-default`
//! capture live system state (the frontmost application and the input source
//! active right now); every mutation is persisted immediately.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use keyshift_core::{
    engine::{capture_condition, capture_default},
    ConditionStore, InputSourceRegistry, SettingsStore,
};
use keyshift_watcher::{frontmost_app, SystemInputSources};
use tabled::{settings::Style, Table, Tabled};

#[derive(Parser)]
#[command(name = "keyshift")]
#[command(about = "Per-application keyboard input source switcher")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured conditions
    List,

    /// List the input sources that can be activated
    Sources,

    /// Show the input source active right now
    Current,

    /// Bind the frontmost application to the current input source
    Add,

    /// Make the current input source the default for unmatched applications
    SetDefault {
        /// Record the default without enabling it
        #[arg(long)]
        disabled: bool,
    },

    /// Delete the condition for an application
    Remove {
        /// Application bundle identifier (see `list`)
        app_id: String,
    },

    /// Enable the condition for an application
    Enable { app_id: String },

    /// Disable the condition for an application (kept, but never applied)
    Disable { app_id: String },

    /// Enable the default condition
    EnableDefault,

    /// Disable the default condition
    DisableDefault,
}

#[derive(Tabled)]
struct ConditionRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Input Source")]
    source: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "Input Source ID")]
    id: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = SettingsStore::open_default();
    let mut store = ConditionStore::from_set(
        settings
            .load()
            .with_context(|| format!("failed to load {}", settings.path().display()))?,
    );
    let registry = SystemInputSources;

    match cli.command {
        Commands::List => {
            show_conditions(&store);
        }
        Commands::Sources => {
            let rows: Vec<SourceRow> = registry
                .list_activatable()
                .into_iter()
                .map(|s| SourceRow { id: s.id })
                .collect();
            if rows.is_empty() {
                println!("{}", "No activatable input sources found.".yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        Commands::Current => {
            let source = registry
                .current()
                .context("could not read the current input source")?;
            println!("{}", source.id);
        }
        Commands::Add => {
            let Some(app) = frontmost_app() else {
                bail!("could not determine the frontmost application");
            };
            let condition =
                capture_condition(&registry, &app).context("could not capture a condition")?;
            let summary = format!(
                "{} ({}) -> {}",
                condition.application_name,
                condition.application_identifier,
                condition.input_source.id
            );
            store.upsert(condition);
            save(&settings, &store)?;
            println!("{} {}", "Added:".green(), summary);
        }
        Commands::SetDefault { disabled } => {
            let default = capture_default(&registry, !disabled)
                .context("could not capture the default condition")?;
            let summary = default.input_source.id.clone();
            store.set_default(default.input_source, default.enabled);
            save(&settings, &store)?;
            println!("{} {}", "Default set:".green(), summary);
        }
        Commands::Remove { app_id } => {
            if store.remove(&app_id) {
                save(&settings, &store)?;
                println!("{} {}", "Removed:".green(), app_id);
            } else {
                println!("{} {}", "No condition for".yellow(), app_id);
            }
        }
        Commands::Enable { app_id } => set_enabled(&settings, &mut store, &app_id, true)?,
        Commands::Disable { app_id } => set_enabled(&settings, &mut store, &app_id, false)?,
        Commands::EnableDefault => {
            store.toggle_default(true);
            save(&settings, &store)?;
            println!("{}", "Default condition enabled.".green());
        }
        Commands::DisableDefault => {
            store.toggle_default(false);
            save(&settings, &store)?;
            println!("{}", "Default condition disabled.".green());
        }
    }

    Ok(())
}

fn show_conditions(store: &ConditionStore) {
    let rows: Vec<ConditionRow> = store
        .conditions()
        .iter()
        .map(|c| ConditionRow {
            application: c.application_name.clone(),
            identifier: c.application_identifier.clone(),
            source: c.input_source.id.clone(),
            enabled: if c.enabled { "yes".to_string() } else { "no".to_string() },
        })
        .collect();

    if rows.is_empty() {
        println!("{}", "No conditions configured.".yellow());
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    let default = store.default_condition();
    if default.is_placeholder() {
        println!("Default: {}", "not set".yellow());
    } else {
        let state = if default.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        };
        println!("Default: {} ({})", default.input_source.id, state);
    }
}

fn set_enabled(
    settings: &SettingsStore,
    store: &mut ConditionStore,
    app_id: &str,
    enabled: bool,
) -> Result<()> {
    if store.toggle(app_id, enabled) {
        save(settings, store)?;
        let verb = if enabled { "Enabled:" } else { "Disabled:" };
        println!("{} {}", verb.green(), app_id);
    } else {
        println!("{} {}", "No condition for".yellow(), app_id);
    }
    Ok(())
}

fn save(settings: &SettingsStore, store: &ConditionStore) -> Result<()> {
    settings
        .save(&store.snapshot())
        .with_context(|| format!("failed to write {}", settings.path().display()))
}
