//! modelcfg CLI: inspect, edit, validate, push and save the training config.
//!
//! Commands:
//! - `show` / `params` / `features` / `layers list`: print the selected node
//! - `set-param`, `reset-params`, `set-feature`, `reset-features`, `layers ...`: edit and save
//! - `push`: copy sections of the selected node to other timeframes
//! - `validate`: report document issues (exit code 1 when any)
//! - `download`: write the server's config file to disk
//! - `blocks`: list the blocks a model family offers, with their parameters
//!
//! Edits are saved through the config server unless `--dry-run` is given. A
//! document with validation issues is not saved unless `--force` is given.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modelcfg_core::architecture::{block_library, schema_for};
use modelcfg_core::features::{orphan_overlays, OverlayField, OverlayPatch, PRESCALERS, SCALERS};
use modelcfg_core::hyperparams::{label, InputKind, Level};
use modelcfg_core::{ModelType, Section, Timeframe};
use modelcfg_session::settings::SETTINGS_FILE;
use modelcfg_session::{ClientSettings, ConfigStore, EditSession, HttpConfigStore, Selection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "modelcfg",
    about = "modelcfg: edit the multi-timeframe training configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file. Missing file means defaults.
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    config: PathBuf,

    /// Config server URL, overrides the settings file.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Timeframe to operate on. Defaults to the first one in the document.
    #[arg(long, global = true)]
    tf: Option<String>,

    /// Model family to operate on. Defaults to the first one in the timeframe.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Apply edits locally and print the result without saving.
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    /// Save even when the edited document has validation issues.
    #[arg(long, global = true, default_value_t = false)]
    force: bool,

    /// Debug logging (same as RUST_LOG=debug).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print hyperparameters, features and layers of the selection.
    Show,
    /// Print effective hyperparameters and which level supplies each.
    Params,
    /// Print feature rows grouped by catalog group.
    Features,
    /// Override a hyperparameter. An empty VALUE removes the override.
    SetParam { key: String, value: String },
    /// Remove every hyperparameter override of the selection.
    ResetParams,
    /// Enable/disable a feature or override its fields.
    SetFeature {
        name: String,

        #[arg(long)]
        enabled: Option<bool>,

        /// FIELD=VALUE, repeatable. Fields: callback_params, prescaler,
        /// prescaler_params, scaler, scaler_params. An empty VALUE clears the field.
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },
    /// Replace the selection's overlays with catalog defaults.
    ResetFeatures,
    /// Architecture builder commands.
    Layers {
        #[command(subcommand)]
        action: LayerAction,
    },
    /// Copy sections of the selection to other timeframes (same model).
    Push {
        /// Destination timeframes, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,

        /// Sections to copy: hyperparameters, features, architecture (alias: model).
        #[arg(long, value_delimiter = ',', default_value = "hyperparameters,features,architecture")]
        sections: Vec<String>,

        /// Don't ask for confirmation.
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
    /// Validate the stored document.
    Validate,
    /// Download the server's config file.
    Download {
        #[arg(long, default_value = "config.yaml")]
        out: PathBuf,
    },
    /// List blocks offered for the selected model family.
    Blocks,
}

#[derive(Subcommand)]
enum LayerAction {
    /// Print the layer pipeline.
    List,
    /// Add a block (appended unless --at is given).
    Add {
        block_type: String,
        #[arg(long)]
        at: Option<usize>,
    },
    /// Move the layer at FROM to position TO.
    Move { from: usize, to: usize },
    /// Remove the layer at INDEX.
    Remove { index: usize },
    /// Set a parameter of the layer at INDEX.
    Set {
        index: usize,
        key: String,
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = ClientSettings::load(&cli.config)?;
    if let Some(url) = &cli.base_url {
        settings = settings.with_base_url(url.clone());
    }
    let store = HttpConfigStore::new(&settings)?;
    debug!(base_url = store.base_url(), "using config server");

    if let Commands::Download { out } = &cli.command {
        return run_download(&store, out);
    }

    let mut session = EditSession::load(&store)?;
    select(&mut session, cli.tf.as_deref(), cli.model.as_deref())?;

    let edited = match cli.command {
        Commands::Show => {
            print_params(&session)?;
            println!();
            print_features(&session)?;
            println!();
            print_layers(&session);
            false
        }
        Commands::Params => {
            print_params(&session)?;
            false
        }
        Commands::Features => {
            print_features(&session)?;
            false
        }
        Commands::Blocks => {
            print_blocks(&session)?;
            false
        }
        Commands::Validate => return run_validate(&session),
        Commands::Download { out } => return run_download(&store, &out),
        Commands::SetParam { key, value } => {
            if value.trim().is_empty() {
                session.clear_hyperparameter(&key)?;
            } else {
                session.set_hyperparameter(&key, Value::String(value))?;
            }
            true
        }
        Commands::ResetParams => {
            session.reset_hyperparameters()?;
            true
        }
        Commands::SetFeature {
            name,
            enabled,
            fields,
        } => {
            run_set_feature(&mut session, &name, enabled, &fields)?;
            true
        }
        Commands::ResetFeatures => {
            session.reset_features()?;
            true
        }
        Commands::Layers { action } => run_layers(&mut session, action)?,
        Commands::Push { to, sections, yes } => {
            run_push(&mut session, to, sections, yes)?;
            true
        }
    };

    if edited {
        finish(&mut session, &store, cli.dry_run, cli.force)?;
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Apply `--tf`/`--model` on top of the session's default selection.
fn select(session: &mut EditSession, tf: Option<&str>, model: Option<&str>) -> Result<()> {
    if tf.is_none() && model.is_none() {
        if session.selection().is_none() {
            bail!("the document has no timeframes; pass --tf and --model");
        }
        return Ok(());
    }

    let timeframe = match tf {
        Some(tf) => Timeframe::from(tf),
        None => match session.selection() {
            Some(s) => s.timeframe.clone(),
            None => bail!("--tf is required: the document has no timeframes"),
        },
    };
    let model = match model {
        Some(model) => ModelType::from(model),
        None => match session
            .document()
            .timeframes
            .get(&timeframe)
            .and_then(|models| models.keys().next())
        {
            Some(model) => model.clone(),
            None => bail!("timeframe {timeframe} has no models; pass --model"),
        },
    };
    session.select(Selection::new(timeframe, model));
    Ok(())
}

fn finish(
    session: &mut EditSession,
    store: &HttpConfigStore,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    if !session.is_dirty() {
        println!("No changes.");
        return Ok(());
    }
    if dry_run {
        print_selection_node(session)?;
        println!("Dry run: not saved.");
        return Ok(());
    }
    if force {
        session.save(store)?;
    } else {
        session
            .save_validated(store)
            .context("not saved (use --force to save anyway)")?;
    }
    println!("Saved (updated {}).", session.document().updated);
    Ok(())
}

fn run_set_feature(
    session: &mut EditSession,
    name: &str,
    enabled: Option<bool>,
    fields: &[String],
) -> Result<()> {
    if enabled.is_none() && fields.is_empty() {
        bail!("nothing to change: pass --enabled and/or --set FIELD=VALUE");
    }
    if let Some(enabled) = enabled {
        session.upsert_feature(name, &OverlayPatch::new().enabled(enabled))?;
    }
    for assignment in fields {
        let Some((field, raw)) = assignment.split_once('=') else {
            bail!("expected FIELD=VALUE, got '{assignment}'");
        };
        let field: OverlayField = field.trim().parse().map_err(anyhow::Error::msg)?;
        let known: &[&str] = match field {
            OverlayField::Prescaler => PRESCALERS,
            OverlayField::Scaler => SCALERS,
            _ => &[],
        };
        let value = raw.trim();
        if !known.is_empty() && !value.is_empty() && !known.contains(&value) {
            info!(field = field.as_str(), value, "not a known option; storing verbatim");
        }
        session.set_feature_text(name, field, raw)?;
    }
    Ok(())
}

fn run_layers(session: &mut EditSession, action: LayerAction) -> Result<bool> {
    match action {
        LayerAction::List => {
            print_layers(session);
            Ok(false)
        }
        LayerAction::Add { block_type, at } => {
            if schema_for(&block_type).is_none() {
                info!(
                    block_type = %block_type,
                    "block type has no schema; adding with empty params"
                );
            }
            session.add_layer(&block_type, at)?;
            Ok(true)
        }
        LayerAction::Move { from, to } => {
            session.move_layer(from, to)?;
            Ok(true)
        }
        LayerAction::Remove { index } => {
            let id = layer_id(session, index)?;
            session.remove_layer(id)?;
            Ok(true)
        }
        LayerAction::Set { index, key, value } => {
            let id = layer_id(session, index)?;
            session.set_layer_param(id, &key, Value::String(value))?;
            Ok(true)
        }
    }
}

fn layer_id(session: &EditSession, index: usize) -> Result<modelcfg_core::LayerId> {
    let nodes = session.builder().nodes();
    match nodes.get(index) {
        Some(node) => Ok(node.id),
        None => bail!("no layer at index {index} ({} layers)", nodes.len()),
    }
}

fn run_push(
    session: &mut EditSession,
    to: Vec<String>,
    sections: Vec<String>,
    yes: bool,
) -> Result<()> {
    let destinations: Vec<Timeframe> = to.iter().map(|tf| Timeframe::from(tf.trim())).collect();
    let sections = sections
        .iter()
        .map(|s| s.parse::<Section>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut confirmer = |message: &str| yes || prompt(message);
    session.push_selection(destinations, sections, &mut confirmer)?;
    Ok(())
}

fn prompt(message: &str) -> bool {
    eprint!("{message} [y/N] ");
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn run_validate(session: &EditSession) -> Result<()> {
    let issues = session.load_issues();
    if issues.is_empty() {
        println!("No issues.");
        return Ok(());
    }
    for issue in issues {
        println!("{issue}");
    }
    eprintln!("{} issue(s)", issues.len());
    std::process::exit(1);
}

fn run_download(store: &HttpConfigStore, out: &Path) -> Result<()> {
    let bytes = store.download()?;
    std::fs::write(out, &bytes).with_context(|| format!("write {}", out.display()))?;
    println!("Wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

// ─── Printing ───────────────────────────────────────────────────────

fn print_selection_node(session: &EditSession) -> Result<()> {
    let Some(selection) = session.selection() else {
        return Ok(());
    };
    let node = session
        .document()
        .model_config(&selection.timeframe, &selection.model)
        .cloned()
        .unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&node)?);
    Ok(())
}

fn print_params(session: &EditSession) -> Result<()> {
    let params = session.hyperparameters()?;
    if let Some(s) = session.selection() {
        println!("Hyperparameters for {}/{}:", s.timeframe, s.model);
    }
    for entry in params.iter() {
        let level = match entry.level {
            Level::Default => "default",
            Level::Model => "model",
            Level::Override => "override",
        };
        let hint = input_hint(InputKind::for_param(&entry.key, &entry.value));
        println!(
            "  {:<24} {:<28} {:<10} {hint}",
            label(&entry.key),
            entry.value.to_string(),
            format!("[{level}]"),
        );
    }
    Ok(())
}

fn input_hint(kind: InputKind) -> String {
    match kind {
        InputKind::Boolean => "bool".to_string(),
        InputKind::Text => "text".to_string(),
        InputKind::Structured => "json".to_string(),
        InputKind::Number { step, min, max } => match (min, max) {
            (Some(min), Some(max)) => format!("number step {step} in [{min}, {max}]"),
            _ => format!("number step {step}"),
        },
    }
}

fn print_features(session: &EditSession) -> Result<()> {
    for group in session.feature_groups()? {
        println!("{}:", group.name);
        for row in &group.rows {
            let mark = if row.enabled { "x" } else { " " };
            let overridden: Vec<&str> = row.overridden.iter().map(|f| f.as_str()).collect();
            let scaler = row.scaler.as_deref().unwrap_or("-");
            let prescaler = row.prescaler.as_deref().unwrap_or("-");
            print!("  [{mark}] {:<20} prescaler={prescaler:<12} scaler={scaler:<16}", row.name);
            if overridden.is_empty() {
                println!();
            } else {
                println!(" overrides: {}", overridden.join(", "));
            }
        }
    }
    if let Some(s) = session.selection() {
        let orphans = orphan_overlays(session.document(), &s.timeframe, &s.model);
        if !orphans.is_empty() {
            println!("Not in catalog (ignored): {}", orphans.join(", "));
        }
    }
    Ok(())
}

fn print_layers(session: &EditSession) {
    let builder = session.builder();
    if builder.is_empty() {
        println!("No layers.");
        return;
    }
    for (i, node) in builder.nodes().iter().enumerate() {
        let params = serde_json::to_string(&node.params).unwrap_or_default();
        let marker = if node.has_schema() { "" } else { " (no schema)" };
        println!("  {i:>2}. {}{marker} {params}", node.layer_type);
    }
}

fn print_blocks(session: &EditSession) -> Result<()> {
    let Some(selection) = session.selection() else {
        bail!("no model selected");
    };
    let library = block_library(&selection.model);
    if library.is_empty() {
        println!("Model family {} offers no blocks.", selection.model);
        return Ok(());
    }
    for block in library {
        let params: Vec<String> = schema_for(block)
            .map(|schema| {
                schema
                    .params
                    .iter()
                    .map(|p| format!("{}:{}={}", p.name, p.kind, p.default.to_value()))
                    .collect()
            })
            .unwrap_or_default();
        println!("  {block:<24} {}", params.join(" "));
    }
    Ok(())
}
