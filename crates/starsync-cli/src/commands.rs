use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use starsync_coordinator::{ConflictPrompt, SnapshotCoordinator};
use starsync_store::{FsSlotStore, OpenTarget};
use starsync_types::{MetadataChange, RevisionMetadata, SaveGame, SlotName};

use crate::cli::*;
use crate::config::CliConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(&cli)?;
    let root = config.store_root();
    let store = Arc::new(
        FsSlotStore::open(&root).with_context(|| format!("opening store at {}", root.display()))?,
    );
    debug!(root = %root.display(), config = ?config.coordinator, "starting");

    let (coordinator, prompts) = SnapshotCoordinator::from_config(store.clone(), config.coordinator);
    if let Some(prompts) = prompts {
        tokio::spawn(answer_prompts(prompts));
    }

    let format = cli.format;
    match cli.command {
        Command::Load(args) => cmd_load(&coordinator, args, format).await,
        Command::Save(args) => cmd_save(&coordinator, args, format).await,
        Command::List(args) => cmd_list(&coordinator, args, format).await,
        Command::Delete(args) => cmd_delete(&coordinator, args).await,
        Command::PushDivergent(args) => cmd_push_divergent(&store, args, format),
    }
}

async fn cmd_load(
    coordinator: &SnapshotCoordinator,
    args: LoadArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let target = if args.existing {
        OpenTarget::existing(args.slot.clone())
    } else {
        OpenTarget::name(args.slot.clone())
    };
    let save = coordinator.load(target).await?;
    match format {
        OutputFormat::Json => println!("{}", save_json(&save)?),
        OutputFormat::Text => print_grid(&args.slot, &save),
    }
    Ok(())
}

async fn cmd_save(
    coordinator: &SnapshotCoordinator,
    args: SaveArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let slot = args.slot.unwrap_or_else(SlotName::generate);
    let save = build_save(&args.stars)?;

    let mut change = MetadataChange::new();
    if let Some(description) = args.description {
        change = change.with_description(description);
    }
    if let Some(ms) = args.played_time_ms {
        change = change.with_played_time_ms(ms);
    }

    let meta = coordinator.save(slot, &save, Some(change)).await?;
    print_revision("Saved", &meta, format)
}

async fn cmd_list(
    coordinator: &SnapshotCoordinator,
    args: ListArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let slots = coordinator.list(&args.prefix).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&slots)?);
        return Ok(());
    }
    if slots.is_empty() {
        println!("No slots.");
    }
    for meta in &slots {
        println!(
            "{:<24} {} {:>4}★  {}  {}",
            meta.slot.as_str().bold(),
            meta.revision_id.short_id().dimmed(),
            meta.progress_value.unwrap_or(0).to_string().yellow(),
            meta.last_modified.format("%Y-%m-%d %H:%M:%S"),
            meta.description,
        );
    }
    Ok(())
}

async fn cmd_delete(coordinator: &SnapshotCoordinator, args: DeleteArgs) -> anyhow::Result<()> {
    coordinator.delete(&args.slot).await?;
    println!("Deleted slot {}", args.slot.as_str().yellow());
    Ok(())
}

fn cmd_push_divergent(
    store: &FsSlotStore,
    args: PushDivergentArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let save = build_save(&args.stars)?;
    let description = args
        .description
        .unwrap_or_else(|| format!("Divergent data at: {}", Utc::now().to_rfc3339()));
    let change = MetadataChange::new()
        .with_description(description)
        .with_progress_value(save.total_stars());
    let meta = store.push_divergent(&args.slot, save.serialize(), change)?;
    print_revision("Pushed divergent", &meta, format)
}

/// Ask on the terminal which candidate to keep, once per conflict.
async fn answer_prompts(mut prompts: mpsc::Receiver<ConflictPrompt>) {
    while let Some(prompt) = prompts.recv().await {
        eprintln!(
            "{} slot {} has conflicting revisions (attempt {})",
            "!".red().bold(),
            prompt.slot.as_str().bold(),
            prompt.retry
        );
        eprintln!("  [1] {}", describe(&prompt.current));
        eprintln!("  [2] {}", describe(&prompt.conflicting));
        eprint!("Keep which revision? [1/2] ");

        let choice = tokio::task::spawn_blocking(read_choice).await.ok().flatten();
        let answered = match choice {
            Some(1) => prompt.choose_current(),
            Some(2) => prompt.choose_conflicting(),
            _ => {
                eprintln!("No choice made, abandoning.");
                false
            }
        };
        if !answered {
            warn!("conflict prompt was not answered");
        }
    }
}

fn read_choice() -> Option<u8> {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    line.trim().parse().ok()
}

fn describe(meta: &RevisionMetadata) -> String {
    format!(
        "{} {}★ {} {}",
        meta.revision_id.short_id().dimmed(),
        meta.progress_value.unwrap_or(0),
        meta.last_modified.format("%Y-%m-%d %H:%M:%S"),
        meta.description
    )
}

fn save_json(save: &SaveGame) -> anyhow::Result<String> {
    let value: serde_json::Value = serde_json::from_slice(&save.serialize())?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn print_grid(slot: &SlotName, save: &SaveGame) {
    println!("Slot {}", slot.as_str().bold());
    if save.is_empty() {
        println!("  (no progress)");
        return;
    }
    let mut world = None;
    for (key, stars) in save.levels() {
        if world != Some(key.world) {
            world = Some(key.world);
            println!("  World {}", key.world.to_string().cyan());
        }
        let filled = "★".repeat(stars as usize);
        let empty = "☆".repeat((starsync_types::MAX_STARS - stars) as usize);
        println!("    {:>3}  {}{}", key.level, filled.yellow(), empty.dimmed());
    }
    println!("  Total: {}", save.total_stars().to_string().bold());
}

fn print_revision(verb: &str, meta: &RevisionMetadata, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(meta)?),
        OutputFormat::Text => {
            println!("{} {} {}", "✓".green().bold(), verb, meta.slot.as_str().yellow());
            println!("  Revision: {}", meta.revision_id.to_string().cyan());
            println!("  Progress: {}★", meta.progress_value.unwrap_or(0));
            println!("  {}", meta.description);
        }
    }
    Ok(())
}
