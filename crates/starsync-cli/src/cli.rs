use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use starsync_types::{LevelKey, SaveGame, SlotName, TypeResult};

#[derive(Parser, Debug)]
#[command(
    name = "starsync",
    about = "starsync: conflict-safe star progress snapshots",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the slot store
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum conflict resolution attempts per request
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Ask which revision to keep instead of merging conflicts
    #[arg(long, global = true)]
    pub manual: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the star grid stored in a slot
    Load(LoadArgs),
    /// Record stars into a slot, keeping the best result per level
    Save(SaveArgs),
    /// List slots
    List(ListArgs),
    /// Delete a slot
    Delete(DeleteArgs),
    /// Commit a revision as another device would, creating a conflict
    PushDivergent(PushDivergentArgs),
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    pub slot: SlotName,
    /// Fail instead of returning an empty save for unknown slots
    #[arg(long)]
    pub existing: bool,
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Slot to write; a temporary name is generated if omitted
    pub slot: Option<SlotName>,
    /// Star ratings as WORLD-LEVEL=STARS
    #[arg(long = "set", value_parser = parse_star, required = true)]
    pub stars: Vec<(LevelKey, u8)>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub played_time_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(default_value = "")]
    pub prefix: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub slot: SlotName,
}

#[derive(Args, Debug)]
pub struct PushDivergentArgs {
    pub slot: SlotName,
    /// Star ratings as WORLD-LEVEL=STARS
    #[arg(long = "set", value_parser = parse_star)]
    pub stars: Vec<(LevelKey, u8)>,
    #[arg(short, long)]
    pub description: Option<String>,
}

/// Parse `W-L=S`, e.g. `1-2=3`.
pub fn parse_star(s: &str) -> Result<(LevelKey, u8), String> {
    let (key, stars) = s
        .split_once('=')
        .ok_or_else(|| format!("expected WORLD-LEVEL=STARS, got `{s}`"))?;
    let key: LevelKey = key.trim().parse().map_err(|e| format!("{e}"))?;
    let stars: u8 = stars
        .trim()
        .parse()
        .map_err(|_| format!("invalid star count `{stars}`"))?;
    Ok((key, stars))
}

/// Build a save from parsed `--set` values. Later values for the same level win.
pub fn build_save(stars: &[(LevelKey, u8)]) -> TypeResult<SaveGame> {
    let mut save = SaveGame::new();
    for (key, value) in stars {
        save.set_stars(key.world, key.level, *value)?;
    }
    Ok(save)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_star_assignments() {
        let (key, stars) = parse_star("2-7=4").unwrap();
        assert_eq!((key.world, key.level, stars), (2, 7, 4));
        assert!(parse_star("2-7").is_err());
        assert!(parse_star("0-1=3").is_err());
        assert!(parse_star("1-1=many").is_err());
    }

    #[test]
    fn build_save_rejects_out_of_range_stars() {
        let (key, _) = parse_star("1-1=1").unwrap();
        assert!(build_save(&[(key, 9)]).is_err());
        let save = build_save(&[(key, 2), (key, 1)]).unwrap();
        assert_eq!(save.stars_for(1, 1), 1);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "starsync", "save", "p1", "--set", "1-1=3", "--set", "1-2=2", "--max-retries", "7",
            "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.max_retries, Some(7));
        assert_eq!(cli.format, OutputFormat::Json);
        let Command::Save(args) = cli.command else {
            panic!("expected save")
        };
        assert_eq!(args.slot.unwrap().as_str(), "p1");
        assert_eq!(args.stars.len(), 2);
    }

    #[test]
    fn rejects_invalid_slot_names() {
        assert!(Cli::try_parse_from(["starsync", "load", "bad/name"]).is_err());
        assert!(Cli::try_parse_from(["starsync", "save", "p1"]).is_err());
    }
}
