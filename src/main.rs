use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};

use atletiq::config::EngineConfig;
use atletiq::snapshot::{Snapshot, SnapshotKey, global_cache};
use atletiq::source::{JsonDirSource, load_season_with_fallback};

const USAGE: &str = "usage: atletiq [--data=DIR] [--season=YEAR] <command>

commands:
  teams
  table
  predict <home> <away>
  simulate [--round=N] [--runs=N] [--seed=N] [--json]
  h2h <first> <second>";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();
    let Some((&command, rest)) = positional.split_first() else {
        eprintln!("{USAGE}");
        bail!("missing command");
    };

    let mut cfg = EngineConfig::from_env();
    if let Some(runs) = parse_arg::<usize>(&args, "--runs=")? {
        cfg.simulation.runs = runs.max(1);
    }
    if let Some(seed) = parse_arg::<u64>(&args, "--seed=")? {
        cfg.simulation.seed = Some(seed);
    }

    let data_dir = arg_value(&args, "--data=")
        .map(PathBuf::from)
        .or_else(|| std::env::var("MATCH_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));
    let season = parse_arg::<i32>(&args, "--season=")?.unwrap_or_else(|| Utc::now().year());

    let source = JsonDirSource::new(&data_dir);
    let loaded = load_season_with_fallback(&source, season)
        .with_context(|| format!("loading matches from {}", data_dir.display()))?;
    let key = SnapshotKey::now(loaded.season);
    let snapshot = global_cache().get_or_build(&key, &cfg, move || Ok(loaded.matches))?;
    if snapshot.key().season != season {
        println!("note: season {season} unavailable, using {}", snapshot.key().season);
    }

    match (command, rest) {
        ("teams", []) => {
            for team in snapshot.teams() {
                println!("{team}");
            }
        }
        ("table", []) => print_known_table(&snapshot),
        ("predict", [home, away]) => {
            let p = snapshot.predict(home, away)?;
            println!("{home} vs {away}");
            println!("  home win  {:>5.1}%", p.home_win * 100.0);
            println!("  draw      {:>5.1}%", p.draw * 100.0);
            println!("  away win  {:>5.1}%", p.away_win * 100.0);
        }
        ("simulate", []) => {
            let target = parse_arg::<u32>(&args, "--round=")?.unwrap_or(cfg.simulation.max_round);
            let projected = snapshot.simulate(target)?;
            if has_flag(&args, "--json") {
                let raw = serde_json::to_string_pretty(&projected).context("serialize table")?;
                println!("{raw}");
            } else {
                println!(
                    "round {} projection ({} runs, {} fixtures simulated)",
                    projected.target_round, projected.runs, projected.simulated_fixtures
                );
                println!("{:>3}  {:<24} {:>6} {:>6} {:>6} {:>7}", "#", "team", "pts", "gd", "gf", "E[pos]");
                for (i, row) in projected.rows.iter().enumerate() {
                    println!(
                        "{:>3}  {:<24} {:>6.1} {:>6.1} {:>6.1} {:>7.2}",
                        i + 1,
                        row.team,
                        row.points,
                        row.goal_difference,
                        row.goals_for,
                        row.expected_position
                    );
                }
            }
        }
        ("h2h", [first, second]) => {
            let h = snapshot.head_to_head(first, second)?;
            println!(
                "{first} {} - {} draws - {} {second} ({} played)",
                h.wins_first, h.draws, h.wins_second, h.total
            );
            for m in &h.matches {
                let date = m.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
                let (hg, ag) = m.score().unwrap_or_default();
                println!("  {date}  R{:<2} {} {hg}-{ag} {}", m.round, m.home, m.away);
            }
        }
        _ => {
            eprintln!("{USAGE}");
            bail!("unrecognised command: {}", positional.join(" "));
        }
    }
    Ok(())
}

fn print_known_table(snapshot: &Snapshot) {
    let table = snapshot.known_table();
    println!("after round {}", snapshot.current_round());
    println!("{:>3}  {:<24} {:>3} {:>4} {:>4}", "#", "team", "p", "pts", "gd");
    for (i, row) in table.rows.iter().enumerate() {
        println!(
            "{:>3}  {:<24} {:>3} {:>4} {:>4}",
            i + 1,
            row.team,
            row.played,
            row.points,
            row.goal_difference
        );
    }
}

fn arg_value<'a>(args: &'a [String], prefix: &str) -> Option<&'a str> {
    args.iter()
        .find_map(|a| a.strip_prefix(prefix))
        .filter(|v| !v.trim().is_empty())
}

fn parse_arg<T>(args: &[String], prefix: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    arg_value(args, prefix)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {prefix}{v}"))
        })
        .transpose()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
