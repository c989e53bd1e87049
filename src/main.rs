use anyhow::{Result, anyhow};

use prepscout::{AggregatorConfig, ProgramAggregator, ProgramDataParams};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let team = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow!("usage: prepscout <team name> [--stat-path=...] [--board=...] [--secondary-board=...] [--season=...] [--schedule] [--roster] [--recruiting] [--raw] [--force-refresh]"))?;

    let params = ProgramDataParams {
        team,
        season: flag_value(&args, "--season"),
        stat_site_path: flag_value(&args, "--stat-path"),
        primary_board_slug: flag_value(&args, "--board"),
        secondary_board_slug: flag_value(&args, "--secondary-board"),
        include_schedule: has_flag(&args, "--schedule"),
        include_player_stats: has_flag(&args, "--roster"),
        include_recruiting: has_flag(&args, "--recruiting"),
        include_raw: has_flag(&args, "--raw"),
        force_refresh: has_flag(&args, "--force-refresh"),
    };

    let aggregator = ProgramAggregator::new(&AggregatorConfig::from_env());
    let record = aggregator.program_data(&params)?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if !record.errors.is_empty() {
        eprintln!("{} source error(s):", record.errors.len());
        for err in record.errors.iter().take(8) {
            eprintln!(" - [{}] {}", err.source.as_str(), err.message);
        }
    }

    Ok(())
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.starts_with("--")
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}
