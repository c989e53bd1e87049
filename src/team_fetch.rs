use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::extract::{
    StateLocation, extract_linked_data, extract_structured_state, normalize_text, parse_number,
    pick_string, pick_u32, run_chain, run_chain_opt, table_rows, to_date,
};
use crate::fetch::Fetcher;
use crate::state::{
    GameScore, RecordLine, RosterPlayer, ScheduleGame, SourceId, TeamEnvelope, TeamProfile,
    TeamRankings, TeamRecord,
};
use crate::util::{deep_find_all, deep_find_first};

/// Embedded-state locations the stats site has been observed to use, newest
/// frontend first.
pub const STATE_LOCATIONS: &[StateLocation] = &[
    StateLocation::HydrationVar("__PREP_STATE__"),
    StateLocation::ScriptId("team-data"),
];

const STAT_LABELS: &[(&str, &str)] = &[
    ("Points Per Game", "points_per_game"),
    ("Points Allowed Per Game", "points_allowed_per_game"),
    ("Total Yards Per Game", "total_yards_per_game"),
    ("Passing Yards Per Game", "passing_yards_per_game"),
    ("Rushing Yards Per Game", "rushing_yards_per_game"),
    ("Turnover Margin", "turnover_margin"),
];

static H1_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("h1 regex"));

static RECORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)(?:\s*-\s*(\d+))?").expect("record regex"));

static NEWS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)class="[^"]*(?:headline|news-item)[^"]*"[^>]*>(.*?)<"#).expect("news regex")
});

#[derive(Debug, Clone, Default)]
pub struct TeamFetchOptions {
    pub include_schedule: bool,
    pub include_player_stats: bool,
    pub include_raw: bool,
}

/// Adapter for the program-stats site: team profile, season stats, and
/// optionally schedule and roster documents.
pub struct TeamSiteClient {
    fetcher: Arc<dyn Fetcher>,
}

impl TeamSiteClient {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Best-effort retrieval: fetch and extraction failures are recorded in
    /// the envelope's error list, never propagated. The only hard error is a
    /// missing team path, which is caller misuse.
    pub fn fetch_team_data(&self, path: &str, opts: &TeamFetchOptions) -> Result<TeamEnvelope> {
        let path = path.trim();
        if path.is_empty() {
            bail!("team path is required");
        }

        let mut envelope = TeamEnvelope {
            source: SourceId::StatSite,
            fetched_at: Utc::now(),
            profile: TeamProfile::default(),
            stats: BTreeMap::new(),
            schedule: Vec::new(),
            roster: Vec::new(),
            notes: Vec::new(),
            raw: None,
            errors: Vec::new(),
        };

        match self.fetcher.fetch_html(path) {
            Ok(html) => {
                let state = extract_structured_state(&html, STATE_LOCATIONS);
                if opts.include_raw {
                    envelope.raw = state.clone();
                }
                envelope.profile = extract_team_profile(&html, state.as_ref()).unwrap_or_default();
                if envelope.profile.is_empty() {
                    envelope.errors.push("no team profile extracted".to_string());
                }
                envelope.stats = extract_team_stats(&html, state.as_ref());
                envelope.notes = extract_notes(&html);
            }
            Err(err) => envelope.errors.push(format!("team page fetch failed: {err}")),
        }

        if opts.include_schedule {
            match self.fetcher.fetch_html(&format!("{path}/schedule")) {
                Ok(html) => {
                    let state = extract_structured_state(&html, STATE_LOCATIONS);
                    envelope.schedule = extract_schedule(&html, state.as_ref());
                    if envelope.schedule.is_empty() {
                        envelope.errors.push("no schedule entries extracted".to_string());
                    }
                }
                Err(err) => envelope.errors.push(format!("schedule fetch failed: {err}")),
            }
        }

        if opts.include_player_stats {
            match self.fetcher.fetch_html(&format!("{path}/roster")) {
                Ok(html) => {
                    let state = extract_structured_state(&html, STATE_LOCATIONS);
                    envelope.roster = extract_roster(&html, state.as_ref());
                    if envelope.roster.is_empty() {
                        envelope.errors.push("no roster entries extracted".to_string());
                    }
                }
                Err(err) => envelope.errors.push(format!("roster fetch failed: {err}")),
            }
        }

        Ok(envelope)
    }
}

/// Profile strategy chain: embedded state, then ld+json, then raw markup.
pub fn extract_team_profile(html: &str, state: Option<&Value>) -> Option<TeamProfile> {
    run_chain_opt(vec![
        Box::new(|| state.and_then(profile_from_state)),
        Box::new(|| profile_from_linked_data(&extract_linked_data(html))),
        Box::new(|| profile_from_html(html)),
    ])
}

pub fn profile_from_state(state: &Value) -> Option<TeamProfile> {
    let node = deep_find_first(state, &|v| {
        v.is_object()
            && pick_string(v, &["name", "teamName", "schoolName"]).is_some()
            && (v.get("mascot").is_some()
                || v.get("classification").is_some()
                || v.get("record").is_some()
                || v.get("coach").is_some())
    })?;

    let mut profile = TeamProfile {
        name: pick_string(node, &["name", "teamName", "schoolName"]),
        mascot: pick_string(node, &["mascot", "nickname"]),
        classification: pick_string(node, &["classification", "division", "class"]),
        district: pick_string(node, &["district", "region", "conference"]),
        location: pick_string(node, &["location", "city", "cityState"]),
        coach: node
            .get("coach")
            .and_then(|c| pick_string(c, &["name", "fullName"]))
            .or_else(|| pick_string(node, &["coach", "headCoach"])),
        record: TeamRecord::default(),
        rankings: TeamRankings::default(),
    };

    if let Some(record) = node.get("record") {
        profile.record = TeamRecord {
            overall: record_line_from_value(record.get("overall").unwrap_or(record)),
            district: record.get("district").and_then(record_line_from_value),
            home: record.get("home").and_then(record_line_from_value),
            away: record.get("away").and_then(record_line_from_value),
        };
    }
    if let Some(rankings) = node.get("rankings") {
        profile.rankings = TeamRankings {
            state: pick_u32(rankings, &["state", "stateRank"]),
            national: pick_u32(rankings, &["national", "nationalRank"]),
        };
    }

    if profile.is_empty() { None } else { Some(profile) }
}

pub fn profile_from_linked_data(docs: &[Value]) -> Option<TeamProfile> {
    let doc = docs.iter().find(|doc| {
        pick_string(doc, &["@type"])
            .is_some_and(|t| matches!(t.as_str(), "SportsTeam" | "Organization" | "HighSchool"))
    })?;

    let location = doc.get("address").and_then(|addr| {
        let city = pick_string(addr, &["addressLocality"]);
        let region = pick_string(addr, &["addressRegion"]);
        match (city, region) {
            (Some(city), Some(region)) => Some(format!("{city}, {region}")),
            (Some(city), None) => Some(city),
            (None, region) => region,
        }
    });

    let profile = TeamProfile {
        name: pick_string(doc, &["name"]),
        mascot: pick_string(doc, &["alternateName"]),
        location,
        coach: doc
            .get("coach")
            .and_then(|c| pick_string(c, &["name"])),
        ..TeamProfile::default()
    };
    if profile.is_empty() { None } else { Some(profile) }
}

pub fn profile_from_html(html: &str) -> Option<TeamProfile> {
    let name = H1_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| normalize_text(m.as_str()));

    let profile = TeamProfile {
        name,
        mascot: labeled_text(html, "Mascot"),
        classification: labeled_text(html, "Classification"),
        district: labeled_text(html, "District"),
        location: labeled_text(html, "Location"),
        coach: labeled_text(html, "Head Coach"),
        record: TeamRecord {
            overall: labeled_text(html, "Overall").and_then(|s| record_line_from_text(&s)),
            district: labeled_text(html, "District Record").and_then(|s| record_line_from_text(&s)),
            ..TeamRecord::default()
        },
        ..TeamProfile::default()
    };
    if profile.is_empty() { None } else { Some(profile) }
}

/// Season stats: embedded-state stat node first, labeled markup second.
pub fn extract_team_stats(html: &str, state: Option<&Value>) -> BTreeMap<String, f64> {
    if let Some(state) = state {
        let stats = stats_from_state(state);
        if !stats.is_empty() {
            return stats;
        }
    }
    stats_from_html(html)
}

pub fn stats_from_state(state: &Value) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let Some(node) = deep_find_first(state, &|v| {
        v.is_object()
            && ["pointsPerGame", "ppg", "pointsAllowedPerGame", "totalYardsPerGame"]
                .iter()
                .any(|key| v.get(*key).is_some())
    }) else {
        return out;
    };
    if let Some(map) = node.as_object() {
        for (key, value) in map {
            let num = value
                .as_f64()
                .or_else(|| value.as_str().and_then(parse_number));
            if let Some(num) = num {
                out.insert(snake_case(key), num);
            }
        }
    }
    out
}

pub fn stats_from_html(html: &str) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (label, key) in STAT_LABELS {
        if let Some(text) = labeled_text(html, label)
            && let Some(num) = parse_number(&text)
        {
            out.insert((*key).to_string(), num);
        }
    }
    out
}

/// Schedule strategy chain: embedded-state game nodes, then table scraping.
pub fn extract_schedule(html: &str, state: Option<&Value>) -> Vec<ScheduleGame> {
    run_chain(vec![
        Box::new(|| state.map(schedule_from_state).unwrap_or_default()),
        Box::new(|| schedule_from_table(html)),
    ])
}

pub fn schedule_from_state(state: &Value) -> Vec<ScheduleGame> {
    deep_find_all(state, &|v| {
        v.is_object()
            && pick_string(v, &["opponent", "opponentName"]).is_some()
            && pick_string(v, &["date", "gameDate", "kickoff"]).is_some()
    })
    .into_iter()
    .filter_map(game_from_value)
    .collect()
}

fn game_from_value(node: &Value) -> Option<ScheduleGame> {
    let opponent = pick_string(node, &["opponent", "opponentName"])?;
    let home = node
        .get("home")
        .and_then(|v| v.as_bool())
        .or_else(|| pick_string(node, &["homeAway", "site"]).map(|s| s.eq_ignore_ascii_case("home")));
    let score = node.get("score").unwrap_or(&Value::Null);
    Some(ScheduleGame {
        id: pick_string(node, &["id", "gameId"]),
        date: pick_string(node, &["date", "gameDate", "kickoff"]).and_then(|s| to_date(&s)),
        opponent: Some(opponent),
        home,
        venue: pick_string(node, &["venue", "stadium"]),
        result: pick_string(node, &["result", "outcome"]),
        score: GameScore {
            team: pick_u32(score, &["team", "us", "for"])
                .or_else(|| pick_u32(node, &["teamScore", "pointsFor"])),
            opponent: pick_u32(score, &["opponent", "them", "against"])
                .or_else(|| pick_u32(node, &["opponentScore", "pointsAgainst"])),
            summary: pick_string(score, &["summary"]),
        },
    })
}

pub fn schedule_from_table(html: &str) -> Vec<ScheduleGame> {
    let mut games = Vec::new();
    for cells in table_rows(html) {
        if cells.len() < 2 {
            continue;
        }
        let Some(date) = to_date(&cells[0]) else {
            continue; // header or malformed row
        };
        let raw_opponent = cells[1].as_str();
        let home = if raw_opponent.starts_with('@') {
            Some(false)
        } else if raw_opponent.to_ascii_lowercase().starts_with("vs") {
            Some(true)
        } else {
            None
        };
        let opponent = normalize_text(
            raw_opponent
                .trim_start_matches('@')
                .trim_start_matches("vs.")
                .trim_start_matches("vs"),
        );
        let result_cell = cells.get(2).cloned().filter(|s| !s.is_empty());
        let score = result_cell
            .as_deref()
            .and_then(|text| RECORD_RE.captures(text))
            .map(|caps| GameScore {
                team: caps.get(1).and_then(|m| m.as_str().parse().ok()),
                opponent: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                summary: result_cell.clone(),
            })
            .unwrap_or_default();
        games.push(ScheduleGame {
            id: None,
            date: Some(date),
            opponent,
            home,
            venue: None,
            result: result_cell,
            score,
        });
    }
    games
}

/// Roster strategy chain, same shape as the schedule chain.
pub fn extract_roster(html: &str, state: Option<&Value>) -> Vec<RosterPlayer> {
    run_chain(vec![
        Box::new(|| state.map(roster_from_state).unwrap_or_default()),
        Box::new(|| roster_from_table(html)),
    ])
}

pub fn roster_from_state(state: &Value) -> Vec<RosterPlayer> {
    deep_find_all(state, &|v| {
        v.is_object()
            && pick_string(v, &["name", "playerName", "fullName"]).is_some()
            && pick_string(v, &["position", "pos"]).is_some()
            && v.get("rating").is_none() // prospect nodes carry ratings, roster nodes do not
    })
    .into_iter()
    .filter_map(|node| {
        let name = pick_string(node, &["name", "playerName", "fullName"])?;
        Some(RosterPlayer {
            name,
            position: pick_string(node, &["position", "pos"]),
            number: pick_u32(node, &["number", "jersey", "jerseyNumber"]),
            class_year: pick_string(node, &["classYear", "class", "gradYear", "year"]),
            height: pick_string(node, &["height", "ht"]),
            weight: pick_string(node, &["weight", "wt"]),
            hometown: pick_string(node, &["hometown", "homeTown"]),
        })
    })
    .collect()
}

pub fn roster_from_table(html: &str) -> Vec<RosterPlayer> {
    let mut players = Vec::new();
    for cells in table_rows(html) {
        // Expected shape: No | Name | Pos | Class | Ht | Wt
        if cells.len() < 3 {
            continue;
        }
        let Ok(number) = cells[0].parse::<u32>() else {
            continue;
        };
        let name = cells[1].clone();
        if name.is_empty() {
            continue;
        }
        players.push(RosterPlayer {
            name,
            position: cells.get(2).and_then(|s| normalize_text(s)),
            number: Some(number),
            class_year: cells.get(3).and_then(|s| normalize_text(s)),
            height: cells.get(4).and_then(|s| normalize_text(s)),
            weight: cells.get(5).and_then(|s| normalize_text(s)),
            hometown: None,
        });
    }
    players
}

pub fn extract_notes(html: &str) -> Vec<String> {
    let mut notes: Vec<String> = extract_linked_data(html)
        .iter()
        .filter_map(|doc| pick_string(doc, &["headline"]))
        .collect();
    for caps in NEWS_RE.captures_iter(html) {
        if let Some(text) = caps.get(1).and_then(|m| normalize_text(m.as_str())) {
            notes.push(text);
        }
    }
    crate::util::dedup_by_key(notes, |note| note.clone())
}

fn record_line_from_value(value: &Value) -> Option<RecordLine> {
    if let Some(text) = value.as_str() {
        return record_line_from_text(text);
    }
    if !value.is_object() {
        return None;
    }
    let wins = pick_u32(value, &["wins", "w"])?;
    let losses = pick_u32(value, &["losses", "l"])?;
    let ties = pick_u32(value, &["ties", "t"]).unwrap_or(0);
    Some(with_win_percentage(RecordLine {
        wins,
        losses,
        ties,
        win_percentage: value.get("winPercentage").and_then(|v| v.as_f64()),
    }))
}

fn record_line_from_text(text: &str) -> Option<RecordLine> {
    let caps = RECORD_RE.captures(text)?;
    Some(with_win_percentage(RecordLine {
        wins: caps.get(1)?.as_str().parse().ok()?,
        losses: caps.get(2)?.as_str().parse().ok()?,
        ties: caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
        win_percentage: None,
    }))
}

fn with_win_percentage(mut line: RecordLine) -> RecordLine {
    if line.win_percentage.is_none() {
        let games = line.wins + line.losses + line.ties;
        if games > 0 {
            line.win_percentage = Some(f64::from(line.wins) / f64::from(games));
        }
    }
    line
}

fn labeled_text(html: &str, label: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"(?is){}\s*:?\s*(?:</[^>]+>\s*)*(?:<[^>]+>\s*)*([^<]+)",
        regex::escape(label)
    ))
    .ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize_text(m.as_str()))
}

fn snake_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
