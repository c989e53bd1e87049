use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::extract::{
    StateLocation, extract_linked_data, extract_structured_state, normalize_text, parse_number,
    pick_f64, pick_string, pick_u32, run_chain, table_rows, to_date,
};
use crate::fetch::Fetcher;
use crate::state::{
    Measurables, ProspectRanking, RankingMetrics, RecruitEnvelope, RecruitingProspect, SourceId,
    TeamProfile,
};
use crate::team_fetch::extract_team_profile;
use crate::util::deep_find_all;

static COMMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(commit|committed|signed|enrolled)\b").expect("commit regex"));

static CLASS_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(19|20)\d{2}$").expect("class year regex"));

/// Which recruiting board this client talks to. The two boards run different
/// frontends, so each carries its own embedded-state locations; everything
/// downstream of extraction is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Primary,
    Secondary,
}

impl BoardKind {
    pub fn source_id(&self) -> SourceId {
        match self {
            BoardKind::Primary => SourceId::PrimaryBoard,
            BoardKind::Secondary => SourceId::SecondaryBoard,
        }
    }

    fn state_locations(&self) -> &'static [StateLocation] {
        match self {
            BoardKind::Primary => &[
                StateLocation::HydrationVar("__RECRUIT_STATE__"),
                StateLocation::ScriptId("recruit-data"),
            ],
            BoardKind::Secondary => &[
                StateLocation::ScriptId("board-state"),
                StateLocation::HydrationVar("__BOARD_BOOTSTRAP__"),
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecruitFetchOptions {
    pub include_targets: bool,
    pub include_raw: bool,
}

pub struct RecruitBoardClient {
    board: BoardKind,
    fetcher: Arc<dyn Fetcher>,
}

impl RecruitBoardClient {
    pub fn new(board: BoardKind, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { board, fetcher }
    }

    pub fn board(&self) -> BoardKind {
        self.board
    }

    /// Best-effort retrieval of commits, targets, and team ranking metrics
    /// for one program page. Only a missing identifier is a hard error.
    pub fn fetch_recruiting_data(
        &self,
        team_slug: &str,
        opts: &RecruitFetchOptions,
    ) -> Result<RecruitEnvelope> {
        let team_slug = team_slug.trim();
        if team_slug.is_empty() {
            bail!("recruiting board team identifier is required");
        }

        let mut envelope = RecruitEnvelope {
            source: self.board.source_id(),
            fetched_at: Utc::now(),
            profile: TeamProfile::default(),
            commits: Vec::new(),
            targets: Vec::new(),
            rankings: None,
            notes: Vec::new(),
            raw: None,
            errors: Vec::new(),
        };

        let html = match self.fetcher.fetch_html(team_slug) {
            Ok(body) => body,
            Err(err) => {
                envelope.errors.push(format!("board page fetch failed: {err}"));
                return Ok(envelope);
            }
        };

        let state = extract_structured_state(&html, self.board.state_locations());
        if opts.include_raw {
            envelope.raw = state.clone();
        }

        envelope.profile = extract_team_profile(&html, state.as_ref()).unwrap_or_default();

        let prospects = extract_prospects(&html, state.as_ref());
        if prospects.is_empty() {
            envelope.errors.push("no prospects extracted".to_string());
        }
        envelope.commits = prospects
            .iter()
            .filter(|p| p.status.as_deref().is_some_and(is_commit_status))
            .cloned()
            .collect();
        if opts.include_targets {
            envelope.targets = prospects;
        }

        envelope.rankings = extract_rankings(&html, state.as_ref());
        if envelope.rankings.is_none() {
            envelope.errors.push("no team ranking metrics extracted".to_string());
        }

        Ok(envelope)
    }
}

/// A prospect counts as committed when the board's status text carries a
/// commitment word, however the board phrases it.
pub fn is_commit_status(status: &str) -> bool {
    COMMIT_RE.is_match(status)
}

/// Stars of 4 or 5 are blue-chip prospects.
pub fn is_blue_chip(prospect: &RecruitingProspect) -> bool {
    prospect.stars.is_some_and(|stars| stars >= 4)
}

/// Prospect strategy chain: embedded state, ld+json person docs, then the
/// table fallback. The table fallback loses fields the markup never shows
/// (ranking, profile url), which is the accepted precision cost.
pub fn extract_prospects(html: &str, state: Option<&Value>) -> Vec<RecruitingProspect> {
    run_chain(vec![
        Box::new(|| state.map(prospects_from_state).unwrap_or_default()),
        Box::new(|| prospects_from_linked_data(&extract_linked_data(html))),
        Box::new(|| prospects_from_table(html)),
    ])
}

pub fn prospects_from_state(state: &Value) -> Vec<RecruitingProspect> {
    deep_find_all(state, &|v| {
        v.is_object()
            && pick_string(v, &["name", "fullName", "athleteName"]).is_some()
            && (v.get("rating").is_some()
                || v.get("stars").is_some()
                || (v.get("position").is_some() && v.get("status").is_some()))
    })
    .into_iter()
    .filter_map(prospect_from_value)
    .collect()
}

pub fn prospect_from_value(node: &Value) -> Option<RecruitingProspect> {
    let name = pick_string(node, &["name", "fullName", "athleteName"])?;
    let ranking = node.get("ranking").unwrap_or(node);
    Some(RecruitingProspect {
        name,
        position: pick_string(node, &["position", "pos"]),
        class_year: pick_string(node, &["classYear", "class", "gradYear", "year"]),
        status: pick_string(node, &["status", "commitStatus", "recruitStatus"]),
        commitment_date: pick_string(node, &["commitmentDate", "commitDate", "committedOn"])
            .and_then(|s| to_date(&s)),
        measurables: Measurables {
            height: pick_string(node, &["height", "ht"]),
            weight: pick_string(node, &["weight", "wt"]),
        },
        hometown: pick_string(node, &["hometown", "homeTown", "location"]),
        ranking: ProspectRanking {
            national: pick_u32(ranking, &["national", "nationalRank"]),
            state: pick_u32(ranking, &["state", "stateRank"]),
            position: pick_u32(ranking, &["position", "positionRank", "posRank"]),
        },
        rating: pick_f64(node, &["rating", "compositeRating"]),
        stars: pick_u32(node, &["stars", "starRating"]),
        profile_url: pick_string(node, &["profileUrl", "url", "link"]),
    })
}

pub fn prospects_from_linked_data(docs: &[Value]) -> Vec<RecruitingProspect> {
    docs.iter()
        .filter(|doc| pick_string(doc, &["@type"]).is_some_and(|t| t == "Person"))
        .filter_map(|doc| {
            let name = pick_string(doc, &["name"])?;
            Some(RecruitingProspect {
                name,
                position: pick_string(doc, &["jobTitle"]),
                hometown: doc
                    .get("homeLocation")
                    .and_then(|loc| pick_string(loc, &["name"])),
                profile_url: pick_string(doc, &["url"]),
                ..RecruitingProspect::default()
            })
        })
        .collect()
}

pub fn prospects_from_table(html: &str) -> Vec<RecruitingProspect> {
    let mut prospects = Vec::new();
    for cells in table_rows(html) {
        // Expected shape: Name | Pos | Class | Status | Rating | Hometown
        if cells.len() < 4 || cells[0].eq_ignore_ascii_case("name") {
            continue;
        }
        let name = cells[0].clone();
        if name.is_empty() {
            continue;
        }
        let class_year = cells
            .get(2)
            .filter(|s| CLASS_YEAR_RE.is_match(s))
            .cloned();
        prospects.push(RecruitingProspect {
            name,
            position: cells.get(1).and_then(|s| normalize_text(s)),
            class_year,
            status: cells.get(3).and_then(|s| normalize_text(s)),
            rating: cells.get(4).and_then(|s| parse_number(s)),
            hometown: cells.get(5).and_then(|s| normalize_text(s)),
            ..RecruitingProspect::default()
        });
    }
    prospects
}

/// Ranking metrics: structured nodes first, keeping the most recently
/// timestamped candidate when several match; labeled-text scraping as the
/// fallback, timestamped at extraction time since the markup carries none.
pub fn extract_rankings(html: &str, state: Option<&Value>) -> Option<RankingMetrics> {
    if let Some(state) = state
        && let Some(metrics) = rankings_from_state(state)
    {
        return Some(metrics);
    }
    rankings_from_html(html)
}

pub fn rankings_from_state(state: &Value) -> Option<RankingMetrics> {
    let candidates = deep_find_all(state, &|v| {
        if !v.is_object() {
            return false;
        }
        let national = pick_u32(v, &["nationalRank", "national"]);
        let state_rank = pick_u32(v, &["stateRank", "state"]);
        let composite = pick_f64(v, &["compositeScore", "composite"]);
        // Per-prospect ranking nodes carry a position rank; team nodes do not.
        (national.is_some() && state_rank.is_some() && v.get("position").is_none())
            || (composite.is_some() && (national.is_some() || v.get("rank").is_some()))
    });

    candidates
        .into_iter()
        .filter_map(metrics_from_value)
        .filter(|m| !m.is_empty())
        .max_by_key(|m| m.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC))
}

fn metrics_from_value(node: &Value) -> Option<RankingMetrics> {
    Some(RankingMetrics {
        national_rank: pick_u32(node, &["nationalRank", "national", "rank"]),
        state_rank: pick_u32(node, &["stateRank", "state"]),
        class_rank: pick_u32(node, &["classRank"]),
        composite_score: pick_f64(node, &["compositeScore", "composite"]),
        average_rating: pick_f64(node, &["averageRating", "avgRating"]),
        total_commits: pick_u32(node, &["totalCommits", "commitCount"]),
        blue_chips: pick_u32(node, &["blueChips", "blueChipCount"]),
        timestamp: pick_string(node, &["updatedAt", "timestamp", "lastUpdated", "asOf"])
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

pub fn rankings_from_html(html: &str) -> Option<RankingMetrics> {
    let metrics = RankingMetrics {
        national_rank: labeled_number(html, "National Rank").map(|n| n as u32),
        state_rank: labeled_number(html, "State Rank").map(|n| n as u32),
        class_rank: labeled_number(html, "Class Rank").map(|n| n as u32),
        composite_score: labeled_number(html, "Composite"),
        average_rating: labeled_number(html, "Average Rating"),
        total_commits: labeled_number(html, "Commits").map(|n| n as u32),
        blue_chips: labeled_number(html, "Blue Chips").map(|n| n as u32),
        timestamp: Some(Utc::now()),
    };
    if metrics.is_empty() { None } else { Some(metrics) }
}

fn labeled_number(html: &str, label: &str) -> Option<f64> {
    let re = Regex::new(&format!(
        r"(?is){}[^0-9.]{{0,60}}(\d+(?:\.\d+)?)",
        regex::escape(label)
    ))
    .ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_number(m.as_str()))
}
