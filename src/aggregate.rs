use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::fetch::HttpFetcher;
use crate::insights::build_insights;
use crate::merge::{consensus_rankings, merge_prospects, merge_team_profiles, names_match};
use crate::recruit_fetch::{BoardKind, RecruitBoardClient, RecruitFetchOptions, is_blue_chip};
use crate::state::{
    AggregatedProgramRecord, Performance, RankingMetrics, RankingsSection, RecordMetadata,
    RecruitEnvelope, RecruitingSection, RecruitingSummary, SourceError, SourceFetch, SourceId,
    TeamEnvelope,
};
use crate::team_fetch::{TeamFetchOptions, TeamSiteClient};

const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const MIN_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_MIN_INTERVAL_MS: u64 = 750;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub stat_site_base: String,
    pub primary_board_base: String,
    pub secondary_board_base: String,
    pub cache_ttl: Duration,
    pub min_request_interval: Duration,
}

impl AggregatorConfig {
    pub fn from_env() -> Self {
        let stat_site_base = env_or("PREPSCOUT_STAT_SITE_BASE", "https://stats.example.com");
        let primary_board_base =
            env_or("PREPSCOUT_PRIMARY_BOARD_BASE", "https://board-one.example.com");
        let secondary_board_base =
            env_or("PREPSCOUT_SECONDARY_BOARD_BASE", "https://board-two.example.com");
        let ttl_secs = std::env::var("PREPSCOUT_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS)
            .max(MIN_CACHE_TTL_SECS);
        let interval_ms = std::env::var("PREPSCOUT_MIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MIN_INTERVAL_MS);
        Self {
            stat_site_base,
            primary_board_base,
            secondary_board_base,
            cache_ttl: Duration::from_secs(ttl_secs),
            min_request_interval: Duration::from_millis(interval_ms),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Request parameters for one aggregation. Adapters whose identifier is left
/// unset are skipped entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramDataParams {
    pub team: String,
    pub season: Option<String>,
    pub stat_site_path: Option<String>,
    pub primary_board_slug: Option<String>,
    pub secondary_board_slug: Option<String>,
    pub include_schedule: bool,
    pub include_player_stats: bool,
    pub include_recruiting: bool,
    pub include_raw: bool,
    pub force_refresh: bool,
}

struct CacheSlot {
    record: AggregatedProgramRecord,
    expires_at: Instant,
}

/// Fans out to the configured adapters, reconciles their envelopes into one
/// canonical record, and owns the result cache.
pub struct ProgramAggregator {
    stat_site: TeamSiteClient,
    primary_board: RecruitBoardClient,
    secondary_board: RecruitBoardClient,
    cache: Mutex<HashMap<String, CacheSlot>>,
    ttl: Duration,
}

impl ProgramAggregator {
    pub fn new(cfg: &AggregatorConfig) -> Self {
        let stat_fetcher = Arc::new(HttpFetcher::with_min_interval(
            cfg.stat_site_base.clone(),
            cfg.min_request_interval,
        ));
        let primary_fetcher = Arc::new(HttpFetcher::with_min_interval(
            cfg.primary_board_base.clone(),
            cfg.min_request_interval,
        ));
        let secondary_fetcher = Arc::new(HttpFetcher::with_min_interval(
            cfg.secondary_board_base.clone(),
            cfg.min_request_interval,
        ));
        Self::with_clients(
            TeamSiteClient::new(stat_fetcher),
            RecruitBoardClient::new(BoardKind::Primary, primary_fetcher),
            RecruitBoardClient::new(BoardKind::Secondary, secondary_fetcher),
            cfg.cache_ttl,
        )
    }

    pub fn with_clients(
        stat_site: TeamSiteClient,
        primary_board: RecruitBoardClient,
        secondary_board: RecruitBoardClient,
        ttl: Duration,
    ) -> Self {
        Self {
            stat_site,
            primary_board,
            secondary_board,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock poisoned").clear();
    }

    /// The primary entry point: cache check, settle-all fan-out, merge,
    /// insight synthesis, cache write.
    pub fn program_data(&self, params: &ProgramDataParams) -> Result<AggregatedProgramRecord> {
        if params.team.trim().is_empty() {
            bail!("program team name is required");
        }
        let key = cache_key(params)?;

        if !params.force_refresh
            && let Some(record) = self.cache_lookup(&key)
        {
            log::debug!("cache hit for {}", params.team);
            return Ok(record);
        }

        // Settle-all join: every adapter call completes and reports its own
        // result-or-error; merge order below is by source identity, never by
        // completion order.
        let (team_result, (primary_result, secondary_result)) = rayon::join(
            || self.run_stat_site(params),
            || {
                rayon::join(
                    || self.run_board(BoardKind::Primary, params),
                    || self.run_board(BoardKind::Secondary, params),
                )
            },
        );

        let record = self.assemble(params, team_result, primary_result, secondary_result);
        self.cache_write(key, &record);
        Ok(record)
    }

    fn run_stat_site(&self, params: &ProgramDataParams) -> Option<Result<TeamEnvelope>> {
        let path = params.stat_site_path.as_deref()?.trim();
        if path.is_empty() {
            return None;
        }
        let opts = TeamFetchOptions {
            include_schedule: params.include_schedule,
            include_player_stats: params.include_player_stats,
            include_raw: params.include_raw,
        };
        Some(self.stat_site.fetch_team_data(path, &opts))
    }

    fn run_board(
        &self,
        kind: BoardKind,
        params: &ProgramDataParams,
    ) -> Option<Result<RecruitEnvelope>> {
        if !params.include_recruiting {
            return None;
        }
        let slug = match kind {
            BoardKind::Primary => params.primary_board_slug.as_deref()?,
            BoardKind::Secondary => params.secondary_board_slug.as_deref()?,
        }
        .trim();
        if slug.is_empty() {
            return None;
        }
        let opts = RecruitFetchOptions {
            include_targets: true,
            include_raw: params.include_raw,
        };
        let client = match kind {
            BoardKind::Primary => &self.primary_board,
            BoardKind::Secondary => &self.secondary_board,
        };
        Some(client.fetch_recruiting_data(slug, &opts))
    }

    fn assemble(
        &self,
        params: &ProgramDataParams,
        team_result: Option<Result<TeamEnvelope>>,
        primary_result: Option<Result<RecruitEnvelope>>,
        secondary_result: Option<Result<RecruitEnvelope>>,
    ) -> AggregatedProgramRecord {
        let mut sources = Vec::new();
        let mut errors = Vec::new();
        let mut raw = BTreeMap::new();

        let team_env = settle(team_result, SourceId::StatSite, &mut errors);
        let primary_env = settle(primary_result, SourceId::PrimaryBoard, &mut errors);
        let secondary_env = settle(secondary_result, SourceId::SecondaryBoard, &mut errors);

        let mut fragments = Vec::new();
        if let Some(env) = &team_env {
            sources.push(SourceFetch { source: env.source, fetched_at: env.fetched_at });
            for message in &env.errors {
                errors.push(SourceError { source: env.source, message: message.clone() });
            }
            if !env.profile.is_empty() {
                fragments.push((env.source, env.profile.clone()));
            }
            if let Some(value) = &env.raw {
                raw.insert(env.source.as_str().to_string(), value.clone());
            }
        }
        for env in [&primary_env, &secondary_env].into_iter().flatten() {
            sources.push(SourceFetch { source: env.source, fetched_at: env.fetched_at });
            for message in &env.errors {
                errors.push(SourceError { source: env.source, message: message.clone() });
            }
            if !env.profile.is_empty() {
                fragments.push((env.source, env.profile.clone()));
            }
            if let Some(value) = &env.raw {
                raw.insert(env.source.as_str().to_string(), value.clone());
            }
            if let Some(name) = env.profile.name.as_deref()
                && !names_match(name, &params.team)
            {
                errors.push(SourceError {
                    source: env.source,
                    message: format!(
                        "team name '{name}' does not match requested program '{}'",
                        params.team
                    ),
                });
            }
        }

        let team_profile = merge_team_profiles(fragments);

        let (performance, schedule, players) = match &team_env {
            Some(env) => {
                let mut notes = env.notes.clone();
                for board in [&primary_env, &secondary_env].into_iter().flatten() {
                    notes.extend(board.notes.iter().cloned());
                }
                (
                    Performance { stats: env.stats.clone(), notes },
                    env.schedule.clone(),
                    env.roster.clone(),
                )
            }
            None => (Performance::default(), Vec::new(), Vec::new()),
        };

        let recruiting = build_recruiting(&primary_env, &secondary_env);
        let insights = build_insights(&team_profile, &performance.stats, &schedule, &recruiting);

        AggregatedProgramRecord {
            metadata: RecordMetadata {
                program: params.team.clone(),
                requested: params
                    .stat_site_path
                    .clone()
                    .or_else(|| params.primary_board_slug.clone())
                    .or_else(|| params.secondary_board_slug.clone()),
                season: params.season.clone(),
                generated_at: Utc::now(),
                sources,
                cache_hit: false,
            },
            team_profile,
            performance,
            schedule,
            players,
            recruiting,
            insights,
            errors,
            raw: if params.include_raw && !raw.is_empty() { Some(raw) } else { None },
        }
    }

    fn cache_lookup(&self, key: &str) -> Option<AggregatedProgramRecord> {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        match cache.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => {
                let mut record = slot.record.clone();
                record.metadata.cache_hit = true;
                Some(record)
            }
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_write(&self, key: String, record: &AggregatedProgramRecord) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        cache.insert(
            key,
            CacheSlot { record: record.clone(), expires_at: Instant::now() + self.ttl },
        );
    }
}

/// Unwrap one adapter result: a hard failure becomes a per-source error entry
/// and the aggregation keeps going with whatever the other sources produced.
fn settle<T>(
    result: Option<Result<T>>,
    source: SourceId,
    errors: &mut Vec<SourceError>,
) -> Option<T> {
    match result {
        Some(Ok(envelope)) => Some(envelope),
        Some(Err(err)) => {
            log::warn!("{} adapter failed: {err:#}", source.as_str());
            errors.push(SourceError { source, message: format!("{err:#}") });
            None
        }
        None => None,
    }
}

fn build_recruiting(
    primary: &Option<RecruitEnvelope>,
    secondary: &Option<RecruitEnvelope>,
) -> RecruitingSection {
    let commits = merge_prospects(
        primary.as_ref().map(|e| e.commits.clone()).unwrap_or_default(),
        secondary.as_ref().map(|e| e.commits.clone()).unwrap_or_default(),
    );
    let targets = merge_prospects(
        primary.as_ref().map(|e| e.targets.clone()).unwrap_or_default(),
        secondary.as_ref().map(|e| e.targets.clone()).unwrap_or_default(),
    );

    let mut per_source = BTreeMap::new();
    let mut defined: Vec<RankingMetrics> = Vec::new();
    for env in [primary, secondary].into_iter().flatten() {
        if let Some(metrics) = &env.rankings {
            per_source.insert(env.source.as_str().to_string(), metrics.clone());
            defined.push(metrics.clone());
        }
    }
    let consensus = consensus_rankings(&defined);

    let blue_chips = commits.iter().filter(|p| is_blue_chip(p)).count();
    let ratings: Vec<f64> = commits.iter().filter_map(|p| p.rating).collect();
    let average_rating = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
    };

    let summary = RecruitingSummary {
        total_commits: commits.len(),
        total_targets: targets.len(),
        blue_chips,
        average_rating,
    };

    RecruitingSection {
        commits,
        targets,
        rankings: RankingsSection { per_source, consensus },
        summary,
    }
}

/// Canonical cache key: the params serialize with a fixed field order, so the
/// key is independent of how the caller populated them. `force_refresh` is
/// excluded so a refreshed record is found by later normal lookups.
fn cache_key(params: &ProgramDataParams) -> Result<String> {
    let mut canonical = params.clone();
    canonical.force_refresh = false;
    serde_json::to_string(&canonical).context("failed to build cache key")
}
