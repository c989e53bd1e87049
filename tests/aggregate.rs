use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{TimeZone, Utc};

use prepscout::fetch::Fetcher;
use prepscout::merge::{consensus_rankings, merge_prospects, merge_team_profiles, names_match};
use prepscout::recruit_fetch::{BoardKind, RecruitBoardClient};
use prepscout::state::{RankingMetrics, RecruitingProspect, SourceId, TeamProfile};
use prepscout::team_fetch::TeamSiteClient;
use prepscout::{ProgramAggregator, ProgramDataParams};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

struct PageFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl PageFetcher {
    fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(path, fixture)| ((*path).to_string(), read_fixture(fixture)))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn empty() -> Arc<Self> {
        Self::new(&[])
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for PageFetcher {
    fn fetch_html(&self, path: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no page for {path}"))
    }
}

struct Fixture {
    aggregator: ProgramAggregator,
    stat: Arc<PageFetcher>,
    primary: Arc<PageFetcher>,
    secondary: Arc<PageFetcher>,
}

fn fixture_aggregator(ttl: Duration) -> Fixture {
    let stat = PageFetcher::new(&[
        ("westlake", "team_page.html"),
        ("westlake/schedule", "team_schedule.html"),
        ("westlake/roster", "team_roster.html"),
    ]);
    let primary = PageFetcher::new(&[("westlake-chaps", "board_primary.html")]);
    let secondary = PageFetcher::new(&[("westlake-tx", "board_secondary.html")]);
    let aggregator = ProgramAggregator::with_clients(
        TeamSiteClient::new(stat.clone()),
        RecruitBoardClient::new(BoardKind::Primary, primary.clone()),
        RecruitBoardClient::new(BoardKind::Secondary, secondary.clone()),
        ttl,
    );
    Fixture { aggregator, stat, primary, secondary }
}

fn full_params() -> ProgramDataParams {
    ProgramDataParams {
        team: "Westlake".to_string(),
        season: Some("2025".to_string()),
        stat_site_path: Some("westlake".to_string()),
        primary_board_slug: Some("westlake-chaps".to_string()),
        secondary_board_slug: Some("westlake-tx".to_string()),
        include_schedule: true,
        include_player_stats: true,
        include_recruiting: true,
        ..ProgramDataParams::default()
    }
}

#[test]
fn all_sources_merge_into_one_record() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let record = fx.aggregator.program_data(&full_params()).expect("aggregation should succeed");

    assert_eq!(record.metadata.program, "Westlake");
    assert_eq!(record.metadata.sources.len(), 3);
    assert!(!record.metadata.cache_hit);
    assert!(record.errors.is_empty(), "unexpected errors: {:?}", record.errors);

    // Stat site outranks the boards for profile fields.
    assert_eq!(record.team_profile.name.as_deref(), Some("Westlake High School"));
    assert_eq!(record.team_profile.mascot.as_deref(), Some("Chaparrals"));
    assert_eq!(record.team_profile.rankings.national, Some(14));

    assert_eq!(record.performance.stats.get("points_per_game"), Some(&38.2));
    assert_eq!(record.schedule.len(), 3);
    assert_eq!(record.players.len(), 3);

    // Jordan Lee appears on both boards and must come through once, with the
    // primary board's rating.
    let commit_names: Vec<&str> =
        record.recruiting.commits.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(commit_names, vec!["Jordan Lee", "Trey Maddox", "Alex Cruz"]);
    assert_eq!(record.recruiting.commits[0].rating, Some(0.95));
    assert_eq!(record.recruiting.targets.len(), 5);

    assert_eq!(record.recruiting.summary.total_commits, 3);
    assert_eq!(record.recruiting.summary.total_targets, 5);
    assert_eq!(record.recruiting.summary.blue_chips, 2);
    let avg = record.recruiting.summary.average_rating.expect("average rating");
    assert!((avg - (0.95 + 0.89 + 0.91) / 3.0).abs() < 1e-9);

    let consensus = &record.recruiting.rankings.consensus;
    assert_eq!(consensus.national_rank, Some(12));
    assert_eq!(consensus.state_rank, Some(2));
    let composite = consensus.composite_score.expect("composite");
    assert!((composite - 275.4).abs() < 1e-9);
    assert_eq!(consensus.total_commits, Some(18));
    assert_eq!(consensus.blue_chips, Some(6));
    assert_eq!(record.recruiting.rankings.per_source.len(), 2);

    assert!(record.insights.quick_hits.iter().any(|h| h.contains("Overall record 12-1")));
    assert!(
        record
            .insights
            .quick_hits
            .iter()
            .any(|h| h.contains("Ranked #12 nationally"))
    );
    assert_eq!(record.insights.metrics.get("margin_trend"), Some(&-28.0));
    assert_eq!(record.insights.metrics.get("total_commits"), Some(&3.0));

    assert!(record.raw.is_none());
}

#[test]
fn unreachable_sources_degrade_to_error_entries() {
    let aggregator = ProgramAggregator::with_clients(
        TeamSiteClient::new(PageFetcher::empty()),
        RecruitBoardClient::new(BoardKind::Primary, PageFetcher::empty()),
        RecruitBoardClient::new(BoardKind::Secondary, PageFetcher::empty()),
        Duration::from_secs(600),
    );
    let params = ProgramDataParams {
        include_schedule: false,
        include_player_stats: false,
        ..full_params()
    };
    let record = aggregator.program_data(&params).expect("degraded aggregation still succeeds");

    assert_eq!(record.metadata.sources.len(), 3);
    assert_eq!(record.errors.len(), 3);
    for source in [SourceId::StatSite, SourceId::PrimaryBoard, SourceId::SecondaryBoard] {
        assert!(
            record.errors.iter().any(|e| e.source == source),
            "missing error for {}",
            source.as_str()
        );
    }
    assert!(record.team_profile.is_empty());
    assert!(record.recruiting.commits.is_empty());
    assert_eq!(record.recruiting.rankings.consensus.national_rank, None);
}

#[test]
fn repeated_request_is_served_from_cache() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = full_params();

    let first = fx.aggregator.program_data(&params).expect("first call");
    let stat_calls = fx.stat.call_count();
    assert_eq!(stat_calls, 3);
    assert_eq!(fx.primary.call_count(), 1);
    assert_eq!(fx.secondary.call_count(), 1);

    let second = fx.aggregator.program_data(&params).expect("second call");
    assert!(second.metadata.cache_hit);
    assert_eq!(second.metadata.generated_at, first.metadata.generated_at);
    assert_eq!(fx.stat.call_count(), stat_calls);
    assert_eq!(fx.primary.call_count(), 1);
    assert_eq!(fx.secondary.call_count(), 1);
}

#[test]
fn expired_cache_entry_triggers_refetch() {
    let fx = fixture_aggregator(Duration::ZERO);
    let params = full_params();

    fx.aggregator.program_data(&params).expect("first call");
    let record = fx.aggregator.program_data(&params).expect("second call");
    assert!(!record.metadata.cache_hit);
    assert_eq!(fx.stat.call_count(), 6);
    assert_eq!(fx.primary.call_count(), 2);
}

#[test]
fn force_refresh_bypasses_and_repopulates_cache() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = full_params();

    fx.aggregator.program_data(&params).expect("first call");
    assert_eq!(fx.primary.call_count(), 1);

    let refreshed = fx
        .aggregator
        .program_data(&ProgramDataParams { force_refresh: true, ..params.clone() })
        .expect("forced refresh");
    assert!(!refreshed.metadata.cache_hit);
    assert_eq!(fx.primary.call_count(), 2);

    // A normal lookup afterwards must find the refreshed record, not refetch.
    let cached = fx.aggregator.program_data(&params).expect("post-refresh call");
    assert!(cached.metadata.cache_hit);
    assert_eq!(cached.metadata.generated_at, refreshed.metadata.generated_at);
    assert_eq!(fx.primary.call_count(), 2);
}

#[test]
fn clear_cache_forces_a_fresh_fetch() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = full_params();

    fx.aggregator.program_data(&params).expect("first call");
    fx.aggregator.clear_cache();
    let record = fx.aggregator.program_data(&params).expect("second call");
    assert!(!record.metadata.cache_hit);
    assert_eq!(fx.primary.call_count(), 2);
}

#[test]
fn empty_team_name_is_rejected() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = ProgramDataParams { team: "  ".to_string(), ..full_params() };
    let err = fx.aggregator.program_data(&params).expect_err("blank team must fail");
    assert!(err.to_string().contains("team name"));
    assert_eq!(fx.stat.call_count(), 0);
}

#[test]
fn adapters_without_identifiers_are_skipped() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = ProgramDataParams {
        team: "Westlake".to_string(),
        ..ProgramDataParams::default()
    };
    let record = fx.aggregator.program_data(&params).expect("aggregation should succeed");

    assert!(record.metadata.sources.is_empty());
    assert!(record.errors.is_empty());
    assert!(record.team_profile.is_empty());
    assert_eq!(fx.stat.call_count(), 0);
    assert_eq!(fx.primary.call_count(), 0);
    assert_eq!(fx.secondary.call_count(), 0);
}

#[test]
fn recruiting_flag_gates_the_board_adapters() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = ProgramDataParams { include_recruiting: false, ..full_params() };
    let record = fx.aggregator.program_data(&params).expect("aggregation should succeed");

    assert_eq!(record.metadata.sources.len(), 1);
    assert_eq!(fx.primary.call_count(), 0);
    assert_eq!(fx.secondary.call_count(), 0);
    assert!(record.recruiting.commits.is_empty());
}

#[test]
fn board_name_mismatch_is_surfaced_not_patched() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = ProgramDataParams {
        team: "Central Catholic".to_string(),
        stat_site_path: None,
        secondary_board_slug: None,
        include_schedule: false,
        include_player_stats: false,
        ..full_params()
    };
    let record = fx.aggregator.program_data(&params).expect("aggregation should succeed");

    assert!(
        record
            .errors
            .iter()
            .any(|e| e.source == SourceId::PrimaryBoard && e.message.contains("does not match")),
        "expected a name-mismatch error, got {:?}",
        record.errors
    );
    // The board data still flows into the record; the mismatch is advisory.
    assert_eq!(record.recruiting.commits.len(), 2);
}

#[test]
fn raw_payloads_are_keyed_by_source() {
    let fx = fixture_aggregator(Duration::from_secs(600));
    let params = ProgramDataParams { include_raw: true, ..full_params() };
    let record = fx.aggregator.program_data(&params).expect("aggregation should succeed");

    let raw = record.raw.expect("raw snapshots requested");
    assert!(raw.contains_key("stat-site"));
    assert!(raw.contains_key("primary-board"));
    assert!(raw.contains_key("secondary-board"));
}

#[test]
fn profile_merge_follows_source_priority_not_arrival_order() {
    let stat = TeamProfile {
        name: Some("Westlake High School".to_string()),
        classification: Some("6A".to_string()),
        ..TeamProfile::default()
    };
    let board = TeamProfile {
        name: Some("Westlake Chaparrals".to_string()),
        district: Some("District 25-6A".to_string()),
        ..TeamProfile::default()
    };

    // Board fragment listed first; the stat site must still win the name.
    let merged = merge_team_profiles(vec![
        (SourceId::PrimaryBoard, board),
        (SourceId::StatSite, stat),
    ]);
    assert_eq!(merged.name.as_deref(), Some("Westlake High School"));
    assert_eq!(merged.classification.as_deref(), Some("6A"));
    assert_eq!(merged.district.as_deref(), Some("District 25-6A"));
}

#[test]
fn duplicate_prospects_keep_the_primary_board_entry() {
    let primary = vec![RecruitingProspect {
        name: "Jordan Lee".to_string(),
        class_year: Some("2026".to_string()),
        rating: Some(0.95),
        ..RecruitingProspect::default()
    }];
    let secondary = vec![
        RecruitingProspect {
            name: "Jordan Lee".to_string(),
            class_year: Some("2026".to_string()),
            rating: Some(0.8),
            ..RecruitingProspect::default()
        },
        RecruitingProspect {
            name: "Jordan Lee".to_string(),
            class_year: Some("2027".to_string()),
            ..RecruitingProspect::default()
        },
    ];

    let merged = merge_prospects(primary, secondary);
    // Same class year collapses; a different class year is a different athlete.
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].rating, Some(0.95));
}

#[test]
fn consensus_omits_metrics_no_source_reports() {
    let a = RankingMetrics {
        national_rank: Some(12),
        composite_score: Some(284.5),
        timestamp: Some(Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()),
        ..RankingMetrics::default()
    };
    let b = RankingMetrics {
        national_rank: Some(20),
        total_commits: Some(17),
        timestamp: Some(Utc.with_ymd_and_hms(2025, 9, 2, 8, 30, 0).unwrap()),
        ..RankingMetrics::default()
    };

    let consensus = consensus_rankings(&[a.clone(), b.clone()]);
    assert_eq!(consensus.national_rank, Some(12));
    assert_eq!(consensus.composite_score, Some(284.5));
    assert_eq!(consensus.total_commits, Some(17));
    assert_eq!(consensus.state_rank, None);
    assert_eq!(consensus.average_rating, None);
    assert_eq!(consensus.timestamp, b.timestamp);

    let empty = consensus_rankings(&[]);
    assert!(empty.is_empty());
    assert_eq!(empty.timestamp, None);
}

#[test]
fn name_matching_ignores_punctuation_and_allows_containment() {
    assert!(names_match("Westlake High School", "Westlake"));
    assert!(names_match("Westlake", "Westlake Chaparrals"));
    assert!(names_match("St. Mary's", "st marys"));
    assert!(!names_match("Westlake", "Lake Travis"));
    assert!(!names_match("", "Westlake"));
}
