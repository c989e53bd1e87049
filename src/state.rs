use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of an upstream source. Merge priority is fixed: the stats site
/// wins profile conflicts, the primary board wins recruiting conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    StatSite,
    PrimaryBoard,
    SecondaryBoard,
}

pub const MERGE_PRIORITY: [SourceId; 3] = [
    SourceId::StatSite,
    SourceId::PrimaryBoard,
    SourceId::SecondaryBoard,
];

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::StatSite => "stat-site",
            SourceId::PrimaryBoard => "primary-board",
            SourceId::SecondaryBoard => "secondary-board",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordLine {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub win_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub overall: Option<RecordLine>,
    pub district: Option<RecordLine>,
    pub home: Option<RecordLine>,
    pub away: Option<RecordLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRankings {
    pub state: Option<u32>,
    pub national: Option<u32>,
}

/// Merged per-field from the per-source fragments; every field is optional
/// because no single source reliably reports all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub name: Option<String>,
    pub mascot: Option<String>,
    pub classification: Option<String>,
    pub district: Option<String>,
    pub location: Option<String>,
    pub coach: Option<String>,
    pub record: TeamRecord,
    pub rankings: TeamRankings,
}

impl TeamProfile {
    pub fn is_empty(&self) -> bool {
        self == &TeamProfile::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameScore {
    pub team: Option<u32>,
    pub opponent: Option<u32>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleGame {
    pub id: Option<String>,
    pub date: Option<NaiveDate>,
    pub opponent: Option<String>,
    pub home: Option<bool>,
    pub venue: Option<String>,
    pub result: Option<String>,
    pub score: GameScore,
}

impl ScheduleGame {
    /// A game counts as completed once both sides of the score are known.
    pub fn is_completed(&self) -> bool {
        self.score.team.is_some() && self.score.opponent.is_some()
    }

    pub fn margin(&self) -> Option<i64> {
        match (self.score.team, self.score.opponent) {
            (Some(team), Some(opp)) => Some(i64::from(team) - i64::from(opp)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub name: String,
    pub position: Option<String>,
    pub number: Option<u32>,
    pub class_year: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub hometown: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measurables {
    pub height: Option<String>,
    pub weight: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProspectRanking {
    pub national: Option<u32>,
    pub state: Option<u32>,
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecruitingProspect {
    pub name: String,
    pub position: Option<String>,
    pub class_year: Option<String>,
    pub status: Option<String>,
    pub commitment_date: Option<NaiveDate>,
    pub measurables: Measurables,
    pub hometown: Option<String>,
    pub ranking: ProspectRanking,
    pub rating: Option<f64>,
    pub stars: Option<u32>,
    pub profile_url: Option<String>,
}

impl RecruitingProspect {
    /// Cross-source identity; name plus class year is the only signal the
    /// boards agree on.
    pub fn identity_key(&self) -> String {
        format!("{}-{}", self.name, self.class_year.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingMetrics {
    pub national_rank: Option<u32>,
    pub state_rank: Option<u32>,
    pub class_rank: Option<u32>,
    pub composite_score: Option<f64>,
    pub average_rating: Option<f64>,
    pub total_commits: Option<u32>,
    pub blue_chips: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RankingMetrics {
    pub fn is_empty(&self) -> bool {
        self.national_rank.is_none()
            && self.state_rank.is_none()
            && self.class_rank.is_none()
            && self.composite_score.is_none()
            && self.average_rating.is_none()
            && self.total_commits.is_none()
            && self.blue_chips.is_none()
    }
}

/// Per-source result of one adapter call. Fetch and extraction problems land
/// in `errors`; the rest of the envelope carries whatever was recovered.
#[derive(Debug, Clone, Serialize)]
pub struct TeamEnvelope {
    pub source: SourceId,
    pub fetched_at: DateTime<Utc>,
    pub profile: TeamProfile,
    pub stats: BTreeMap<String, f64>,
    pub schedule: Vec<ScheduleGame>,
    pub roster: Vec<RosterPlayer>,
    pub notes: Vec<String>,
    pub raw: Option<Value>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecruitEnvelope {
    pub source: SourceId,
    pub fetched_at: DateTime<Utc>,
    pub profile: TeamProfile,
    pub commits: Vec<RecruitingProspect>,
    pub targets: Vec<RecruitingProspect>,
    pub rankings: Option<RankingMetrics>,
    pub notes: Vec<String>,
    pub raw: Option<Value>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFetch {
    pub source: SourceId,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceError {
    pub source: SourceId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordMetadata {
    pub program: String,
    pub requested: Option<String>,
    pub season: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<SourceFetch>,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Performance {
    pub stats: BTreeMap<String, f64>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecruitingSummary {
    pub total_commits: usize,
    pub total_targets: usize,
    pub blue_chips: usize,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingsSection {
    pub per_source: BTreeMap<String, RankingMetrics>,
    pub consensus: RankingMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecruitingSection {
    pub commits: Vec<RecruitingProspect>,
    pub targets: Vec<RecruitingProspect>,
    pub rankings: RankingsSection,
    pub summary: RecruitingSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Insights {
    pub quick_hits: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedProgramRecord {
    pub metadata: RecordMetadata,
    pub team_profile: TeamProfile,
    pub performance: Performance,
    pub schedule: Vec<ScheduleGame>,
    pub players: Vec<RosterPlayer>,
    pub recruiting: RecruitingSection,
    pub insights: Insights,
    pub errors: Vec<SourceError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<BTreeMap<String, Value>>,
}
