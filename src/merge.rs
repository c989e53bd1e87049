use chrono::Utc;

use crate::state::{
    MERGE_PRIORITY, RankingMetrics, RecruitingProspect, SourceId, TeamProfile, TeamRecord,
};
use crate::util::dedup_by_key;

fn priority_index(source: SourceId) -> usize {
    MERGE_PRIORITY
        .iter()
        .position(|s| *s == source)
        .unwrap_or(MERGE_PRIORITY.len())
}

/// Resolve the canonical profile: first non-null value wins per field, in
/// fixed source-priority order regardless of which fragment arrived first.
pub fn merge_team_profiles(mut fragments: Vec<(SourceId, TeamProfile)>) -> TeamProfile {
    fragments.sort_by_key(|(source, _)| priority_index(*source));

    let mut merged = TeamProfile::default();
    for (_, fragment) in fragments {
        merged.name = merged.name.or(fragment.name);
        merged.mascot = merged.mascot.or(fragment.mascot);
        merged.classification = merged.classification.or(fragment.classification);
        merged.district = merged.district.or(fragment.district);
        merged.location = merged.location.or(fragment.location);
        merged.coach = merged.coach.or(fragment.coach);
        merged.record = TeamRecord {
            overall: merged.record.overall.or(fragment.record.overall),
            district: merged.record.district.or(fragment.record.district),
            home: merged.record.home.or(fragment.record.home),
            away: merged.record.away.or(fragment.record.away),
        };
        merged.rankings.state = merged.rankings.state.or(fragment.rankings.state);
        merged.rankings.national = merged.rankings.national.or(fragment.rankings.national);
    }
    merged
}

/// Concatenate primary-board prospects ahead of secondary-board prospects and
/// dedup by identity key; on a conflicting duplicate the primary entry wins
/// because it comes first.
pub fn merge_prospects(
    primary: Vec<RecruitingProspect>,
    secondary: Vec<RecruitingProspect>,
) -> Vec<RecruitingProspect> {
    let mut combined = primary;
    combined.extend(secondary);
    dedup_by_key(combined, |prospect| prospect.identity_key())
}

/// Combine per-source ranking metrics into one consensus instance. Lower rank
/// is better, so the consensus rank is the minimum of the defined values;
/// scores are averaged; counts take the largest claim; all null when no
/// source reports the metric.
pub fn consensus_rankings(per_source: &[RankingMetrics]) -> RankingMetrics {
    if per_source.is_empty() {
        return RankingMetrics::default();
    }
    RankingMetrics {
        national_rank: min_defined(per_source.iter().map(|m| m.national_rank)),
        state_rank: min_defined(per_source.iter().map(|m| m.state_rank)),
        class_rank: min_defined(per_source.iter().map(|m| m.class_rank)),
        composite_score: mean_defined(per_source.iter().map(|m| m.composite_score)),
        average_rating: mean_defined(per_source.iter().map(|m| m.average_rating)),
        total_commits: max_defined(per_source.iter().map(|m| m.total_commits)),
        blue_chips: max_defined(per_source.iter().map(|m| m.blue_chips)),
        timestamp: per_source
            .iter()
            .filter_map(|m| m.timestamp)
            .max()
            .or_else(|| Some(Utc::now())),
    }
}

/// Cross-source team identity is substring containment over normalized
/// names, nothing smarter; disagreements are surfaced, not patched.
pub fn names_match(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn min_defined(values: impl Iterator<Item = Option<u32>>) -> Option<u32> {
    values.flatten().min()
}

fn max_defined(values: impl Iterator<Item = Option<u32>>) -> Option<u32> {
    values.flatten().max()
}

fn mean_defined(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let defined: Vec<f64> = values.flatten().collect();
    if defined.is_empty() {
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    }
}
