use std::collections::BTreeMap;

use crate::state::{Insights, RecruitingSection, ScheduleGame, TeamProfile};

/// Derive quick-hit highlights and a metrics map from whatever survived the
/// merge. Every insight is conditional on its inputs; missing data silently
/// omits the insight instead of emitting a placeholder.
pub fn build_insights(
    profile: &TeamProfile,
    stats: &BTreeMap<String, f64>,
    schedule: &[ScheduleGame],
    recruiting: &RecruitingSection,
) -> Insights {
    let mut quick_hits = Vec::new();
    let mut metrics = BTreeMap::new();

    if let Some(overall) = &profile.record.overall {
        let mut line = format!("Overall record {}-{}", overall.wins, overall.losses);
        if overall.ties > 0 {
            line.push_str(&format!("-{}", overall.ties));
        }
        if let Some(pct) = overall.win_percentage {
            line.push_str(&format!(" ({:.3})", pct));
            metrics.insert("win_percentage".to_string(), pct);
        }
        quick_hits.push(line);
    }

    if let Some(ppg) = stats.get("points_per_game").copied() {
        quick_hits.push(format!("Scoring {ppg:.1} points per game"));
        metrics.insert("points_per_game".to_string(), ppg);
    }
    if let Some(papg) = stats.get("points_allowed_per_game").copied() {
        quick_hits.push(format!("Allowing {papg:.1} points per game"));
        metrics.insert("points_allowed_per_game".to_string(), papg);
    }

    if let Some(delta) = margin_trend(schedule) {
        let direction = if delta > 0 {
            "improving"
        } else if delta < 0 {
            "declining"
        } else {
            "flat"
        };
        quick_hits.push(format!(
            "Scoring margin {direction} over the last two games ({delta:+})"
        ));
        metrics.insert("margin_trend".to_string(), delta as f64);
    }

    let total_commits = recruiting.summary.total_commits;
    if total_commits > 0 {
        quick_hits.push(format!("{total_commits} commits in the current class"));
        metrics.insert("total_commits".to_string(), total_commits as f64);
    }

    if let Some(rank) = recruiting.rankings.consensus.national_rank {
        quick_hits.push(format!("Ranked #{rank} nationally across boards"));
        metrics.insert("consensus_national_rank".to_string(), f64::from(rank));
    }

    Insights { quick_hits, metrics }
}

/// Margin delta between the two most recent completed games, in schedule
/// order; needs at least two completed games.
fn margin_trend(schedule: &[ScheduleGame]) -> Option<i64> {
    let margins: Vec<i64> = schedule.iter().filter_map(ScheduleGame::margin).collect();
    if margins.len() < 2 {
        return None;
    }
    let last = margins[margins.len() - 1];
    let prev = margins[margins.len() - 2];
    Some(last - prev)
}
