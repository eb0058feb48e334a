use crate::model::Performance;
use serde::{Deserialize, Serialize};

/// Number of entries reported in `recent_tests`.
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedTestSummary {
    pub test_id: String,
    pub test_name: String,
    pub total_score: u32,
    pub total_possible_score: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_tests: usize,
    pub average_score: Option<f64>,
    pub best_score: Option<f64>,
    pub worst_score: Option<f64>,
    pub recent_tests: Vec<GradedTestSummary>,
}

impl PerformanceSummary {
    pub fn empty() -> Self {
        Self {
            total_tests: 0,
            average_score: None,
            best_score: None,
            worst_score: None,
            recent_tests: Vec::new(),
        }
    }
}

pub fn percentage(total_score: u32, total_possible_score: u32) -> f64 {
    if total_possible_score == 0 {
        return 0.0;
    }
    total_score as f64 / total_possible_score as f64 * 100.0
}

/// Entries carrying both totals, in stored order. Ungraded submissions are skipped.
pub fn graded_tests(performance: &[Performance]) -> Vec<GradedTestSummary> {
    performance
        .iter()
        .filter_map(|p| match (p.total_score, p.total_possible_score) {
            (Some(score), Some(possible)) => Some(GradedTestSummary {
                test_id: p.test_id.clone(),
                test_name: p.test_name.clone(),
                total_score: score,
                total_possible_score: possible,
                percentage: percentage(score, possible),
            }),
            _ => None,
        })
        .collect()
}

/// Count, mean, best and worst percentage over graded entries.
///
/// `recent_tests` is ordered by test name descending, not by time: performance
/// entries carry no reliable date to sort on.
pub fn summarize(performance: &[Performance]) -> PerformanceSummary {
    let graded = graded_tests(performance);
    if graded.is_empty() {
        return PerformanceSummary::empty();
    }

    let n = graded.len();
    let sum: f64 = graded.iter().map(|g| g.percentage).sum();
    let best = graded
        .iter()
        .map(|g| g.percentage)
        .fold(f64::NEG_INFINITY, f64::max);
    let worst = graded
        .iter()
        .map(|g| g.percentage)
        .fold(f64::INFINITY, f64::min);

    let mut recent = graded;
    recent.sort_by(|a, b| b.test_name.cmp(&a.test_name));
    recent.truncate(RECENT_LIMIT);

    PerformanceSummary {
        total_tests: n,
        average_score: Some(sum / n as f64),
        best_score: Some(best),
        worst_score: Some(worst),
        recent_tests: recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(name: &str, score: Option<u32>, possible: Option<u32>) -> Performance {
        Performance {
            test_id: format!("id-{}", name),
            test_name: name.to_string(),
            submitted_answers: vec![],
            graded_answers: score.map(|_| vec![]),
            total_score: score,
            total_possible_score: possible,
            submitted_at: None,
            graded_at: None,
        }
    }

    #[test]
    fn test_empty_summary_serializes_nulls() {
        let summary = summarize(&[]);
        assert_eq!(summary, PerformanceSummary::empty());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "totalTests": 0,
                "averageScore": null,
                "bestScore": null,
                "worstScore": null,
                "recentTests": []
            })
        );
    }

    #[test]
    fn test_ungraded_entries_are_excluded() {
        let summary = summarize(&[perf("a", None, None), perf("b", None, None)]);
        assert_eq!(summary.total_tests, 0);
        assert_eq!(summary.average_score, None);
    }

    #[test]
    fn test_statistics() {
        let summary = summarize(&[
            perf("Test A", Some(3), Some(5)),
            perf("Test B", Some(5), Some(5)),
            perf("Pending", None, None),
            perf("Test C", Some(1), Some(4)),
        ]);
        assert_eq!(summary.total_tests, 3);
        let avg = summary.average_score.unwrap();
        assert!((avg - (60.0 + 100.0 + 25.0) / 3.0).abs() < 1e-9);
        assert_eq!(summary.best_score, Some(100.0));
        assert_eq!(summary.worst_score, Some(25.0));
    }

    #[test]
    fn test_recent_is_top_five_by_name_descending() {
        let entries: Vec<_> = ["b", "f", "a", "d", "c", "e", "g"]
            .iter()
            .map(|n| perf(n, Some(1), Some(2)))
            .collect();
        let summary = summarize(&entries);
        let names: Vec<_> = summary
            .recent_tests
            .iter()
            .map(|r| r.test_name.as_str())
            .collect();
        assert_eq!(names, vec!["g", "f", "e", "d", "c"]);
    }

    #[test]
    fn test_zero_possible_score_is_zero_percent() {
        assert_eq!(percentage(0, 0), 0.0);
        let summary = summarize(&[perf("empty", Some(0), Some(0))]);
        assert_eq!(summary.best_score, Some(0.0));
    }
}
