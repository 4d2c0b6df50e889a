//! Result normalization
//!
//! Pure functions over a [`GradingResult`]: rounded scores, grade tiers, display
//! colors, progress fractions, and informational rubric-consistency warnings.
//! Nothing here mutates or corrects the model's numbers.

use crate::model::GradingResult;
use crate::prompt::SubmissionName;
use crate::rubric::{self, TOTAL_POINTS};
use serde::Serialize;

/// Display name used when neither the model nor the filename supplies one
pub const FALLBACK_DISPLAY_NAME: &str = "学生作业";

/// Five-tier grade ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GradeTier {
    A,
    B,
    C,
    D,
    F,
}

impl GradeTier {
    /// Tier for a percentage; thresholds are inclusive lower bounds checked from the top
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            GradeTier::A
        } else if percentage >= 80.0 {
            GradeTier::B
        } else if percentage >= 70.0 {
            GradeTier::C
        } else if percentage >= 60.0 {
            GradeTier::D
        } else {
            GradeTier::F
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            GradeTier::A => "#4caf50",
            GradeTier::B => "#8bc34a",
            GradeTier::C => "#ffc107",
            GradeTier::D => "#ff9800",
            GradeTier::F => "#f44336",
        }
    }

    /// Human-readable tier name with localized qualifier
    pub fn label(self) -> &'static str {
        match self {
            GradeTier::A => "A (优秀)",
            GradeTier::B => "B (良好)",
            GradeTier::C => "C (中等)",
            GradeTier::D => "D (及格)",
            GradeTier::F => "F (不及格)",
        }
    }
}

/// Round half away from zero to the nearest integer
pub fn round_score(score: f64) -> i64 {
    score.round() as i64
}

/// Percentage of `score` out of `max`; 0 when `max` is not positive
///
/// Computed as `score * 100 / max` so whole-number boundaries (e.g. 18/20) land exactly.
pub fn percentage(score: f64, max: f64) -> f64 {
    if max > 0.0 {
        score * 100.0 / max
    } else {
        0.0
    }
}

/// Tier of `score` out of `max`
pub fn tier_for(score: f64, max: f64) -> GradeTier {
    GradeTier::from_percentage(percentage(score, max))
}

/// Display color for `score` out of `max`
pub fn color_for(score: f64, max: f64) -> &'static str {
    tier_for(score, max).color()
}

/// Grade label for an overall 0-100 score
pub fn grade_label(score: f64) -> &'static str {
    tier_for(score, f64::from(TOTAL_POINTS)).label()
}

/// Progress-bar fraction `round(score) / max`, clamped to [0, 1]
pub fn fraction(score: f64, max: f64) -> f64 {
    if max > 0.0 {
        (round_score(score) as f64 / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Overall score block of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallScore {
    pub score: i64,
    pub tier: GradeTier,
    pub label: &'static str,
    pub color: &'static str,
}

/// One rendered category row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    pub name: String,
    pub score: i64,
    pub max_score: i64,
    /// Progress fraction in [0, 1]
    pub fraction: f64,
    /// Progress bar width in percent
    pub percent: f64,
    pub color: &'static str,
    pub feedback: String,
    /// Reported score is above the reported maximum
    pub exceeds_max: bool,
}

/// Rubric-consistency findings; informational only
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyWarning {
    ScoreExceedsMax { category: String, score: f64, max_score: f64 },
    MaxScoreMismatch { category: String, reported: f64, expected: u32 },
    UnknownCategory { category: String },
    MissingCategory { category: String },
    MaxTotalMismatch { total: f64 },
    OverallMismatch { overall: f64, category_total: f64 },
}

/// Normalized, display-ready grade report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub display_name: String,
    pub filename: String,
    pub is_video: bool,
    pub overall: OverallScore,
    pub summary: String,
    pub categories: Vec<CategoryRow>,
    pub consistency: Vec<ConsistencyWarning>,
}

impl ScoreReport {
    /// Render a grading result for the submission it was derived from
    pub fn build(result: &GradingResult, filename: &str, is_video: bool) -> Self {
        let overall = round_score(result.overall_score);
        let overall_tier = tier_for(overall as f64, f64::from(TOTAL_POINTS));

        let categories = result
            .categories
            .iter()
            .map(|c| {
                let fraction = fraction(c.score, c.max_score);
                CategoryRow {
                    name: c.name.clone(),
                    score: round_score(c.score),
                    max_score: round_score(c.max_score),
                    fraction,
                    percent: fraction * 100.0,
                    color: color_for(c.score, c.max_score),
                    feedback: c.feedback.clone(),
                    exceeds_max: c.score > c.max_score,
                }
            })
            .collect();

        Self {
            display_name: display_name(result, filename),
            filename: filename.to_string(),
            is_video,
            overall: OverallScore {
                score: overall,
                tier: overall_tier,
                label: overall_tier.label(),
                color: overall_tier.color(),
            },
            summary: result.summary.clone(),
            categories,
            consistency: consistency_warnings(result),
        }
    }
}

/// Model's name guess → name parsed from the filename → fixed fallback
pub fn display_name(result: &GradingResult, filename: &str) -> String {
    result
        .student_name()
        .map(str::to_string)
        .or_else(|| SubmissionName::parse(filename).map(|n| n.student_name))
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string())
}

/// Check the result against the rubric without changing it
pub fn consistency_warnings(result: &GradingResult) -> Vec<ConsistencyWarning> {
    let mut warnings = Vec::new();

    for category in &result.categories {
        if category.score > category.max_score {
            warnings.push(ConsistencyWarning::ScoreExceedsMax {
                category: category.name.clone(),
                score: category.score,
                max_score: category.max_score,
            });
        }

        match rubric::find(&category.name) {
            Some(expected)
                if (category.max_score - f64::from(expected.max_score)).abs() > f64::EPSILON =>
            {
                warnings.push(ConsistencyWarning::MaxScoreMismatch {
                    category: category.name.clone(),
                    reported: category.max_score,
                    expected: expected.max_score,
                });
            }
            Some(_) => {}
            None => warnings.push(ConsistencyWarning::UnknownCategory {
                category: category.name.clone(),
            }),
        }
    }

    for expected in rubric::categories() {
        if !result.categories.iter().any(|c| c.name.trim() == expected.name) {
            warnings.push(ConsistencyWarning::MissingCategory {
                category: expected.name.to_string(),
            });
        }
    }

    let max_total: f64 = result.categories.iter().map(|c| c.max_score).sum();
    if (max_total - f64::from(TOTAL_POINTS)).abs() > f64::EPSILON {
        warnings.push(ConsistencyWarning::MaxTotalMismatch { total: max_total });
    }

    // Summed in f64: shape-valid scores may be arbitrarily large
    let category_total: f64 = result.categories.iter().map(|c| c.score.round()).sum();
    if category_total != result.overall_score.round() {
        warnings.push(ConsistencyWarning::OverallMismatch {
            overall: result.overall_score,
            category_total,
        });
    }

    warnings
}
