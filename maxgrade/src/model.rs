//! Grading result data contract
//!
//! The model's response is untyped JSON at the boundary. It is parsed into these
//! strict shapes and checked before anything downstream sees it. Rubric-level
//! consistency (score ≤ max, totals) is deliberately not checked here; see
//! [`crate::normalizer::consistency_warnings`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured grade for one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    /// Overall score, 0-100 (integer by contract; rounded for display)
    pub overall_score: f64,
    /// Student name guessed from the filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name_guess: Option<String>,
    /// Overall comment from the grader
    pub summary: String,
    /// Per-category results in rubric order
    pub categories: Vec<CategoryResult>,
}

/// Result for one rubric category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
}

/// Why a response did not match the contract
#[derive(Debug, Error)]
pub enum ResponseShapeError {
    #[error("Response is not a valid grading document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: f64 },

    #[error("Response contains no categories")]
    NoCategories,
}

impl GradingResult {
    /// Parse and validate the model's JSON text
    pub fn from_json(text: &str) -> Result<Self, ResponseShapeError> {
        let result: GradingResult = serde_json::from_str(text.trim())?;
        result.validate()?;
        Ok(result)
    }

    /// Shape checks: every number finite and non-negative, at least one category
    pub fn validate(&self) -> Result<(), ResponseShapeError> {
        check_number("overallScore", self.overall_score)?;

        if self.categories.is_empty() {
            return Err(ResponseShapeError::NoCategories);
        }

        for (index, category) in self.categories.iter().enumerate() {
            check_number(&format!("categories[{}].score", index), category.score)?;
            check_number(&format!("categories[{}].maxScore", index), category.max_score)?;
        }

        Ok(())
    }

    /// Guessed student name, if the model supplied a non-blank one
    pub fn student_name(&self) -> Option<&str> {
        self.student_name_guess
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

fn check_number(field: &str, value: f64) -> Result<(), ResponseShapeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ResponseShapeError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}
