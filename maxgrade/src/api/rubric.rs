//! Rubric listing
//!
//! Lets the presentation layer show the scoring criteria before any result exists.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::rubric::{self, RUBRIC_VERSION, TOTAL_POINTS};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RubricEntry {
    pub name: &'static str,
    pub max_score: u32,
    /// "动画技术 (20)"
    pub label: String,
    pub criteria: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct RubricResponse {
    pub version: &'static str,
    pub total_points: u32,
    pub categories: Vec<RubricEntry>,
}

/// GET /api/rubric
pub async fn get_rubric() -> Json<RubricResponse> {
    let categories = rubric::categories()
        .iter()
        .map(|c| RubricEntry {
            name: c.name,
            max_score: c.max_score,
            label: rubric::display_label(c),
            criteria: c.criteria,
        })
        .collect();

    Json(RubricResponse {
        version: RUBRIC_VERSION,
        total_points: TOTAL_POINTS,
        categories,
    })
}

pub fn rubric_routes() -> Router<AppState> {
    Router::new().route("/api/rubric", get(get_rubric))
}
