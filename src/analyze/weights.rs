//! Per-dimension weights for the weighted composite score.
//!
//! JSON shape (also accepted as a `[weights]` table inside a profile):
//! {
//!   "technology": 40,
//!   "seniority": 10,
//!   "location": 20,
//!   "company": 10,
//!   "remote": 20
//! }
//!
//! Weights conceptually sum to 100 but only their ratios matter: the final
//! score is normalized by the maximum attainable sum.

use serde::{Deserialize, Serialize};

/// Scoring dimensions a profile can weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Technology,
    Seniority,
    Location,
    Company,
    Remote,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Technology,
        Dimension::Seniority,
        Dimension::Location,
        Dimension::Company,
        Dimension::Remote,
    ];
}

/// Missing dimensions in a `[weights]` table default to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub technology: f64,
    pub seniority: f64,
    pub location: f64,
    pub company: f64,
    pub remote: f64,
}

impl ScoreWeights {
    /// Balanced weights (sum 100) for callers that want weighted scoring
    /// without hand-tuning.
    pub fn balanced() -> Self {
        Self {
            technology: 35.0,
            seniority: 15.0,
            location: 20.0,
            company: 15.0,
            remote: 15.0,
        }
    }

    /// Negative or non-finite weights count as zero.
    pub fn weight(&self, d: Dimension) -> f64 {
        let w = match d {
            Dimension::Technology => self.technology,
            Dimension::Seniority => self.seniority,
            Dimension::Location => self.location,
            Dimension::Company => self.company,
            Dimension::Remote => self.remote,
        };
        if w.is_finite() && w > 0.0 {
            w
        } else {
            0.0
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.weight(*d)).sum()
    }
}
