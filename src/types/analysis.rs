//! Text analysis data structures

use crate::error::ServiceError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Longest text accepted for analysis, in characters
pub const MAX_TEXT_CHARS: usize = 5000;

/// Threshold used when a request or user does not specify one
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// The six toxicity dimensions reported by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToxicityDimension {
    Toxicity,
    SevereToxicity,
    Obscene,
    Threat,
    Insult,
    IdentityAttack,
}

impl ToxicityDimension {
    /// All dimensions, in classifier label order
    pub const ALL: [ToxicityDimension; 6] = [
        ToxicityDimension::Toxicity,
        ToxicityDimension::SevereToxicity,
        ToxicityDimension::Obscene,
        ToxicityDimension::Threat,
        ToxicityDimension::Insult,
        ToxicityDimension::IdentityAttack,
    ];

    /// Label used by the classifier and on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ToxicityDimension::Toxicity => "toxicity",
            ToxicityDimension::SevereToxicity => "severe_toxicity",
            ToxicityDimension::Obscene => "obscene",
            ToxicityDimension::Threat => "threat",
            ToxicityDimension::Insult => "insult",
            ToxicityDimension::IdentityAttack => "identity_attack",
        }
    }
}

/// Per-dimension toxicity probabilities.
///
/// Every value is kept in [0, 1]; all six dimensions are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToxicityProfile {
    pub toxicity: f64,
    pub severe_toxicity: f64,
    pub obscene: f64,
    pub threat: f64,
    pub insult: f64,
    pub identity_attack: f64,
}

impl ToxicityProfile {
    /// All-zero profile returned when no model output is available
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Build a profile from raw classifier output.
    ///
    /// Missing labels become 0.0, values are clamped to [0, 1] and NaN is
    /// treated as 0.0.
    pub fn from_scores(scores: &HashMap<String, f64>) -> Self {
        let mut profile = Self::neutral();
        for dimension in ToxicityDimension::ALL {
            let value = scores.get(dimension.name()).copied().unwrap_or(0.0);
            profile.set(dimension, value);
        }
        profile
    }

    pub fn get(&self, dimension: ToxicityDimension) -> f64 {
        match dimension {
            ToxicityDimension::Toxicity => self.toxicity,
            ToxicityDimension::SevereToxicity => self.severe_toxicity,
            ToxicityDimension::Obscene => self.obscene,
            ToxicityDimension::Threat => self.threat,
            ToxicityDimension::Insult => self.insult,
            ToxicityDimension::IdentityAttack => self.identity_attack,
        }
    }

    /// Set a dimension, clamping the value into [0, 1]
    pub fn set(&mut self, dimension: ToxicityDimension, value: f64) {
        let value = clamp_unit(value);
        match dimension {
            ToxicityDimension::Toxicity => self.toxicity = value,
            ToxicityDimension::SevereToxicity => self.severe_toxicity = value,
            ToxicityDimension::Obscene => self.obscene = value,
            ToxicityDimension::Threat => self.threat = value,
            ToxicityDimension::Insult => self.insult = value,
            ToxicityDimension::IdentityAttack => self.identity_attack = value,
        }
    }

    /// Iterate over `(dimension, value)` pairs in label order
    pub fn iter(&self) -> impl Iterator<Item = (ToxicityDimension, f64)> + '_ {
        ToxicityDimension::ALL.into_iter().map(|d| (d, self.get(d)))
    }
}

/// Clamp into [0, 1], mapping NaN to 0.0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Current time at microsecond precision, the finest PostgreSQL stores
pub(crate) fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A validated request to score a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    text: String,
    threshold: f64,
}

impl AnalysisRequest {
    /// Validate text and build a request.
    ///
    /// Rejects text that is blank after trimming or longer than
    /// [`MAX_TEXT_CHARS`] characters. The threshold is clamped to [0, 1].
    pub fn new(text: impl Into<String>, threshold: f64) -> Result<Self, ServiceError> {
        let text = text.into();

        if text.trim().is_empty() {
            return Err(ServiceError::Validation("Text cannot be empty".to_string()));
        }

        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(ServiceError::Validation(format!(
                "Text too long (max {} characters)",
                MAX_TEXT_CHARS
            )));
        }

        let threshold = if threshold.is_nan() {
            DEFAULT_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };

        Ok(Self { text, threshold })
    }

    /// Validate text and use the default threshold
    pub fn with_default_threshold(text: impl Into<String>) -> Result<Self, ServiceError> {
        Self::new(text, DEFAULT_THRESHOLD)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Outcome of scoring one text. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Text as submitted
    pub text: String,

    /// Aggregated regret score (0.0 - 1.0)
    pub regret_score: f64,

    /// `regret_score >= threshold`
    pub should_warn: bool,

    /// Per-dimension classifier output
    pub analysis: ToxicityProfile,

    /// Threshold the warning was evaluated against
    pub threshold: f64,

    /// Wall-clock time spent serving the request
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(
        request: &AnalysisRequest,
        regret_score: f64,
        profile: ToxicityProfile,
        processing_time: Duration,
    ) -> Self {
        Self {
            text: request.text().to_string(),
            regret_score,
            should_warn: regret_score >= request.threshold(),
            analysis: profile,
            threshold: request.threshold(),
            processing_time,
            timestamp: now_micros(),
        }
    }

    /// Condensed view used by analytics
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            text: self.text.clone(),
            regret_score: self.regret_score,
            should_warn: self.should_warn,
            timestamp: self.timestamp,
        }
    }
}

/// Short form of a stored analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub text: String,
    pub regret_score: f64,
    pub should_warn: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters over every stored analysis
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisTotals {
    pub total: u64,
    pub warned: u64,
    /// Sum of processing times, in seconds
    pub processing_time_sum: f64,
}

/// Serialize a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
