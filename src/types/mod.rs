//! Type definitions for the regret scoring service

pub mod analysis;
pub mod settings;

pub use analysis::{
    AnalysisRequest, AnalysisResult, AnalysisSummary, AnalysisTotals, ToxicityDimension,
    ToxicityProfile, DEFAULT_THRESHOLD, MAX_TEXT_CHARS,
};
pub use settings::{StatusCheck, UserSettings};
