use thiserror::Error;

#[derive(Error, Debug)]
pub enum AciError {
    /// Unusable transcript. Skipped and logged; never aborts a run.
    #[error("Malformed transcript {negotiation_id}: {reason}")]
    MalformedTranscript {
        negotiation_id: String,
        reason: String,
    },

    /// Internal signal: no monetary amounts. Converted to undefined features.
    #[error("Insufficient data in transcript {negotiation_id}")]
    InsufficientData { negotiation_id: String },

    /// A window has no group with evidence. Degrades to zero rows.
    #[error("Empty cohort for window {window}")]
    EmptyCohort { window: String },

    /// Weights negative, non-finite or not summing to 1.0. Fatal.
    #[error("Invalid weight config '{name}': {reason}")]
    InvalidWeightConfig { name: String, reason: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Group '{group_id}' has no scorable evidence")]
    NoScorableEvidence { group_id: String },

    #[error("CSV error at line {line}: {reason}")]
    Csv { line: usize, reason: String },

    #[error("CSV error: {0}")]
    CsvFormat(#[from] ::csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AciResult<T> = Result<T, AciError>;
