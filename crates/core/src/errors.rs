use thiserror::Error;

/// The only failures the extractor surfaces to callers. Malformed part
/// entries and non-numeric price/qty values are repaired with defaults
/// instead of being reported.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("JSON markers not found in AI response. The AI may not have generated a final report yet, or the format is incorrect.")]
    MarkersNotFound,
    #[error("embedded report is not valid JSON: {0}")]
    JsonParse(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
