pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;

pub use domain::incident::{IncidentId, IncidentScanner};
pub use domain::report::{CrashReport, PartEntry, ReportStatus};
pub use errors::ExtractError;
pub use extract::{Envelope, Extraction, ReportExtractor, JSON_END_MARKER, JSON_START_MARKER};
