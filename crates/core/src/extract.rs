//! Report Extractor: pulls a marker-delimited JSON crash report out of raw
//! AI workflow output and normalizes it into typed data.
//!
//! The pipeline is a single linear pass: select the message text from the
//! first workflow record, scan for an incident identifier, slice the region
//! between the sentinel markers, parse it, validate the required fields, and
//! normalize the rest. Every outcome is wrapped in the uniform [`Envelope`];
//! extraction never fails the caller's transport.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::incident::{IncidentId, IncidentScanner};
use crate::domain::report::{CrashReport, PartEntry};
use crate::errors::ExtractError;

pub const JSON_START_MARKER: &str = "###JSON_START###";
pub const JSON_END_MARKER: &str = "###JSON_END###";

/// Record fields checked for the AI message, first match wins.
const MESSAGE_FIELDS: [&str; 4] = ["output", "message", "text", "response"];

const FAILURE_MESSAGE: &str = "Failed to parse crash report. Please ensure the AI has generated a complete report with JSON markers.";

/// Uniform success/failure wrapper returned to workflow callers.
///
/// `incident_id` and `has_incident_id` are present only when incident
/// linking is enabled; a failure envelope never carries a partial report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_data: Option<CrashReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<IncidentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_incident_id: Option<bool>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A successfully extracted report plus the identifier that correlates it
/// with a previously created incident, when one was discovered.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub report: CrashReport,
    pub incident_id: Option<IncidentId>,
}

pub struct ReportExtractor {
    scanner: IncidentScanner,
    link_incidents: bool,
}

impl Default for ReportExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReportExtractor {
    pub fn new(link_incidents: bool) -> Self {
        Self { scanner: IncidentScanner::new(), link_incidents }
    }

    /// Run the full pipeline over workflow output records and wrap the
    /// outcome in the envelope contract.
    pub fn extract(&self, records: &[Value]) -> Envelope {
        let raw_message = source_message(records);
        self.extract_raw(&raw_message)
    }

    /// Same pipeline, starting from an already-selected AI message.
    pub fn extract_raw(&self, raw_message: &str) -> Envelope {
        debug!(raw_message = %raw_message, "extracting crash report from AI message");

        match self.extract_report(raw_message) {
            Ok(extraction) => {
                debug!(report = ?extraction.report, "crash report extracted");
                self.success_envelope(extraction)
            }
            Err(error) => {
                warn!(error = %error, "crash report extraction failed");
                Envelope {
                    success: false,
                    report_data: None,
                    incident_id: None,
                    has_incident_id: None,
                    message: FAILURE_MESSAGE.to_string(),
                    error: Some(format!("Error parsing crash report: {error}")),
                }
            }
        }
    }

    /// Marker slicing, parsing, validation, and normalization for a single
    /// raw AI message.
    pub fn extract_report(&self, raw_message: &str) -> Result<Extraction, ExtractError> {
        let scanned = if self.link_incidents { self.scanner.find(raw_message) } else { None };

        let json_slice = marker_region(raw_message)?;
        debug!(json_slice = %json_slice, "extracted marker-delimited JSON");

        let parsed: Value = serde_json::from_str(json_slice)
            .map_err(|error| ExtractError::JsonParse(error.to_string()))?;

        // Required fields, checked in this fixed order; the first absent
        // field is the one reported.
        let driver = require_field(&parsed, "driver")?;
        let date = require_field(&parsed, "date")?;
        let event = require_field(&parsed, "event")?;

        let incident_id = if self.link_incidents {
            explicit_incident_id(&parsed).or(scanned)
        } else {
            None
        };

        let report = CrashReport {
            driver,
            date,
            chassis: optional_field(&parsed, "chassis"),
            event,
            accident_damage: optional_field(&parsed, "accident_damage"),
            parts: normalize_parts(parsed.get("parts")),
        };

        Ok(Extraction { report, incident_id })
    }

    fn success_envelope(&self, extraction: Extraction) -> Envelope {
        let Extraction { report, incident_id } = extraction;

        let message = if !self.link_incidents {
            "Crash report parsed successfully".to_string()
        } else {
            match &incident_id {
                Some(incident_id) => {
                    format!("Crash report parsed successfully and linked to incident {incident_id}")
                }
                None => "Crash report parsed successfully (no incident id detected)".to_string(),
            }
        };

        Envelope {
            success: true,
            report_data: Some(report),
            has_incident_id: if self.link_incidents { Some(incident_id.is_some()) } else { None },
            incident_id,
            message,
            error: None,
        }
    }
}

/// Select the AI message from the first workflow record: first-match-wins
/// over the known string fields of the record's `json` sub-object, falling
/// back to serializing the whole sub-object. An empty field is skipped the
/// same way a missing one is.
fn source_message(records: &[Value]) -> String {
    let Some(record) = records.first() else {
        return String::new();
    };
    let payload = record.get("json").unwrap_or(record);

    for field in MESSAGE_FIELDS {
        if let Some(Value::String(message)) = payload.get(field) {
            if !message.is_empty() {
                return message.clone();
            }
        }
    }

    payload.to_string()
}

/// Slice strictly between the sentinel markers. The end marker is searched
/// independently of the start marker; an end marker at or before the payload
/// start yields a nonsensical region and is reported the same way as a
/// missing marker.
fn marker_region(raw_message: &str) -> Result<&str, ExtractError> {
    let start = raw_message.find(JSON_START_MARKER).ok_or(ExtractError::MarkersNotFound)?;
    let end = raw_message.find(JSON_END_MARKER).ok_or(ExtractError::MarkersNotFound)?;

    let payload_start = start + JSON_START_MARKER.len();
    if end < payload_start {
        return Err(ExtractError::MarkersNotFound);
    }

    Ok(raw_message[payload_start..end].trim())
}

/// A required field that is missing, null, non-string, or empty counts as
/// absent.
fn require_field(parsed: &Value, field: &'static str) -> Result<String, ExtractError> {
    match parsed.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ExtractError::MissingField(field)),
    }
}

fn optional_field(parsed: &Value, field: &str) -> String {
    match parsed.get(field) {
        Some(Value::String(value)) => value.clone(),
        _ => String::new(),
    }
}

/// An `incident_id` field inside the report takes precedence over any
/// identifier scanned out of the surrounding text.
fn explicit_incident_id(parsed: &Value) -> Option<IncidentId> {
    match parsed.get("incident_id") {
        Some(Value::String(value)) if !value.trim().is_empty() => {
            Some(IncidentId::normalize(value))
        }
        _ => None,
    }
}

fn normalize_parts(parts: Option<&Value>) -> Vec<PartEntry> {
    let entries = match parts {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            warn!(parts = %other, "parts field is not an array, dropping it");
            return Vec::new();
        }
    };

    entries.iter().map(PartEntry::from_json).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::domain::incident::IncidentId;
    use crate::errors::ExtractError;

    use super::{source_message, Envelope, ReportExtractor};

    fn record(message: &str) -> Value {
        json!([{"json": {"output": message}}])
    }

    fn extract(message: &str) -> Envelope {
        let records = record(message);
        ReportExtractor::default().extract(records.as_array().expect("records fixture"))
    }

    const MINIMAL: &str = r#"###JSON_START###{"driver":"A","date":"2024-01-01","event":"collision"}###JSON_END###"#;

    #[test]
    fn minimal_report_succeeds_with_defaults() {
        let envelope = extract(MINIMAL);

        assert!(envelope.success);
        assert!(envelope.error.is_none());
        let report = envelope.report_data.expect("report should be present");
        assert_eq!(report.driver, "A");
        assert_eq!(report.date, "2024-01-01");
        assert_eq!(report.event, "collision");
        assert_eq!(report.chassis, "");
        assert_eq!(report.accident_damage, "");
        assert!(report.parts.is_empty());
        assert_eq!(envelope.has_incident_id, Some(false));
        assert!(envelope.incident_id.is_none());
    }

    #[test]
    fn missing_markers_fail_with_markers_error() {
        let envelope = extract("The assessment is still in progress, no report yet.");

        assert!(!envelope.success);
        assert!(envelope.report_data.is_none());
        let error = envelope.error.expect("error should be present");
        assert!(error.contains("JSON markers not found"));
        assert!(envelope.message.contains("Failed to parse crash report"));
    }

    #[test]
    fn missing_end_marker_fails_the_same_way() {
        let envelope = extract(r#"###JSON_START###{"driver":"A"}"#);

        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("JSON markers not found"));
    }

    #[test]
    fn end_marker_before_start_marker_is_treated_as_missing_markers() {
        let envelope =
            extract(r#"###JSON_END###{"driver":"A","date":"d","event":"e"}###JSON_START###"#);

        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("JSON markers not found"));
    }

    #[test]
    fn malformed_json_fails_with_parse_error() {
        let envelope = extract("###JSON_START###{not json}###JSON_END###");

        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("not valid JSON"));
    }

    #[test]
    fn first_missing_required_field_is_reported() {
        let envelope =
            extract(r#"###JSON_START###{"date":"2024-01-01","event":"collision"}###JSON_END###"#);

        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("missing required field: driver"));
    }

    #[test]
    fn required_fields_are_checked_in_driver_date_event_order() {
        let envelope = extract(r#"###JSON_START###{"event":"collision"}###JSON_END###"#);
        assert!(envelope.error.expect("error").contains("driver"));

        let envelope = extract(r#"###JSON_START###{"driver":"A"}###JSON_END###"#);
        assert!(envelope.error.expect("error").contains("date"));

        let envelope = extract(r#"###JSON_START###{"driver":"A","date":"d"}###JSON_END###"#);
        assert!(envelope.error.expect("error").contains("event"));
    }

    #[test]
    fn empty_required_field_counts_as_missing() {
        let envelope =
            extract(r#"###JSON_START###{"driver":"","date":"d","event":"e"}###JSON_END###"#);

        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("missing required field: driver"));
    }

    #[test]
    fn part_entries_are_normalized() {
        let envelope = extract(
            r#"###JSON_START###{"driver":"A","date":"d","event":"e",
               "parts":[{"part":"front wing","price":"12.5","qty":"3"},{"price":"abc"}]}###JSON_END###"#,
        );

        let report = envelope.report_data.expect("report");
        assert_eq!(report.parts.len(), 2);
        assert_eq!(report.parts[0].part, "front wing");
        assert_eq!(report.parts[0].price, 12.5);
        assert_eq!(report.parts[0].qty, 3);
        assert_eq!(report.parts[0].likelihood, "Possible");
        assert_eq!(report.parts[1].price, 0.0);
        assert_eq!(report.parts[1].qty, 1);
    }

    #[test]
    fn non_array_parts_are_dropped() {
        let envelope = extract(
            r#"###JSON_START###{"driver":"A","date":"d","event":"e","parts":"none"}###JSON_END###"#,
        );

        assert!(envelope.success);
        assert!(envelope.report_data.expect("report").parts.is_empty());
    }

    #[test]
    fn identifier_outside_the_json_region_is_linked() {
        let envelope = extract(&format!("Incident VRD-20240115-AB12CD assessed.\n{MINIMAL}"));

        assert!(envelope.success);
        assert_eq!(envelope.incident_id, Some(IncidentId("VRD-20240115-AB12CD".to_string())));
        assert_eq!(envelope.has_incident_id, Some(true));
        assert!(envelope.message.contains("VRD-20240115-AB12CD"));
    }

    #[test]
    fn explicit_incident_field_wins_over_scanned_identifier() {
        let envelope = extract(concat!(
            "See VRD-20240101-AAAAAA.\n",
            r#"###JSON_START###{"driver":"A","date":"d","event":"e","#,
            r#""incident_id":"vrd-20240115-ab12cd"}###JSON_END###"#,
        ));

        assert_eq!(envelope.incident_id, Some(IncidentId("VRD-20240115-AB12CD".to_string())));
    }

    #[test]
    fn linking_disabled_omits_incident_fields() {
        let records = record(&format!("VRD-20240115-AB12CD\n{MINIMAL}"));
        let envelope =
            ReportExtractor::new(false).extract(records.as_array().expect("records fixture"));

        assert!(envelope.success);
        assert!(envelope.incident_id.is_none());
        assert!(envelope.has_incident_id.is_none());
        assert_eq!(envelope.message, "Crash report parsed successfully");

        let wire = serde_json::to_value(&envelope).expect("serialize envelope");
        assert!(wire.get("incidentId").is_none());
        assert!(wire.get("hasIncidentId").is_none());
    }

    #[test]
    fn envelope_serializes_with_camel_case_keys() {
        let wire = serde_json::to_value(extract(MINIMAL)).expect("serialize envelope");

        assert_eq!(wire["success"], json!(true));
        assert!(wire.get("reportData").is_some());
        assert_eq!(wire["hasIncidentId"], json!(false));
        assert!(wire.get("error").is_none());
        assert_eq!(wire["reportData"]["accident_damage"], json!(""));
    }

    #[test]
    fn empty_record_list_yields_markers_failure() {
        let envelope = ReportExtractor::default().extract(&[]);
        assert!(!envelope.success);
        assert!(envelope.error.expect("error").contains("JSON markers not found"));
    }

    #[test]
    fn message_field_precedence_is_output_message_text_response() {
        let records = json!([{"json": {"response": "r", "text": "t", "message": "m"}}]);
        assert_eq!(source_message(records.as_array().expect("records")), "m");

        let records = json!([{"json": {"output": "o", "message": "m"}}]);
        assert_eq!(source_message(records.as_array().expect("records")), "o");
    }

    #[test]
    fn empty_message_fields_are_skipped() {
        let records = json!([{"json": {"output": "", "text": "t"}}]);
        assert_eq!(source_message(records.as_array().expect("records")), "t");
    }

    #[test]
    fn record_without_known_fields_is_serialized_wholesale() {
        let records = json!([{"json": {"data": {"driver": "A"}}}]);
        let message = source_message(records.as_array().expect("records"));
        assert!(message.contains("\"driver\":\"A\""));
    }

    #[test]
    fn record_without_json_sub_object_is_used_directly() {
        let records = json!([{"output": "direct"}]);
        assert_eq!(source_message(records.as_array().expect("records")), "direct");
    }

    #[test]
    fn array_payload_between_markers_reports_missing_driver() {
        // JSON that parses but is not an object has no fields at all, so the
        // first required field is the one reported.
        let envelope = extract(r#"###JSON_START###[1,2,3]###JSON_END###"#);
        assert!(envelope.error.expect("error").contains("missing required field: driver"));
    }

    #[test]
    fn extract_report_returns_typed_error() {
        let extractor = ReportExtractor::default();
        let result = extractor.extract_report("no markers");
        assert_eq!(result.expect_err("should fail"), ExtractError::MarkersNotFound);
    }
}
