use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation code linking a crash report to a previously created incident
/// record: `VRD-` + 8-digit date + `-` + 6 hex characters, always uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub String);

impl IncidentId {
    /// Normalize an explicitly supplied identifier. Input casing is not
    /// trusted; the canonical form is uppercase.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Mint a fresh identifier for a newly created dashboard report.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let entropy = Uuid::new_v4().simple().to_string();
        Self(format!("VRD-{}-{}", now.format("%Y%m%d"), entropy[..6].to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Finds incident identifiers embedded anywhere in free text, in either case.
pub struct IncidentScanner {
    pattern: Regex,
}

impl Default for IncidentScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentScanner {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?i)VRD-\d{8}-[0-9A-F]{6}")
                .expect("incident id pattern is valid"),
        }
    }

    pub fn find(&self, text: &str) -> Option<IncidentId> {
        self.pattern.find(text).map(|found| IncidentId(found.as_str().to_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{IncidentId, IncidentScanner};

    #[test]
    fn finds_identifier_embedded_in_prose() {
        let scanner = IncidentScanner::new();
        let found = scanner
            .find("Linked this crash to VRD-20240115-AB12CD per the duty engineer.")
            .expect("identifier should be found");
        assert_eq!(found, IncidentId("VRD-20240115-AB12CD".to_string()));
    }

    #[test]
    fn lowercase_identifiers_are_uppercased() {
        let scanner = IncidentScanner::new();
        let found = scanner.find("ref vrd-20240115-ab12cd").expect("identifier should be found");
        assert_eq!(found.as_str(), "VRD-20240115-AB12CD");
    }

    #[test]
    fn rejects_near_misses() {
        let scanner = IncidentScanner::new();
        assert!(scanner.find("VRD-2024-AB12CD has too few date digits").is_none());
        assert!(scanner.find("VRD-20240115-XYZ123 is not hex").is_none());
        assert!(scanner.find("no identifier here").is_none());
    }

    #[test]
    fn generated_identifiers_match_the_wire_format() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single().expect("valid timestamp");
        let generated = IncidentId::generate(now);

        let scanner = IncidentScanner::new();
        assert_eq!(scanner.find(generated.as_str()), Some(generated.clone()));
        assert!(generated.as_str().starts_with("VRD-20240115-"));
        assert_eq!(generated.as_str(), generated.as_str().to_uppercase());
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        let normalized = IncidentId::normalize("  vrd-20240201-0a1b2c ");
        assert_eq!(normalized.as_str(), "VRD-20240201-0A1B2C");
    }
}
