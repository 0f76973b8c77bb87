use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_LIKELIHOOD: &str = "Possible";

/// One suspected-damage line of a crash report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartEntry {
    pub part_number: String,
    pub part: String,
    pub likelihood: String,
    pub price: f64,
    pub qty: i64,
}

impl Default for PartEntry {
    fn default() -> Self {
        Self {
            part_number: String::new(),
            part: String::new(),
            likelihood: DEFAULT_LIKELIHOOD.to_string(),
            price: 0.0,
            qty: 1,
        }
    }
}

impl PartEntry {
    /// Build an entry from untrusted JSON. Anything that does not fit the
    /// expected shape is repaired with the field default rather than
    /// reported: AI-produced part lists routinely carry prices and
    /// quantities as strings.
    pub fn from_json(entry: &Value) -> Self {
        Self {
            part_number: string_field(entry, "part_number"),
            part: string_field(entry, "part"),
            likelihood: match entry.get("likelihood") {
                Some(Value::String(value)) if !value.is_empty() => value.clone(),
                _ => DEFAULT_LIKELIHOOD.to_string(),
            },
            price: coerce_price(entry.get("price")),
            qty: coerce_qty(entry.get("qty")),
        }
    }

    pub fn line_total(&self) -> f64 {
        self.price * self.qty as f64
    }
}

/// The normalized report extracted from an AI response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub driver: String,
    pub date: String,
    #[serde(default)]
    pub chassis: String,
    pub event: String,
    #[serde(default)]
    pub accident_damage: String,
    #[serde(default)]
    pub parts: Vec<PartEntry>,
}

impl CrashReport {
    pub fn total(&self) -> f64 {
        self.parts.iter().map(PartEntry::line_total).sum()
    }
}

/// Dashboard lifecycle of a stored report: created as `pending`, promoted to
/// `active` once the workflow enriches it, and `reviewed` after sign-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Active,
    Reviewed,
}

impl ReportStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "reviewed" => Some(Self::Reviewed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Reviewed => "reviewed",
        }
    }
}

fn string_field(entry: &Value, field: &str) -> String {
    match entry.get(field) {
        Some(Value::String(value)) => value.clone(),
        _ => String::new(),
    }
}

fn coerce_price(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(raw)) => match raw.trim().parse::<f64>() {
            Ok(price) if price.is_finite() => price,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

fn coerce_qty(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(number)) => {
            number.as_i64().or_else(|| number.as_f64().map(|qty| qty as i64)).unwrap_or(1)
        }
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|qty| qty as i64))
                .unwrap_or(1)
        }
        _ => 1,
    }
}
