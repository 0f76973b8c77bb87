use std::fs;
use std::io::Read;
use std::path::Path;

use crashdesk_core::config::{AppConfig, LoadOptions};
use crashdesk_core::extract::ReportExtractor;
use serde_json::Value;

use crate::commands::CommandResult;

/// Runs the report extractor over a workflow records file (or stdin) and
/// prints the envelope as one JSON line. Exit code 1 means the envelope is a
/// failure envelope, so shell pipelines can branch without parsing it.
pub fn run(input: Option<&Path>, raw: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "extract",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let text = match read_input(input) {
        Ok(text) => text,
        Err(error) => {
            return CommandResult::failure(
                "extract",
                "input_read",
                format!("could not read input: {error}"),
                3,
            );
        }
    };

    let extractor = ReportExtractor::new(config.ingest.link_incidents);
    let envelope = if raw {
        extractor.extract_raw(&text)
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(records)) => extractor.extract(&records),
            Ok(record @ Value::Object(_)) => extractor.extract(std::slice::from_ref(&record)),
            Ok(_) | Err(_) => {
                return CommandResult::failure(
                    "extract",
                    "input_decode",
                    "input is not a JSON record array or object (use --raw for bare AI messages)",
                    4,
                );
            }
        }
    };

    let exit_code = u8::from(!envelope.success);
    let output = serde_json::to_string(&envelope).unwrap_or_else(|error| {
        format!(
            "{{\"success\":false,\"message\":\"envelope serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code, output }
}

fn read_input(input: Option<&Path>) -> std::io::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
