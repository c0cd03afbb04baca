use crate::error::CliError;
use async_trait::async_trait;
use engine_core::observer::IngestObserver;
use model::{
    core::utils::format_elapsed,
    events::IngestEvent,
    results::{CopyResult, IngestResult},
};
use serde::Serialize;
use tracing::warn;

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn copy_report(result: &CopyResult, as_json: bool) -> Result<String, CliError> {
    if as_json {
        return to_json(result);
    }
    let mut lines = vec![result.to_string(), "\tSplits:".to_string()];
    lines.extend(result.splits.iter().map(|split| format!("\t\t{split}")));
    lines.push(format!("\tElapsed: {}", format_elapsed(result.elapsed)));
    Ok(lines.join("\n"))
}

pub fn ingest_report(result: &IngestResult, as_json: bool) -> Result<String, CliError> {
    if as_json {
        return to_json(result);
    }
    Ok(result.full_report())
}

/// Writes the report to `path`, or prints it when no path is given.
pub async fn emit_report(report: String, path: Option<&str>) -> Result<(), CliError> {
    match path {
        Some(path) => tokio::fs::write(path, report).await?,
        None => println!("{report}"),
    }
    Ok(())
}

/// Prints every event to stderr as one JSON line.
pub struct JsonLinesObserver;

#[async_trait]
impl IngestObserver for JsonLinesObserver {
    async fn on_event(&self, event: &IngestEvent) {
        match serde_json::to_string(event) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => warn!(event = event.event_type(), error = %e, "Failed to serialize event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::split::SplitSize;
    use std::time::Duration;

    fn copy_result() -> CopyResult {
        CopyResult {
            table_name: "orders".into(),
            schema_name: "public".into(),
            table_row_count: 3,
            split_size: SplitSize::Unsplit,
            base_path: "/tmp/exports/orders/orders-NO_SPLIT".into(),
            elapsed: Duration::from_millis(1500),
            splits: vec![],
            columns: vec![],
        }
    }

    #[test]
    fn json_report_carries_the_result_fields() {
        let json = copy_report(&copy_result(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["table_name"], "orders");
        assert_eq!(value["table_row_count"], 3);
    }

    #[test]
    fn text_report_ends_with_the_elapsed_time() {
        let text = copy_report(&copy_result(), false).unwrap();
        assert!(text.contains("\tSplits:"));
        assert!(text.ends_with(&format!("\tElapsed: {}", format_elapsed(Duration::from_millis(1500)))));
    }

    #[tokio::test]
    async fn report_is_written_to_the_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        emit_report("{}".into(), path.to_str()).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
