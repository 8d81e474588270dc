//! Renders a page of object rows into CSV or JSON (§4.9).

use ferrostore_meta::models::{InventoryFormat, ObjectRecord};
use serde::Serialize;

const COLUMNS: [&str; 7] = ["key", "version_id", "size", "etag", "storage_class", "last_modified", "is_delete_marker"];

#[derive(Serialize)]
struct InventoryRow<'a> {
    key: &'a str,
    version_id: &'a str,
    size: i64,
    etag: &'a str,
    storage_class: &'a str,
    last_modified: String,
    is_delete_marker: bool,
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_csv(records: &[ObjectRecord]) -> Vec<u8> {
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for record in records {
        let fields = [
            csv_escape(&record.key),
            csv_escape(&record.version_id),
            record.size.to_string(),
            csv_escape(&record.etag),
            csv_escape(&record.storage_class),
            record.last_modified.to_rfc3339(),
            record.is_delete_marker.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out.into_bytes()
}

fn render_json(records: &[ObjectRecord]) -> serde_json::Result<Vec<u8>> {
    let rows: Vec<InventoryRow<'_>> = records
        .iter()
        .map(|record| InventoryRow {
            key: &record.key,
            version_id: &record.version_id,
            size: record.size,
            etag: &record.etag,
            storage_class: &record.storage_class,
            last_modified: record.last_modified.to_rfc3339(),
            is_delete_marker: record.is_delete_marker,
        })
        .collect();
    serde_json::to_vec_pretty(&rows)
}

/// Render `records` in `format`, returning the bytes and the content type to
/// write them with.
pub fn render(records: &[ObjectRecord], format: InventoryFormat) -> ferrostore_common::Result<(Vec<u8>, &'static str)> {
    match format {
        InventoryFormat::Csv => Ok((render_csv(records), "text/csv")),
        InventoryFormat::Json => {
            let bytes = render_json(records).map_err(|e| ferrostore_common::Error::InvalidRequest(e.to_string()))?;
            Ok((bytes, "application/json"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_record(key: &str) -> ObjectRecord {
        ObjectRecord {
            bucket_id: Uuid::new_v4(),
            key: key.to_string(),
            version_id: "v1".to_string(),
            is_latest: true,
            is_delete_marker: false,
            size: 128,
            etag: "abc123".to_string(),
            content_type: "text/plain".to_string(),
            storage_class: "STANDARD".to_string(),
            metadata_json: "{}".to_string(),
            tags_json: None,
            retention_mode: None,
            retain_until: None,
            legal_hold: false,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_render_csv_has_header_and_escapes_commas() {
        let records = vec![sample_record("a,b.txt")];
        let (bytes, content_type) = render(&records, InventoryFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(content_type, "text/csv");
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        assert!(lines.next().unwrap().starts_with("\"a,b.txt\","));
    }

    #[test]
    fn test_render_json_round_trips_key() {
        let records = vec![sample_record("b.txt")];
        let (bytes, content_type) = render(&records, InventoryFormat::Json).unwrap();
        assert_eq!(content_type, "application/json");
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed[0]["key"], "b.txt");
    }
}
