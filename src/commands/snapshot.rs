use crate::models::CustomerRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read a customer table written as a JSON array of records.
pub fn read_customer_records(path: &Path) -> Result<Vec<CustomerRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open customer table {}", path.display()))?;
    let records: Vec<CustomerRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse customer table {}", path.display()))?;
    Ok(records)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_customer_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("customers.json");
        let records = vec![CustomerRecord {
            master_id: "a1".to_string(),
            order_channel: None,
            first_order_date: "2021-01-04".to_string(),
            last_order_date: "2021-03-01".to_string(),
            order_num_total_ever_online: 2.0,
            order_num_total_ever_offline: 1.0,
            customer_value_total_ever_online: 120.5,
            customer_value_total_ever_offline: 40.0,
        }];
        write_json(&path, &records).unwrap();
        assert_eq!(read_customer_records(&path).unwrap(), records);
    }

    #[test]
    fn reports_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let error = read_customer_records(&missing).unwrap_err();
        assert!(error.to_string().contains("Failed to open"));

        let malformed = dir.path().join("malformed.json");
        fs::write(&malformed, "{\"master_id\": 1}").unwrap();
        let error = read_customer_records(&malformed).unwrap_err();
        assert!(error.to_string().contains("Failed to parse"));
    }
}
