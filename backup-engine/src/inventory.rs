//! Inventory loading from CSV.
//!
//! The first row is a header. Recognized columns (case insensitive):
//! `ip` (or `host`/`address`), `username`, `password`, `device_type`,
//! `secret`, `hostname`, and optionally `port`.

use crate::config::EngineConfig;
use crate::device::{is_safe_hostname, Device};
use crate::utils::errors::InventoryError;
use crate::utils::Sensitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct InventoryRow {
    #[serde(alias = "ip", alias = "host")]
    address: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: Sensitive,
    #[serde(default)]
    device_type: String,
    #[serde(default)]
    secret: Sensitive,
    hostname: String,
    #[serde(default)]
    port: Option<u16>,
}

/// Load devices from the CSV file at `path`, in file order.
pub fn load(path: &Path, default_port: u16) -> Result<Vec<Device>, InventoryError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| InventoryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let devices = parse(reader, default_port)?;
    info!(path = %path.display(), count = devices.len(), "Loaded inventory");
    Ok(devices)
}

/// Load the inventory named by the configuration.
pub fn load_from_config(config: &EngineConfig) -> crate::Result<Vec<Device>> {
    Ok(load(&config.inventory.path, config.session.port)?)
}

/// Parse inventory CSV from any reader.
pub fn from_reader<R: Read>(input: R, default_port: u16) -> Result<Vec<Device>, InventoryError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    parse(reader, default_port)
}

fn parse<R: Read>(mut reader: csv::Reader<R>, default_port: u16) -> Result<Vec<Device>, InventoryError> {
    // Lower-case the header so `Hostname` and `hostname` both match.
    let headers = reader
        .headers()
        .map_err(|source| InventoryError::Parse { row: 1, source })?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect::<csv::StringRecord>();
    reader.set_headers(headers);

    let mut devices = Vec::new();
    let mut seen: HashMap<String, u64> = HashMap::new();

    for (idx, result) in reader.deserialize::<InventoryRow>().enumerate() {
        // Row numbers are 1-based and count the header line.
        let row_no = idx as u64 + 2;
        let row = result.map_err(|source| InventoryError::Parse {
            row: row_no,
            source,
        })?;

        if row.address.is_empty() {
            return Err(InventoryError::InvalidRow {
                row: row_no,
                reason: "missing address".into(),
            });
        }
        if !is_safe_hostname(&row.hostname) {
            return Err(InventoryError::InvalidRow {
                row: row_no,
                reason: format!("hostname {:?} cannot name a backup directory", row.hostname),
            });
        }
        if let Some(&first_row) = seen.get(&row.hostname) {
            return Err(InventoryError::DuplicateHostname {
                row: row_no,
                hostname: row.hostname,
                first_row,
            });
        }
        seen.insert(row.hostname.clone(), row_no);

        devices.push(Device {
            address: row.address,
            port: row.port.unwrap_or(default_port),
            username: row.username,
            password: row.password,
            secret: row.secret,
            device_type: if row.device_type.is_empty() {
                "cisco_ios".to_string()
            } else {
                row.device_type
            },
            hostname: row.hostname,
        });
    }

    Ok(devices)
}
