use sha2::{Digest, Sha256};

use crate::domain::entities::grid::Grid;

const SHEET_SEPARATOR: &str = "::";

/// Layout identity of a grid: SHA-256 hex over the trimmed, lower-cased
/// headers joined without separator, prefixed by `"{sheet}::"` when a sheet
/// name is given. Stored rule keys embed this value, so the format is fixed.
pub fn fingerprint(headers: &[String], sheet_name: Option<&str>) -> String {
    let mut material = String::new();
    if let Some(sheet) = sheet_name.map(str::trim).filter(|sheet| !sheet.is_empty()) {
        material.push_str(&sheet.to_lowercase());
        material.push_str(SHEET_SEPARATOR);
    }
    for header in headers {
        material.push_str(&header.trim().to_lowercase());
    }
    sha256_hex(material.as_bytes())
}

pub fn grid_fingerprint(grid: &Grid, sheet_name: Option<&str>) -> String {
    fingerprint(&grid.header_names(), sheet_name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
