//! JSON export of a plan.
//!
//! Permission blocks keep the cloud API field names so the output can be fed back to the
//! `aws` client.

use std::fs::File;
use std::io::Write;

use crate::export::ExportError;
use crate::plan::Plan;

/// Serializes `plan` as pretty JSON, writing it to `path` when given.
///
/// # Returns
/// * `Ok(String)` - The JSON content (also written to file if path is Some)
/// * `Err(ExportError)` - If writing to file or serializing fails
pub fn export_plan_json(plan: &Plan, path: Option<&str>) -> Result<String, ExportError> {
    let json = serde_json::to_string_pretty(plan)?;
    if let Some(path) = path {
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
    }
    Ok(json)
}
