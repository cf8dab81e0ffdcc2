use clap::ValueEnum;
use tracing::info;

pub mod json;
pub mod script;
pub mod text;

pub use json::export_plan_json;
pub use script::{export_script, render_script, shell_quote, GeneratedScript, ScriptError};
pub use text::render_plan;

use crate::plan::Plan;

/// Error type for `export` operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supported plan export formats
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Permission blocks as pretty JSON
    Json,
    /// Rendered plan text
    Text,
}

impl ExportFormat {
    /// File extension of the format.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

/// Saves `plan` in `export` format and returns the path written.
///
/// Without `output_path`, the file is `sg_plan_<UTC timestamp>.<ext>` in the working
/// directory.
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub fn export_plan(
    plan: &Plan,
    export: ExportFormat,
    output_path: Option<&str>,
) -> Result<String, ExportError> {
    let output_path = output_path.map_or_else(
        || {
            format!(
                "sg_plan_{}.{}",
                chrono::Utc::now().format("%Y%m%d_%H%M%S"),
                export.extension()
            )
        },
        str::to_string,
    );

    match export {
        ExportFormat::Json => {
            export_plan_json(plan, Some(&output_path))?;
        }
        ExportFormat::Text => std::fs::write(&output_path, render_plan(plan))?,
    }

    info!("Plan exported to {}", output_path);
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SecurityGroupTarget;
    use crate::provider::IpPermission;

    fn plan() -> Plan {
        let mut block = IpPermission::new("tcp", Some(22), Some(22));
        block.push_cidr(&"10.0.0.0/8".parse().unwrap(), Some("SSH".into()));
        Plan {
            target: SecurityGroupTarget {
                vpc_id: "vpc-1".into(),
                name: "bastion".into(),
                description: "jump hosts".into(),
                group_id: Some("sg-1".into()),
            },
            create_group: false,
            ingress: vec![block],
            egress: Vec::new(),
        }
    }

    #[test]
    fn test_export_text_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.txt");
        let written = export_plan(&plan(), ExportFormat::Text, path.to_str()).unwrap();
        assert_eq!(written, path.to_str().unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[ingress] tcp 22-22  10.0.0.0/8  # SSH"));
    }

    #[test]
    fn test_export_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        export_plan(&plan(), ExportFormat::Json, path.to_str()).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["ingress"][0]["IpRanges"][0]["CidrIp"], "10.0.0.0/8");
    }

    #[test]
    fn test_extension() {
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::Text.extension(), "txt");
    }
}
