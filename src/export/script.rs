//! Shell script generation.
//!
//! The script performs the same find-or-create and authorize calls through the `aws`
//! client, without reconciliation: one authorize call per parsed row.

use std::path::Path;

use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::export::ExportError;
use crate::parse::{parse_sheet, ParseError};
use crate::provider::IpPermission;
use crate::rule::{Direction, RowOutcome, RuleRecord};
use crate::sheet::Workbook;

/// A rendered deployment script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    /// Script text
    pub content: String,
    /// Ingress authorize lines
    pub ingress: usize,
    /// Egress authorize lines
    pub egress: usize,
}

/// Quotes `value` for a POSIX shell. Plain words are returned unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn client_flags(config: &SyncConfig) -> String {
    let mut flags = String::new();
    if let Some(profile) = &config.profile {
        flags.push_str(&format!(" --profile {}", shell_quote(profile)));
    }
    if let Some(region) = &config.region {
        flags.push_str(&format!(" --region {}", shell_quote(region)));
    }
    flags
}

fn script_header(config: &SyncConfig, flags: &str) -> Vec<String> {
    vec![
        "#!/usr/bin/env bash".to_string(),
        "set -euo pipefail".to_string(),
        String::new(),
        format!("VPC_ID={}", shell_quote(&config.vpc_id)),
        format!("SG_NAME={}", shell_quote(&config.group_name)),
        format!("SG_DESC={}", shell_quote(&config.group_description)),
        String::new(),
        format!(
            "SG_ID=$(aws ec2 describe-security-groups{flags} \
             --filters \"Name=vpc-id,Values=$VPC_ID\" \"Name=group-name,Values=$SG_NAME\" \
             --query 'SecurityGroups[0].GroupId' --output text || true)"
        ),
        r#"if [[ "$SG_ID" == "None" || -z "${SG_ID}" ]]; then"#.to_string(),
        r#"  echo "Creating security group...""#.to_string(),
        format!(
            "  SG_ID=$(aws ec2 create-security-group{flags} \
             --group-name \"$SG_NAME\" --description \"$SG_DESC\" --vpc-id \"$VPC_ID\" \
             --tag-specifications \"ResourceType=security-group,Tags=[{{Key=Name,Value=$SG_NAME}}]\" \
             --query 'GroupId' --output text)"
        ),
        r#"  echo "Created SG: $SG_ID""#.to_string(),
        "else".to_string(),
        r#"  echo "Reusing SG: $SG_ID""#.to_string(),
        "fi".to_string(),
        String::new(),
    ]
}

fn authorize_line(record: &RuleRecord, flags: &str) -> Result<String, serde_json::Error> {
    let description = record.description_or_default();
    let mut permission =
        IpPermission::new(record.protocol.clone(), record.from_port, record.to_port);
    for cidr in &record.cidrs {
        permission.push_cidr(cidr, Some(description.clone()));
    }
    let payload = serde_json::to_string(&[permission])?;
    Ok(format!(
        "aws ec2 authorize-security-group-{}{} --group-id \"$SG_ID\" --ip-permissions {}",
        record.direction,
        flags,
        shell_quote(&payload)
    ))
}

/// Error raised while rendering a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Spreadsheet could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Permission JSON could not be built
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders the deployment script for `workbook`.
///
/// Rows skipped with a warning become `echo WARN` lines; silently skipped rows produce
/// nothing.
///
/// # Errors
/// Fails on a sheet without a header row or an invalid network.
pub fn render_script(
    config: &SyncConfig,
    workbook: &Workbook,
) -> Result<GeneratedScript, ScriptError> {
    let flags = client_flags(config);
    let mut lines = script_header(config, &flags);
    let (mut ingress, mut egress) = (0, 0);

    for sheet in &workbook.sheets {
        if !sheet.has_data_rows() {
            debug!("Sheet '{}' has no data rows, skipping", sheet.name);
            continue;
        }
        let rows = parse_sheet(sheet)?;
        lines.push(format!(
            "echo {}",
            shell_quote(&format!("Processing sheet: {}", sheet.name))
        ));
        for parsed in rows {
            match &parsed.outcome {
                RowOutcome::Rule(record) => {
                    lines.push(authorize_line(record, &flags)?);
                    match record.direction {
                        Direction::Ingress => ingress += 1,
                        Direction::Egress => egress += 1,
                    }
                }
                RowOutcome::Skip(reason) if reason.is_warning() => lines.push(format!(
                    "echo {} 1>&2",
                    shell_quote(&format!(
                        "WARN: sheet '{}' row {}: {}; row skipped",
                        parsed.sheet, parsed.row, reason
                    ))
                )),
                RowOutcome::Skip(_) => {}
            }
        }
        lines.push(String::new());
    }

    lines.push(format!(
        "echo \"Prepared {ingress} ingress and {egress} egress rule block(s) for $SG_NAME ($SG_ID)\""
    ));

    let mut content = lines.join("\n");
    content.push('\n');
    Ok(GeneratedScript {
        content,
        ingress,
        egress,
    })
}

/// Writes `script` to `path`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn export_script(script: &GeneratedScript, path: &Path) -> Result<(), ExportError> {
    std::fs::write(path, &script.content)?;
    info!(
        "Generated {}. Run it with: bash {}",
        path.display(),
        path.display()
    );
    Ok(())
}
