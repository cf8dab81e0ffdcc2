use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plan::GroupSpec;
use crate::prompt::{PromptError, Prompter};

mod load;

pub use load::load_config_file;

/// Description given to a created group when none is configured.
pub const DEFAULT_GROUP_DESCRIPTION: &str = "Created from spreadsheet";

/// Error type for `config` operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    /// Unsupported file format
    #[error("Unsupported file format: {path}")]
    UnsupportedFileFormat {
        /// File path
        path: String,
    },
    /// Required value neither configured nor answered
    #[error("Missing required value: {field}")]
    Missing {
        /// Configuration key
        field: &'static str,
    },
    /// Interactive prompt failed
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Partial settings, as read from a config file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// VPC holding the group
    #[serde(default)]
    pub vpc_id: Option<String>,
    /// Group name
    #[serde(default)]
    pub group_name: Option<String>,
    /// Description for a created group
    #[serde(default)]
    pub group_description: Option<String>,
    /// Cloud region
    #[serde(default)]
    pub region: Option<String>,
    /// Credentials profile
    #[serde(default)]
    pub profile: Option<String>,
    /// Spreadsheet path
    #[serde(default)]
    pub source_table: Option<PathBuf>,
}

/// Complete settings of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// VPC holding the group
    pub vpc_id: String,
    /// Group name
    pub group_name: String,
    /// Description for a created group
    pub group_description: String,
    /// Cloud region, or the client default
    pub region: Option<String>,
    /// Credentials profile, or the client default
    pub profile: Option<String>,
    /// Spreadsheet path
    pub source_table: PathBuf,
}

impl SyncConfig {
    /// The group this configuration targets.
    pub fn group_spec(&self) -> GroupSpec {
        GroupSpec {
            vpc_id: self.vpc_id.clone(),
            name: self.group_name.clone(),
            description: self.group_description.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<P>(
    value: Option<String>,
    field: &'static str,
    question: &str,
    prompter: &mut P,
) -> Result<String, ConfigError>
where
    P: Prompter + ?Sized,
{
    if let Some(value) = non_blank(value) {
        return Ok(value);
    }
    debug!("No {} configured, prompting", field);
    non_blank(Some(prompter.input(question, None)?)).ok_or(ConfigError::Missing { field })
}

fn optional<P>(
    value: &mut Option<String>,
    question: &str,
    default: Option<&str>,
    prompter: &mut P,
) -> Result<(), ConfigError>
where
    P: Prompter + ?Sized,
{
    if value.is_none() {
        *value = non_blank(Some(prompter.input(question, default)?));
    }
    Ok(())
}

impl ConfigFile {
    /// Layers `overrides` on top of `self`; every value set in `overrides` wins.
    pub fn merge(self, overrides: ConfigFile) -> ConfigFile {
        ConfigFile {
            vpc_id: overrides.vpc_id.or(self.vpc_id),
            group_name: overrides.group_name.or(self.group_name),
            group_description: overrides.group_description.or(self.group_description),
            region: overrides.region.or(self.region),
            profile: overrides.profile.or(self.profile),
            source_table: overrides.source_table.or(self.source_table),
        }
    }

    /// True when a required value is unset or blank, so [`ConfigFile::resolve`] will
    /// prompt for it.
    pub fn needs_prompt(&self) -> bool {
        let source = self
            .source_table
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        [source, self.vpc_id.clone(), self.group_name.clone()]
            .into_iter()
            .any(|value| non_blank(value).is_none())
    }

    /// Completes the settings, asking `prompter` for missing required values.
    ///
    /// Blank values count as missing. When a required value had to be asked for, the
    /// unset optional values are asked for too; a blank region or profile keeps the
    /// client default.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when a required value is still blank after
    /// prompting, or the prompt error itself.
    pub fn resolve<P>(self, prompter: &mut P) -> Result<SyncConfig, ConfigError>
    where
        P: Prompter + ?Sized,
    {
        let interactive = self.needs_prompt();
        let source_table = required(
            self.source_table.map(|p| p.to_string_lossy().into_owned()),
            "source_table",
            "Spreadsheet file (.xlsx, .ods, .csv)",
            prompter,
        )?;
        let vpc_id = required(
            self.vpc_id,
            "vpc_id",
            "VPC ID (e.g., vpc-0123abcd)",
            prompter,
        )?;
        let group_name = required(self.group_name, "group_name", "Security Group name", prompter)?;

        let mut group_description = non_blank(self.group_description);
        let mut region = non_blank(self.region);
        let mut profile = non_blank(self.profile);
        if interactive {
            optional(
                &mut group_description,
                "Security Group description",
                Some(DEFAULT_GROUP_DESCRIPTION),
                prompter,
            )?;
            optional(&mut region, "Region (blank for client default)", None, prompter)?;
            optional(&mut profile, "Profile (blank for client default)", None, prompter)?;
        }

        Ok(SyncConfig {
            vpc_id,
            group_name,
            group_description: group_description
                .unwrap_or_else(|| DEFAULT_GROUP_DESCRIPTION.to_string()),
            region,
            profile,
            source_table: PathBuf::from(source_table),
        })
    }
}
