#![crate_type = "lib"]
#![forbid(unsafe_code)]
#![forbid(missing_debug_implementations)]
#![forbid(missing_docs)]
#![doc = include_str!("../README.md")]

//! # secgroup_sync
//!
//! Turns firewall rules kept in a spreadsheet into cloud security-group changes.
//!
//! - Tolerant header detection with column synonyms
//! - Reconciliation against the rules already on the group
//! - Plan, confirm, apply; or a standalone shell script
//! - Usable as a CLI or as a library
//!
//! ## Example (CLI)
//! ```sh
//! secgroup_sync apply --source rules.xlsx --vpc-id vpc-0123abcd --group-name web --dry-run
//! ```

mod app;
mod config;
mod export;
mod header;
mod parse;
mod plan;
mod prompt;
mod provider;
mod ranges;
mod reconcile;
mod rule;
mod sheet;

pub use app::{
    run, run_apply, run_script, script_output, ApplyOptions, Args, Command, SyncError,
    SyncOutcome, TargetArgs, DEFAULT_SCRIPT_FILE,
};
pub use config::{
    load_config_file, ConfigError, ConfigFile, SyncConfig, DEFAULT_GROUP_DESCRIPTION,
};
pub use export::{
    export_plan, export_plan_json, export_script, render_plan, render_script, shell_quote,
    ExportError, ExportFormat, GeneratedScript, ScriptError,
};
pub use header::{
    normalize_header, resolve_headers, try_map, CanonicalField, ColumnRef, HeaderError,
    HeaderMap, ResolvedSheet, HEADER_SCAN_ROWS,
};
pub use parse::{parse_sheet, ParseError, ParsedRow};
pub use plan::{
    apply_plan, build_plan, collect_desired_rules, ApplyReport, GroupSpec, Plan, PlanError,
    SecurityGroupTarget,
};
pub use prompt::{is_affirmative, PromptError, Prompter, TerminalPrompter};
pub use provider::aws_cli::AwsCliProvider;
pub use provider::memory::{InMemorySecurityGroups, Mutation};
pub use provider::{
    IpPermission, IpRange, Ipv6Range, ProviderError, RemoteRule, SecurityGroupApi,
    DUPLICATE_PERMISSION_CODE,
};
pub use ranges::{parse_network, parse_ranges, smart_split, split_ranges, RangeError};
pub use reconcile::{remote_keys, DesiredRules, PermissionSet, ReconcileError, RuleKey};
pub use rule::{
    coerce_port, normalize_row, Direction, PortPolicy, RowOutcome, RuleRecord, SkipReason,
    MAX_DESCRIPTION_LEN,
};
pub use sheet::{read_workbook, CellValue, Sheet, SheetError, Workbook};
