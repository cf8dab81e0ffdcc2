//! Plan building and application against a security-group API.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::parse::{parse_sheet, ParseError};
use crate::provider::{IpPermission, ProviderError, SecurityGroupApi};
use crate::reconcile::{remote_keys, DesiredRules, ReconcileError};
use crate::rule::{Direction, RowOutcome};
use crate::sheet::Workbook;

/// Error type for `plan` operations.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Spreadsheet could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Remote call failed
    #[error("Security group API error: {0}")]
    Provider(#[from] ProviderError),
    /// Remote rules could not be compared
    #[error("Cannot compare remote rules: {0}")]
    Reconcile(#[from] ReconcileError),
}

/// The security group to reconcile, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    /// VPC holding the group
    pub vpc_id: String,
    /// Group name
    pub name: String,
    /// Description used when the group has to be created
    pub description: String,
}

/// The group a plan targets, with its id when it already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroupTarget {
    /// VPC holding the group
    pub vpc_id: String,
    /// Group name
    pub name: String,
    /// Group description
    pub description: String,
    /// Id of the existing group, absent when it will be created
    pub group_id: Option<String>,
}

/// Mutations needed to bring a group in line with a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Target group
    pub target: SecurityGroupTarget,
    /// Whether the group has to be created first
    pub create_group: bool,
    /// Ingress blocks to authorize
    pub ingress: Vec<IpPermission>,
    /// Egress blocks to authorize
    pub egress: Vec<IpPermission>,
}

impl Plan {
    /// True when at least one permission block is planned.
    pub fn has_rules(&self) -> bool {
        !self.ingress.is_empty() || !self.egress.is_empty()
    }

    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        !self.create_group && !self.has_rules()
    }

    /// Blocks paired with their direction, ingress first.
    pub fn blocks(&self) -> impl Iterator<Item = (Direction, &IpPermission)> {
        self.ingress
            .iter()
            .map(|b| (Direction::Ingress, b))
            .chain(self.egress.iter().map(|b| (Direction::Egress, b)))
    }
}

/// What [`apply_plan`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Id of the group that was updated
    pub group_id: String,
    /// Whether the group was created
    pub created_group: bool,
    /// Ingress blocks accepted
    pub ingress_blocks: usize,
    /// Egress blocks accepted
    pub egress_blocks: usize,
    /// Directions whose batch was rejected as already present
    pub duplicates: Vec<Direction>,
}

/// Parses every sheet of `workbook` into the set of wanted rules.
///
/// Sheets without data rows are skipped. Skipped rows are logged and never abort.
///
/// # Errors
/// Fails on the first sheet without a header row or the first invalid network.
pub fn collect_desired_rules(workbook: &Workbook) -> Result<DesiredRules, ParseError> {
    let mut desired = DesiredRules::new();
    for sheet in &workbook.sheets {
        if !sheet.has_data_rows() {
            debug!("Sheet '{}' has no data rows, skipping", sheet.name);
            continue;
        }
        let mut added = 0;
        for parsed in parse_sheet(sheet)? {
            match parsed.outcome {
                RowOutcome::Rule(record) => added += desired.insert_record(&record),
                RowOutcome::Skip(reason) if reason.is_warning() => warn!(
                    "Sheet '{}' row {}: {}; skipping row",
                    parsed.sheet, parsed.row, reason
                ),
                RowOutcome::Skip(reason) => debug!(
                    "Sheet '{}' row {}: {}; skipping row",
                    parsed.sheet, parsed.row, reason
                ),
            }
        }
        info!("Sheet '{}': {} new rule(s)", sheet.name, added);
    }
    Ok(desired)
}

/// Builds the plan for `spec` from `workbook` and the group's current rules.
///
/// The whole workbook is parsed before the API is called. Only read calls are made.
///
/// # Errors
/// Fails on parse errors, read-call errors, or unreadable remote rules.
pub fn build_plan<A>(spec: &GroupSpec, workbook: &Workbook, api: &A) -> Result<Plan, PlanError>
where
    A: SecurityGroupApi + ?Sized,
{
    let desired = collect_desired_rules(workbook)?;
    debug!("{} distinct rule(s) wanted", desired.len());

    let group_id = api.find_group(&spec.vpc_id, &spec.name)?;
    let existing = match &group_id {
        Some(id) => remote_keys(&api.list_rules(id)?)?,
        None => HashSet::new(),
    };
    let missing = desired.missing_from(&existing);

    Ok(Plan {
        create_group: group_id.is_none(),
        target: SecurityGroupTarget {
            vpc_id: spec.vpc_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            group_id,
        },
        ingress: missing.ingress,
        egress: missing.egress,
    })
}

/// Applies `plan`: creates the group if needed, then one authorize call per direction.
///
/// A batch rejected as already present counts as satisfied. Nothing is rolled back when a
/// later call fails.
///
/// # Errors
/// Fails on the first remote error other than a duplicate permission.
pub fn apply_plan<A>(plan: &Plan, api: &mut A) -> Result<ApplyReport, PlanError>
where
    A: SecurityGroupApi + ?Sized,
{
    let (group_id, created_group) = match &plan.target.group_id {
        Some(id) if !plan.create_group => (id.clone(), false),
        _ => {
            let target = &plan.target;
            let id = api.create_group(&target.vpc_id, &target.name, &target.description)?;
            info!("Created SG: {}", id);
            (id, true)
        }
    };
    let mut report = ApplyReport {
        group_id,
        created_group,
        ..ApplyReport::default()
    };

    for (direction, blocks) in [
        (Direction::Ingress, &plan.ingress),
        (Direction::Egress, &plan.egress),
    ] {
        if blocks.is_empty() {
            continue;
        }
        match api.authorize(direction, &report.group_id, blocks) {
            Ok(()) => {
                info!("Added {} {} permission block(s).", blocks.len(), direction);
                match direction {
                    Direction::Ingress => report.ingress_blocks = blocks.len(),
                    Direction::Egress => report.egress_blocks = blocks.len(),
                }
            }
            Err(ProviderError::DuplicatePermission { message, .. }) => {
                warn!("Some {} rules were duplicates; skipped ({})", direction, message);
                report.duplicates.push(direction);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(report)
}
