use crate::plan::Plan;

/// Message shown when a plan has nothing to do.
pub const NOTHING_TO_DO: &str = "Nothing to add: all rules already exist.";

/// Formats the target line of a plan.
pub fn target_line(plan: &Plan) -> String {
    let target = &plan.target;
    match (&target.group_id, plan.create_group) {
        (Some(id), false) => format!("Target SG: {} ({}) in {}", target.name, id, target.vpc_id),
        _ => format!(
            "Target SG: {} (will be created) in {}",
            target.name, target.vpc_id
        ),
    }
}

/// Formats a plan as human-readable text for CLI output.
pub fn render_plan(plan: &Plan) -> String {
    let mut output = format!("{}\n", target_line(plan));
    if plan.is_empty() {
        output.push_str(&format!("{NOTHING_TO_DO}\n"));
        return output;
    }

    output.push_str("\nPlan:\n");
    if plan.create_group {
        output.push_str(&format!(
            "  - Create Security Group '{}' in VPC {} (description: '{}')\n",
            plan.target.name, plan.target.vpc_id, plan.target.description
        ));
    }
    if plan.has_rules() {
        output.push_str("  - Add rule blocks:\n");
        for (direction, block) in plan.blocks() {
            output.push_str(&format!(
                "      [{}] {} {}  {}",
                direction,
                block.ip_protocol,
                block.ports_label(),
                block.cidrs().join(", ")
            ));
            let descriptions = block.descriptions();
            if !descriptions.is_empty() {
                output.push_str(&format!("  # {}", descriptions.join("; ")));
            }
            output.push('\n');
        }
    }
    output
}
