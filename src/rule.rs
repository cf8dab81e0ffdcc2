//! Row normalization: one spreadsheet row into one [`RuleRecord`].

use ipnet::IpNet;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::header::{CanonicalField, HeaderMap};
use crate::ranges::{parse_ranges, split_ranges, RangeError};
use crate::sheet::CellValue;

/// Longest description the cloud API accepts.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Traffic direction of a rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound traffic
    Ingress,
    /// Outbound traffic
    Egress,
}

impl Direction {
    /// Classifies a free-text `type` cell such as `"Inbound Rule"` or `"Egress-only"`.
    pub fn classify(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        if value.starts_with("inbound") || value.contains("ingress") {
            Some(Direction::Ingress)
        } else if value.starts_with("outbound") || value.contains("egress") {
            Some(Direction::Egress)
        } else {
            None
        }
    }
}

/// How ports are handled for a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPolicy {
    /// tcp/udp (6/17): both ports required
    Ranged,
    /// icmp (1): blank ports mean every type and code
    Icmp,
    /// Anything else: ports are dropped
    Unported,
}

impl PortPolicy {
    /// Port policy of a lowercase protocol name or number.
    pub fn for_protocol(protocol: &str) -> Self {
        match protocol {
            "tcp" | "udp" | "6" | "17" => PortPolicy::Ranged,
            "icmp" | "1" => PortPolicy::Icmp,
            _ => PortPolicy::Unported,
        }
    }
}

/// One parsed spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRecord {
    /// Rule direction
    pub direction: Direction,
    /// Lowercase protocol, kept as written (`tcp`, `6`, `-1`, ...)
    pub protocol: String,
    /// First port, absent for non-port protocols
    pub from_port: Option<i32>,
    /// Last port, absent for non-port protocols
    pub to_port: Option<i32>,
    /// Networks in cell order
    pub cidrs: Vec<IpNet>,
    /// Row description, at most [`MAX_DESCRIPTION_LEN`] characters
    pub description: Option<String>,
}

impl RuleRecord {
    /// `"{PROTO} {fromPort|*}-{toPort|*}"`, used when a row carries no description.
    pub fn default_description(&self) -> String {
        let port = |p: Option<i32>| p.map_or_else(|| "*".to_string(), |p| p.to_string());
        format!(
            "{} {}-{}",
            self.protocol.to_uppercase(),
            port(self.from_port),
            port(self.to_port)
        )
    }

    /// Row description, or the synthesized default.
    pub fn description_or_default(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.default_description())
    }
}

/// Why a row produced no rule. Skips never abort a sheet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// `type` cell is blank
    #[error("blank type")]
    BlankType,
    /// `ipranges` cell is blank or holds no token
    #[error("no IP ranges")]
    BlankRanges,
    /// `type` cell is neither inbound nor outbound
    #[error("unknown direction '{0}'")]
    UnknownDirection(String),
    /// `ipprotocol` cell is blank
    #[error("blank protocol")]
    BlankProtocol,
    /// tcp/udp row without both ports
    #[error("missing ports for {protocol}")]
    MissingPorts {
        /// Protocol of the row
        protocol: String,
    },
}

impl SkipReason {
    /// Whether the skip deserves a warning rather than silence.
    pub fn is_warning(&self) -> bool {
        !matches!(self, SkipReason::BlankType | SkipReason::BlankRanges)
    }
}

/// Result of normalizing one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Row is a rule
    Rule(RuleRecord),
    /// Row is skipped
    Skip(SkipReason),
}

/// Coerces a port cell to an integer.
///
/// `443`, `"443"` and `"443.0"` all give `Some(443)`. Blank, non-numeric and
/// non-integral values give `None`.
pub fn coerce_port(cell: &CellValue) -> Option<i32> {
    let value = match cell {
        CellValue::Absent => return None,
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    if value.is_finite()
        && value.fract() == 0.0
        && value >= f64::from(i32::MIN)
        && value <= f64::from(i32::MAX)
    {
        Some(value as i32)
    } else {
        None
    }
}

/// Truncates to [`MAX_DESCRIPTION_LEN`] characters.
pub fn truncate_description(text: &str) -> String {
    text.chars().take(MAX_DESCRIPTION_LEN).collect()
}

/// Normalizes one data row under `map`.
///
/// # Errors
/// Returns [`RangeError`] when the IP ranges cell holds an invalid network; that aborts
/// the run, while every other problem only skips the row.
pub fn normalize_row(row: &[CellValue], map: &HeaderMap) -> Result<RowOutcome, RangeError> {
    let kind = map.cell(row, CanonicalField::Type).as_text();
    if kind.is_empty() {
        return Ok(RowOutcome::Skip(SkipReason::BlankType));
    }
    let Some(direction) = Direction::classify(&kind) else {
        return Ok(RowOutcome::Skip(SkipReason::UnknownDirection(kind)));
    };

    let ranges = map.cell(row, CanonicalField::IpRanges).as_text();
    if split_ranges(&ranges).is_empty() {
        return Ok(RowOutcome::Skip(SkipReason::BlankRanges));
    }

    let protocol = map
        .cell(row, CanonicalField::IpProtocol)
        .as_text()
        .to_lowercase();
    if protocol.is_empty() {
        return Ok(RowOutcome::Skip(SkipReason::BlankProtocol));
    }

    let mut from_port = coerce_port(map.cell(row, CanonicalField::FromPort));
    let mut to_port = coerce_port(map.cell(row, CanonicalField::ToPort));
    match PortPolicy::for_protocol(&protocol) {
        PortPolicy::Ranged => {
            if from_port.is_none() || to_port.is_none() {
                return Ok(RowOutcome::Skip(SkipReason::MissingPorts { protocol }));
            }
        }
        PortPolicy::Icmp => {
            if from_port.is_none() && to_port.is_none() {
                from_port = Some(-1);
                to_port = Some(-1);
            }
        }
        PortPolicy::Unported => {
            from_port = None;
            to_port = None;
        }
    }

    let cidrs = parse_ranges(&ranges)?;

    let description = Some(map.cell(row, CanonicalField::Description).as_text())
        .filter(|d| !d.is_empty())
        .map(|d| truncate_description(&d));

    Ok(RowOutcome::Rule(RuleRecord {
        direction,
        protocol,
        from_port,
        to_port,
        cidrs,
        description,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::try_map;

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    fn header() -> HeaderMap {
        try_map(&row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges", "Description"]))
            .unwrap()
    }

    fn rule(cells: &[&str]) -> RuleRecord {
        match normalize_row(&row(cells), &header()).unwrap() {
            RowOutcome::Rule(rule) => rule,
            RowOutcome::Skip(reason) => panic!("row skipped: {reason}"),
        }
    }

    fn skip(cells: &[&str]) -> SkipReason {
        match normalize_row(&row(cells), &header()).unwrap() {
            RowOutcome::Skip(reason) => reason,
            RowOutcome::Rule(rule) => panic!("row parsed: {rule:?}"),
        }
    }

    #[test]
    fn test_direction_classification() {
        assert_eq!(Direction::classify("Inbound Rule"), Some(Direction::Ingress));
        assert_eq!(Direction::classify("Egress-only"), Some(Direction::Egress));
        assert_eq!(Direction::classify("OUTBOUND"), Some(Direction::Egress));
        assert_eq!(Direction::classify("aws-ingress"), Some(Direction::Ingress));
        assert_eq!(Direction::classify("Unknown"), None);
    }

    #[test]
    fn test_unknown_direction_is_warning_skip() {
        let reason = skip(&["Unknown", "tcp", "22", "22", "10.0.0.0/8", ""]);
        assert_eq!(reason, SkipReason::UnknownDirection("Unknown".into()));
        assert!(reason.is_warning());
    }

    #[test]
    fn test_coerce_port() {
        assert_eq!(coerce_port(&CellValue::from("443.0")), Some(443));
        assert_eq!(coerce_port(&CellValue::Number(443.0)), Some(443));
        assert_eq!(coerce_port(&CellValue::from(" 22 ")), Some(22));
        assert_eq!(coerce_port(&CellValue::from("-1")), Some(-1));
        assert_eq!(coerce_port(&CellValue::Absent), None);
        assert_eq!(coerce_port(&CellValue::from("any")), None);
        assert_eq!(coerce_port(&CellValue::Number(80.5)), None);
    }

    #[test]
    fn test_basic_tcp_row() {
        let rule = rule(&["Inbound", "TCP", "443.0", "443", "0.0.0.0/0", "HTTPS"]);
        assert_eq!(rule.direction, Direction::Ingress);
        assert_eq!(rule.protocol, "tcp");
        assert_eq!(rule.from_port, Some(443));
        assert_eq!(rule.to_port, Some(443));
        assert_eq!(rule.cidrs, vec!["0.0.0.0/0".parse::<IpNet>().unwrap()]);
        assert_eq!(rule.description.as_deref(), Some("HTTPS"));
    }

    #[test]
    fn test_numeric_protocol_preserved() {
        let rule = rule(&["Outbound", "6", "80", "80", "10.0.0.0/8", ""]);
        assert_eq!(rule.protocol, "6");
        assert_eq!(rule.description, None);
    }

    #[test]
    fn test_tcp_missing_port_skipped() {
        let reason = skip(&["Inbound", "udp", "53", "", "10.0.0.0/8", ""]);
        assert_eq!(
            reason,
            SkipReason::MissingPorts {
                protocol: "udp".into()
            }
        );
        assert!(reason.is_warning());
    }

    #[test]
    fn test_icmp_defaults_to_all() {
        let rule = rule(&["Inbound", "icmp", "", "", "10.0.0.0/8", ""]);
        assert_eq!((rule.from_port, rule.to_port), (Some(-1), Some(-1)));
        let rule = rule_with_ports("1", "8", "0");
        assert_eq!((rule.from_port, rule.to_port), (Some(8), Some(0)));
    }

    fn rule_with_ports(proto: &str, from: &str, to: &str) -> RuleRecord {
        rule(&["Inbound", proto, from, to, "10.0.0.0/8", ""])
    }

    #[test]
    fn test_other_protocol_drops_ports() {
        let rule = rule_with_ports("-1", "0", "65535");
        assert_eq!((rule.from_port, rule.to_port), (None, None));
    }

    #[test]
    fn test_blank_cells_skip_silently() {
        assert_eq!(skip(&["", "tcp", "1", "1", "10.0.0.0/8", ""]), SkipReason::BlankType);
        assert_eq!(skip(&["Inbound", "tcp", "1", "1", " ", ""]), SkipReason::BlankRanges);
        assert!(!SkipReason::BlankType.is_warning());
        assert_eq!(skip(&["Inbound", "", "1", "1", "10.0.0.0/8", ""]), SkipReason::BlankProtocol);
    }

    #[test]
    fn test_invalid_cidr_is_error() {
        let res = normalize_row(&row(&["Inbound", "tcp", "1", "1", "10.0.0.0/99", ""]), &header());
        assert!(matches!(res, Err(RangeError::InvalidNetwork { .. })));
    }

    #[test]
    fn test_description_truncated() {
        let long = "x".repeat(300);
        let rule = rule(&["Inbound", "tcp", "1", "1", "10.0.0.0/8", long.as_str()]);
        assert_eq!(rule.description.unwrap().chars().count(), MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn test_default_description() {
        let rule = rule_with_ports("-1", "", "");
        assert_eq!(rule.default_description(), "-1 *-*");
        let rule = rule_with_ports("tcp", "22", "22");
        assert_eq!(rule.description_or_default(), "TCP 22-22");
    }
}
