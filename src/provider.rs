//! Cloud security-group API seam and its wire types.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::rule::Direction;

pub mod aws_cli;
pub mod memory;

/// Error code the cloud API returns when a permission already exists.
pub const DUPLICATE_PERMISSION_CODE: &str = "InvalidPermission.Duplicate";

/// Error type for `provider` operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Client program could not be started
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// Remote call failed
    #[error("{operation} failed (code: {code:?}): {message}")]
    CallFailed {
        /// API operation
        operation: String,
        /// Client exit code, when there is one
        code: Option<i32>,
        /// Error text reported by the API
        message: String,
    },
    /// One of the permissions already exists on the group
    #[error("{operation}: {message}")]
    DuplicatePermission {
        /// API operation
        operation: String,
        /// Error text reported by the API
        message: String,
    },
    /// Request or response JSON could not be handled
    #[error("{operation}: JSON error: {source}")]
    Decode {
        /// API operation
        operation: String,
        /// JSON error
        #[source]
        source: serde_json::Error,
    },
    /// Referenced group does not exist
    #[error("security group '{0}' not found")]
    GroupNotFound(String),
}

/// One IPv4 range entry of a permission block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    /// IPv4 network
    pub cidr_ip: String,
    /// Entry description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One IPv6 range entry of a permission block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipv6Range {
    /// IPv6 network
    pub cidr_ipv6: String,
    /// Entry description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// API-level rule descriptor: one protocol and port range, many networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    /// Protocol name or number
    pub ip_protocol: String,
    /// First port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    /// Last port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    /// IPv4 targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,
    /// IPv6 targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<Ipv6Range>,
}

impl IpPermission {
    /// Block without any target yet.
    pub fn new(
        ip_protocol: impl Into<String>,
        from_port: Option<i32>,
        to_port: Option<i32>,
    ) -> Self {
        Self {
            ip_protocol: ip_protocol.into(),
            from_port,
            to_port,
            ip_ranges: Vec::new(),
            ipv6_ranges: Vec::new(),
        }
    }

    /// Adds a network to the IPv4 or IPv6 list, by address family.
    pub fn push_cidr(&mut self, cidr: &IpNet, description: Option<String>) {
        match cidr {
            IpNet::V4(_) => self.ip_ranges.push(IpRange {
                cidr_ip: cidr.to_string(),
                description,
            }),
            IpNet::V6(_) => self.ipv6_ranges.push(Ipv6Range {
                cidr_ipv6: cidr.to_string(),
                description,
            }),
        }
    }

    /// All networks of the block, IPv4 first.
    pub fn cidrs(&self) -> Vec<&str> {
        self.ip_ranges
            .iter()
            .map(|r| r.cidr_ip.as_str())
            .chain(self.ipv6_ranges.iter().map(|r| r.cidr_ipv6.as_str()))
            .collect()
    }

    /// Distinct descriptions of the block, in entry order.
    pub fn descriptions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let all = self
            .ip_ranges
            .iter()
            .filter_map(|r| r.description.as_deref())
            .chain(self.ipv6_ranges.iter().filter_map(|r| r.description.as_deref()));
        for desc in all {
            if !out.contains(&desc) {
                out.push(desc);
            }
        }
        out
    }

    /// `"from-to"`, or `*` when either port is absent.
    pub fn ports_label(&self) -> String {
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) => format!("{from}-{to}"),
            _ => "*".to_string(),
        }
    }

    /// Number of networks in the block.
    pub fn len(&self) -> usize {
        self.ip_ranges.len() + self.ipv6_ranges.len()
    }

    /// True when the block has no network.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One rule currently present on a remote group, as the API lists it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteRule {
    /// Rule id
    #[serde(default)]
    pub security_group_rule_id: Option<String>,
    /// Owning group id
    #[serde(default)]
    pub group_id: Option<String>,
    /// Direction flag; `false` is ingress
    #[serde(default)]
    pub is_egress: Option<bool>,
    /// Protocol name or number
    pub ip_protocol: String,
    /// First port
    #[serde(default)]
    pub from_port: Option<i32>,
    /// Last port
    #[serde(default)]
    pub to_port: Option<i32>,
    /// IPv4 network, when the rule targets one
    #[serde(default)]
    pub cidr_ipv4: Option<String>,
    /// IPv6 network, when the rule targets one
    #[serde(default)]
    pub cidr_ipv6: Option<String>,
    /// Rule description
    #[serde(default)]
    pub description: Option<String>,
}

/// The operations the orchestrator needs from a cloud security-group service.
pub trait SecurityGroupApi {
    /// Id of the group called `name` in `vpc_id`, if it exists.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    fn find_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>, ProviderError>;

    /// Creates a group and returns its id.
    ///
    /// # Errors
    /// Returns an error if the group cannot be created.
    fn create_group(
        &mut self,
        vpc_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String, ProviderError>;

    /// Lists every rule of a group.
    ///
    /// # Errors
    /// Returns an error if the rules cannot be listed.
    fn list_rules(&self, group_id: &str) -> Result<Vec<RemoteRule>, ProviderError>;

    /// Adds ingress permission blocks in one call.
    ///
    /// # Errors
    /// Returns [`ProviderError::DuplicatePermission`] if a permission already exists.
    fn authorize_ingress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError>;

    /// Adds egress permission blocks in one call.
    ///
    /// # Errors
    /// Returns [`ProviderError::DuplicatePermission`] if a permission already exists.
    fn authorize_egress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError>;

    /// Dispatches to the authorize call of `direction`.
    ///
    /// # Errors
    /// Same as [`SecurityGroupApi::authorize_ingress`].
    fn authorize(
        &mut self,
        direction: Direction,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        match direction {
            Direction::Ingress => self.authorize_ingress(group_id, permissions),
            Direction::Egress => self.authorize_egress(group_id, permissions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_json_shape() {
        let mut perm = IpPermission::new("tcp", Some(443), Some(443));
        perm.push_cidr(&"0.0.0.0/0".parse().unwrap(), Some("HTTPS".into()));
        perm.push_cidr(&"::/0".parse().unwrap(), None);
        let json = serde_json::to_value(&perm).unwrap();
        assert_eq!(json["IpProtocol"], "tcp");
        assert_eq!(json["FromPort"], 443);
        assert_eq!(json["IpRanges"][0]["CidrIp"], "0.0.0.0/0");
        assert_eq!(json["IpRanges"][0]["Description"], "HTTPS");
        assert_eq!(json["Ipv6Ranges"][0]["CidrIpv6"], "::/0");
        assert!(json["Ipv6Ranges"][0].get("Description").is_none());
    }

    #[test]
    fn test_unported_permission_omits_ports() {
        let mut perm = IpPermission::new("-1", None, None);
        perm.push_cidr(&"10.0.0.0/8".parse().unwrap(), None);
        let json = serde_json::to_value(&perm).unwrap();
        assert!(json.get("FromPort").is_none());
        assert!(json.get("Ipv6Ranges").is_none());
        assert_eq!(perm.ports_label(), "*");
    }

    #[test]
    fn test_remote_rule_from_api_json() {
        let json = r#"{
            "SecurityGroupRuleId": "sgr-0abc",
            "GroupId": "sg-1",
            "IsEgress": false,
            "IpProtocol": "tcp",
            "FromPort": 22,
            "ToPort": 22,
            "CidrIpv4": "10.0.0.0/8",
            "Tags": []
        }"#;
        let rule: RemoteRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.is_egress, Some(false));
        assert_eq!(rule.cidr_ipv4.as_deref(), Some("10.0.0.0/8"));
        assert_eq!(rule.cidr_ipv6, None);
    }

    #[test]
    fn test_descriptions_deduplicated() {
        let mut perm = IpPermission::new("udp", Some(53), Some(53));
        perm.push_cidr(&"10.0.0.2/32".parse().unwrap(), Some("DNS".into()));
        perm.push_cidr(&"10.0.0.3/32".parse().unwrap(), Some("DNS".into()));
        perm.push_cidr(&"fd00::53/128".parse().unwrap(), Some("DNS v6".into()));
        assert_eq!(perm.descriptions(), vec!["DNS", "DNS v6"]);
        assert_eq!(perm.cidrs(), vec!["10.0.0.2/32", "10.0.0.3/32", "fd00::53/128"]);
        assert_eq!(perm.len(), 3);
    }
}
