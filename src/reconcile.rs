//! Rule identity and the desired-vs-remote diff.

use std::collections::{BTreeMap, HashSet};

use ipnet::IpNet;
use tracing::debug;

use crate::provider::{IpPermission, RemoteRule};
use crate::ranges::{parse_network, RangeError};
use crate::rule::{Direction, PortPolicy, RuleRecord};

/// Error type for `reconcile` operations.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Remote rule has no direction flag
    #[error("remote rule {rule_id} has no direction flag")]
    MissingDirection {
        /// Rule id, or `<unknown>`
        rule_id: String,
    },
    /// Remote rule holds a network that does not parse
    #[error("remote rule {rule_id}: {source}")]
    InvalidRemoteNetwork {
        /// Rule id, or `<unknown>`
        rule_id: String,
        /// Parse error
        #[source]
        source: RangeError,
    },
}

/// Identity of a rule. Descriptions are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    /// Rule direction
    pub direction: Direction,
    /// Lowercase protocol as written
    pub protocol: String,
    /// First port, or absent
    pub from_port: Option<i32>,
    /// Last port, or absent
    pub to_port: Option<i32>,
    /// Target network
    pub cidr: IpNet,
}

impl RuleKey {
    /// Key of one network of a parsed row.
    pub fn from_record(record: &RuleRecord, cidr: IpNet) -> Self {
        Self {
            direction: record.direction,
            protocol: record.protocol.clone(),
            from_port: record.from_port,
            to_port: record.to_port,
            cidr,
        }
    }

    /// Keys of a remote rule: one per populated network field.
    ///
    /// Ports are dropped for protocols that carry none, mirroring row normalization, so
    /// an `all traffic` rule listed with `-1` ports still matches its spreadsheet row.
    ///
    /// # Errors
    /// Fails when the direction flag is missing or a network does not parse.
    pub fn from_remote(rule: &RemoteRule) -> Result<Vec<Self>, ReconcileError> {
        let rule_id = || {
            rule.security_group_rule_id
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string())
        };
        let direction = match rule.is_egress {
            Some(false) => Direction::Ingress,
            Some(true) => Direction::Egress,
            None => return Err(ReconcileError::MissingDirection { rule_id: rule_id() }),
        };
        let protocol = rule.ip_protocol.trim().to_lowercase();
        let (from_port, to_port) = match PortPolicy::for_protocol(&protocol) {
            PortPolicy::Unported => (None, None),
            _ => (rule.from_port, rule.to_port),
        };

        let mut keys = Vec::new();
        for cidr in [rule.cidr_ipv4.as_deref(), rule.cidr_ipv6.as_deref()]
            .into_iter()
            .flatten()
        {
            let cidr = parse_network(cidr.trim()).map_err(|source| {
                ReconcileError::InvalidRemoteNetwork {
                    rule_id: rule_id(),
                    source,
                }
            })?;
            keys.push(Self {
                direction,
                protocol: protocol.clone(),
                from_port,
                to_port,
                cidr,
            });
        }
        Ok(keys)
    }
}

/// Keys of every CIDR-based remote rule. Group-reference and prefix-list rules carry no
/// network and yield nothing.
///
/// # Errors
/// See [`RuleKey::from_remote`].
pub fn remote_keys(rules: &[RemoteRule]) -> Result<HashSet<RuleKey>, ReconcileError> {
    let mut keys = HashSet::new();
    for rule in rules {
        keys.extend(RuleKey::from_remote(rule)?);
    }
    Ok(keys)
}

/// Permission blocks to add, split by direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    /// Ingress blocks
    pub ingress: Vec<IpPermission>,
    /// Egress blocks
    pub egress: Vec<IpPermission>,
}

/// Rules wanted by the spreadsheet, de-duplicated by key.
///
/// Keys are kept sorted, so the same rows always produce the same blocks in the same
/// order regardless of sheet or row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredRules {
    rules: BTreeMap<RuleKey, Option<String>>,
}

impl DesiredRules {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one key. The first description seen for a key wins.
    ///
    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: RuleKey, description: Option<String>) -> bool {
        if self.rules.contains_key(&key) {
            debug!("Duplicate rule {:?} ignored", key);
            return false;
        }
        self.rules.insert(key, description);
        true
    }

    /// Adds every network of a row; returns how many keys were new.
    pub fn insert_record(&mut self, record: &RuleRecord) -> usize {
        record
            .cidrs
            .iter()
            .filter(|cidr| {
                self.insert(
                    RuleKey::from_record(record, **cidr),
                    record.description.clone(),
                )
            })
            .count()
    }

    /// Number of distinct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rule is wanted.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &RuleKey> {
        self.rules.keys()
    }

    /// Groups the rules absent from `existing` into permission blocks.
    ///
    /// One block per `(direction, protocol, fromPort, toPort)`, carrying all of its
    /// missing networks.
    pub fn missing_from(&self, existing: &HashSet<RuleKey>) -> PermissionSet {
        let mut blocks: BTreeMap<(Direction, &str, Option<i32>, Option<i32>), IpPermission> =
            BTreeMap::new();
        for (key, description) in &self.rules {
            if existing.contains(key) {
                continue;
            }
            blocks
                .entry((key.direction, key.protocol.as_str(), key.from_port, key.to_port))
                .or_insert_with(|| {
                    IpPermission::new(key.protocol.clone(), key.from_port, key.to_port)
                })
                .push_cidr(&key.cidr, description.clone());
        }

        let mut set = PermissionSet::default();
        for ((direction, ..), block) in blocks {
            match direction {
                Direction::Ingress => set.ingress.push(block),
                Direction::Egress => set.egress.push(block),
            }
        }
        set
    }
}
