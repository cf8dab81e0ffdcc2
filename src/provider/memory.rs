use std::cell::Cell;

use crate::provider::{
    IpPermission, ProviderError, RemoteRule, SecurityGroupApi, DUPLICATE_PERMISSION_CODE,
};
use crate::reconcile::{remote_keys, ReconcileError, RuleKey};
use crate::rule::Direction;

/// A mutating call received by [`InMemorySecurityGroups`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `create_group`
    CreateGroup {
        /// Group name
        name: String,
    },
    /// `authorize_ingress` / `authorize_egress`
    Authorize {
        /// Direction of the call
        direction: Direction,
        /// Target group
        group_id: String,
        /// Number of permission blocks sent
        blocks: usize,
    },
}

#[derive(Debug, Clone)]
struct Group {
    id: String,
    vpc_id: String,
    name: String,
    rules: Vec<RemoteRule>,
}

/// Security groups kept in memory, with the cloud API's duplicate semantics: an
/// authorize batch holding any existing rule is rejected as a whole.
#[derive(Debug, Default)]
pub struct InMemorySecurityGroups {
    groups: Vec<Group>,
    mutations: Vec<Mutation>,
    reads: Cell<usize>,
    next_rule: usize,
}

impl InMemorySecurityGroups {
    /// No group at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing group with its current rules; returns its id.
    ///
    /// Seeding is not recorded as a mutation.
    pub fn insert_group(&mut self, vpc_id: &str, name: &str, rules: Vec<RemoteRule>) -> String {
        let id = format!("sg-{:08x}", self.groups.len() + 1);
        self.groups.push(Group {
            id: id.clone(),
            vpc_id: vpc_id.to_string(),
            name: name.to_string(),
            rules,
        });
        id
    }

    /// Current rules of a group.
    pub fn rules(&self, group_id: &str) -> Option<&[RemoteRule]> {
        self.group(group_id).map(|g| g.rules.as_slice())
    }

    /// Mutating calls received so far, in order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of read calls received so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    fn materialize(
        &mut self,
        direction: Direction,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Vec<RemoteRule> {
        let mut rules = Vec::new();
        for perm in permissions {
            let v4 = perm
                .ip_ranges
                .iter()
                .map(|r| (Some(r.cidr_ip.clone()), None, r.description.clone()));
            let v6 = perm
                .ipv6_ranges
                .iter()
                .map(|r| (None, Some(r.cidr_ipv6.clone()), r.description.clone()));
            for (cidr_ipv4, cidr_ipv6, description) in v4.chain(v6) {
                self.next_rule += 1;
                rules.push(RemoteRule {
                    security_group_rule_id: Some(format!("sgr-{:08x}", self.next_rule)),
                    group_id: Some(group_id.to_string()),
                    is_egress: Some(direction == Direction::Egress),
                    ip_protocol: perm.ip_protocol.clone(),
                    from_port: perm.from_port,
                    to_port: perm.to_port,
                    cidr_ipv4,
                    cidr_ipv6,
                    description,
                });
            }
        }
        rules
    }

    fn authorize_direction(
        &mut self,
        direction: Direction,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        let operation = format!("authorize-{direction}");
        self.mutations.push(Mutation::Authorize {
            direction,
            group_id: group_id.to_string(),
            blocks: permissions.len(),
        });

        let existing = self
            .group(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?
            .rules
            .clone();
        let new_rules = self.materialize(direction, group_id, permissions);

        let invalid_rule = |e: ReconcileError| ProviderError::CallFailed {
            operation: operation.clone(),
            code: None,
            message: e.to_string(),
        };
        let existing_keys = remote_keys(&existing).map_err(&invalid_rule)?;
        let mut duplicate = None;
        for rule in &new_rules {
            let keys = RuleKey::from_remote(rule).map_err(&invalid_rule)?;
            duplicate = keys.into_iter().find(|key| existing_keys.contains(key));
            if duplicate.is_some() {
                break;
            }
        }
        if let Some(dup) = duplicate {
            return Err(ProviderError::DuplicatePermission {
                operation,
                message: format!(
                    "{DUPLICATE_PERMISSION_CODE}: rule for {} already exists",
                    dup.cidr
                ),
            });
        }

        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) {
            group.rules.extend(new_rules);
        }
        Ok(())
    }
}

impl SecurityGroupApi for InMemorySecurityGroups {
    fn find_group(&self, vpc_id: &str, name: &str) -> Result<Option<String>, ProviderError> {
        self.reads.set(self.reads.get() + 1);
        Ok(self
            .groups
            .iter()
            .find(|g| g.vpc_id == vpc_id && g.name == name)
            .map(|g| g.id.clone()))
    }

    fn create_group(
        &mut self,
        vpc_id: &str,
        name: &str,
        _description: &str,
    ) -> Result<String, ProviderError> {
        self.mutations.push(Mutation::CreateGroup {
            name: name.to_string(),
        });
        Ok(self.insert_group(vpc_id, name, Vec::new()))
    }

    fn list_rules(&self, group_id: &str) -> Result<Vec<RemoteRule>, ProviderError> {
        self.reads.set(self.reads.get() + 1);
        self.rules(group_id)
            .map(<[RemoteRule]>::to_vec)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))
    }

    fn authorize_ingress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        self.authorize_direction(Direction::Ingress, group_id, permissions)
    }

    fn authorize_egress(
        &mut self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), ProviderError> {
        self.authorize_direction(Direction::Egress, group_id, permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn https() -> IpPermission {
        let mut perm = IpPermission::new("tcp", Some(443), Some(443));
        perm.push_cidr(&"0.0.0.0/0".parse().unwrap(), Some("HTTPS".into()));
        perm
    }

    #[test]
    fn test_create_and_find() {
        let mut api = InMemorySecurityGroups::new();
        assert_eq!(api.find_group("vpc-1", "web").unwrap(), None);
        let id = api.create_group("vpc-1", "web", "desc").unwrap();
        assert_eq!(api.find_group("vpc-1", "web").unwrap(), Some(id));
        assert_eq!(api.find_group("vpc-2", "web").unwrap(), None);
        assert_eq!(api.reads(), 3);
    }

    #[test]
    fn test_authorize_then_list() {
        let mut api = InMemorySecurityGroups::new();
        let id = api.insert_group("vpc-1", "web", Vec::new());
        api.authorize_ingress(&id, &[https()]).unwrap();
        let rules = api.list_rules(&id).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].is_egress, Some(false));
        assert_eq!(rules[0].cidr_ipv4.as_deref(), Some("0.0.0.0/0"));
        assert_eq!(rules[0].description.as_deref(), Some("HTTPS"));
    }

    #[test]
    fn test_duplicate_batch_rejected() {
        let mut api = InMemorySecurityGroups::new();
        let id = api.insert_group("vpc-1", "web", Vec::new());
        api.authorize_ingress(&id, &[https()]).unwrap();
        let err = api.authorize_ingress(&id, &[https()]).unwrap_err();
        assert!(matches!(err, ProviderError::DuplicatePermission { .. }));
        assert_eq!(api.rules(&id).unwrap().len(), 1);
        // same rule in the other direction is not a duplicate
        api.authorize_egress(&id, &[https()]).unwrap();
        assert_eq!(api.rules(&id).unwrap().len(), 2);
    }

    #[test]
    fn test_stored_rule_without_direction_fails_authorize() {
        let mut api = InMemorySecurityGroups::new();
        let id = api.insert_group(
            "vpc-1",
            "web",
            vec![RemoteRule {
                security_group_rule_id: Some("sgr-1".into()),
                is_egress: None,
                ip_protocol: "tcp".into(),
                from_port: Some(22),
                to_port: Some(22),
                cidr_ipv4: Some("10.0.0.0/8".into()),
                ..Default::default()
            }],
        );
        match api.authorize_ingress(&id, &[https()]) {
            Err(ProviderError::CallFailed {
                operation, message, ..
            }) => {
                assert_eq!(operation, "authorize-ingress");
                assert!(message.contains("sgr-1"));
            }
            other => panic!("expected CallFailed, got {other:?}"),
        }
        assert_eq!(api.rules(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_group() {
        let mut api = InMemorySecurityGroups::new();
        assert!(matches!(
            api.authorize_egress("sg-missing", &[https()]),
            Err(ProviderError::GroupNotFound(_))
        ));
        assert!(api.list_rules("sg-missing").is_err());
    }
}
