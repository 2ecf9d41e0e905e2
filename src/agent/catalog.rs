//! Local catalog records and cluster membership.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::health::HealthCheck;

/// A service instance registered on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeService {
    pub id: String,
    pub service: String,
    pub tags: Vec<String>,
    pub port: u16,
}

/// Liveness of a cluster member as seen by this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Alive,
    Left,
}

/// A known cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub name: String,
    pub addr: String,
    pub status: MemberStatus,
}

/// Services and checks registered locally.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    services: DashMap<String, NodeService>,
    checks: DashMap<String, HealthCheck>,
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service.
    pub fn put_service(&self, service: NodeService) {
        self.services.insert(service.id.clone(), service);
    }

    /// Insert or replace a check.
    pub fn put_check(&self, check: HealthCheck) {
        self.checks.insert(check.check_id.clone(), check);
    }

    pub fn service(&self, id: &str) -> Option<NodeService> {
        self.services.get(id).map(|s| s.value().clone())
    }

    pub fn services(&self) -> BTreeMap<String, NodeService> {
        self.services
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn checks(&self) -> BTreeMap<String, HealthCheck> {
        self.checks
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn check_count(&self) -> usize {
        self.checks.len()
    }
}

/// Cluster members known to this node, keyed by node name.
#[derive(Debug, Default)]
pub struct Membership {
    members: DashMap<String, Member>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` at `addr` as alive. Returns true if it was not known.
    pub fn alive(&self, name: &str, addr: &str) -> bool {
        self.members
            .insert(
                name.to_string(),
                Member {
                    name: name.to_string(),
                    addr: addr.to_string(),
                    status: MemberStatus::Alive,
                },
            )
            .is_none()
    }

    /// Mark `name` as having left.
    pub fn left(&self, name: &str) {
        if let Some(mut member) = self.members.get_mut(name) {
            member.status = MemberStatus::Left;
        }
    }

    pub fn get(&self, name: &str) -> Option<Member> {
        self.members.get(name).map(|m| m.value().clone())
    }

    /// All members sorted by name.
    pub fn all(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.iter().map(|m| m.value().clone()).collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
