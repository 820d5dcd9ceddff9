//! Mapping between node ids and node groups.
//!
//! Scenario-driven nodes take ids `0..k`; every additional group then takes
//! the next contiguous range, in registration order.

use std::ops::Range;

use crate::config::NodeGroup;
use crate::error::ResolverError;
use crate::node::NodeId;

#[derive(Debug, Clone)]
struct GroupRange {
    name: String,
    ids: Range<NodeId>,
    can_fail: bool,
}

/// Immutable id layout of a runner.
#[derive(Debug, Clone)]
pub struct NodeAddressResolver {
    groups: Vec<GroupRange>,
    nodes_with_scenario: usize,
    total: usize,
}

impl NodeAddressResolver {
    /// Lay out `nodes_with_scenario` scenario-driven nodes of group
    /// `scenario_group`, followed by `groups`.
    pub fn new(
        scenario_group: &str,
        nodes_with_scenario: usize,
        groups: &[NodeGroup],
    ) -> Result<Self, ResolverError> {
        let mut ranges = vec![GroupRange {
            name: scenario_group.to_string(),
            ids: 0..nodes_with_scenario,
            can_fail: true,
        }];
        let mut next = nodes_with_scenario;

        for group in groups {
            if ranges.iter().any(|r| r.name == group.name) {
                return Err(ResolverError::DuplicateGroup(group.name.clone()));
            }
            ranges.push(GroupRange {
                name: group.name.clone(),
                ids: next..next + group.count,
                can_fail: group.can_fail,
            });
            next += group.count;
        }

        Ok(Self {
            groups: ranges,
            nodes_with_scenario,
            total: next,
        })
    }

    fn range_of(&self, id: NodeId) -> Result<&GroupRange, ResolverError> {
        self.groups
            .iter()
            .find(|r| r.ids.contains(&id))
            .ok_or(ResolverError::OutOfRange {
                id,
                total: self.total,
            })
    }

    /// Group name owning `id`.
    pub fn group_for(&self, id: NodeId) -> Result<&str, ResolverError> {
        self.range_of(id).map(|r| r.name.as_str())
    }

    /// Ids of `group` in ascending order. Empty for unknown groups.
    pub fn ids_for(&self, group: &str) -> Vec<NodeId> {
        self.groups
            .iter()
            .find(|r| r.name == group)
            .map(|r| r.ids.clone().collect())
            .unwrap_or_default()
    }

    /// Whether `id` is allowed to crash. Out-of-range ids never crash.
    pub fn can_fail(&self, id: NodeId) -> bool {
        self.range_of(id).map(|r| r.can_fail).unwrap_or(false)
    }

    /// Total number of nodes across all groups.
    pub fn total_nodes(&self) -> usize {
        self.total
    }

    /// Number of scenario-driven nodes.
    pub fn nodes_with_scenario(&self) -> usize {
        self.nodes_with_scenario
    }

    /// Returns `true` if `id` names a node.
    pub fn contains(&self, id: NodeId) -> bool {
        id < self.total
    }
}
