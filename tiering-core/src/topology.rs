//! Tier Topology Resolution
//!
//! Resolves a tier group name into its ordered tiers. Group membership is
//! metadata on a resource: the value names the group and the unit carries the
//! tier index. Each member is expanded to the leaf resources under it by
//! walking the catalog's `name -> children` records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{Catalog, ResourceRecord};
use crate::error::{TieringError, TieringResult};
use crate::metadata::MetadataAccessor;

/// Resources sharing one tier index within a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLevel {
    pub index: u32,
    /// Member resource -> its leaf resources
    pub members: BTreeMap<String, BTreeSet<String>>,
}

impl TierLevel {
    fn new(index: u32) -> Self {
        Self {
            index,
            members: BTreeMap::new(),
        }
    }

    /// Union of the leaves of every member
    pub fn leaves(&self) -> BTreeSet<String> {
        self.members.values().flatten().cloned().collect()
    }

    /// Deterministic migration destination for this tier
    pub fn first_leaf(&self) -> Option<String> {
        self.leaves().into_iter().next()
    }

    pub fn contains_leaf(&self, leaf: &str) -> bool {
        self.members.values().any(|leaves| leaves.contains(leaf))
    }

    /// Member a leaf (or member) belongs to
    pub fn member_of(&self, resource: &str) -> Option<&str> {
        if self.members.contains_key(resource) {
            return self.members.get_key_value(resource).map(|(k, _)| k.as_str());
        }
        self.members
            .iter()
            .find(|(_, leaves)| leaves.contains(resource))
            .map(|(member, _)| member.as_str())
    }
}

/// A resolved tier group; ascending index means slower, cheaper storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierGroup {
    pub name: String,
    pub levels: BTreeMap<u32, TierLevel>,
}

impl TierGroup {
    pub fn tier_count(&self) -> usize {
        self.levels.len()
    }

    /// Fastest tier
    pub fn minimum_level(&self) -> Option<&TierLevel> {
        self.levels.values().next()
    }

    /// Consecutive (source, destination) tier pairs, fastest first
    pub fn transitions(&self) -> Vec<(&TierLevel, &TierLevel)> {
        let levels: Vec<&TierLevel> = self.levels.values().collect();
        levels.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Tier holding a member or leaf resource
    pub fn level_of(&self, resource: &str) -> Option<&TierLevel> {
        self.levels
            .values()
            .find(|level| level.member_of(resource).is_some())
    }

    /// Every declared member, in tier order
    pub fn members(&self) -> Vec<&str> {
        self.levels
            .values()
            .flat_map(|level| level.members.keys().map(String::as_str))
            .collect()
    }
}

/// A resource's membership in a tier group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group: String,
    pub index: u32,
    /// Resource carrying the membership (the resource itself or an ancestor)
    pub member: String,
}

/// Resolves tier groups and walks the resource hierarchy
pub struct TopologyResolver<C: Catalog> {
    catalog: Arc<C>,
    metadata: MetadataAccessor<C>,
    group_attribute: String,
}

impl<C: Catalog> TopologyResolver<C> {
    pub fn new(catalog: Arc<C>, group_attribute: &str) -> Self {
        Self {
            metadata: MetadataAccessor::new(catalog.clone()),
            catalog,
            group_attribute: group_attribute.to_string(),
        }
    }

    /// Resolve a group into its ordered tiers
    pub async fn resolve(&self, group: &str) -> TieringResult<TierGroup> {
        let entries = self.metadata.members_of(&self.group_attribute, group).await?;
        if entries.is_empty() {
            return Err(TieringError::Topology(format!(
                "tier group '{}' has no member resources",
                group
            )));
        }

        let mut indices: BTreeMap<String, u32> = BTreeMap::new();
        for (resource, entry) in entries {
            let index = parse_tier_index(&resource, group, &entry.unit)?;
            match indices.get(&resource) {
                Some(existing) if *existing != index => {
                    return Err(TieringError::Topology(format!(
                        "resource '{}' has conflicting tier indices {} and {} in group '{}'",
                        resource, existing, index, group
                    )));
                }
                Some(_) => {}
                None => {
                    indices.insert(resource, index);
                }
            }
        }

        let mut levels: BTreeMap<u32, TierLevel> = BTreeMap::new();
        let mut claimed: HashMap<String, String> = HashMap::new();

        for (member, index) in indices {
            let leaves = self.leaves_of(&member).await?;
            for leaf in &leaves {
                if let Some(other) = claimed.insert(leaf.clone(), member.clone()) {
                    return Err(TieringError::Topology(format!(
                        "leaf '{}' is reachable from both '{}' and '{}' in group '{}'",
                        leaf, other, member, group
                    )));
                }
            }
            levels
                .entry(index)
                .or_insert_with(|| TierLevel::new(index))
                .members
                .insert(member, leaves);
        }

        debug!(
            group,
            tiers = levels.len(),
            indices = ?levels.keys().collect::<Vec<_>>(),
            "Resolved tier group"
        );

        Ok(TierGroup {
            name: group.to_string(),
            levels,
        })
    }

    /// Leaf resources under `resource`; a leaf expands to itself
    pub async fn leaves_of(&self, resource: &str) -> TieringResult<BTreeSet<String>> {
        let mut leaves = BTreeSet::new();
        let mut on_path: HashSet<String> = HashSet::new();
        // (name, children already pushed)
        let mut stack: Vec<(String, bool)> = vec![(resource.to_string(), false)];

        while let Some((name, expanded)) = stack.pop() {
            if expanded {
                on_path.remove(&name);
                continue;
            }
            if on_path.contains(&name) {
                return Err(TieringError::Topology(format!(
                    "resource hierarchy under '{}' contains a cycle through '{}'",
                    resource, name
                )));
            }

            let record = self.require(&name).await?;
            if record.is_leaf() {
                leaves.insert(name);
                continue;
            }

            on_path.insert(name.clone());
            stack.push((name, true));
            for child in record.children.into_iter().rev() {
                stack.push((child, false));
            }
        }

        Ok(leaves)
    }

    /// Topmost ancestor of `resource`
    pub async fn root_of(&self, resource: &str) -> TieringResult<String> {
        Ok(self
            .ancestry(resource)
            .await?
            .pop()
            .unwrap_or_else(|| resource.to_string()))
    }

    /// Group memberships of `resource` or its nearest ancestor carrying one
    pub async fn memberships_of(&self, resource: &str) -> TieringResult<Vec<GroupMembership>> {
        for name in self.ancestry(resource).await? {
            let entries = self.metadata.get_all(&self.group_attribute, &name).await?;
            if entries.is_empty() {
                continue;
            }
            return entries
                .into_iter()
                .map(|entry| -> TieringResult<GroupMembership> {
                    Ok(GroupMembership {
                        index: parse_tier_index(&name, &entry.value, &entry.unit)?,
                        group: entry.value,
                        member: name.clone(),
                    })
                })
                .collect();
        }
        Ok(Vec::new())
    }

    /// First group membership of `resource` or its nearest member ancestor
    pub async fn group_for_resource(&self, resource: &str) -> TieringResult<Option<GroupMembership>> {
        Ok(self.memberships_of(resource).await?.into_iter().next())
    }

    /// `resource` followed by its ancestors up to the root
    async fn ancestry(&self, resource: &str) -> TieringResult<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(resource.to_string());

        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                return Err(TieringError::Topology(format!(
                    "resource hierarchy above '{}' contains a cycle through '{}'",
                    resource, name
                )));
            }
            let record = self.require(&name).await?;
            chain.push(name);
            current = record.parent;
        }

        Ok(chain)
    }

    async fn require(&self, name: &str) -> TieringResult<ResourceRecord> {
        self.catalog
            .resource(name)
            .await?
            .ok_or_else(|| TieringError::Topology(format!("resource '{}' not found", name)))
    }
}

fn parse_tier_index(resource: &str, group: &str, unit: &str) -> TieringResult<u32> {
    unit.trim().parse::<u32>().map_err(|_| {
        TieringError::Topology(format!(
            "resource '{}' has invalid tier index {:?} in group '{}'",
            resource, unit, group
        ))
    })
}
