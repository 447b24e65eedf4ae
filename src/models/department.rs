//! Department tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A department, optionally nested under a parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A department with its resolved children, for hierarchy responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: Department,
    pub children: Vec<DepartmentNode>,
}

impl DepartmentNode {
    /// Build the subtree rooted at `root_id` from a flat department list
    ///
    /// Returns `None` when the root is absent. Nodes whose parent chain
    /// never reaches the root are ignored.
    pub fn build(root_id: Uuid, departments: &[Department]) -> Option<DepartmentNode> {
        let mut by_parent: HashMap<Option<Uuid>, Vec<&Department>> = HashMap::new();
        for dept in departments {
            by_parent.entry(dept.parent_id).or_default().push(dept);
        }
        let root = departments.iter().find(|d| d.id == root_id)?;
        Some(Self::attach(root, &by_parent))
    }

    fn attach(dept: &Department, by_parent: &HashMap<Option<Uuid>, Vec<&Department>>) -> Self {
        let children = by_parent
            .get(&Some(dept.id))
            .map(|kids| kids.iter().map(|k| Self::attach(k, by_parent)).collect())
            .unwrap_or_default();
        Self {
            department: dept.clone(),
            children,
        }
    }

    /// Count of nodes in the subtree, root included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Detect whether re-parenting `id` under `new_parent` would form a cycle
pub fn would_cycle(id: Uuid, new_parent: Option<Uuid>, departments: &[Department]) -> bool {
    let parents: HashMap<Uuid, Option<Uuid>> =
        departments.iter().map(|d| (d.id, d.parent_id)).collect();

    let mut cursor = new_parent;
    let mut hops = 0;
    while let Some(parent) = cursor {
        if parent == id {
            return true;
        }
        cursor = parents.get(&parent).copied().flatten();
        hops += 1;
        if hops > departments.len() {
            // Pre-existing cycle in the input; treat as cyclic
            return true;
        }
    }
    false
}
