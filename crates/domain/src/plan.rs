//! The task DAG a [`crate::executor`]-shaped component runs: [`TaskDef`]
//! nodes assembled into a [`PlanIR`], validated and topologically
//! ordered before a single attempt is made.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::value::ParamValue;

/// One node of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub task_id: String,
    pub tool: String,
    #[serde(default)]
    pub params: ParamValue,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default)]
    pub retries: u32,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub policy: BTreeMap<String, ParamValue>,
}

/// A validated DAG of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanIR {
    pub plan_id: String,
    pub base_ctx_id: String,
    /// Insertion-ordered so id-order tie-breaking in the topological
    /// sort is stable; callers must not rely on map iteration order of
    /// an externally-deserialized plan.
    pub tasks: BTreeMap<String, TaskDef>,
    #[serde(default)]
    pub metadata: BTreeMap<String, ParamValue>,
    pub version: u32,
}

impl PlanIR {
    /// Validate every [`TaskDef`] invariant and the acyclicity of the
    /// dependency graph. Does not mutate `self`.
    pub fn validate(&self) -> Result<()> {
        for (id, task) in &self.tasks {
            if task.task_id != *id {
                return Err(Error::InvalidPlan(format!(
                    "task key '{id}' does not match task_id '{}'",
                    task.task_id
                )));
            }
            if task.tool.is_empty() {
                return Err(Error::InvalidPlan(format!("task '{id}' has an empty tool")));
            }
            for dep in &task.depends_on {
                if !self.tasks.contains_key(dep) {
                    return Err(Error::InvalidPlan(format!(
                        "task '{id}' depends on unknown task '{dep}'"
                    )));
                }
            }
            // retries: u32, so the non-negative invariant holds by construction.
        }
        self.topological_order()?;
        Ok(())
    }

    /// A stable linearization of `tasks` honoring `depends_on`, breaking
    /// ties by ascending `task_id` among tasks whose dependencies are
    /// already satisfied. Returns `InvalidPlan` if the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, task) in &self.tasks {
            in_degree.entry(id.as_str()).or_insert(0);
            for dep in &task.depends_on {
                *in_degree.entry(id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(self.tasks.len());
        let mut ready_heap = ready;
        while let Some(id) = ready_heap.first().copied() {
            ready_heap.remove(0);
            order.push(id.to_string());
            if let Some(deps) = dependents.get(id) {
                let mut newly_ready = Vec::new();
                for &dependent in deps {
                    let deg = in_degree.get_mut(dependent).expect("known task");
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dependent);
                    }
                }
                ready_heap.extend(newly_ready);
                ready_heap.sort_unstable();
            }
        }

        if order.len() != self.tasks.len() {
            return Err(Error::InvalidPlan("dependency graph contains a cycle".into()));
        }
        Ok(order)
    }

    /// Deterministic content hash over canonicalized tasks and their
    /// dependencies. Stable under key-order permutations of map-valued
    /// params because [`ParamValue::canonical_bytes`] sorts map keys.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, task) in &self.tasks {
            hasher.update(id.as_bytes());
            hasher.update(task.tool.as_bytes());
            let mut deps = task.depends_on.clone();
            deps.sort();
            for dep in &deps {
                hasher.update(dep.as_bytes());
            }
            hasher.update(task.params.canonical_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Status of a plan as a whole, maintained independently of its
/// (immutable) IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Persisted record pairing an immutable [`PlanIR`] with its mutable
/// status and the timestamps the store tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan: PlanIR,
    pub fingerprint: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn cycle_free_diamond() -> PlanIR {
    let mut tasks = BTreeMap::new();
    tasks.insert(
        "a".to_string(),
        TaskDef {
            task_id: "a".into(),
            tool: "noop".into(),
            params: ParamValue::default(),
            depends_on: vec![],
            reads: vec![],
            writes: vec![],
            retries: 0,
            timeout_ms: None,
            policy: BTreeMap::new(),
        },
    );
    tasks.insert(
        "b".to_string(),
        TaskDef {
            task_id: "b".into(),
            tool: "noop".into(),
            params: ParamValue::default(),
            depends_on: vec!["a".into()],
            reads: vec![],
            writes: vec![],
            retries: 0,
            timeout_ms: None,
            policy: BTreeMap::new(),
        },
    );
    tasks.insert(
        "c".to_string(),
        TaskDef {
            task_id: "c".into(),
            tool: "noop".into(),
            params: ParamValue::default(),
            depends_on: vec!["a".into()],
            reads: vec![],
            writes: vec![],
            retries: 0,
            timeout_ms: None,
            policy: BTreeMap::new(),
        },
    );
    tasks.insert(
        "d".to_string(),
        TaskDef {
            task_id: "d".into(),
            tool: "noop".into(),
            params: ParamValue::default(),
            depends_on: vec!["b".into(), "c".into()],
            reads: vec![],
            writes: vec![],
            retries: 0,
            timeout_ms: None,
            policy: BTreeMap::new(),
        },
    );
    PlanIR {
        plan_id: "p1".into(),
        base_ctx_id: "ctx0".into(),
        tasks,
        metadata: BTreeMap::new(),
        version: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_plan() {
        assert!(cycle_free_diamond().validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let mut plan = cycle_free_diamond();
        plan.tasks
            .get_mut("a")
            .unwrap()
            .depends_on
            .push("ghost".into());
        let err = plan.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
    }

    #[test]
    fn validate_rejects_empty_tool() {
        let mut plan = cycle_free_diamond();
        plan.tasks.get_mut("a").unwrap().tool = String::new();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let plan = cycle_free_diamond();
        let order = plan.topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn topological_order_breaks_ties_by_id() {
        let plan = cycle_free_diamond();
        let order = plan.topological_order().unwrap();
        // a has no deps and is the sole initially-ready task.
        assert_eq!(order[0], "a");
        // b and c become ready simultaneously; "b" < "c" lexically.
        assert_eq!(order[1], "b");
        assert_eq!(order[2], "c");
    }

    #[test]
    fn topological_order_detects_cycle() {
        let mut plan = cycle_free_diamond();
        plan.tasks.get_mut("a").unwrap().depends_on.push("d".into());
        let err = plan.topological_order().unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
    }

    #[test]
    fn fingerprint_stable_under_param_key_permutation() {
        let mut plan_a = cycle_free_diamond();
        let mut map_a = BTreeMap::new();
        map_a.insert("x".to_string(), ParamValue::Num(1.0));
        map_a.insert("y".to_string(), ParamValue::Num(2.0));
        plan_a.tasks.get_mut("a").unwrap().params = ParamValue::Map(map_a);

        let mut plan_b = cycle_free_diamond();
        let mut map_b = BTreeMap::new();
        map_b.insert("y".to_string(), ParamValue::Num(2.0));
        map_b.insert("x".to_string(), ParamValue::Num(1.0));
        plan_b.tasks.get_mut("a").unwrap().params = ParamValue::Map(map_b);

        assert_eq!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_structure() {
        let plan_a = cycle_free_diamond();
        let mut plan_b = cycle_free_diamond();
        plan_b.tasks.get_mut("a").unwrap().tool = "different".into();
        assert_ne!(plan_a.fingerprint(), plan_b.fingerprint());
    }
}
