//! Critical-path analysis over a task dependency DAG.
//!
//! Graph errors (empty set, duplicate ids, bad durations, unknown
//! dependencies, cycles) are all detected before any scheduling happens.
//! Ordering ties are always broken by the task's position in the input.

use crate::digest::canonical_hash;
use crate::error::{PlatformError, Result};
use crate::token::{Token, TokenKind, TokenStore};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub duration: f64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(id: &str, duration: f64, depends_on: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            duration,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            completed: false,
        }
    }
}

#[derive(Serialize)]
struct CanonicalTask<'a> {
    id: &'a str,
    name: &'a str,
    duration: f64,
    depends_on: Vec<&'a str>,
    completed: bool,
}

/// Hash of the task set, independent of task order and dependency order.
pub fn task_set_hash(tasks: &[Task]) -> Result<String> {
    let mut canonical: Vec<CanonicalTask> = tasks
        .iter()
        .map(|t| {
            let mut deps: Vec<&str> = t.depends_on.iter().map(String::as_str).collect();
            deps.sort_unstable();
            deps.dedup();
            CanonicalTask {
                id: &t.id,
                name: &t.name,
                duration: t.duration,
                depends_on: deps,
                completed: t.completed,
            }
        })
        .collect();
    canonical.sort_by(|a, b| a.id.cmp(b.id));
    canonical_hash(&canonical)
}

/// Set `completed` on every task named in `ids`.
pub fn mark_completed(tasks: &mut [Task], ids: &[String]) -> Result<()> {
    for id in ids {
        let task = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| PlatformError::UnknownTask(id.clone()))?;
        task.completed = true;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Validated adjacency over a task slice, by input index.
pub(crate) struct TaskGraph<'a> {
    tasks: &'a [Task],
    index: HashMap<&'a str, usize>,
    /// Deduplicated dependency indices, in declaration order.
    deps: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl<'a> TaskGraph<'a> {
    pub(crate) fn build(tasks: &'a [Task]) -> Result<Self> {
        if tasks.is_empty() {
            return Err(PlatformError::EmptyTaskSet);
        }
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, t) in tasks.iter().enumerate() {
            if index.insert(t.id.as_str(), i).is_some() {
                return Err(PlatformError::DuplicateTask(t.id.clone()));
            }
            if !(t.duration.is_finite() && t.duration > 0.0) {
                return Err(PlatformError::InvalidDuration {
                    task: t.id.clone(),
                    duration: t.duration,
                });
            }
        }

        let mut deps = Vec::with_capacity(tasks.len());
        for t in tasks {
            let mut seen = HashSet::new();
            let mut list = Vec::new();
            for d in &t.depends_on {
                let di = *index
                    .get(d.as_str())
                    .ok_or_else(|| PlatformError::UnknownDependency {
                        task: t.id.clone(),
                        dependency: d.clone(),
                    })?;
                if seen.insert(di) {
                    list.push(di);
                }
            }
            deps.push(list);
        }

        let mut graph = Self {
            tasks,
            index,
            deps,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm; among ready nodes the lowest input index goes first.
    fn topological_order(&self) -> Result<Vec<usize>> {
        let n = self.tasks.len();
        let mut pending: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); n];
        for (i, ds) in self.deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&i| pending[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                pending[j] -= 1;
                if pending[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() < n {
            return Err(PlatformError::CyclicDependency(self.find_cycle(&pending)));
        }
        Ok(order)
    }

    /// Every node left with pending deps has a pending dependency of its own,
    /// so following them from any such node must revisit one.
    fn find_cycle(&self, pending: &[usize]) -> Vec<String> {
        let stuck = |i: usize| pending[i] > 0;
        let Some(start) = (0..self.tasks.len()).find(|&i| stuck(i)) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut pos: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut cur = start;
        loop {
            let Some(&next) = self.deps[cur].iter().find(|&&d| stuck(d)) else {
                return path.iter().map(|&i| self.tasks[i].id.clone()).collect();
            };
            if let Some(&at) = pos.get(&next) {
                let mut cycle: Vec<String> =
                    path[at..].iter().map(|&i| self.tasks[i].id.clone()).collect();
                cycle.push(self.tasks[next].id.clone());
                return cycle;
            }
            pos.insert(next, path.len());
            path.push(next);
            cur = next;
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<&'a Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    fn is_completed(&self, i: usize) -> bool {
        self.tasks[i].completed
    }

    /// Not completed, and every dependency completed.
    pub(crate) fn is_ready(&self, i: usize) -> bool {
        !self.is_completed(i) && self.deps[i].iter().all(|&d| self.is_completed(d))
    }

    pub(crate) fn incomplete_deps(&self, i: usize) -> Vec<String> {
        self.deps[i]
            .iter()
            .filter(|&&d| !self.is_completed(d))
            .map(|&d| self.tasks[d].id.clone())
            .collect()
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTiming {
    pub id: String,
    pub earliest_start: f64,
    pub earliest_finish: f64,
    /// How far the task can slip without delaying the end of the project.
    pub slack: f64,
}

/// A wave of incomplete tasks that can run in parallel once the previous
/// waves are done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLevel {
    pub level: usize,
    pub tasks: Vec<String>,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub task_set_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub topological_order: Vec<String>,
    pub critical_path: Vec<String>,
    pub total_duration: f64,
    pub timings: Vec<TaskTiming>,
    pub levels: Vec<WorkLevel>,
    pub ready_tasks: Vec<String>,
    /// Incomplete dependencies of every task that has any.
    pub blockers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_task: Option<String>,
    pub completed_count: usize,
    pub remaining_count: usize,
}

impl Schedule {
    pub fn is_on_critical_path(&self, id: &str) -> bool {
        self.critical_path.iter().any(|t| t == id)
    }
}

/// Pure scheduling computation: no token is issued.
pub fn schedule(tasks: &[Task], goal: Option<&str>) -> Result<Schedule> {
    let graph = TaskGraph::build(tasks)?;
    let n = tasks.len();

    let mut start = vec![0.0_f64; n];
    let mut finish = vec![0.0_f64; n];
    for &i in &graph.order {
        start[i] = graph.deps[i]
            .iter()
            .map(|&d| finish[d])
            .fold(0.0, f64::max);
        finish[i] = start[i] + tasks[i].duration;
    }

    let end = match goal {
        Some(g) => graph
            .index_of(g)
            .ok_or_else(|| PlatformError::UnknownTask(g.to_string()))?,
        None => argmax_first(&finish, 0..n),
    };

    let mut path = vec![end];
    let mut cur = end;
    while !graph.deps[cur].is_empty() {
        let mut candidates = graph.deps[cur].clone();
        candidates.sort_unstable();
        cur = argmax_first(&finish, candidates.into_iter());
        path.push(cur);
    }
    path.reverse();
    let critical_path: Vec<String> = path.iter().map(|&i| tasks[i].id.clone()).collect();
    let total_duration = finish[end];

    // Backward pass for slack, relative to the end of the whole set.
    let project_end = finish.iter().copied().fold(0.0, f64::max);
    let mut latest_finish = vec![project_end; n];
    for &i in graph.order.iter().rev() {
        let latest_start = latest_finish[i] - tasks[i].duration;
        for &d in &graph.deps[i] {
            latest_finish[d] = latest_finish[d].min(latest_start);
        }
    }
    let timings = graph
        .order
        .iter()
        .map(|&i| TaskTiming {
            id: tasks[i].id.clone(),
            earliest_start: start[i],
            earliest_finish: finish[i],
            slack: latest_finish[i] - finish[i],
        })
        .collect();

    let levels = work_levels(&graph);
    let ready_tasks: Vec<String> = (0..n)
        .filter(|&i| graph.is_ready(i))
        .map(|i| tasks[i].id.clone())
        .collect();
    let blockers = (0..n)
        .filter(|&i| !graph.is_completed(i))
        .filter_map(|i| {
            let waiting = graph.incomplete_deps(i);
            (!waiting.is_empty()).then(|| (tasks[i].id.clone(), waiting))
        })
        .collect();
    let recommended_task = critical_path
        .iter()
        .find(|id| ready_tasks.contains(id))
        .or_else(|| ready_tasks.first())
        .cloned();
    let completed_count = tasks.iter().filter(|t| t.completed).count();

    Ok(Schedule {
        task_set_hash: task_set_hash(tasks)?,
        goal: goal.map(str::to_string),
        topological_order: graph.order.iter().map(|&i| tasks[i].id.clone()).collect(),
        critical_path,
        total_duration,
        timings,
        levels,
        ready_tasks,
        blockers,
        recommended_task,
        completed_count,
        remaining_count: n - completed_count,
    })
}

/// Index of the largest value; the earliest candidate wins ties.
fn argmax_first(values: &[f64], candidates: impl Iterator<Item = usize>) -> usize {
    let mut best: Option<usize> = None;
    for i in candidates {
        match best {
            Some(b) if values[i] <= values[b] => {}
            _ => best = Some(i),
        }
    }
    best.unwrap_or(0)
}

fn work_levels(graph: &TaskGraph) -> Vec<WorkLevel> {
    let n = graph.tasks.len();
    let mut done: Vec<bool> = (0..n).map(|i| graph.is_completed(i)).collect();
    let mut levels = Vec::new();
    loop {
        let wave: Vec<usize> = (0..n)
            .filter(|&i| !done[i] && graph.deps[i].iter().all(|&d| done[d]))
            .collect();
        if wave.is_empty() {
            break;
        }
        for &i in &wave {
            done[i] = true;
        }
        levels.push(WorkLevel {
            level: levels.len(),
            duration: wave
                .iter()
                .map(|&i| graph.tasks[i].duration)
                .fold(0.0, f64::max),
            tasks: wave.iter().map(|&i| graph.tasks[i].id.clone()).collect(),
        });
    }
    levels
}

// ---------------------------------------------------------------------------
// CriticalPathAnalyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CriticalPathAnalysis {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub token: Token,
}

pub struct CriticalPathAnalyzer {
    store: Arc<dyn TokenStore>,
}

impl CriticalPathAnalyzer {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Schedule `tasks` and issue an analysis token bound to the exact set.
    pub fn analyze(&self, tasks: &[Task], goal: Option<&str>) -> Result<CriticalPathAnalysis> {
        let schedule = schedule(tasks, goal)?;
        let token = self.store.issue(TokenKind::Analysis, &schedule.task_set_hash)?;
        tracing::info!(
            tasks = tasks.len(),
            total_duration = schedule.total_duration,
            critical_path = %schedule.critical_path.join(" -> "),
            "critical path analyzed"
        );
        Ok(CriticalPathAnalysis { schedule, token })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::token::InMemoryTokenStore;

    fn diamond() -> Vec<Task> {
        vec![
            Task::new("A", 1.0, &[]),
            Task::new("B", 2.0, &["A"]),
            Task::new("C", 5.0, &["A"]),
            Task::new("D", 1.0, &["B", "C"]),
        ]
    }

    #[test]
    fn diamond_critical_path() {
        let s = schedule(&diamond(), None).unwrap();
        assert_eq!(s.critical_path, vec!["A", "C", "D"]);
        assert_eq!(s.total_duration, 7.0);
        assert_eq!(s.topological_order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn critical_path_duration_sums_its_tasks() {
        let tasks = diamond();
        let s = schedule(&tasks, None).unwrap();
        let sum: f64 = s
            .critical_path
            .iter()
            .map(|id| tasks.iter().find(|t| &t.id == id).unwrap().duration)
            .sum();
        assert_eq!(sum, s.total_duration);
    }

    #[test]
    fn two_node_cycle_rejected() {
        let tasks = vec![Task::new("A", 1.0, &["B"]), Task::new("B", 1.0, &["A"])];
        match schedule(&tasks, None).unwrap_err() {
            PlatformError::CyclicDependency(path) => assert_eq!(path, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_behind_acyclic_prefix_is_isolated() {
        let tasks = vec![
            Task::new("root", 1.0, &[]),
            Task::new("x", 1.0, &["root", "z"]),
            Task::new("y", 1.0, &["x"]),
            Task::new("z", 1.0, &["y"]),
        ];
        match schedule(&tasks, None).unwrap_err() {
            PlatformError::CyclicDependency(path) => assert_eq!(path, vec!["x", "z", "y", "x"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let tasks = vec![Task::new("A", 1.0, &["A"])];
        assert_eq!(
            schedule(&tasks, None).unwrap_err().kind(),
            ErrorKind::CyclicDependency
        );
    }

    #[test]
    fn graph_errors_are_specific() {
        assert_eq!(schedule(&[], None).unwrap_err().kind(), ErrorKind::EmptyTaskSet);
        let unknown = vec![Task::new("A", 1.0, &["ghost"])];
        assert_eq!(
            schedule(&unknown, None).unwrap_err().kind(),
            ErrorKind::UnknownDependency
        );
        let dup = vec![Task::new("A", 1.0, &[]), Task::new("A", 2.0, &[])];
        assert_eq!(schedule(&dup, None).unwrap_err().kind(), ErrorKind::DuplicateTask);
        for bad in [0.0, -1.0, f64::NAN] {
            let tasks = vec![Task::new("A", bad, &[])];
            assert_eq!(
                schedule(&tasks, None).unwrap_err().kind(),
                ErrorKind::InvalidDuration
            );
        }
    }

    #[test]
    fn single_task_is_its_own_path() {
        let s = schedule(&[Task::new("only", 3.5, &[])], None).unwrap();
        assert_eq!(s.critical_path, vec!["only"]);
        assert_eq!(s.total_duration, 3.5);
        assert_eq!(s.ready_tasks, vec!["only"]);
    }

    #[test]
    fn ties_follow_input_order() {
        let tasks = vec![
            Task::new("left", 2.0, &[]),
            Task::new("right", 2.0, &[]),
            Task::new("join", 1.0, &["right", "left"]),
        ];
        let s = schedule(&tasks, None).unwrap();
        assert_eq!(s.critical_path, vec!["left", "join"]);
        assert_eq!(s.topological_order, vec!["left", "right", "join"]);

        let parallel = vec![Task::new("p", 4.0, &[]), Task::new("q", 4.0, &[])];
        assert_eq!(schedule(&parallel, None).unwrap().critical_path, vec!["p"]);
    }

    #[test]
    fn goal_narrows_the_path() {
        let mut tasks = diamond();
        tasks.push(Task::new("docs", 1.0, &["A"]));
        let s = schedule(&tasks, Some("docs")).unwrap();
        assert_eq!(s.critical_path, vec!["A", "docs"]);
        assert_eq!(s.total_duration, 2.0);
        assert_eq!(
            schedule(&tasks, Some("nope")).unwrap_err().kind(),
            ErrorKind::UnknownTask
        );
    }

    #[test]
    fn timings_and_slack() {
        let s = schedule(&diamond(), None).unwrap();
        let b = s.timings.iter().find(|t| t.id == "B").unwrap();
        assert_eq!(b.earliest_start, 1.0);
        assert_eq!(b.earliest_finish, 3.0);
        assert_eq!(b.slack, 3.0);
        let c = s.timings.iter().find(|t| t.id == "C").unwrap();
        assert_eq!(c.slack, 0.0);
    }

    #[test]
    fn readiness_levels_and_blockers() {
        let s = schedule(&diamond(), None).unwrap();
        assert_eq!(s.ready_tasks, vec!["A"]);
        assert_eq!(s.recommended_task.as_deref(), Some("A"));
        let waves: Vec<Vec<String>> = s.levels.iter().map(|l| l.tasks.clone()).collect();
        assert_eq!(waves, vec![vec!["A"], vec!["B", "C"], vec!["D"]]);
        assert_eq!(s.levels[1].duration, 5.0);
        assert_eq!(s.blockers["D"], vec!["B", "C"]);
        assert!(!s.blockers.contains_key("A"));

        let mut tasks = diamond();
        mark_completed(&mut tasks, &["A".to_string(), "B".to_string()]).unwrap();
        let s = schedule(&tasks, None).unwrap();
        assert_eq!(s.ready_tasks, vec!["C"]);
        assert_eq!(s.blockers["D"], vec!["C"]);
        assert_eq!(s.completed_count, 2);
        assert_eq!(s.remaining_count, 2);
        assert_eq!(s.levels.len(), 2);
    }

    #[test]
    fn hash_ignores_order_but_not_content() {
        let tasks = diamond();
        let mut shuffled = diamond();
        shuffled.reverse();
        shuffled[0].depends_on.reverse();
        assert_eq!(task_set_hash(&tasks).unwrap(), task_set_hash(&shuffled).unwrap());

        let mut longer = diamond();
        longer[1].duration = 2.5;
        assert_ne!(task_set_hash(&tasks).unwrap(), task_set_hash(&longer).unwrap());

        let mut done = diamond();
        done[0].completed = true;
        assert_ne!(task_set_hash(&tasks).unwrap(), task_set_hash(&done).unwrap());
    }

    #[test]
    fn analyzer_issues_bound_token() {
        let store = Arc::new(InMemoryTokenStore::new(chrono::Duration::hours(24)));
        let analyzer = CriticalPathAnalyzer::new(store.clone());
        let analysis = analyzer.analyze(&diamond(), None).unwrap();
        assert_eq!(analysis.token.kind, TokenKind::Analysis);
        assert_eq!(analysis.token.subject_hash, task_set_hash(&diamond()).unwrap());
        assert!(analysis.token.token_id.starts_with("analysis-"));

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["critical_path"], serde_json::json!(["A", "C", "D"]));
        assert!(json["token"]["token_id"].is_string());
    }

    #[test]
    fn unknown_completed_id_rejected() {
        let mut tasks = diamond();
        assert_eq!(
            mark_completed(&mut tasks, &["Z".to_string()]).unwrap_err().kind(),
            ErrorKind::UnknownTask
        );
    }
}
