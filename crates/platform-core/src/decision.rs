use crate::critical_path::{schedule, task_set_hash, Task, TaskGraph};
use crate::error::{PlatformError, Result};
use crate::token::{verify_token, TokenKind, TokenStore, TokenVerification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub chosen_task_id: String,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
    pub was_on_critical_path: bool,
    pub token_id: String,
    pub task_set_hash: String,
}

/// Records planning decisions, each backed by a fresh analysis of the same
/// task set.
pub struct DecisionGate {
    store: Arc<dyn TokenStore>,
    log: Mutex<Vec<Decision>>,
}

impl DecisionGate {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Redeem `analysis_token` for a decision to start `chosen_task_id` next.
    ///
    /// The token is checked, then the choice is checked for readiness, and
    /// only then consumed. A token rejected for `TaskNotReady` stays live.
    pub fn decide(
        &self,
        tasks: &[Task],
        analysis_token: &str,
        chosen_task_id: &str,
        rationale: &str,
    ) -> Result<Decision> {
        let hash = task_set_hash(tasks)?;
        self.store
            .check(analysis_token, TokenKind::Analysis, &hash)
            .inspect_err(|e| {
                tracing::warn!(token = %analysis_token, error = %e, "decision refused");
            })?;

        let graph = TaskGraph::build(tasks)?;
        let index = graph
            .index_of(chosen_task_id)
            .ok_or_else(|| PlatformError::UnknownTask(chosen_task_id.to_string()))?;
        if !graph.is_ready(index) {
            let reason = match graph.get(chosen_task_id) {
                Some(t) if t.completed => "task is already completed".to_string(),
                _ => format!(
                    "waiting on incomplete dependencies: {}",
                    graph.incomplete_deps(index).join(", ")
                ),
            };
            return Err(PlatformError::TaskNotReady {
                task: chosen_task_id.to_string(),
                reason,
            });
        }
        let was_on_critical_path = schedule(tasks, None)?.is_on_critical_path(chosen_task_id);

        let token = self
            .store
            .consume_if_unconsumed(analysis_token, TokenKind::Analysis, &hash)?;

        let decision = Decision {
            chosen_task_id: chosen_task_id.to_string(),
            rationale: rationale.to_string(),
            timestamp: self.store.now(),
            was_on_critical_path,
            token_id: token.token_id,
            task_set_hash: hash,
        };
        tracing::info!(
            task = %decision.chosen_task_id,
            critical = decision.was_on_critical_path,
            "decision recorded"
        );
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(decision.clone());
        Ok(decision)
    }

    pub fn verify(&self, token_id: &str) -> Result<TokenVerification> {
        verify_token(self.store.as_ref(), token_id, TokenKind::Analysis)
    }

    /// Every decision recorded by this gate, oldest first.
    pub fn decisions(&self) -> Vec<Decision> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
