use super::{optional_str, required_arg, required_str, respond, PlatformTool, Services};
use platform_core::critical_path::Task;
use platform_core::Result;
use serde_json::{json, Value};

fn tasks_schema() -> Value {
    json!({
        "type": "array",
        "description": "Every task in the plan",
        "items": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "duration": {"type": "number", "description": "Positive duration in any consistent unit"},
                "depends_on": {"type": "array", "items": {"type": "string"}},
                "completed": {"type": "boolean"}
            },
            "required": ["id", "duration"]
        }
    })
}

// ---------------------------------------------------------------------------
// analyze_critical_path
// ---------------------------------------------------------------------------

pub struct AnalyzeCriticalPathTool;

impl PlatformTool for AnalyzeCriticalPathTool {
    fn name(&self) -> &str {
        "analyze_critical_path"
    }

    fn description(&self) -> &str {
        "Compute the critical path, slack and ready tasks of a dependency graph. Issues a single-use analysis token required by record_decision."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": tasks_schema(),
                "goal": {"type": "string", "description": "Restrict the critical path to the chain ending at this task"}
            },
            "required": ["tasks"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let tasks: Vec<Task> = required_arg(&args, "tasks")?;
        let analysis = services
            .analyzer
            .analyze(&tasks, optional_str(&args, "goal"))?;
        let message = format!(
            "Critical path {} (total {}); analysis token {}",
            analysis.schedule.critical_path.join(" -> "),
            analysis.schedule.total_duration,
            analysis.token.token_id
        );
        respond(true, message, &analysis)
    }
}

// ---------------------------------------------------------------------------
// verify_analysis_token
// ---------------------------------------------------------------------------

pub struct VerifyAnalysisTokenTool;

impl PlatformTool for VerifyAnalysisTokenTool {
    fn name(&self) -> &str {
        "verify_analysis_token"
    }

    fn description(&self) -> &str {
        "Report whether an analysis token is live, consumed or expired, without consuming it"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "token_id": {"type": "string", "description": "Token from analyze_critical_path"}
            },
            "required": ["token_id"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let token_id = required_str(&args, "token_id")?;
        let v = services.decisions.verify(token_id)?;
        respond(true, format!("Token {token_id} is {}", v.status), &v)
    }
}

// ---------------------------------------------------------------------------
// record_decision
// ---------------------------------------------------------------------------

pub struct RecordDecisionTool;

impl PlatformTool for RecordDecisionTool {
    fn name(&self) -> &str {
        "record_decision"
    }

    fn description(&self) -> &str {
        "Record which ready task to work on next. Requires the analysis token for exactly this task set; the token is consumed."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": tasks_schema(),
                "analysis_token": {"type": "string"},
                "chosen_task_id": {"type": "string"},
                "rationale": {"type": "string"}
            },
            "required": ["tasks", "analysis_token", "chosen_task_id", "rationale"]
        })
    }

    fn call(&self, args: Value, services: &Services) -> Result<Value> {
        let tasks: Vec<Task> = required_arg(&args, "tasks")?;
        let token = required_str(&args, "analysis_token")?;
        let chosen = required_str(&args, "chosen_task_id")?;
        let rationale = required_str(&args, "rationale")?;
        let decision = services.decisions.decide(&tasks, token, chosen, rationale)?;
        let message = if decision.was_on_critical_path {
            format!("Decision recorded: {chosen} (on the critical path)")
        } else {
            format!("Decision recorded: {chosen} (off the critical path)")
        };
        respond(true, message, &decision)
    }
}

// ---------------------------------------------------------------------------
// list_decisions
// ---------------------------------------------------------------------------

pub struct ListDecisionsTool;

impl PlatformTool for ListDecisionsTool {
    fn name(&self) -> &str {
        "list_decisions"
    }

    fn description(&self) -> &str {
        "List decisions recorded in this session, oldest first"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn call(&self, _args: Value, services: &Services) -> Result<Value> {
        let decisions = services.decisions.decisions();
        respond(
            true,
            format!("{} decision(s)", decisions.len()),
            &json!({ "decisions": decisions }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::services;
    use platform_core::ErrorKind;
    use tempfile::TempDir;

    fn diamond() -> Value {
        json!([
            {"id": "A", "duration": 1},
            {"id": "B", "duration": 2, "depends_on": ["A"]},
            {"id": "C", "duration": 5, "depends_on": ["A"]},
            {"id": "D", "duration": 1, "depends_on": ["B", "C"]}
        ])
    }

    #[test]
    fn analyze_then_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);

        let analysis = AnalyzeCriticalPathTool
            .call(json!({"tasks": diamond()}), &s)
            .unwrap();
        assert_eq!(analysis["critical_path"], json!(["A", "C", "D"]));
        assert_eq!(analysis["total_duration"], 7.0);
        assert_eq!(analysis["ready_tasks"], json!(["A"]));
        let token = analysis["token"]["token_id"].as_str().unwrap().to_string();

        let args = json!({
            "tasks": diamond(), "analysis_token": token,
            "chosen_task_id": "A", "rationale": "only ready task"
        });
        let decision = RecordDecisionTool.call(args.clone(), &s).unwrap();
        assert_eq!(decision["was_on_critical_path"], true);

        let err = RecordDecisionTool.call(args, &s).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenAlreadyConsumed);

        let listed = ListDecisionsTool.call(json!({}), &s).unwrap();
        assert_eq!(listed["decisions"].as_array().unwrap().len(), 1);

        let v = VerifyAnalysisTokenTool
            .call(json!({"token_id": token}), &s)
            .unwrap();
        assert_eq!(v["status"], "consumed");
    }

    #[test]
    fn cycle_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let err = AnalyzeCriticalPathTool
            .call(
                json!({"tasks": [
                    {"id": "A", "duration": 1, "depends_on": ["B"]},
                    {"id": "B", "duration": 1, "depends_on": ["A"]}
                ]}),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicDependency);
    }

    #[test]
    fn design_token_cannot_record_decision() {
        let dir = TempDir::new().unwrap();
        let s = services(&dir);
        let err = RecordDecisionTool
            .call(
                json!({
                    "tasks": diamond(), "analysis_token": "valid-0000",
                    "chosen_task_id": "A", "rationale": ""
                }),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenNotFound);
    }
}
