//! Plan loading with schema + semantic validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::plan::Plan;

pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan/v1.schema.json");

/// Load a plan file and validate it (schema, then step preconditions).
pub fn load_plan(path: &Path) -> Result<Plan> {
    debug!(path = %path.display(), "loading plan");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    parse_plan(&contents).with_context(|| format!("load plan {}", path.display()))
}

/// Parse and validate plan JSON.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let value: Value = serde_json::from_str(raw).context("parse plan json")?;
    validate_schema(&value)?;
    let plan: Plan = serde_json::from_value(value).context("deserialize plan")?;
    plan.validate()?;
    Ok(plan)
}

fn validate_schema(plan: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages = compiled
        .iter_errors(plan)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::plan::StepKind;

    const VALID: &str = r#"{
        "id": "plan-1",
        "goal": "Add a health endpoint",
        "description": "Small change",
        "steps": [
            { "id": "s1", "type": "analysis", "title": "Read", "input": { "prompt": "read the router" } },
            { "id": "s2", "type": "code_change", "title": "Edit",
              "input": { "prompt": "add the route", "context": { "file": "src/routes.rs" } } }
        ]
    }"#;

    #[test]
    fn parses_valid_plan() {
        let plan = parse_plan(VALID).expect("plan");
        assert_eq!(plan.id, "plan-1");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].kind, StepKind::CodeChange);
        assert_eq!(plan.steps[1].input.context["file"], "src/routes.rs");
    }

    #[test]
    fn accepts_extra_input_fields() {
        let raw = VALID.replace(
            r#""prompt": "read the router""#,
            r#""prompt": "read the router", "files": ["a.rs"]"#,
        );
        let plan = parse_plan(&raw).expect("plan");
        assert_eq!(
            plan.steps[0].input.extra["files"],
            serde_json::json!(["a.rs"])
        );
    }

    #[test]
    fn schema_rejects_unknown_step_type() {
        let raw = VALID.replace("\"code_change\"", "\"deploy\"");
        let err = parse_plan(&raw).expect_err("schema");
        assert!(err.to_string().contains("plan schema validation failed"));
    }

    #[test]
    fn schema_rejects_empty_steps() {
        let raw = r#"{ "id": "p", "goal": "g", "steps": [] }"#;
        assert!(parse_plan(raw).is_err());
    }

    #[test]
    fn semantic_check_rejects_duplicate_ids() {
        let raw = VALID.replace("\"s2\"", "\"s1\"");
        let err = parse_plan(&raw).expect_err("duplicate");
        assert_eq!(
            err.downcast_ref::<PlanError>(),
            Some(&PlanError::DuplicateStepId {
                plan_id: "plan-1".to_string(),
                step_id: "s1".to_string(),
            })
        );
    }

    #[test]
    fn load_plan_reads_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        fs::write(&path, VALID).expect("write");
        let plan = load_plan(&path).expect("load");
        assert_eq!(plan.goal, "Add a health endpoint");
    }
}
