use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Ordered set of steps describing one task. The engine only ever borrows it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub goal: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub input: StepInput,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Analysis,
    CodeChange,
    Review,
    Test,
    Documentation,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Analysis => "analysis",
            StepKind::CodeChange => "code_change",
            StepKind::Review => "review",
            StepKind::Test => "test",
            StepKind::Documentation => "documentation",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepInput {
    pub prompt: String,
    /// Extra key/value hints rendered into the provider prompt in key order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    /// Any other input fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Plan {
    /// Check the preconditions `execute` relies on: at least one step and unique step ids.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.id.trim().is_empty() {
            return Err(PlanError::MissingId);
        }
        if self.steps.is_empty() {
            return Err(PlanError::NoSteps {
                plan_id: self.id.clone(),
            });
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(PlanError::EmptyStepId {
                    plan_id: self.id.clone(),
                });
            }
            if !seen.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStepId {
                    plan_id: self.id.clone(),
                    step_id: step.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_with_steps, step};

    #[test]
    fn validate_accepts_ordered_unique_steps() {
        let plan = plan_with_steps("plan-1", 3);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_plan() {
        let mut plan = plan_with_steps("plan-1", 1);
        plan.steps.clear();
        assert!(matches!(plan.validate(), Err(PlanError::NoSteps { .. })));
    }

    #[test]
    fn validate_rejects_duplicate_step_ids() {
        let mut plan = plan_with_steps("plan-1", 1);
        plan.steps.push(step("step-1", StepKind::Review));
        let err = plan.validate().expect_err("duplicate");
        assert_eq!(
            err.to_string(),
            "plan 'plan-1' has duplicate step id 'step-1'"
        );
    }

    #[test]
    fn step_kind_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&StepKind::CodeChange).expect("serialize");
        assert_eq!(json, "\"code_change\"");
        assert_eq!(StepKind::CodeChange.as_str(), "code_change");
    }

    #[test]
    fn step_type_field_is_named_type() {
        let raw = r#"{
            "id": "s1",
            "type": "analysis",
            "title": "Look around",
            "input": { "prompt": "inspect the repo" }
        }"#;
        let parsed: Step = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.kind, StepKind::Analysis);
        assert_eq!(parsed.description, "");
        assert!(parsed.input.context.is_empty());
    }

    #[test]
    fn unknown_input_fields_survive_a_round_trip() {
        let raw = r#"{
            "id": "s1",
            "type": "code_change",
            "title": "Edit",
            "input": { "prompt": "x", "files": ["a.rs"], "context": { "lang": "rust" } }
        }"#;
        let parsed: Step = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.input.extra["files"], serde_json::json!(["a.rs"]));
        assert_eq!(parsed.input.context["lang"], "rust");
        assert!(!parsed.input.extra.contains_key("context"));

        let value = serde_json::to_value(&parsed).expect("serialize");
        assert_eq!(value["input"]["files"], serde_json::json!(["a.rs"]));
        let reparsed: Step = serde_json::from_value(value).expect("reparse");
        assert_eq!(reparsed, parsed);
    }
}
