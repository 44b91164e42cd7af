//! Provider prompt rendering.
//!
//! Each step is rendered into one prompt together with the plan goal and the
//! repository it runs against. Output is a pure function of its inputs, which
//! keeps provider requests deterministic across runs.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::plan::{Plan, Step};

const STEP_TEMPLATE: &str = include_str!("prompts/step.md");

/// Step fields exposed to the template.
#[derive(Debug, Clone, Serialize)]
struct StepContext<'a> {
    position: usize,
    total: usize,
    id: &'a str,
    kind: &'static str,
    title: &'a str,
    description: &'a str,
    prompt: &'a str,
    context: &'a std::collections::BTreeMap<String, String>,
}

/// Template engine wrapper around minijinja.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("step", STEP_TEMPLATE)
            .context("load step prompt template")?;
        Ok(Self { env })
    }

    /// Render the prompt for `plan.steps[index]`.
    pub fn render_step(&self, plan: &Plan, index: usize, repo_path: &Path) -> Result<String> {
        let step: &Step = plan
            .steps
            .get(index)
            .with_context(|| format!("step index {index} out of range for plan '{}'", plan.id))?;
        let selected = StepContext {
            position: index + 1,
            total: plan.steps.len(),
            id: &step.id,
            kind: step.kind.as_str(),
            title: &step.title,
            description: step.description.trim(),
            prompt: step.input.prompt.trim(),
            context: &step.input.context,
        };
        let template = self.env.get_template("step")?;
        let rendered = template
            .render(context! {
                goal => plan.goal.trim(),
                description => (!plan.description.trim().is_empty()).then(|| plan.description.trim()),
                repo_path => repo_path.display().to_string(),
                step => selected,
            })
            .with_context(|| format!("render prompt for step '{}'", step.id))?;
        Ok(rendered)
    }
}
