//! Prompt rendering for the generator, verifier and reviewer roles.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::protocol::ProtocolKind;

const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    protocol: ProtocolKind,
}

impl PromptEngine {
    pub fn new(protocol: ProtocolKind) -> Self {
        let mut env = Environment::new();
        env.add_template("generator", GENERATOR_TEMPLATE)
            .expect("generator template should be valid");
        env.add_template("verifier", VERIFIER_TEMPLATE)
            .expect("verifier template should be valid");
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .expect("reviewer template should be valid");
        Self { env, protocol }
    }

    /// Prompt for the next generation. Empty artifact/feedback sections are omitted.
    pub fn render_generator(
        &self,
        task: &str,
        previous_artifact: &str,
        feedback: &str,
    ) -> Result<String> {
        let template = self.env.get_template("generator")?;
        let rendered = template.render(context! {
            task => task.trim(),
            previous_artifact => non_empty(previous_artifact),
            feedback => non_empty(feedback),
        })?;
        Ok(rendered)
    }

    pub fn render_verifier(&self, artifact: &str) -> Result<String> {
        let template = self.env.get_template("verifier")?;
        let rendered = template.render(context! {
            artifact => artifact,
            json => self.protocol == ProtocolKind::Json,
        })?;
        Ok(rendered)
    }

    /// Prompt for the reviewer; `verification` is the verifier's raw response.
    pub fn render_reviewer(&self, artifact: &str, verification: &str) -> Result<String> {
        let template = self.env.get_template("reviewer")?;
        let rendered = template.render(context! {
            artifact => artifact,
            verification => verification.trim(),
            json => self.protocol == ProtocolKind::Json,
        })?;
        Ok(rendered)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}
