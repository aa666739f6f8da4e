//! Prompt Templates
//!
//! Every prompt the engine sends is a markdown template. The built-in set is
//! compiled into the crate; deployments can replace any of them by dropping a
//! `<name>.md` file into their prompts directory.

use std::collections::HashMap;
use tracing::{info, warn};

macro_rules! prompt_set {
    ($($field:ident),+ $(,)?) => {
        /// The full set of prompt templates, one field per `<field>.md` file.
        #[derive(Debug, Clone, PartialEq)]
        pub struct Prompts {
            $(pub $field: String,)+
        }

        impl Prompts {
            /// The templates shipped with the crate.
            pub fn builtin() -> Self {
                Self {
                    $($field: include_str!(concat!("../prompts/", stringify!($field), ".md")).to_string(),)+
                }
            }

            fn slot_mut(&mut self, name: &str) -> Option<&mut String> {
                match name {
                    $(stringify!($field) => Some(&mut self.$field),)+
                    _ => None,
                }
            }
        }
    };
}

prompt_set!(
    scenario,
    counterpart_movie,
    counterpart_salary,
    counterpart_general,
    coach,
    transcript_grading,
    content_analysis,
    content_interpretation,
    content_planning_batna,
    content_planning_logrolling,
    content_technique,
    evaluate_analysis,
    evaluate_interpretation,
    evaluate_plan,
    evaluate_technique,
    exercise_description,
    exercise_insights,
    program_length,
);

impl Default for Prompts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Prompts {
    /// Replaces built-in templates with the given ones, keyed by file stem.
    /// Unknown keys are ignored with a warning.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        for (name, template) in overrides {
            match self.slot_mut(&name) {
                Some(slot) => {
                    info!(prompt = %name, "Using prompt override");
                    *slot = template;
                }
                None => warn!(prompt = %name, "Ignoring unknown prompt template"),
            }
        }
        self
    }
}

/// Substitutes `{name}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prompts_are_not_empty() {
        let prompts = Prompts::builtin();
        assert!(prompts.coach.contains("3 tips"));
        assert!(prompts.scenario.contains("{performance_context}"));
        assert!(prompts.content_technique.contains("OTHER_PERSON_SAYS:"));
    }

    #[test]
    fn test_overrides_replace_known_templates_only() {
        let mut overrides = HashMap::new();
        overrides.insert("coach".to_string(), "custom coach".to_string());
        overrides.insert("not_a_prompt".to_string(), "ignored".to_string());

        let prompts = Prompts::builtin().with_overrides(overrides);
        assert_eq!(prompts.coach, "custom coach");
        assert_eq!(prompts.scenario, Prompts::builtin().scenario);
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let out = render(
            "Task: {title}\n{title} again, context: {ctx}",
            &[("title", "BATNA"), ("ctx", "")],
        );
        assert_eq!(out, "Task: BATNA\nBATNA again, context: ");
    }
}
