//! Exercise Content
//!
//! Each exercise kind has its own generated payload. Content is produced by
//! the text generator from a kind-specific prompt, parsed from a `LABEL:`
//! sectioned reply and cached on the exercise. Every kind has a fixed
//! fallback so a generator outage never leaves an exercise empty.

use crate::llm_client::{BestEffort, OrFallback, TextGenerator};
use crate::model::ExerciseKind;
use crate::prompts::{Prompts, render};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generated material for one exercise, one variant per [`ExerciseKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseContent {
    /// Simulations carry no payload; their opening message lives in the log.
    Simulation,
    Analysis {
        transcript: String,
        question: String,
    },
    Interpretation {
        statement: String,
        instruction: String,
    },
    Planning {
        scenario: String,
        constraints: String,
        instruction: String,
    },
    Technique {
        context: String,
        other_person_says: String,
        technique_instruction: String,
        technique_name: String,
    },
}

impl ExerciseContent {
    pub fn kind(&self) -> ExerciseKind {
        match self {
            ExerciseContent::Simulation => ExerciseKind::Simulation,
            ExerciseContent::Analysis { .. } => ExerciseKind::Analysis,
            ExerciseContent::Interpretation { .. } => ExerciseKind::Interpretation,
            ExerciseContent::Planning { .. } => ExerciseKind::Planning,
            ExerciseContent::Technique { .. } => ExerciseKind::Technique,
        }
    }

    /// The fixed content used when generation fails.
    pub fn fallback(kind: ExerciseKind, title: &str) -> Self {
        match kind {
            ExerciseKind::Simulation => ExerciseContent::Simulation,
            ExerciseKind::Analysis => ExerciseContent::Analysis {
                transcript: format!(
                    "Conversation about {title}:\n\n\
                     Person A: I have a proposal I'd like to discuss.\n\n\
                     Person B: That sounds interesting, but I'm not sure we have time right now.\n\n\
                     Person A: I understand, but this is quite important."
                ),
                question: "Identify one statement that expresses a position rather than the \
                           underlying interest."
                    .to_string(),
            },
            ExerciseKind::Interpretation => ExerciseContent::Interpretation {
                statement: "I absolutely refuse to work on weekends. That's non-negotiable."
                    .to_string(),
                instruction: "What need or concern might sit behind this statement? What does \
                              this person actually care about?"
                    .to_string(),
            },
            ExerciseKind::Planning if PlanningFlavor::of(title) == PlanningFlavor::LogRolling => {
                ExerciseContent::Planning {
                    scenario: "You're negotiating a new job offer. Four issues are on the table: \
                               base salary, signing bonus, vacation days and remote work days per \
                               week."
                        .to_string(),
                    constraints: "The company values in-office presence. You value flexibility. \
                                  The budget allows some movement on total compensation."
                        .to_string(),
                    instruction: "Rank the issues by how much they matter to you and decide what \
                                  you would give up to get what you really want."
                        .to_string(),
                }
            }
            ExerciseKind::Planning => ExerciseContent::Planning {
                scenario: format!(
                    "You are negotiating about {}. The other party has made an initial offer you \
                     find partly acceptable but not ideal.",
                    title.to_lowercase()
                ),
                constraints: "Budget: limited\nTimeline: one week\nStakeholders: two decision-makers"
                    .to_string(),
                instruction: "Write a step-by-step plan for the negotiation, including your BATNA, \
                              your priorities and possible trade-offs."
                    .to_string(),
            },
            ExerciseKind::Technique => {
                let technique_name = technique_name(title);
                ExerciseContent::Technique {
                    context: format!(
                        "You are in a negotiation about {title}. The other person seems frustrated."
                    ),
                    other_person_says: "I'm really frustrated with how this is going. You don't \
                                        seem to understand my concerns at all!"
                        .to_string(),
                    technique_instruction: format!(
                        "Respond using {technique_name}: restate what you heard in your own words \
                         to show understanding and acknowledge their feelings."
                    ),
                    technique_name,
                }
            }
        }
    }
}

/// Which planning prompt an exercise gets, decided by its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningFlavor {
    Batna,
    LogRolling,
}

impl PlanningFlavor {
    pub fn of(title: &str) -> Self {
        let title = title.to_lowercase();
        if title.contains("log-rolling") || title.contains("value creation") {
            PlanningFlavor::LogRolling
        } else {
            PlanningFlavor::Batna
        }
    }
}

/// The technique a drill practises, read from its title ("Mirroring and
/// Validation" practises mirroring).
pub fn technique_name(title: &str) -> String {
    title
        .split([':', '–', '-'])
        .next()
        .and_then(|head| head.split(" and ").next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(title)
        .to_string()
}

fn is_label(candidate: &str) -> bool {
    candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_' || c == ' ')
}

/// Splits a `LABEL: value` sectioned reply into lowercase keys.
///
/// A section starts at a line whose text before the first colon is an
/// upper-case label from `labels` (markdown emphasis is ignored) and runs
/// until the next such line. Labels outside `labels` are treated as text so
/// that dialogue lines like `MANAGER: ...` stay inside their section.
pub fn parse_sections(raw: &str, labels: &[&str]) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    let mut flush = |current: Option<(String, Vec<&str>)>| {
        if let Some((key, lines)) = current {
            let value = lines.join("\n").trim().to_string();
            if !value.is_empty() {
                sections.insert(key, value);
            }
        }
    };

    for line in raw.lines() {
        let heading = line.split_once(':').and_then(|(head, rest)| {
            let label = head.replace('*', "").replace('#', "");
            let label = label.trim();
            (is_label(label) && labels.contains(&label)).then(|| (label.to_string(), rest))
        });
        match heading {
            Some((label, rest)) => {
                flush(current.take());
                let key = label.to_lowercase().replace(' ', "_");
                current = Some((key, vec![rest.trim_start_matches('*').trim()]));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }
    flush(current);
    sections
}

fn take(sections: &mut HashMap<String, String>, key: &str) -> Result<String> {
    sections
        .remove(key)
        .ok_or_else(|| anyhow!("generated content has no {} section", key.to_uppercase()))
}

fn parse_content(kind: ExerciseKind, title: &str, raw: &str) -> Result<ExerciseContent> {
    let labels: &[&str] = match kind {
        ExerciseKind::Simulation => return Ok(ExerciseContent::Simulation),
        ExerciseKind::Analysis => &["TRANSCRIPT", "QUESTION"],
        ExerciseKind::Interpretation => &["STATEMENT", "INSTRUCTION"],
        ExerciseKind::Planning => &["SCENARIO", "CONSTRAINTS", "INSTRUCTION"],
        ExerciseKind::Technique => &["CONTEXT", "OTHER_PERSON_SAYS", "TECHNIQUE_INSTRUCTION"],
    };
    let mut s = parse_sections(raw, labels);
    Ok(match kind {
        ExerciseKind::Simulation => ExerciseContent::Simulation,
        ExerciseKind::Analysis => ExerciseContent::Analysis {
            transcript: take(&mut s, "transcript")?,
            question: take(&mut s, "question")?,
        },
        ExerciseKind::Interpretation => ExerciseContent::Interpretation {
            statement: take(&mut s, "statement")?,
            instruction: take(&mut s, "instruction")?,
        },
        ExerciseKind::Planning => ExerciseContent::Planning {
            scenario: take(&mut s, "scenario")?,
            constraints: take(&mut s, "constraints")?,
            instruction: take(&mut s, "instruction")?,
        },
        ExerciseKind::Technique => ExerciseContent::Technique {
            context: take(&mut s, "context")?,
            other_person_says: take(&mut s, "other_person_says")?,
            technique_instruction: take(&mut s, "technique_instruction")?,
            technique_name: technique_name(title),
        },
    })
}

/// What content generation knows about the exercise it writes for.
#[derive(Debug, Clone, Copy)]
pub struct ContentRequest<'a> {
    pub kind: ExerciseKind,
    pub title: &'a str,
    pub objective: &'a str,
    /// Opaque difficulty guidance, see [`crate::performance::guidance`].
    pub guidance: &'a str,
}

fn exercise_brief(title: &str, objective: &str) -> String {
    format!("Exercise title: {title}\nExercise objective: {objective}\n")
}

/// Generates the payload for an exercise, falling back to fixed content.
pub async fn generate_content(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    request: ContentRequest<'_>,
) -> BestEffort<ExerciseContent> {
    let ContentRequest {
        kind,
        title,
        objective,
        guidance,
    } = request;
    let (template, ask) = match kind {
        ExerciseKind::Simulation => return Ok(ExerciseContent::Simulation),
        ExerciseKind::Analysis => (
            &prompts.content_analysis,
            "Write a realistic analysis exercise for this.",
        ),
        ExerciseKind::Interpretation => (
            &prompts.content_interpretation,
            "Write an interpretation exercise about the need hidden behind a position.",
        ),
        ExerciseKind::Planning => match PlanningFlavor::of(title) {
            PlanningFlavor::Batna => (
                &prompts.content_planning_batna,
                "Write a realistic, specific BATNA planning exercise.",
            ),
            PlanningFlavor::LogRolling => (
                &prompts.content_planning_logrolling,
                "Write a realistic log-rolling exercise with several negotiable issues.",
            ),
        },
        ExerciseKind::Technique => (
            &prompts.content_technique,
            "Write a technique drill. Technique to practise: {technique}.",
        ),
    };

    let technique = technique_name(title);
    let system_prompt = render(template, &[("performance_context", guidance)]);
    let user_prompt = format!(
        "{}\n{}",
        exercise_brief(title, objective),
        render(ask, &[("technique", technique.as_str())])
    );

    generator
        .generate(system_prompt, user_prompt)
        .await
        .and_then(|raw| parse_content(kind, title, &raw))
        .or_fallback(|| ExerciseContent::fallback(kind, title))
}

/// Generates the opening scenario of a simulation.
pub async fn generate_opening(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    title: &str,
    objective: &str,
    guidance: &str,
) -> Result<String> {
    let system_prompt = render(&prompts.scenario, &[("performance_context", guidance)]);
    let user_prompt = format!(
        "{}\nWrite a realistic scenario for this negotiation exercise in this shape:\n\
         - You are [Name], [Role].\n\
         - Your counterpart is [Name], [Role].\n\
         - [The counterpart's opening line for the learner to answer.]",
        exercise_brief(title, objective)
    );
    generator.generate(system_prompt, user_prompt).await
}
