//! Evaluation and Grading
//!
//! Learner answers to written exercises are judged by the text generator on
//! a five-level scale; the engine, not the generator, turns that level into
//! a grade. Simulations are graded from their transcript instead.

use crate::content::{ExerciseContent, parse_sections};
use crate::conversation::LogEntry;
use crate::llm_client::{BestEffort, OrFallback, TextGenerator};
use crate::model::{Sender, clamp_grade};
use crate::prompts::{Prompts, render};
use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::LazyLock;

pub const UNAVAILABLE: &str = "Feedback is unavailable right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLevel {
    Excellent,
    Good,
    Acceptable,
    Weak,
    Minimal,
}

impl AssessmentLevel {
    pub fn grade(self) -> u8 {
        match self {
            AssessmentLevel::Excellent => 5,
            AssessmentLevel::Good => 4,
            AssessmentLevel::Acceptable => 3,
            AssessmentLevel::Weak => 2,
            AssessmentLevel::Minimal => 1,
        }
    }
}

impl FromStr for AssessmentLevel {
    type Err = std::convert::Infallible;

    /// Anything unrecognised counts as minimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s
            .trim()
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        Ok(match word.as_str() {
            "excellent" => AssessmentLevel::Excellent,
            "good" => AssessmentLevel::Good,
            "acceptable" => AssessmentLevel::Acceptable,
            "weak" => AssessmentLevel::Weak,
            _ => AssessmentLevel::Minimal,
        })
    }
}

/// One labelled part of an evaluator's reply, e.g. `("Strengths", "...")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationDetail {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// `None` when the evaluator could not be reached.
    pub level: Option<AssessmentLevel>,
    pub grade: Option<u8>,
    /// The details joined into one text, ready to store on the exercise.
    pub feedback: String,
    pub details: Vec<EvaluationDetail>,
}

impl Evaluation {
    fn unavailable() -> Self {
        Self {
            level: None,
            grade: None,
            feedback: UNAVAILABLE.to_string(),
            details: Vec::new(),
        }
    }
}

const ANALYSIS_SECTIONS: &[&str] = &["FEEDBACK"];
const INTERPRETATION_SECTIONS: &[&str] = &["COACH_MESSAGE", "FEEDBACK", "SUGGESTION"];
const PLAN_SECTIONS: &[&str] = &["COACH_MESSAGE", "STRENGTHS", "GAPS", "SUGGESTED_REFINEMENT"];
const TECHNIQUE_SECTIONS: &[&str] = &["COACH_MESSAGE", "ANALYSIS", "EXAMPLE"];

/// Level key and the feedback sections, in display order, per content kind.
fn reply_shape(content: &ExerciseContent) -> Option<(&'static str, &'static [&'static str])> {
    match content {
        ExerciseContent::Simulation => None,
        ExerciseContent::Analysis { .. } => Some(("CORRECTNESS_LEVEL", ANALYSIS_SECTIONS)),
        ExerciseContent::Interpretation { .. } => Some(("INSIGHT_LEVEL", INTERPRETATION_SECTIONS)),
        ExerciseContent::Planning { .. } => Some(("PLAN_QUALITY", PLAN_SECTIONS)),
        ExerciseContent::Technique { .. } => Some(("TECHNIQUE_QUALITY", TECHNIQUE_SECTIONS)),
    }
}

fn display_label(key: &str) -> String {
    let text = key.replace('_', " ").to_lowercase();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => text,
    }
}

/// Parses an evaluator reply for `content`'s kind.
pub fn parse_evaluation(content: &ExerciseContent, raw: &str) -> Option<Evaluation> {
    let (level_key, sections) = reply_shape(content)?;
    let mut labels = vec![level_key];
    labels.extend_from_slice(sections);
    let parsed = parse_sections(raw, &labels);

    let level = parsed
        .get(&level_key.to_lowercase())
        .map(|l| l.lines().next().unwrap_or_default())
        .unwrap_or_default()
        .parse::<AssessmentLevel>()
        .unwrap_or(AssessmentLevel::Minimal);

    let details: Vec<EvaluationDetail> = sections
        .iter()
        .filter_map(|key| {
            parsed.get(&key.to_lowercase()).map(|text| EvaluationDetail {
                label: display_label(key),
                text: text.clone(),
            })
        })
        .collect();

    let feedback = match details.as_slice() {
        [only] => only.text.clone(),
        many => many
            .iter()
            .map(|d| format!("{}: {}", d.label, d.text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    Some(Evaluation {
        level: Some(level),
        grade: Some(level.grade()),
        feedback,
        details,
    })
}

/// Extra guidance for analysis exercises, chosen from the title.
fn analysis_focus(title: &str) -> &'static str {
    let title = title.to_lowercase();
    if title.contains("excuse") {
        "Focus: identifying excuses. An excuse is any reason used to avoid, deflect or \
         sidestep a request, even a true one (\"we can't afford it\", \"let's revisit later\")."
    } else if title.contains("manipulation") || title.contains("tactic") {
        "Focus: identifying manipulation tactics such as good cop / bad cop, where pressure \
         shifts to reassurance to gain an advantage."
    } else if ["objection", "calm", "emotion"]
        .iter()
        .any(|k| title.contains(k))
    {
        "Focus: managing emotions and objections. Judge the proposed strategies on how well \
         they calm the other person: active listening, acknowledgment, empathy, solutions."
    } else {
        ""
    }
}

fn evaluation_prompts(
    prompts: &Prompts,
    title: &str,
    content: &ExerciseContent,
    response: &str,
) -> Option<(String, String)> {
    let pair = match content {
        ExerciseContent::Simulation => return None,
        ExerciseContent::Analysis { question, .. } => (
            render(
                &prompts.evaluate_analysis,
                &[("task_context", analysis_focus(title))],
            ),
            format!(
                "Exercise: {title}\n\nQuestion:\n{question}\n\nLearner's answer:\n{response}\n\n\
                 Judge the answer only against what the question asked."
            ),
        ),
        ExerciseContent::Interpretation { statement, .. } => (
            prompts.evaluate_interpretation.clone(),
            format!(
                "Exercise: {title}\n\nThe stated position:\n\"{statement}\"\n\n\
                 Learner's interpretation of the underlying need:\n\"{response}\""
            ),
        ),
        ExerciseContent::Planning {
            scenario,
            constraints,
            ..
        } => (
            prompts.evaluate_plan.clone(),
            format!(
                "Exercise: {title}\n\nScenario:\n{scenario}\n\nConstraints:\n{constraints}\n\n\
                 Learner's plan:\n{response}"
            ),
        ),
        ExerciseContent::Technique {
            other_person_says,
            technique_instruction,
            technique_name,
            ..
        } => (
            prompts.evaluate_technique.clone(),
            format!(
                "Exercise: {title}\nTechnique: {technique_name}\n\nInstruction:\n\
                 {technique_instruction}\n\nThe other person said:\n\"{other_person_says}\"\n\n\
                 Learner's reply:\n\"{response}\""
            ),
        ),
    };
    Some(pair)
}

/// Judges a learner's answer to a written exercise.
///
/// Returns `None` for simulations, which are graded from their transcript.
pub async fn evaluate_response(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    title: &str,
    content: &ExerciseContent,
    response: &str,
) -> Option<BestEffort<Evaluation>> {
    let (system_prompt, user_prompt) = evaluation_prompts(prompts, title, content, response)?;
    let outcome: Result<Evaluation> = generator
        .generate(system_prompt, user_prompt)
        .await
        .and_then(|raw| {
            parse_evaluation(content, &raw)
                .ok_or_else(|| anyhow::anyhow!("evaluation reply has an unexpected shape"))
        });
    Some(outcome.or_fallback(Evaluation::unavailable))
}

/// The grade of a finished simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptGrade {
    pub grade: Option<u8>,
    pub feedback: String,
}

static GRADE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Grade[:\s]+(\d)").expect("grade pattern is a valid regex"));

/// Reads the `Grade: <n>` line of a grading reply, clamped to the grade range.
pub fn extract_grade(raw: &str) -> Option<u8> {
    GRADE_LINE
        .captures(raw)
        .and_then(|c| c[1].parse::<i64>().ok())
        .map(clamp_grade)
}

/// Grades the learner's side of a simulation from its transcript.
pub async fn grade_transcript(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    title: &str,
    entries: &[LogEntry<'_>],
) -> BestEffort<TranscriptGrade> {
    let transcript = entries
        .iter()
        .filter(|e| matches!(e.sender, Sender::Learner | Sender::Counterpart))
        .map(|e| format!("{}: {}", display_label(e.sender.as_str()), e.text))
        .collect::<Vec<_>>()
        .join("\n");
    let user_prompt = format!(
        "Exercise: {title}\n\nTranscript:\n{transcript}\n\n\
         Give an outcome summary, feedback, one improvement and a final \"Grade: <number>\" line."
    );

    generator
        .generate(prompts.transcript_grading.clone(), user_prompt)
        .await
        .map(|raw| TranscriptGrade {
            grade: extract_grade(&raw),
            feedback: raw,
        })
        .or_fallback(|| TranscriptGrade {
            grade: None,
            feedback: UNAVAILABLE.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockTextGenerator;
    use chrono::Utc;

    fn planning() -> ExerciseContent {
        ExerciseContent::Planning {
            scenario: "Renewing a vendor contract.".to_string(),
            constraints: "Budget frozen.".to_string(),
            instruction: "Build your BATNA.".to_string(),
        }
    }

    #[test]
    fn test_levels_map_to_grades() {
        let grades: Vec<u8> = ["Excellent", "good", " acceptable ", "WEAK", "minimal"]
            .iter()
            .map(|l| l.parse::<AssessmentLevel>().unwrap().grade())
            .collect();
        assert_eq!(grades, vec![5, 4, 3, 2, 1]);
        assert_eq!(
            "[outstanding]".parse::<AssessmentLevel>().unwrap(),
            AssessmentLevel::Minimal
        );
        assert_eq!(
            "[good]".parse::<AssessmentLevel>().unwrap(),
            AssessmentLevel::Good
        );
    }

    #[test]
    fn test_parse_plan_evaluation() {
        let raw = "PLAN_QUALITY: good\nCOACH_MESSAGE: Solid start.\nSTRENGTHS: Concrete alternative.\nGAPS: No walk-away point.\nSUGGESTED_REFINEMENT: Name your floor.";
        let evaluation = parse_evaluation(&planning(), raw).unwrap();
        assert_eq!(evaluation.level, Some(AssessmentLevel::Good));
        assert_eq!(evaluation.grade, Some(4));
        assert_eq!(evaluation.details.len(), 4);
        assert_eq!(evaluation.details[3].label, "Suggested refinement");
        assert!(
            evaluation
                .feedback
                .starts_with("Coach message: Solid start.\n\nStrengths: Concrete alternative.")
        );
    }

    #[test]
    fn test_parse_analysis_keeps_plain_feedback() {
        let content = ExerciseContent::Analysis {
            transcript: String::new(),
            question: String::new(),
        };
        let raw = "CORRECTNESS_LEVEL: excellent\nFEEDBACK: You found the excuse.\nIt deflects the raise.";
        let evaluation = parse_evaluation(&content, raw).unwrap();
        assert_eq!(evaluation.grade, Some(5));
        assert_eq!(
            evaluation.feedback,
            "You found the excuse.\nIt deflects the raise."
        );
    }

    #[test]
    fn test_missing_level_counts_as_minimal() {
        let evaluation = parse_evaluation(&planning(), "GAPS: everything").unwrap();
        assert_eq!(evaluation.level, Some(AssessmentLevel::Minimal));
        assert_eq!(evaluation.grade, Some(1));
    }

    #[test]
    fn test_extract_grade() {
        assert_eq!(extract_grade("Outcome: no deal.\nGrade: 3"), Some(3));
        assert_eq!(extract_grade("Grade 9"), Some(5));
        assert_eq!(extract_grade("No number here"), None);
    }

    #[test]
    fn test_analysis_focus_by_title() {
        assert!(analysis_focus("Case Study Analysis – Identify Excuses").contains("excuses"));
        assert!(analysis_focus("Identifying Manipulation Tactics").contains("good cop"));
        assert!(analysis_focus("Managing Objections and Emotions").contains("calm"));
        assert_eq!(analysis_focus("Something else"), "");
    }

    #[tokio::test]
    async fn test_evaluate_response_falls_back_without_grade() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));

        let outcome = evaluate_response(
            &generator,
            &Prompts::builtin(),
            "Building Your BATNA",
            &planning(),
            "I'd apply elsewhere",
        )
        .await
        .unwrap();
        let fallback = outcome.unwrap_err();
        assert_eq!(fallback.value.grade, None);
        assert_eq!(fallback.value.feedback, UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_evaluate_response_sends_scenario_and_answer() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|system, user| {
                system.contains("PLAN_QUALITY")
                    && user.contains("Budget frozen.")
                    && user.contains("I'd apply elsewhere")
            })
            .returning(|_, _| Ok("PLAN_QUALITY: weak\nGAPS: Too vague.".to_string()));

        let evaluation = evaluate_response(
            &generator,
            &Prompts::builtin(),
            "Building Your BATNA",
            &planning(),
            "I'd apply elsewhere",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(evaluation.grade, Some(2));
        assert_eq!(evaluation.feedback, "Too vague.");
    }

    #[tokio::test]
    async fn test_simulations_are_not_evaluated() {
        let generator = MockTextGenerator::new();
        let outcome = evaluate_response(
            &generator,
            &Prompts::builtin(),
            "Light Negotiation Simulation",
            &ExerciseContent::Simulation,
            "hi",
        )
        .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_grade_transcript_uses_learner_and_counterpart_only() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, user| {
                user.contains("Learner: I want Up")
                    && user.contains("Counterpart: The Matrix")
                    && !user.contains("secret tip")
            })
            .returning(|_, _| Ok("Good exploration of interests.\nGrade: 4".to_string()));

        let now = Utc::now();
        let entries = [
            LogEntry { sender: Sender::System, text: "You are Sam.", timestamp: now },
            LogEntry { sender: Sender::Learner, text: "I want Up", timestamp: now },
            LogEntry { sender: Sender::Counterpart, text: "The Matrix", timestamp: now },
            LogEntry { sender: Sender::Coach, text: "secret tip", timestamp: now },
        ];
        let graded = grade_transcript(&generator, &Prompts::builtin(), "Movie night", &entries)
            .await
            .unwrap();
        assert_eq!(graded.grade, Some(4));
        assert!(graded.feedback.contains("Good exploration"));
    }
}
