//! Exercise Briefings and Program Length
//!
//! Learner-facing framing around the timeline: a short description and an
//! insight on why an exercise matters, and an estimate of how many days of
//! practice the whole timeline represents. All of it is best effort and
//! falls back to fixed text.

use crate::llm_client::{BestEffort, OrFallback, TextGenerator};
use crate::prompts::Prompts;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const GENERIC_DESCRIPTION: &str = "Practice this negotiation skill to improve your abilities.";

/// Description and insight for one exercise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Briefing {
    pub exercise_title: String,
    pub description: String,
    pub insights: String,
}

/// How long the program is expected to take.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramEstimate {
    pub days: u32,
    pub rationale: String,
}

impl ProgramEstimate {
    /// One exercise per day, without a rationale.
    pub fn fallback(exercise_count: usize) -> Self {
        Self {
            days: u32::try_from(exercise_count.max(1)).unwrap_or(u32::MAX),
            rationale: String::new(),
        }
    }
}

/// The estimate together with where the learner currently is in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramLength {
    pub days: u32,
    pub rationale: String,
    /// 1-based, never beyond `days`.
    pub current_day: u32,
}

fn non_empty(reply: Result<String>) -> Result<String> {
    let text = reply?;
    let text = text.trim();
    ensure!(!text.is_empty(), "generator returned an empty reply");
    Ok(text.to_string())
}

pub async fn describe(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    title: &str,
    difficulty_marker: &str,
) -> BestEffort<String> {
    let user_prompt = format!("Task Title: {title}\nDifficulty Level: {difficulty_marker}");
    non_empty(
        generator
            .generate(prompts.exercise_description.clone(), user_prompt)
            .await,
    )
    .or_fallback(|| GENERIC_DESCRIPTION.to_string())
}

/// Why the exercise matters. Falls back to `summary` (the catalog
/// objective), or to the generic description when that is empty too.
pub async fn insights(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    title: &str,
    description: &str,
    summary: &str,
) -> BestEffort<String> {
    let user_prompt = format!("Task Title: {title}\nTask Description: {description}");
    non_empty(
        generator
            .generate(prompts.exercise_insights.clone(), user_prompt)
            .await,
    )
    .or_fallback(|| {
        let summary = summary.trim();
        if summary.is_empty() {
            GENERIC_DESCRIPTION.to_string()
        } else {
            summary.to_string()
        }
    })
}

pub async fn estimate_program_length(
    generator: &dyn TextGenerator,
    prompts: &Prompts,
    titles: &[&str],
) -> BestEffort<ProgramEstimate> {
    let list = titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    generator
        .generate(prompts.program_length.clone(), format!("Tasks:\n{list}"))
        .await
        .and_then(|raw| parse_estimate(&raw))
        .or_fallback(|| ProgramEstimate::fallback(titles.len()))
}

#[derive(Deserialize)]
struct RawEstimate {
    days: i64,
    #[serde(default)]
    rationale: String,
}

/// Reads the `{"days": n, "rationale": "..."}` object out of a reply,
/// tolerating code fences or prose around it.
pub fn parse_estimate(raw: &str) -> Result<ProgramEstimate> {
    let start = raw.find('{').context("no JSON object in estimate")?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .context("unterminated JSON object in estimate")?;
    let parsed: RawEstimate = serde_json::from_str(&raw[start..=end])?;
    ensure!(parsed.days > 0, "estimate of {} days is not usable", parsed.days);
    Ok(ProgramEstimate {
        days: u32::try_from(parsed.days)?,
        rationale: parsed.rationale.trim().to_string(),
    })
}

/// Maps the completed share of the timeline onto the estimated days.
pub fn current_day(completed: usize, total: usize, days: u32) -> u32 {
    let days = days.max(1);
    let share = completed as f64 / total.max(1) as f64;
    let day = (share * f64::from(days)).floor() as u32 + 1;
    day.clamp(1, days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockTextGenerator;

    fn replying(reply: &'static str) -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(move |_, _| Ok(reply.to_string()));
        generator
    }

    fn failing() -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("rate limited")));
        generator
    }

    #[test]
    fn test_parse_estimate_inside_fences() {
        let raw = "```json\n{\"days\": 14, \"rationale\": \" Two weeks of short sessions. \"}\n```";
        assert_eq!(
            parse_estimate(raw).unwrap(),
            ProgramEstimate {
                days: 14,
                rationale: "Two weeks of short sessions.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_estimate_rejects_unusable_replies() {
        assert!(parse_estimate(r#"{"days": 0, "rationale": "none"}"#).is_err());
        assert!(parse_estimate(r#"{"days": -3}"#).is_err());
        assert!(parse_estimate("About two weeks.").is_err());
        assert!(parse_estimate(r#"{"days": "ten"}"#).is_err());
    }

    #[test]
    fn test_current_day() {
        assert_eq!(current_day(0, 15, 10), 1);
        assert_eq!(current_day(3, 15, 10), 3);
        assert_eq!(current_day(15, 15, 10), 10);
        assert_eq!(current_day(0, 0, 0), 1);
    }

    #[tokio::test]
    async fn test_estimate_falls_back_to_one_day_per_exercise() {
        let prompts = Prompts::builtin();
        let titles = ["A", "B", "C"];

        let outcome = estimate_program_length(&replying("no idea"), &prompts, &titles).await;
        let fallback = outcome.unwrap_err();
        assert_eq!(fallback.value, ProgramEstimate::fallback(3));

        let outcome = estimate_program_length(&failing(), &prompts, &[]).await;
        assert_eq!(outcome.unwrap_err().value.days, 1);
    }

    #[tokio::test]
    async fn test_insights_fall_back_to_summary_then_generic_text() {
        let prompts = Prompts::builtin();
        let outcome = insights(&replying("   "), &prompts, "T", "D", "Define your walk-away.").await;
        assert_eq!(outcome.unwrap_err().value, "Define your walk-away.");

        let outcome = insights(&failing(), &prompts, "T", "D", "").await;
        assert_eq!(outcome.unwrap_err().value, GENERIC_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_describe_trims_the_reply() {
        let prompts = Prompts::builtin();
        let outcome = describe(&replying("  Learn to spot excuses.\n"), &prompts, "T", "●").await;
        assert_eq!(outcome.unwrap(), "Learn to spot excuses.");
    }
}
