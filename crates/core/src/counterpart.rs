//! Counterpart
//!
//! The simulated other party in a negotiation. Its persona follows the
//! exercise objective. Once the learner agrees, it stops negotiating and
//! answers with a short closing line that needs no generation at all.

use crate::conversation::{LogEntry, render};
use crate::model::Sender;
use crate::prompts::Prompts;
use rand::seq::IndexedRandom;

/// Said when the counterpart cannot be generated, so the learner still gets
/// an answer and can keep going.
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, give me a moment to think that over. Could you say that again in another way?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// A friend set on their own pick for movie night.
    MovieNight,
    /// A manager with budget constraints.
    SalaryReview,
    General,
}

impl Persona {
    pub fn for_objective(objective: &str) -> Self {
        let objective = objective.to_lowercase();
        if objective.contains("movie") {
            Persona::MovieNight
        } else if objective.contains("salary") {
            Persona::SalaryReview
        } else {
            Persona::General
        }
    }

    pub fn system_prompt(self, prompts: &Prompts) -> &str {
        match self {
            Persona::MovieNight => &prompts.counterpart_movie,
            Persona::SalaryReview => &prompts.counterpart_salary,
            Persona::General => &prompts.counterpart_general,
        }
    }

    pub fn closing_lines(self) -> &'static [&'static str] {
        match self {
            Persona::MovieNight => &[
                "Great, I'm excited to watch it!",
                "Perfect, let's get it started!",
                "Awesome, sounds good to me!",
                "Nice, let's do it!",
                "Cool, I'm pumped for this!",
            ],
            Persona::SalaryReview => &[
                "Excellent, I'll get the paperwork started.",
                "Perfect, let's finalize the details.",
                "Great, I'm glad we found middle ground.",
                "Wonderful, let's make it official.",
            ],
            Persona::General => &[
                "Great, that sounds good!",
                "Perfect, let's move forward.",
                "Awesome, I'm happy with that.",
            ],
        }
    }

    /// Picks one closing line at random.
    pub fn closing_line(self) -> &'static str {
        let lines = self.closing_lines();
        lines.choose(&mut rand::rng()).copied().unwrap_or(lines[0])
    }
}

/// The counterpart's own first line in the conversation, used to keep it
/// consistent with the position it opened with.
pub fn initial_position<'a>(history: &[LogEntry<'a>]) -> Option<&'a str> {
    history
        .iter()
        .find(|e| e.sender == Sender::Counterpart)
        .map(|e| e.text)
}

/// Builds the user prompt for a counterpart reply from the counterpart view
/// of the conversation.
pub fn user_prompt(learner_text: &str, objective: &str, history: &[LogEntry<'_>]) -> String {
    let mut prompt = format!("The learner said:\n\"{learner_text}\"\n");
    if !history.is_empty() {
        prompt.push_str(&format!(
            "\n[CONVERSATION SO FAR]\n{}\n",
            render(history)
        ));
    }
    if let Some(position) = initial_position(history) {
        prompt.push_str(&format!(
            "\n[YOUR INITIAL POSITION]\nYou opened with: {position}\nStay true to this position and defend it.\n"
        ));
    }
    if !objective.is_empty() {
        prompt.push_str(&format!("\n[EXERCISE OBJECTIVE]\n{objective}\n"));
    }
    prompt.push_str(
        "\nReply naturally as the other party, with personality and conviction. Keep negotiating.",
    );
    prompt
}
