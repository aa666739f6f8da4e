//! Coach
//!
//! Private advice for the learner after every counterpart reply. The coach
//! sees the whole conversation, including the opening scenario it reads the
//! counterpart's name from.

use regex::Regex;
use std::sync::LazyLock;

/// How many tips a coach message keeps.
pub const MAX_TIPS: usize = 3;

/// Used in prompts when no name can be found.
pub const UNNAMED_COUNTERPART: &str = "the other party";

static COUNTERPART_INTRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Yy]our counterpart is\s+(\w+)").expect("counterpart pattern is a valid regex")
});

static NAMED_SPEAKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Z][a-z]+):\s").expect("speaker pattern is a valid regex")
});

const ROLE_LABELS: &[&str] = &["Learner", "Counterpart", "Coach", "System", "Manager", "User"];

/// Finds the counterpart's name in a rendered conversation: first from the
/// scenario's "Your counterpart is ..." line, then from a `Name: ...`
/// dialogue line that is not a role label.
pub fn counterpart_name(conversation: &str) -> Option<String> {
    if let Some(caps) = COUNTERPART_INTRO.captures(conversation) {
        return Some(caps[1].to_string());
    }
    NAMED_SPEAKER
        .captures_iter(conversation)
        .map(|caps| caps[1].to_string())
        .find(|name| !ROLE_LABELS.contains(&name.as_str()))
}

/// Builds the coach's user prompt from the rendered coach view of the
/// conversation.
pub fn user_prompt(
    title: &str,
    objective: &str,
    learner_text: &str,
    counterpart_reply: &str,
    conversation: &str,
) -> String {
    let name = counterpart_name(conversation).unwrap_or_else(|| UNNAMED_COUNTERPART.to_string());
    format!(
        "[EXERCISE]: {title}\n[OBJECTIVE]: {objective}\n\n\
         [CONVERSATION SO FAR]\n{conversation}\n\n\
         The other party ({name}) replied:\n\"{counterpart_reply}\"\n\n\
         The learner is responding to:\n\"{learner_text}\"\n\n\
         Give exactly {MAX_TIPS} tips of 20 to 25 words each for the learner's next move. \
         Refer to {name} by name and to the actual topic being negotiated."
    )
}

/// Reads bullet lines (`-`, `•`, or `*` followed by a space) as tips and
/// keeps the first three. Fewer bullets give fewer tips; nothing is made up.
pub fn parse_tips(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter_map(bullet_text)
        .filter(|tip| !tip.is_empty())
        .take(MAX_TIPS)
        .map(str::to_string)
        .collect()
}

/// The text after a bullet marker. `**bold**` lines are not bullets.
fn bullet_text(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('*') {
        return rest
            .starts_with(char::is_whitespace)
            .then(|| rest.trim());
    }
    line.starts_with(['-', '•'])
        .then(|| line.trim_start_matches(['-', '•', ' ']).trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{LogEntry, render};
    use crate::model::Sender;
    use chrono::Utc;

    #[test]
    fn test_name_from_scenario_line() {
        let text = "SYSTEM: You are Sam, a friend. Your counterpart is Alex, your roommate.";
        assert_eq!(counterpart_name(text).as_deref(), Some("Alex"));
    }

    #[test]
    fn test_name_from_dialogue_line_skips_role_labels() {
        let text = "Manager: Let's talk.\nSarah: Budgets are tight.";
        assert_eq!(counterpart_name(text).as_deref(), Some("Sarah"));
        assert_eq!(counterpart_name("LEARNER: hi\nCOUNTERPART: hello"), None);
    }

    #[test]
    fn test_parse_tips_keeps_first_three_bullets() {
        let raw = "Here are your tips:\n- Ask Alex why.\n• Offer a trade.\n* Stay calm.\n- Extra tip.";
        assert_eq!(
            parse_tips(raw),
            vec!["Ask Alex why.", "Offer a trade.", "Stay calm."]
        );
    }

    #[test]
    fn test_parse_tips_skips_bold_headings() {
        let raw = "**Here are your tips:**\n- Ask Alex why.\n- Offer a trade.\n- Stay calm.";
        assert_eq!(
            parse_tips(raw),
            vec!["Ask Alex why.", "Offer a trade.", "Stay calm."]
        );
        assert_eq!(
            parse_tips("* Star bullet.\n• Dot bullet.\n*Not a bullet*"),
            vec!["Star bullet.", "Dot bullet."]
        );
    }

    #[test]
    fn test_parse_tips_never_pads() {
        assert_eq!(parse_tips("- Only one tip.\nSome prose."), vec!["Only one tip."]);
        assert!(parse_tips("No bullets at all.").is_empty());
    }

    #[test]
    fn test_user_prompt_names_counterpart() {
        let now = Utc::now();
        let history = [
            LogEntry {
                sender: Sender::System,
                text: "You are Morgan. Your counterpart is Sarah, your manager.",
                timestamp: now,
            },
            LogEntry { sender: Sender::Learner, text: "I'd like a raise.", timestamp: now },
        ];
        let prompt = user_prompt(
            "High-Stakes Salary Negotiation",
            "Negotiate salary",
            "I'd like a raise.",
            "Budgets are tight.",
            &render(&history),
        );
        assert!(prompt.contains("The other party (Sarah) replied"));
        assert!(prompt.contains("SYSTEM: You are Morgan."));
    }

    #[test]
    fn test_user_prompt_without_name() {
        let prompt = user_prompt("T", "O", "hi", "hello", "");
        assert!(prompt.contains("(the other party)"));
    }
}
