//! Agreement Detector
//!
//! A fixed pattern classifier deciding whether a learner's message concludes
//! a simulated negotiation. Each message is judged on its own; there is no
//! memory of earlier turns.

use regex::Regex;
use std::sync::LazyLock;

/// What kind of agreement language a rule recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalCategory {
    /// "ok", "sure", "sounds good"
    Casual,
    /// "I agree", "I accept"
    Formal,
    /// "let's go with that", "you've convinced me"
    Commitment,
    /// "that's final", "decision made"
    Finality,
}

const RULES: &[(SignalCategory, &str)] = &[
    (SignalCategory::Casual, r"\byeah\b.*\bfine\b"),
    (SignalCategory::Casual, r"\bthat['’]?s\s+fine\b"),
    (SignalCategory::Casual, r"\bok(ay)?\b"),
    (SignalCategory::Casual, r"\bsure\b"),
    (SignalCategory::Casual, r"\balright\b"),
    (SignalCategory::Casual, r"\byep\b"),
    (SignalCategory::Casual, r"\bcool\b"),
    (SignalCategory::Casual, r"\bthat\s+works\b"),
    (SignalCategory::Casual, r"\bworks\s+for\s+me\b"),
    (SignalCategory::Casual, r"\bsounds\s+good\b"),
    (SignalCategory::Casual, r"\bi['’]?m\s+good\s+with\s+(that|it)\b"),
    (SignalCategory::Formal, r"\bi\s+agree\b"),
    (SignalCategory::Formal, r"\bi\s+accept\b"),
    (SignalCategory::Formal, r"\blet['’]?s\s+do\s+that\b"),
    (SignalCategory::Formal, r"\blet['’]?s\s+go\s+with\s+that\b"),
    (SignalCategory::Formal, r"\bi['’]?m\s+okay\s+with\s+that\b"),
    (SignalCategory::Commitment, r"\byou['’]?ve\s+convinced\s+me\b"),
    (SignalCategory::Commitment, r"\blet['’]?s\s+stick\s+with\b"),
    (
        SignalCategory::Commitment,
        r"\bperfect.*let['’]?s\s+(get\s+it\s+started|put\s+it\s+on|watch)\b",
    ),
    (SignalCategory::Commitment, r"\bi['’]?ll\s+go\s+with.*choice\b"),
    (SignalCategory::Commitment, r"\bi['’]?m\s+starting\b"),
    (SignalCategory::Commitment, r"\blet\s+me\s+start\b"),
    (SignalCategory::Commitment, r"\blet['’]?s\s+watch\b"),
    (SignalCategory::Commitment, r"\byou['’]?re\s+right\b"),
    (SignalCategory::Commitment, r"\blet['’]?s\s+put\s+it\s+on\b"),
    (SignalCategory::Commitment, r"\blet['’]?s\s+get\s+it\s+started\b"),
    (SignalCategory::Finality, r"\bthat['’]?s\s+final\b"),
    (SignalCategory::Finality, r"\bdecision\s+made\b"),
    (SignalCategory::Finality, r"\bno\s+more\s+debating\b"),
    (SignalCategory::Finality, r"\bthis\s+is\s+settled\b"),
    (SignalCategory::Finality, r"\blet['’]?s\s+finalize\b"),
    (SignalCategory::Finality, r"\blet['’]?s\s+make\s+it\s+official\b"),
];

/// One compiled agreement pattern.
#[derive(Debug)]
pub struct AgreementRule {
    pub category: SignalCategory,
    pattern: Regex,
}

impl AgreementRule {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

static DETECTOR: LazyLock<Vec<AgreementRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|(category, pattern)| AgreementRule {
            category: *category,
            pattern: Regex::new(pattern).expect("agreement patterns are valid regexes"),
        })
        .collect()
});

/// Returns the first rule matching the lower-cased, trimmed message.
pub fn detect(learner_text: &str) -> Option<&'static AgreementRule> {
    let normalized = learner_text.trim().to_lowercase();
    DETECTOR.iter().find(|rule| rule.pattern.is_match(&normalized))
}

pub fn is_agreement(learner_text: &str) -> bool {
    detect(learner_text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_cases() {
        assert!(is_agreement("Yeah, that's fine"));
        assert!(!is_agreement("I'm still not convinced"));
        assert!(is_agreement("Let's finalize this"));
    }

    #[test]
    fn test_every_category_is_recognised() {
        assert_eq!(detect("Sounds good!").unwrap().category, SignalCategory::Casual);
        assert_eq!(
            detect("I accept your offer").unwrap().category,
            SignalCategory::Formal
        );
        assert_eq!(
            detect("Fine, you've convinced me").unwrap().category,
            SignalCategory::Commitment
        );
        assert_eq!(
            detect("Decision made.").unwrap().category,
            SignalCategory::Finality
        );
    }

    #[test]
    fn test_typographic_apostrophes_match() {
        assert!(is_agreement("That’s final"));
        assert!(is_agreement("  LET’S WATCH it then  "));
    }

    #[test]
    fn test_negotiating_language_is_not_agreement() {
        for text in [
            "I really want to watch the other movie",
            "Can we look at the budget again?",
            "I need at least ten percent more",
            "",
        ] {
            assert!(!is_agreement(text), "{text:?} should not end the negotiation");
        }
    }

    #[test]
    fn test_every_rule_compiles() {
        assert_eq!(DETECTOR.len(), RULES.len());
        assert!(DETECTOR.iter().all(|rule| !rule.pattern().is_empty()));
    }
}
