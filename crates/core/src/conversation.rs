//! Conversation Log & History Assembler
//!
//! An exercise's messages form an append-only log ordered by timestamp. One
//! orchestration turn works on a [`ConversationLog`]: the committed messages
//! as loaded from storage plus the messages staged during the turn. Histories
//! handed to the counterpart and the coach are pure projections over a
//! snapshot of that log; projecting never mutates it.

use crate::model::{Message, NewMessage, Sender};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

/// How many of the most recent messages a history window keeps.
pub const HISTORY_WINDOW: usize = 10;

/// A borrowed, sender-tagged line of the log, committed or staged alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry<'a> {
    pub sender: Sender,
    pub text: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// The log of one (session, exercise) pair during a turn.
#[derive(Debug, Default)]
pub struct ConversationLog {
    committed: Vec<Message>,
    pending: Vec<NewMessage>,
}

impl ConversationLog {
    /// Wraps the committed messages, which must already be in timestamp order.
    pub fn new(committed: Vec<Message>) -> Self {
        Self {
            committed,
            pending: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.pending.is_empty()
    }

    /// Stages a message at the end of the log.
    ///
    /// Timestamps are truncated to microseconds (the storage precision) and
    /// bumped when needed so that every staged message sorts strictly after
    /// everything before it.
    pub fn append(
        &mut self,
        sender: Sender,
        text: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let timestamp = match self.last_timestamp() {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.pending.push(NewMessage {
            sender,
            text: text.into(),
            timestamp,
            metadata,
        });
        timestamp
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.pending
            .last()
            .map(|m| m.timestamp)
            .or_else(|| self.committed.last().map(|m| m.timestamp))
    }

    /// A chronological snapshot of the whole log.
    pub fn entries(&self) -> Vec<LogEntry<'_>> {
        let committed = self.committed.iter().map(|m| LogEntry {
            sender: m.sender,
            text: &m.text,
            timestamp: m.timestamp,
        });
        let pending = self.pending.iter().map(|m| LogEntry {
            sender: m.sender,
            text: &m.text,
            timestamp: m.timestamp,
        });
        committed.chain(pending).collect()
    }

    pub fn pending(&self) -> &[NewMessage] {
        &self.pending
    }

    pub fn into_parts(self) -> (Vec<Message>, Vec<NewMessage>) {
        (self.committed, self.pending)
    }
}

/// The consumer a history is assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// The simulated other party. Never sees the opening scenario or coaching.
    Counterpart,
    /// The coach sees everything, including the opening scenario it reads the
    /// counterpart's name from.
    Coach,
}

impl View {
    pub fn admits(self, sender: Sender) -> bool {
        match self {
            View::Counterpart => matches!(sender, Sender::Learner | Sender::Counterpart),
            View::Coach => true,
        }
    }
}

/// Keeps the last `size` entries, plus the opening system message when it has
/// already scrolled out of that range.
pub fn window<'a>(entries: &[LogEntry<'a>], size: usize) -> Vec<LogEntry<'a>> {
    let start = entries.len().saturating_sub(size);
    let mut kept = Vec::with_capacity(size + 1);
    if let Some(opening) = entries[..start].iter().find(|e| e.sender == Sender::System) {
        kept.push(*opening);
    }
    kept.extend_from_slice(&entries[start..]);
    kept
}

/// Windows the log and filters it down to what `view` may see.
pub fn project<'a>(entries: &[LogEntry<'a>], view: View) -> Vec<LogEntry<'a>> {
    window(entries, HISTORY_WINDOW)
        .into_iter()
        .filter(|e| view.admits(e.sender))
        .collect()
}

/// Renders entries as `SENDER: text` lines.
pub fn render(entries: &[LogEntry<'_>]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.sender.as_str().to_uppercase(), e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn committed(sender: Sender, text: &str, offset_secs: i64) -> Message {
        Message {
            id: offset_secs,
            session_id: Uuid::nil(),
            exercise_title: "Light Negotiation Simulation".to_string(),
            sender,
            text: text.to_string(),
            timestamp: DateTime::from_timestamp(1_700_000_000 + offset_secs, 0).unwrap(),
            metadata: None,
        }
    }

    #[test]
    fn test_append_keeps_timestamps_strictly_increasing() {
        let mut log = ConversationLog::new(vec![]);
        let first = log.append(Sender::Learner, "one", None);
        let second = log.append(Sender::Counterpart, "two", None);
        let third = log.append(Sender::Coach, "three", None);
        assert!(first < second && second < third);
    }

    #[test]
    fn test_append_orders_after_committed_messages_from_the_future() {
        let future = Utc::now() + TimeDelta::hours(1);
        let mut message = committed(Sender::Learner, "later", 0);
        message.timestamp = future;
        let mut log = ConversationLog::new(vec![message]);
        let staged = log.append(Sender::Counterpart, "reply", None);
        assert!(staged > future);
    }

    #[test]
    fn test_counterpart_view_hides_opening_and_coaching() {
        let mut log = ConversationLog::new(vec![
            committed(Sender::System, "You are Sam. Your counterpart is Alex.", 0),
            committed(Sender::Learner, "hi", 1),
            committed(Sender::Counterpart, "The Matrix!", 2),
            committed(Sender::Coach, "- ask why", 3),
        ]);
        log.append(Sender::Learner, "what about Up?", None);

        let entries = log.entries();
        let counterpart = project(&entries, View::Counterpart);
        let senders: Vec<_> = counterpart.iter().map(|e| e.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::Learner, Sender::Counterpart, Sender::Learner]
        );

        let coach = project(&entries, View::Coach);
        assert_eq!(coach.len(), 5);
        assert_eq!(coach[0].sender, Sender::System);
        assert_eq!(coach[4].text, "what about Up?");
    }

    #[test]
    fn test_window_keeps_opening_beyond_recent_range() {
        let mut messages = vec![committed(Sender::System, "opening", 0)];
        for i in 1..=14 {
            messages.push(committed(Sender::Learner, &format!("m{i}"), i));
        }
        let log = ConversationLog::new(messages);
        let entries = log.entries();

        let windowed = window(&entries, HISTORY_WINDOW);
        assert_eq!(windowed.len(), HISTORY_WINDOW + 1);
        assert_eq!(windowed[0].text, "opening");
        assert_eq!(windowed[1].text, "m5");
        assert_eq!(windowed[10].text, "m14");
    }

    #[test]
    fn test_window_does_not_duplicate_opening_inside_range() {
        let log = ConversationLog::new(vec![
            committed(Sender::System, "opening", 0),
            committed(Sender::Learner, "hello", 1),
        ]);
        let entries = log.entries();
        assert_eq!(window(&entries, HISTORY_WINDOW).len(), 2);
    }

    #[test]
    fn test_render_uses_uppercase_sender_labels() {
        let log = ConversationLog::new(vec![
            committed(Sender::Learner, "hi", 0),
            committed(Sender::Counterpart, "hello", 1),
        ]);
        assert_eq!(render(&log.entries()), "LEARNER: hi\nCOUNTERPART: hello");
    }
}
