//! Conversation types and session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Per-session sequence number, increasing with arrival order
    pub id: u64,
    pub sender: Sender,
    /// Display text; embedded newlines must be preserved by the view
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// FAQ category of a bot reply, for analytics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Which chat surface a session belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Sidebar FAQ widget: every submission goes to the intent matcher
    #[default]
    Widget,
    /// Landing-page assistant: captures the user's name first, then runs the script
    Landing,
}

/// Onboarding step of a landing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitingName,
    /// Name captured, welcome and joke beats still pending
    Greeting,
    AwaitingQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Onboarding {
    pub step: Step,
    pub user_name: Option<String>,
}

impl Onboarding {
    pub fn new() -> Self {
        Self {
            step: Step::AwaitingName,
            user_name: None,
        }
    }
}

impl Default for Onboarding {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub variant: Variant,
    pub messages: Vec<Message>,
    pub is_open: bool,
    /// Input buffer, cleared on submit
    pub draft: String,
    /// Present only for landing sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<Onboarding>,
    #[serde(skip)]
    next_id: u64,
}

impl ConversationSession {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            messages: Vec::new(),
            is_open: false,
            draft: String::new(),
            onboarding: match variant {
                Variant::Widget => None,
                Variant::Landing => Some(Onboarding::new()),
            },
            next_id: 1,
        }
    }

    pub fn add_user(&mut self, text: &str) -> &Message {
        self.push(Sender::User, text, None)
    }

    pub fn add_bot(&mut self, text: &str, category: Option<String>) -> &Message {
        self.push(Sender::Bot, text, category)
    }

    fn push(&mut self, sender: Sender, text: &str, category: Option<String>) -> &Message {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
            category,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn step(&self) -> Option<Step> {
        self.onboarding.as_ref().map(|o| o.step)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.onboarding.as_ref().and_then(|o| o.user_name.as_deref())
    }

    pub fn bot_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.sender == Sender::Bot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_in_arrival_order() {
        let mut session = ConversationSession::new(Variant::Widget);
        session.add_user("hello");
        session.add_bot("Hi!", Some("greeting".into()));
        session.add_user("thanks");

        let ids: Vec<u64> = session.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(session.messages[1].sender, Sender::Bot);
        assert_eq!(session.messages[1].category.as_deref(), Some("greeting"));
    }

    #[test]
    fn test_landing_starts_awaiting_name() {
        let session = ConversationSession::new(Variant::Landing);
        assert_eq!(session.step(), Some(Step::AwaitingName));
        assert_eq!(session.user_name(), None);

        let widget = ConversationSession::new(Variant::Widget);
        assert_eq!(widget.step(), None);
    }

    #[test]
    fn test_message_serialization_keeps_newlines() {
        let mut session = ConversationSession::new(Variant::Widget);
        session.add_bot("line one\nline two", None);

        let json = serde_json::to_value(&session.messages[0]).unwrap();
        assert_eq!(json["sender"], "bot");
        assert_eq!(json["text"], "line one\nline two");
        assert!(json.get("category").is_none());
    }
}
