//! FAQ knowledge base loaded from TOML
//!
//! The knowledge base is static configuration: it is parsed and validated
//! once at startup, wrapped in an `Arc`, and never written again. It holds:
//! - FAQ entries (keywords → category → candidate responses), in priority order
//! - Fallback responses for input nothing matches
//! - Jokes and templates for the landing-page onboarding script
//! - Scripted topic handlers used once onboarding has finished
//!
//! # Example
//!
//! ```toml
//! fallback = ["Could you rephrase that?"]
//! jokes = ["Why do programmers prefer dark mode? Because light attracts bugs!"]
//!
//! [templates]
//! widget_greeting = "Hi! How can I help?"
//! name_prompt = "What's your name?"
//! welcome = "Nice to meet you, {name}!"
//! transition = "What would you like to know, {name}?"
//! not_understood = "Sorry {name}, I didn't get that."
//!
//! [[faq]]
//! category = "gratitude"
//! keywords = ["thanks", "thank you"]
//! responses = ["You're welcome!"]
//!
//! [[topics]]
//! name = "thanks"
//! triggers = ["thanks", "thank"]
//! response = "Anytime, {name}!"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ConfigError;

/// Knowledge base shipped with the crate
pub const BUILTIN: &str = include_str!("../../knowledge/default.toml");

/// Placeholder replaced with the captured user name in templates
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Root knowledge base document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Replies used when no FAQ entry matches
    pub fallback: Vec<String>,

    /// Jokes told during landing-page onboarding
    pub jokes: Vec<String>,

    /// Fixed conversational templates
    pub templates: Templates,

    /// FAQ entries, matched in declaration order
    pub faq: Vec<FaqEntry>,

    /// Scripted topic handlers for the landing page, matched in declaration order
    #[serde(default)]
    pub topics: Vec<ScriptTopic>,
}

/// A single FAQ entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    /// Bookkeeping label, never used for matching
    pub category: String,

    /// Lowercase trigger phrases
    pub keywords: Vec<String>,

    /// Candidate replies, one is picked at random per match
    pub responses: Vec<String>,
}

/// Scripted handler keyed by substring triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptTopic {
    pub name: String,
    pub triggers: Vec<String>,
    /// Reply template, may contain `{name}`
    pub response: String,
}

/// Fixed messages used by the conversation controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Templates {
    /// First message of a widget session
    pub widget_greeting: String,

    /// First message of a landing session, asks for the user's name
    pub name_prompt: String,

    /// Sent right after the name is captured
    pub welcome: String,

    /// Sent after the joke, hands over to free-form questions
    pub transition: String,

    /// Landing-page reply when no scripted topic matches
    pub not_understood: String,
}

impl KnowledgeBase {
    /// Parse and validate the built-in knowledge base
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(BUILTIN)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let knowledge: KnowledgeBase = toml::from_str(content)?;
        knowledge.validate()?;
        Ok(knowledge)
    }

    /// Load from `path` when given, otherwise use the built-in document
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                tracing::info!("Loading knowledge base from {}", path.display());
                Self::from_file(path)
            }
            None => Self::builtin(),
        }
    }

    /// Check the invariants the matcher relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.faq.is_empty() {
            return Err(ConfigError::Validation("knowledge base has no FAQ entries".into()));
        }

        for (index, entry) in self.faq.iter().enumerate() {
            if entry.keywords.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "FAQ entry #{} ({}) has no keywords",
                    index, entry.category
                )));
            }
            if entry.responses.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "FAQ entry #{} ({}) has no responses",
                    index, entry.category
                )));
            }
            require_text(
                &format!("FAQ entry #{} ({}) response", index, entry.category),
                &entry.responses,
            )?;
            for keyword in &entry.keywords {
                if keyword.is_empty() || *keyword != keyword.trim().to_lowercase() {
                    return Err(ConfigError::Validation(format!(
                        "FAQ entry #{} ({}) has keyword {:?}; keywords must be non-empty, trimmed and lowercase",
                        index, entry.category, keyword
                    )));
                }
            }
        }

        if self.fallback.is_empty() {
            return Err(ConfigError::Validation("fallback list is empty".into()));
        }
        if self.jokes.is_empty() {
            return Err(ConfigError::Validation("joke list is empty".into()));
        }
        require_text("fallback", &self.fallback)?;
        require_text("jokes", &self.jokes)?;

        let templates = &self.templates;
        for (name, text) in [
            ("widget_greeting", &templates.widget_greeting),
            ("name_prompt", &templates.name_prompt),
            ("welcome", &templates.welcome),
            ("transition", &templates.transition),
            ("not_understood", &templates.not_understood),
        ] {
            if text.trim().is_empty() {
                return Err(ConfigError::Validation(format!("template {} is empty", name)));
            }
        }

        for topic in &self.topics {
            if topic.triggers.iter().all(|t| t.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "scripted topic {} has no triggers",
                    topic.name
                )));
            }
            if topic.response.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "scripted topic {} has an empty response",
                    topic.name
                )));
            }
        }

        Ok(())
    }

    /// Look up an entry by category
    pub fn entry(&self, category: &str) -> Option<&FaqEntry> {
        self.faq.iter().find(|e| e.category == category)
    }
}

/// Every bot reply must have something to show
fn require_text(what: &str, texts: &[String]) -> Result<(), ConfigError> {
    if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(format!("{} #{} is blank", what, index)));
    }
    Ok(())
}

/// Substitute the user's name into a template
pub fn interpolate(template: &str, name: &str) -> String {
    template.replace(NAME_PLACEHOLDER, name)
}
