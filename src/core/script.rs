//! Landing-page onboarding script
//!
//! After the user's name is captured, every question goes through a fixed,
//! ordered list of topic handlers instead of the FAQ matcher. The first topic
//! with a trigger contained in the input answers; otherwise the user gets a
//! personalized "didn't understand" message.

use rand::Rng;
use std::sync::Arc;

use crate::config::knowledge::interpolate;
use crate::config::KnowledgeBase;

use super::matcher::{normalize, pick, Reply};

#[derive(Debug, Clone)]
pub struct ScriptedResolver {
    knowledge: Arc<KnowledgeBase>,
}

impl ScriptedResolver {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// Answer a question from a user who has already given their name
    pub fn resolve(&self, input: &str, name: &str) -> Reply {
        let normalized = normalize(input);

        let topic = self.knowledge.topics.iter().find(|topic| {
            topic
                .triggers
                .iter()
                .filter(|t| !t.is_empty())
                .any(|t| normalized.contains(t.as_str()))
        });

        match topic {
            Some(topic) => {
                tracing::debug!(topic = %topic.name, "Scripted topic match");
                Reply {
                    text: interpolate(&topic.response, name),
                    category: Some(topic.name.clone()),
                }
            }
            None => Reply {
                text: interpolate(&self.knowledge.templates.not_understood, name),
                category: None,
            },
        }
    }

    pub fn name_prompt(&self) -> String {
        self.knowledge.templates.name_prompt.clone()
    }

    pub fn welcome(&self, name: &str) -> String {
        interpolate(&self.knowledge.templates.welcome, name)
    }

    pub fn joke<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        pick(&self.knowledge.jokes, rng)
    }

    pub fn transition(&self, name: &str) -> String {
        interpolate(&self.knowledge.templates.transition, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ScriptedResolver {
        ScriptedResolver::new(Arc::new(KnowledgeBase::builtin().unwrap()))
    }

    #[test]
    fn test_apply_topic() {
        let reply = resolver().resolve("how do I apply", "Ada");
        assert_eq!(reply.category.as_deref(), Some("apply"));
        assert!(reply.text.contains("Browse available projects"));
        assert!(reply.text.contains("Ada"));
    }

    #[test]
    fn test_topics_in_declaration_order() {
        let r = resolver();
        let cases = [
            ("I need help", "getting_started"),
            ("where do I start?", "getting_started"),
            ("tell me about skill tests", "skill_tests"),
            ("Can you check my CV", "resume"),
            ("is this on the blockchain?", "certificates"),
            ("thank you!", "thanks"),
            ("ok bye", "goodbye"),
            ("who made this", "team"),
            // "project" is declared before "test"
            ("project tests", "apply"),
        ];
        for (input, topic) in cases {
            assert_eq!(
                r.resolve(input, "Ada").category.as_deref(),
                Some(topic),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_unknown_question_addresses_user_by_name() {
        let r = resolver();
        let reply = r.resolve("pizza", "Grace");
        assert_eq!(reply.category, None);
        assert!(reply.text.contains("Grace"));
        assert!(!reply.text.contains("{name}"));
    }

    #[test]
    fn test_onboarding_templates_interpolate() {
        let r = resolver();
        assert!(r.welcome("Ada").contains("Ada"));
        assert!(r.transition("Ada").contains("Ada"));
        assert!(!r.name_prompt().is_empty());
    }
}
