//! Keyword intent matcher
//!
//! Maps free text to a reply from the FAQ knowledge base in two passes:
//! 1. Substring pass: the first entry (in declaration order) with a keyword
//!    equal to, or contained in, the normalized input wins
//! 2. Word-overlap pass: the first entry with a keyword that contains an
//!    input token, or is contained in one, wins
//!
//! If neither pass matches, a random fallback reply is returned. Matching is
//! deterministic; only the pick among a matched entry's responses is random.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{FaqEntry, KnowledgeBase};

/// Which pass selected an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    Substring,
    WordOverlap,
}

/// Deterministic part of a match
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    pub entry: &'a FaqEntry,
    pub pass: MatchPass,
}

/// A reply chosen by the matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    /// `None` when the reply came from the fallback list
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntentMatcher {
    knowledge: Arc<KnowledgeBase>,
}

impl IntentMatcher {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Find the entry that owns `input`, without choosing a response
    pub fn classify(&self, input: &str) -> Option<Classification<'_>> {
        let normalized = normalize(input);

        for entry in &self.knowledge.faq {
            if entry
                .keywords
                .iter()
                .any(|k| normalized == *k || normalized.contains(k.as_str()))
            {
                return Some(Classification {
                    entry,
                    pass: MatchPass::Substring,
                });
            }
        }

        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        for entry in &self.knowledge.faq {
            if entry.keywords.iter().any(|k| {
                tokens
                    .iter()
                    .any(|t| k.contains(t) || t.contains(k.as_str()))
            }) {
                return Some(Classification {
                    entry,
                    pass: MatchPass::WordOverlap,
                });
            }
        }

        None
    }

    /// Produce a reply for `input`. Never fails and never returns an empty string.
    pub fn respond<R: Rng + ?Sized>(&self, input: &str, rng: &mut R) -> Reply {
        match self.classify(input) {
            Some(Classification { entry, pass }) => {
                tracing::debug!(category = %entry.category, ?pass, "FAQ match");
                Reply {
                    text: pick(&entry.responses, rng),
                    category: Some(entry.category.clone()),
                }
            }
            None => {
                tracing::debug!("No FAQ match, using fallback");
                Reply {
                    text: pick(&self.knowledge.fallback, rng),
                    category: None,
                }
            }
        }
    }
}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Uniform pick from a validated, non-empty list
pub(crate) fn pick<R: Rng + ?Sized>(options: &[String], rng: &mut R) -> String {
    options.choose(rng).cloned().unwrap_or_default()
}
