//! ProjectHub assistant - FAQ chatbot for the ProjectHub student project platform
//!
//! A keyword intent matcher answers questions from a static knowledge base,
//! and a conversation controller runs chat sessions for the sidebar widget
//! and the landing-page assistant (which captures the user's name and runs a
//! short onboarding script first). Sessions are served over a small JSON API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

pub mod config;
pub mod conversation;
pub mod core;
pub mod routes;

use crate::config::{Config, KnowledgeBase};
use crate::conversation::Variant;
use crate::core::{ChatController, IntentMatcher};

/// A session's controller plus the bookkeeping for its reply driver
pub struct ChatSession {
    pub controller: ChatController,
    /// A background task is already waiting to deliver pending replies
    pub(crate) delivery_scheduled: bool,
}

impl ChatSession {
    pub fn new(controller: ChatController) -> Self {
        Self {
            controller,
            delivery_scheduled: false,
        }
    }

    /// Claim the right to start a delivery task. Returns false when a task
    /// is already running or nothing is pending.
    pub(crate) fn claim_delivery(&mut self) -> bool {
        if self.delivery_scheduled || !self.controller.is_typing() {
            return false;
        }
        self.delivery_scheduled = true;
        true
    }
}

pub type SharedSession = Arc<Mutex<ChatSession>>;

/// In-memory chat sessions. Nothing outlives the process.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SharedSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, knowledge: Arc<KnowledgeBase>, variant: Variant) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let controller = ChatController::new(knowledge, variant);
        let session = Arc::new(Mutex::new(ChatSession::new(controller)));
        lock(&self.sessions).insert(id, session.clone());
        (id, session)
    }

    pub fn get(&self, id: Uuid) -> Option<SharedSession> {
        lock(&self.sessions).get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> bool {
        lock(&self.sessions).remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub knowledge: Arc<KnowledgeBase>,
    pub matcher: IntentMatcher,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, knowledge: KnowledgeBase) -> Self {
        let knowledge = Arc::new(knowledge);
        Self {
            config,
            matcher: IntentMatcher::new(knowledge.clone()),
            knowledge,
            sessions: SessionStore::new(),
        }
    }
}
