//! Core chatbot components
//!
//! The intent matcher and scripted resolver are pure functions over the
//! knowledge base; the controller owns session state and reply timing.

pub mod clock;
mod controller;
mod matcher;
mod script;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ChatController, Timing};
pub use matcher::{Classification, IntentMatcher, MatchPass, Reply};
pub use script::ScriptedResolver;
