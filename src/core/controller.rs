//! Conversation controller
//!
//! Owns one chat session and sequences user and bot turns. Bot messages are
//! never appended directly: each one is scheduled as a timed "beat" on a FIFO
//! queue and lands when `deliver_due` runs after its due time. A beat is never
//! due before the beat queued ahead of it, so replies arrive in submission
//! order even when the user types faster than the bot "thinks".
//!
//! Landing sessions run a small state machine before handing over to the
//! scripted resolver:
//!
//! ```text
//! AwaitingName --submit(name)--> Greeting --(welcome, joke, transition land)--> AwaitingQuery
//! AwaitingQuery --submit--> AwaitingQuery
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::config::KnowledgeBase;
use crate::conversation::{ConversationSession, Message, Step, Variant};

use super::clock::{Clock, SystemClock};
use super::matcher::{IntentMatcher, Reply};
use super::script::ScriptedResolver;

/// Simulated "thinking" delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,
    /// Delay before the first bot message after opening
    pub greeting_delay: Duration,
    /// Gap between consecutive onboarding beats
    pub beat_gap: Duration,
}

impl Timing {
    pub fn widget() -> Self {
        Self {
            reply_delay_min: Duration::from_millis(800),
            reply_delay_max: Duration::from_millis(1200),
            greeting_delay: Duration::ZERO,
            beat_gap: Duration::ZERO,
        }
    }

    pub fn landing() -> Self {
        Self {
            reply_delay_min: Duration::from_millis(600),
            reply_delay_max: Duration::from_millis(1200),
            greeting_delay: Duration::from_millis(500),
            beat_gap: Duration::from_millis(1500),
        }
    }

    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Widget => Self::widget(),
            Variant::Landing => Self::landing(),
        }
    }
}

/// A bot message waiting for its due time
#[derive(Debug, Clone)]
struct Beat {
    due: Instant,
    text: String,
    category: Option<String>,
    /// Onboarding step entered once this beat lands
    then: Option<Step>,
}

pub struct ChatController {
    session: ConversationSession,
    matcher: IntentMatcher,
    script: ScriptedResolver,
    timing: Timing,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    pending: VecDeque<Beat>,
    greeted: bool,
}

impl ChatController {
    /// Create a controller on the system clock with an OS-seeded RNG
    pub fn new(knowledge: Arc<KnowledgeBase>, variant: Variant) -> Self {
        Self::build(
            knowledge,
            variant,
            Arc::new(SystemClock),
            StdRng::from_os_rng(),
        )
    }

    /// Create a controller with an explicit clock and a deterministic RNG
    pub fn with_clock(
        knowledge: Arc<KnowledgeBase>,
        variant: Variant,
        clock: Arc<dyn Clock>,
        seed: u64,
    ) -> Self {
        Self::build(knowledge, variant, clock, StdRng::seed_from_u64(seed))
    }

    fn build(
        knowledge: Arc<KnowledgeBase>,
        variant: Variant,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        Self {
            session: ConversationSession::new(variant),
            matcher: IntentMatcher::new(knowledge.clone()),
            script: ScriptedResolver::new(knowledge),
            timing: Timing::for_variant(variant),
            clock,
            rng,
            pending: VecDeque::new(),
            greeted: false,
        }
    }

    /// Replace the delays. Inverted reply bounds are swapped.
    pub fn with_timing(mut self, mut timing: Timing) -> Self {
        if timing.reply_delay_min > timing.reply_delay_max {
            tracing::warn!(
                min = ?timing.reply_delay_min,
                max = ?timing.reply_delay_max,
                "Reply delay bounds inverted, swapping"
            );
            std::mem::swap(&mut timing.reply_delay_min, &mut timing.reply_delay_max);
        }
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn variant(&self) -> Variant {
        self.session.variant
    }

    /// True while any bot message is still pending
    pub fn is_typing(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_beats(&self) -> usize {
        self.pending.len()
    }

    /// When the next pending beat becomes due
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.front().map(|b| b.due)
    }

    pub fn open(&mut self) {
        if self.session.is_open {
            return;
        }
        self.session.is_open = true;

        if self.greeted || !self.session.messages.is_empty() {
            return;
        }
        self.greeted = true;

        match self.session.variant {
            Variant::Widget => {
                let greeting = self.matcher.knowledge().templates.widget_greeting.clone();
                self.session.add_bot(&greeting, None);
            }
            Variant::Landing => {
                let prompt = self.script.name_prompt();
                self.schedule(self.timing.greeting_delay, prompt, None, None);
            }
        }
    }

    /// Hide the chat surface. Pending replies still land.
    pub fn close(&mut self) {
        self.session.is_open = false;
    }

    pub fn toggle(&mut self) {
        if self.session.is_open {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn draft(&self) -> &str {
        &self.session.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.session.draft = text.into();
    }

    /// Submit whatever is in the input buffer
    pub fn submit_draft(&mut self) -> Option<u64> {
        let text = std::mem::take(&mut self.session.draft);
        self.submit(&text)
    }

    /// Fill the input buffer with a canned phrase and submit it
    pub fn quick_action(&mut self, query: &str) -> Option<u64> {
        self.set_draft(query);
        self.submit_draft()
    }

    /// Append a user message and schedule the bot's answer.
    ///
    /// Returns the id of the user message, or `None` for blank input.
    pub fn submit(&mut self, raw: &str) -> Option<u64> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let id = self.session.add_user(raw).id;
        self.session.draft.clear();

        let step = self.session.step();
        match step {
            None => {
                let reply = self.matcher.respond(text, &mut self.rng);
                self.schedule_reply(reply);
            }
            Some(Step::AwaitingName) => self.capture_name(text),
            Some(Step::Greeting) | Some(Step::AwaitingQuery) => {
                let name = self.session.user_name().unwrap_or_default().to_string();
                let reply = self.script.resolve(text, &name);
                self.schedule_reply(reply);
            }
        }

        Some(id)
    }

    /// Append every beat whose due time has passed, in queue order
    pub fn deliver_due(&mut self) -> Vec<Message> {
        let now = self.clock.now();
        let mut delivered = Vec::new();

        while self.pending.front().is_some_and(|b| b.due <= now) {
            let Some(beat) = self.pending.pop_front() else {
                break;
            };
            let message = self.session.add_bot(&beat.text, beat.category).clone();
            if let (Some(step), Some(onboarding)) = (beat.then, self.session.onboarding.as_mut()) {
                onboarding.step = step;
                tracing::debug!(?step, "Onboarding step changed");
            }
            delivered.push(message);
        }

        if !delivered.is_empty() {
            tracing::debug!(count = delivered.len(), "Delivered bot messages");
        }
        delivered
    }

    fn capture_name(&mut self, name: &str) {
        if let Some(onboarding) = self.session.onboarding.as_mut() {
            onboarding.user_name = Some(name.to_string());
            onboarding.step = Step::Greeting;
        }
        tracing::debug!("Captured user name");

        let welcome = self.script.welcome(name);
        let joke = self.script.joke(&mut self.rng);
        let transition = self.script.transition(name);

        let delay = self.reply_delay();
        let gap = self.timing.beat_gap;
        self.schedule(delay, welcome, None, None);
        self.schedule(gap, joke, None, None);
        self.schedule(gap, transition, None, Some(Step::AwaitingQuery));
    }

    fn schedule_reply(&mut self, reply: Reply) {
        let delay = self.reply_delay();
        self.schedule(delay, reply.text, reply.category, None);
    }

    /// Queue a beat `delay` after the later of now and the last pending beat
    fn schedule(
        &mut self,
        delay: Duration,
        text: String,
        category: Option<String>,
        then: Option<Step>,
    ) {
        let now = self.clock.now();
        let base = self.pending.back().map_or(now, |b| b.due.max(now));
        self.pending.push_back(Beat {
            due: base + delay,
            text,
            category,
            then,
        });
    }

    fn reply_delay(&mut self) -> Duration {
        let Timing {
            reply_delay_min: min,
            reply_delay_max: max,
            ..
        } = self.timing;
        debug_assert!(min <= max, "reply delay bounds inverted");
        if max == min {
            return min;
        }
        self.rng.random_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Sender;
    use crate::core::clock::ManualClock;

    fn knowledge() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::builtin().unwrap())
    }

    fn controller(variant: Variant) -> (ChatController, ManualClock) {
        let clock = ManualClock::new();
        let controller =
            ChatController::with_clock(knowledge(), variant, Arc::new(clock.clone()), 42);
        (controller, clock)
    }

    fn last_bot(c: &ChatController) -> &Message {
        c.session().bot_messages().last().unwrap()
    }

    #[test]
    fn test_widget_open_seeds_one_greeting() {
        let (mut c, _) = controller(Variant::Widget);
        c.open();
        assert!(c.session().is_open);
        assert_eq!(c.session().messages.len(), 1);
        assert_eq!(
            c.session().messages[0].text,
            knowledge().templates.widget_greeting
        );

        c.close();
        c.open();
        assert_eq!(c.session().messages.len(), 1);
    }

    #[test]
    fn test_toggle_flips_visibility() {
        let (mut c, _) = controller(Variant::Widget);
        c.toggle();
        assert!(c.session().is_open);
        c.toggle();
        assert!(!c.session().is_open);
        assert_eq!(c.session().messages.len(), 1);
    }

    #[test]
    fn test_blank_submit_is_noop() {
        let (mut c, _) = controller(Variant::Widget);
        assert_eq!(c.submit(""), None);
        assert_eq!(c.submit("   \n\t"), None);
        assert!(c.session().messages.is_empty());
        assert!(!c.is_typing());
    }

    #[test]
    fn test_submit_schedules_one_reply() {
        let (mut c, clock) = controller(Variant::Widget);
        c.set_draft("hello");
        let id = c.submit_draft().unwrap();

        assert_eq!(c.session().messages.len(), 1);
        assert_eq!(c.session().messages[0].id, id);
        assert_eq!(c.session().messages[0].sender, Sender::User);
        assert_eq!(c.draft(), "");
        assert!(c.is_typing());

        // Nothing lands before the minimum delay
        clock.advance(Duration::from_millis(799));
        assert!(c.deliver_due().is_empty());
        assert!(c.is_typing());

        clock.advance(Duration::from_millis(401));
        let delivered = c.deliver_due();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].sender, Sender::Bot);
        assert_eq!(delivered[0].category.as_deref(), Some("greeting"));
        assert_eq!(c.session().messages.len(), 2);
        assert!(!c.is_typing());
    }

    #[test]
    fn test_user_text_displayed_as_typed() {
        let (mut c, _) = controller(Variant::Widget);
        c.submit("  thanks a lot ");
        assert_eq!(c.session().messages[0].text, "  thanks a lot ");
    }

    #[test]
    fn test_widget_thanks_is_gratitude() {
        let (mut c, clock) = controller(Variant::Widget);
        c.submit("thanks a lot");
        clock.advance(Duration::from_secs(2));
        c.deliver_due();

        let reply = last_bot(&c);
        assert_eq!(reply.category.as_deref(), Some("gratitude"));
        assert!(knowledge()
            .entry("gratitude")
            .unwrap()
            .responses
            .contains(&reply.text));
    }

    #[test]
    fn test_widget_gibberish_gets_fallback() {
        let (mut c, clock) = controller(Variant::Widget);
        c.submit("asdkjhasd");
        clock.advance(Duration::from_secs(2));
        c.deliver_due();

        let reply = last_bot(&c);
        assert_eq!(reply.category, None);
        assert!(knowledge().fallback.contains(&reply.text));
    }

    #[test]
    fn test_widget_first_turn_goes_to_matcher() {
        let (mut c, clock) = controller(Variant::Widget);
        c.open();
        c.submit("Ada");
        clock.advance(Duration::from_secs(2));
        c.deliver_due();
        assert_eq!(c.session().step(), None);
        assert_eq!(c.session().user_name(), None);
    }

    #[test]
    fn test_rapid_submissions_answer_in_order() {
        let (mut c, clock) = controller(Variant::Widget);
        c.submit("hello");
        c.submit("thanks");
        c.submit("bye");
        assert_eq!(c.pending_beats(), 3);

        let mut categories = Vec::new();
        for _ in 0..40 {
            clock.advance(Duration::from_millis(100));
            for m in c.deliver_due() {
                categories.push(m.category.unwrap());
            }
        }
        assert_eq!(categories, vec!["greeting", "gratitude", "goodbye"]);
        assert!(!c.is_typing());

        let ids: Vec<u64> = c.session().messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_close_does_not_cancel_pending_reply() {
        let (mut c, clock) = controller(Variant::Widget);
        c.open();
        c.submit("resume");
        c.close();
        clock.advance(Duration::from_secs(2));
        assert_eq!(c.deliver_due().len(), 1);
        assert!(!c.session().is_open);
        assert_eq!(last_bot(&c).category.as_deref(), Some("resume"));
    }

    #[test]
    fn test_quick_action_matches_submit() {
        let (mut c, clock) = controller(Variant::Widget);
        c.set_draft("half typed");
        c.quick_action("build resume");
        assert_eq!(c.session().messages[0].text, "build resume");
        assert_eq!(c.draft(), "");

        clock.advance(Duration::from_secs(2));
        c.deliver_due();
        assert_eq!(last_bot(&c).category.as_deref(), Some("resume"));
    }

    #[test]
    fn test_landing_open_asks_for_name_after_delay() {
        let (mut c, clock) = controller(Variant::Landing);
        c.open();
        assert!(c.session().messages.is_empty());
        assert!(c.is_typing());

        // Reopening while the prompt is pending must not queue a second one
        c.close();
        c.open();
        assert_eq!(c.pending_beats(), 1);

        clock.advance(Duration::from_millis(500));
        let delivered = c.deliver_due();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].text, knowledge().templates.name_prompt);
        assert!(!c.is_typing());
    }

    #[test]
    fn test_landing_name_capture_flow() {
        let kb = knowledge();
        let (mut c, clock) = controller(Variant::Landing);
        c.open();
        clock.advance(Duration::from_millis(500));
        c.deliver_due();

        c.submit("Ada");
        assert_eq!(c.session().user_name(), Some("Ada"));
        assert_eq!(c.session().step(), Some(Step::Greeting));
        assert_eq!(c.pending_beats(), 3);

        clock.advance(Duration::from_millis(1200));
        let first = c.deliver_due();
        assert_eq!(first.len(), 1);
        assert!(first[0].text.contains("Ada"));
        assert_eq!(c.session().step(), Some(Step::Greeting));

        clock.advance(Duration::from_secs(5));
        let rest = c.deliver_due();
        assert_eq!(rest.len(), 2);
        assert!(kb.jokes.contains(&rest[0].text));
        assert_eq!(rest[1].text, kb.templates.transition.replace("{name}", "Ada"));
        assert_eq!(c.session().step(), Some(Step::AwaitingQuery));

        // name prompt + welcome + joke + transition
        assert_eq!(c.session().bot_messages().count(), 4);
        assert!(c
            .session()
            .bot_messages()
            .all(|m| !kb.fallback.contains(&m.text)));
    }

    #[test]
    fn test_landing_name_kept_verbatim() {
        let (mut c, _) = controller(Variant::Landing);
        c.submit("  Ada Lovelace ");
        assert_eq!(c.session().user_name(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_landing_query_uses_script() {
        let (mut c, clock) = controller(Variant::Landing);
        c.submit("Ada");
        clock.advance(Duration::from_secs(10));
        c.deliver_due();
        assert_eq!(c.session().step(), Some(Step::AwaitingQuery));

        c.submit("how do I apply");
        clock.advance(Duration::from_secs(2));
        c.deliver_due();

        let reply = last_bot(&c);
        assert_eq!(reply.category.as_deref(), Some("apply"));
        assert!(reply.text.contains("Browse available projects"));

        c.submit("pizza");
        clock.advance(Duration::from_secs(2));
        c.deliver_due();
        let reply = last_bot(&c);
        assert!(reply.text.contains("Ada"));
        assert!(!knowledge().fallback.contains(&reply.text));
    }

    #[test]
    fn test_landing_question_during_greeting_waits_for_script() {
        let kb = knowledge();
        let (mut c, clock) = controller(Variant::Landing);
        c.submit("Ada");
        c.submit("resume");
        assert_eq!(c.pending_beats(), 4);

        clock.advance(Duration::from_secs(10));
        let delivered = c.deliver_due();
        assert_eq!(delivered.len(), 4);
        assert_eq!(delivered[2].text, kb.templates.transition.replace("{name}", "Ada"));
        assert_eq!(delivered[3].category.as_deref(), Some("resume"));
        assert_eq!(c.session().step(), Some(Step::AwaitingQuery));
    }

    #[test]
    fn test_inverted_reply_bounds_are_swapped() {
        let clock = ManualClock::new();
        let timing = Timing {
            reply_delay_min: Duration::from_millis(900),
            reply_delay_max: Duration::from_millis(300),
            greeting_delay: Duration::ZERO,
            beat_gap: Duration::ZERO,
        };
        let mut c = ChatController::with_clock(
            knowledge(),
            Variant::Widget,
            Arc::new(clock.clone()),
            3,
        )
        .with_timing(timing);

        assert_eq!(c.timing().reply_delay_min, Duration::from_millis(300));
        assert_eq!(c.timing().reply_delay_max, Duration::from_millis(900));

        let start = clock.now();
        for _ in 0..10 {
            c.submit("hello");
        }
        let first = c.next_due().unwrap() - start;
        assert!(first >= Duration::from_millis(300) && first <= Duration::from_millis(900));

        // Ten chained replies, each 300..=900ms after the previous
        clock.advance(Duration::from_millis(2999));
        assert!(c.deliver_due().len() < 10);
        clock.advance(Duration::from_millis(9000 - 2999));
        c.deliver_due();
        assert_eq!(c.pending_beats(), 0);
    }

    #[test]
    fn test_fixed_timing() {
        let clock = ManualClock::new();
        let timing = Timing {
            reply_delay_min: Duration::from_millis(100),
            reply_delay_max: Duration::from_millis(100),
            greeting_delay: Duration::ZERO,
            beat_gap: Duration::ZERO,
        };
        let mut c = ChatController::with_clock(
            knowledge(),
            Variant::Widget,
            Arc::new(clock.clone()),
            1,
        )
        .with_timing(timing);

        c.submit("hello");
        assert_eq!(c.next_due(), Some(clock.now() + Duration::from_millis(100)));
        clock.advance(Duration::from_millis(100));
        assert_eq!(c.deliver_due().len(), 1);
        assert_eq!(c.next_due(), None);
    }
}
