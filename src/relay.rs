//! The reconciliation loop.
//!
//! Each tick fetches the moderation queue, announces items the store has
//! never seen, and retracts announcements whose item left the queue.
//! A failed tick is handed to the alert throttle and retried from scratch
//! on the next one; the store makes that safe.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::alert::{self, ErrorState};
use crate::embed::{self, Embed};
use crate::error::Result;
use crate::model::PendingItem;
use crate::store::ReportStore;

/// Where pending items come from.
pub trait QueueSource {
    fn fetch_pending(&mut self) -> Result<Vec<PendingItem>>;
}

/// Where announcements and alerts go.
pub trait ChatSink {
    /// Publishes an announcement and returns its message id.
    fn publish(&self, embed: &Embed) -> Result<String>;

    /// Deletes a previously published announcement.
    fn delete(&self, message_id: &str) -> Result<()>;

    /// Sends a plain-text message (alerts, startup notice).
    fn send_text(&self, text: &str) -> Result<()>;
}

/// Sleep intervals between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub failure_backoff: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            failure_backoff: Duration::from_secs(120),
        }
    }
}

/// Announces new items and retracts resolved ones.
///
/// Returns the ids of every item currently pending.
pub fn reconcile(
    pending: &[PendingItem],
    store: &ReportStore,
    chat: &dyn ChatSink,
) -> Result<HashSet<String>> {
    let mut current = HashSet::with_capacity(pending.len());

    for item in pending {
        current.insert(item.id().to_string());
        if store.is_announced(item.id())? {
            continue;
        }
        let message_id = chat.publish(&embed::format_item(item))?;
        store.add(item.id(), &message_id)?;
        info!(item = item.id(), message = %message_id, "announced report");
    }

    for record in store.unresolved_records()? {
        if current.contains(&record.item_id) {
            continue;
        }
        chat.delete(&record.announcement_id)?;
        store.mark_resolved(&record.item_id)?;
        info!(item = %record.item_id, message = %record.announcement_id, "resolved report");
    }

    Ok(current)
}

/// Owns the collaborators and error window for the poll loop.
pub struct Relay<'a, Q> {
    source: Q,
    chat: &'a dyn ChatSink,
    store: &'a ReportStore,
    errors: ErrorState,
    schedule: Schedule,
}

impl<'a, Q: QueueSource> Relay<'a, Q> {
    pub fn new(
        source: Q,
        chat: &'a dyn ChatSink,
        store: &'a ReportStore,
        schedule: Schedule,
    ) -> Self {
        Self {
            source,
            chat,
            store,
            errors: ErrorState::default(),
            schedule,
        }
    }

    /// Runs one fetch-and-reconcile cycle.
    ///
    /// Success closes the error window; failure is classified (and possibly
    /// alerted on) before being returned.
    pub fn tick(&mut self) -> Result<HashSet<String>> {
        match self.try_tick() {
            Ok(current) => {
                self.errors.clear();
                Ok(current)
            }
            Err(e) => {
                alert::handle_failure(&e, &mut self.errors, self.chat);
                Err(e)
            }
        }
    }

    fn try_tick(&mut self) -> Result<HashSet<String>> {
        let pending = self.source.fetch_pending()?;
        let current = reconcile(&pending, self.store, self.chat)?;
        debug!(pending = current.len(), "tick complete");
        Ok(current)
    }

    /// Ticks forever, sleeping between ticks.
    ///
    /// Only process termination stops the loop.
    pub fn run(&mut self) -> ! {
        loop {
            let ok = self.tick().is_ok();
            thread::sleep(self.delay_after(ok));
        }
    }

    /// How long to wait after a tick that succeeded (`ok`) or failed.
    fn delay_after(&self, ok: bool) -> Duration {
        if ok {
            self.schedule.interval
        } else {
            self.schedule.failure_backoff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use tempfile::TempDir;

    use crate::error::RelayError;
    use crate::model::{Comment, Post};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Publish(String),
        Delete(String),
        Text(String),
    }

    /// Records calls and hands out sequential message ids.
    #[derive(Default)]
    struct FakeChat {
        calls: RefCell<Vec<Call>>,
        next_id: RefCell<u64>,
        fail_publish_title: Option<String>,
        fail_delete: bool,
    }

    impl FakeChat {
        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn take(&self) -> Vec<Call> {
            self.calls.borrow_mut().drain(..).collect()
        }
    }

    impl ChatSink for FakeChat {
        fn publish(&self, embed: &Embed) -> Result<String> {
            if self.fail_publish_title.as_deref() == Some(embed.title.as_str()) {
                return Err(RelayError::DiscordStatus { status: 503 });
            }
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            let id = format!("m{next}");
            self.calls.borrow_mut().push(Call::Publish(embed.title.clone()));
            Ok(id)
        }

        fn delete(&self, message_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(RelayError::DiscordRequest("connection reset".into()));
            }
            self.calls
                .borrow_mut()
                .push(Call::Delete(message_id.to_string()));
            Ok(())
        }

        fn send_text(&self, text: &str) -> Result<()> {
            self.calls.borrow_mut().push(Call::Text(text.to_string()));
            Ok(())
        }
    }

    /// Replays a scripted sequence of fetch results.
    struct ScriptedQueue(VecDeque<Result<Vec<PendingItem>>>);

    impl ScriptedQueue {
        fn new(ticks: impl IntoIterator<Item = Result<Vec<PendingItem>>>) -> Self {
            Self(ticks.into_iter().collect())
        }
    }

    impl QueueSource for ScriptedQueue {
        fn fetch_pending(&mut self) -> Result<Vec<PendingItem>> {
            self.0.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// A comment whose embed title is `Comment by <name>`.
    fn comment(name: &str) -> PendingItem {
        PendingItem::Comment(Comment {
            id: format!("t1_{name}"),
            author: name.to_string(),
            body: "body".into(),
            permalink: format!("/r/example/comments/x/y/{name}/"),
            reports: vec![],
        })
    }

    fn post(name: &str) -> PendingItem {
        PendingItem::Post(Post {
            id: format!("t3_{name}"),
            short_id: name.to_string(),
            author: "poster".into(),
            title: name.to_string(),
            domain: "self.example".into(),
            is_self: true,
            thumbnail: None,
            reports: vec![],
        })
    }

    fn publish(name: &str) -> Call {
        Call::Publish(format!("Comment by {name}"))
    }

    fn test_store() -> (TempDir, ReportStore) {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::open(dir.path().join("relay.sqlite")).unwrap();
        (dir, store)
    }

    fn ids(set: &HashSet<String>) -> Vec<&str> {
        let mut ids: Vec<_> = set.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn new_items_are_announced_and_recorded() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();

        let current = reconcile(&[comment("a"), post("b")], &store, &chat).unwrap();

        assert_eq!(ids(&current), vec!["t1_a", "t3_b"]);
        assert_eq!(chat.calls(), vec![publish("a"), Call::Publish("b".into())]);
        assert!(store.is_announced("t1_a").unwrap());
        assert!(store.is_announced("t3_b").unwrap());
    }

    #[test]
    fn still_pending_item_is_not_announced_twice() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();

        for _ in 0..3 {
            reconcile(&[comment("a")], &store, &chat).unwrap();
        }

        assert_eq!(chat.calls(), vec![publish("a")]);
    }

    #[test]
    fn resolved_item_is_deleted_exactly_once() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();

        reconcile(&[comment("x")], &store, &chat).unwrap();
        chat.take();

        reconcile(&[], &store, &chat).unwrap();
        assert_eq!(chat.take(), vec![Call::Delete("m1".into())]);
        assert!(store.unresolved_records().unwrap().is_empty());

        reconcile(&[], &store, &chat).unwrap();
        assert!(chat.take().is_empty());
    }

    #[test]
    fn resolved_item_reappearing_is_not_reannounced() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();

        reconcile(&[comment("a")], &store, &chat).unwrap();
        reconcile(&[], &store, &chat).unwrap();
        chat.take();

        let current = reconcile(&[comment("a")], &store, &chat).unwrap();

        assert_eq!(ids(&current), vec!["t1_a"]);
        assert!(chat.take().is_empty());
    }

    #[test]
    fn tick_sequence_announces_resolves_and_ignores_settled_items() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();

        // Tick 1: {A, B}.
        reconcile(&[comment("a"), comment("b")], &store, &chat).unwrap();
        assert_eq!(chat.take(), vec![publish("a"), publish("b")]);

        // Tick 2: {A}. B is retracted, A untouched.
        reconcile(&[comment("a")], &store, &chat).unwrap();
        assert_eq!(chat.take(), vec![Call::Delete("m2".into())]);

        // Tick 3: {A, C}. Only C is new; B stays resolved.
        let current = reconcile(&[comment("a"), comment("c")], &store, &chat).unwrap();
        assert_eq!(chat.take(), vec![publish("c")]);
        assert_eq!(ids(&current), vec!["t1_a", "t1_c"]);

        let mut unresolved: Vec<_> = store
            .unresolved_records()
            .unwrap()
            .into_iter()
            .map(|r| r.item_id)
            .collect();
        unresolved.sort();
        assert_eq!(unresolved, vec!["t1_a", "t1_c"]);
    }

    #[test]
    fn publish_failure_keeps_earlier_announcements() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.sqlite");

        {
            let store = ReportStore::open(&path).unwrap();
            let chat = FakeChat {
                fail_publish_title: Some("Comment by b".into()),
                ..FakeChat::default()
            };
            let err = reconcile(&[comment("a"), comment("b")], &store, &chat).unwrap_err();
            assert!(matches!(err, RelayError::DiscordStatus { status: 503 }));
            assert_eq!(chat.calls(), vec![publish("a")]);
        }

        // Restart: A is already recorded, B is attempted again.
        let store = ReportStore::open(&path).unwrap();
        let chat = FakeChat::default();
        reconcile(&[comment("a"), comment("b")], &store, &chat).unwrap();

        assert_eq!(chat.calls(), vec![publish("b")]);
        assert!(store.is_announced("t1_b").unwrap());
    }

    #[test]
    fn publish_failure_skips_resolution_for_the_tick() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        reconcile(&[comment("old")], &store, &chat).unwrap();

        let failing = FakeChat {
            fail_publish_title: Some("Comment by new".into()),
            ..FakeChat::default()
        };
        reconcile(&[comment("new")], &store, &failing).unwrap_err();

        assert!(failing.calls().is_empty());
        assert_eq!(store.unresolved_records().unwrap().len(), 1);
    }

    #[test]
    fn failed_delete_leaves_record_unresolved() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        reconcile(&[comment("a")], &store, &chat).unwrap();

        let failing = FakeChat {
            fail_delete: true,
            ..FakeChat::default()
        };
        reconcile(&[], &store, &failing).unwrap_err();
        assert_eq!(store.unresolved_records().unwrap().len(), 1);

        // Next tick retries the deletion.
        reconcile(&[], &store, &chat).unwrap();
        assert_eq!(chat.take().last(), Some(&Call::Delete("m1".into())));
        assert!(store.unresolved_records().unwrap().is_empty());
    }

    #[test]
    fn tick_clears_error_window_on_success() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        let queue = ScriptedQueue::new([
            Err(RelayError::RedditStatus { status: 500 }),
            Err(RelayError::RedditRequest("timeout".into())),
            Ok(vec![comment("a")]),
        ]);
        let mut relay = Relay::new(queue, &chat, &store, Schedule::default());

        relay.tick().unwrap_err();
        relay.tick().unwrap_err();
        assert_eq!(relay.errors.platform_server_errors, 1);
        assert_eq!(relay.errors.platform_request_errors, 1);

        relay.tick().unwrap();
        assert_eq!(relay.errors, ErrorState::default());
        assert_eq!(chat.calls(), vec![publish("a")]);
    }

    #[test]
    fn sustained_failures_alert_once_per_window() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        let queue =
            ScriptedQueue::new((0..7).map(|_| Err(RelayError::RedditStatus { status: 503 })));
        let mut relay = Relay::new(queue, &chat, &store, Schedule::default());

        for _ in 0..7 {
            relay.tick().unwrap_err();
        }

        assert_eq!(
            chat.calls(),
            vec![Call::Text("Warning: frequent Reddit server errors.".into())]
        );
    }

    #[test]
    fn fetch_failure_retracts_nothing() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        let queue = ScriptedQueue::new([
            Ok(vec![comment("a")]),
            Err(RelayError::RedditDecode("modqueue exceeds 10 pages".into())),
        ]);
        let mut relay = Relay::new(queue, &chat, &store, Schedule::default());

        relay.tick().unwrap();
        chat.take();
        relay.tick().unwrap_err();

        assert!(!chat.calls().contains(&Call::Delete("m1".into())));
        assert_eq!(store.unresolved_records().unwrap().len(), 1);
        assert_eq!(relay.errors.other_errors, 1);
    }

    #[test]
    fn delay_depends_on_tick_outcome() {
        let (_dir, store) = test_store();
        let chat = FakeChat::default();
        let schedule = Schedule {
            interval: Duration::from_secs(10),
            failure_backoff: Duration::from_secs(120),
        };
        let relay = Relay::new(ScriptedQueue::new([]), &chat, &store, schedule);

        assert_eq!(relay.delay_after(true), Duration::from_secs(10));
        assert_eq!(relay.delay_after(false), Duration::from_secs(120));
    }

    #[test]
    fn reconcile_failure_is_classified() {
        let (_dir, store) = test_store();
        let chat = FakeChat {
            fail_publish_title: Some("Comment by a".into()),
            ..FakeChat::default()
        };
        let queue = ScriptedQueue::new([Ok(vec![comment("a")])]);
        let mut relay = Relay::new(queue, &chat, &store, Schedule::default());

        relay.tick().unwrap_err();

        assert_eq!(relay.errors.chat_server_errors, 1);
        assert!(chat.calls().is_empty());
    }
}
