//! Identity-keyed registry of pending intents and live delivery channels.
//!
//! The outer map is only write-locked to insert a never-seen identity; all
//! per-user work happens under that user's own entry mutex, so unrelated
//! identities never serialize behind each other. Entries are never removed,
//! which keeps an `Arc` handed out by [`SessionRegistry::entry`] canonical
//! for the life of the process.
//!
//! Pushes use `try_send` on a bounded queue and never await, so no lock is
//! held across a suspension point.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ir_domain::{IntentEvent, UserIdentity};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Sending half of a session's outbound intent queue.
pub type IntentSink = mpsc::Sender<IntentEvent>;

/// The registry's handle to one session's outbound queue.
///
/// The session task owns the receiving half. Once the registry drops this
/// handle (detach or supersede) the session's receiver observes the closed
/// queue.
#[derive(Debug)]
pub struct DeliveryChannel {
    session_id: Uuid,
    sink: IntentSink,
}

impl DeliveryChannel {
    pub fn new(session_id: Uuid, sink: IntentSink) -> Self {
        Self { session_id, sink }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushFailure {
    /// The session's queue is at capacity (slow client).
    Full,
    /// The session has gone away but has not detached yet.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    BufferedNoChannel,
    Dropped(PushFailure),
}

/// Result of attaching a channel to an identity. Attaching always succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOutcome {
    /// Session whose channel was replaced, if one was attached.
    pub superseded: Option<Uuid>,
    /// Delivery of the pending intent to the new channel, if one was replayed.
    pub replay: Option<DeliveryOutcome>,
}

#[derive(Debug, Default)]
struct SessionEntry {
    pending_intent: Option<IntentEvent>,
    channel: Option<DeliveryChannel>,
    attached_at: Option<DateTime<Utc>>,
}

/// Per-identity view returned by [`SessionRegistry::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub identity: UserIdentity,
    pub session_id: Option<Uuid>,
    pub attached_at: Option<DateTime<Utc>>,
    pub pending_intent: Option<String>,
    pub pending_received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub identities: usize,
    pub bound_sessions: usize,
    pub pending_intents: usize,
}

/// Thread-safe map from identity to that user's current session state.
pub struct SessionRegistry {
    entries: RwLock<HashMap<UserIdentity, Arc<Mutex<SessionEntry>>>>,
    replay_on_attach: bool,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SessionRegistry {
    pub fn new(replay_on_attach: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            replay_on_attach,
        }
    }

    /// Fetch the entry for `identity`, creating it if absent.
    fn entry(&self, identity: &UserIdentity) -> Arc<Mutex<SessionEntry>> {
        if let Some(entry) = self.entries.read().get(identity) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionEntry::default())))
            .clone()
    }

    fn existing(&self, identity: &UserIdentity) -> Option<Arc<Mutex<SessionEntry>>> {
        self.entries.read().get(identity).cloned()
    }

    /// Record `event` as the latest intent for `identity` and push it to the
    /// attached channel, if any.
    ///
    /// The event is kept as the pending intent even when the push fails.
    pub fn upsert_intent(&self, identity: &UserIdentity, event: IntentEvent) -> DeliveryOutcome {
        let entry = self.entry(identity);
        let mut entry = entry.lock();
        entry.pending_intent = Some(event.clone());

        match &entry.channel {
            None => {
                tracing::debug!(identity = %identity, intent = %event.intent, "no session attached, intent buffered");
                DeliveryOutcome::BufferedNoChannel
            }
            Some(channel) => push(identity, channel, event),
        }
    }

    /// Bind `channel` to `identity`, replacing any previously attached one.
    ///
    /// The replaced channel is dropped here; its session notices through its
    /// own closed receiver. When replay is enabled the pending intent (if any)
    /// is pushed to the new channel before the lock is released.
    pub fn attach_channel(&self, identity: &UserIdentity, channel: DeliveryChannel) -> AttachOutcome {
        let entry = self.entry(identity);
        let mut entry = entry.lock();

        let replay = match (&entry.pending_intent, self.replay_on_attach) {
            (Some(pending), true) => Some(push(identity, &channel, pending.clone())),
            _ => None,
        };

        let session_id = channel.session_id;
        let superseded = entry.channel.replace(channel).map(|old| old.session_id);
        entry.attached_at = Some(Utc::now());

        if let Some(old) = superseded {
            tracing::info!(
                identity = %identity,
                session_id = %session_id,
                superseded_session_id = %old,
                "session channel replaced by newer sign-in"
            );
        }

        AttachOutcome { superseded, replay }
    }

    /// Clear the channel for `identity` only if it still belongs to
    /// `session_id`. Returns `true` when a channel was removed.
    pub fn detach_channel(&self, identity: &UserIdentity, session_id: Uuid) -> bool {
        let Some(entry) = self.existing(identity) else {
            return false;
        };
        let mut entry = entry.lock();

        match entry.channel.as_ref().map(DeliveryChannel::session_id) {
            Some(current) if current == session_id => {
                entry.channel = None;
                entry.attached_at = None;
                true
            }
            Some(current) => {
                tracing::debug!(
                    identity = %identity,
                    session_id = %session_id,
                    current_session_id = %current,
                    "stale detach ignored"
                );
                false
            }
            None => false,
        }
    }

    /// Latest intent recorded for `identity`.
    pub fn pending_intent(&self, identity: &UserIdentity) -> Option<IntentEvent> {
        self.existing(identity)?.lock().pending_intent.clone()
    }

    /// Session currently attached to `identity`.
    pub fn attached_session(&self, identity: &UserIdentity) -> Option<Uuid> {
        self.existing(identity)?
            .lock()
            .channel
            .as_ref()
            .map(DeliveryChannel::session_id)
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        let mut stats = RegistryStats {
            identities: entries.len(),
            ..Default::default()
        };
        for entry in entries.values() {
            let entry = entry.lock();
            stats.bound_sessions += usize::from(entry.channel.is_some());
            stats.pending_intents += usize::from(entry.pending_intent.is_some());
        }
        stats
    }

    /// Per-identity summaries, sorted by identity.
    pub fn snapshot(&self) -> Vec<IdentitySummary> {
        let mut out: Vec<IdentitySummary> = self
            .entries
            .read()
            .iter()
            .map(|(identity, entry)| {
                let entry = entry.lock();
                IdentitySummary {
                    identity: identity.clone(),
                    session_id: entry.channel.as_ref().map(DeliveryChannel::session_id),
                    attached_at: entry.attached_at,
                    pending_intent: entry.pending_intent.as_ref().map(|e| e.intent.clone()),
                    pending_received_at: entry.pending_intent.as_ref().map(|e| e.received_at),
                }
            })
            .collect();
        out.sort_by(|a, b| a.identity.cmp(&b.identity));
        out
    }
}

fn push(identity: &UserIdentity, channel: &DeliveryChannel, event: IntentEvent) -> DeliveryOutcome {
    let intent = event.intent.clone();
    match channel.sink.try_send(event) {
        Ok(()) => {
            tracing::debug!(
                identity = %identity,
                session_id = %channel.session_id,
                intent = %intent,
                "intent queued for session"
            );
            DeliveryOutcome::Delivered
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(
                identity = %identity,
                session_id = %channel.session_id,
                intent = %intent,
                "session queue full, intent dropped (backpressure)"
            );
            DeliveryOutcome::Dropped(PushFailure::Full)
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!(
                identity = %identity,
                session_id = %channel.session_id,
                intent = %intent,
                "session queue closed, awaiting detach"
            );
            DeliveryOutcome::Dropped(PushFailure::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TryRecvError;

    fn id(s: &str) -> UserIdentity {
        UserIdentity::new(s).unwrap()
    }

    fn channel(capacity: usize) -> (DeliveryChannel, mpsc::Receiver<IntentEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (DeliveryChannel::new(Uuid::new_v4(), tx), rx)
    }

    #[test]
    fn upsert_without_channel_buffers() {
        let reg = SessionRegistry::default();
        let outcome = reg.upsert_intent(&id("a@x.com"), IntentEvent::new("greet"));
        assert_eq!(outcome, DeliveryOutcome::BufferedNoChannel);
        assert_eq!(reg.pending_intent(&id("a@x.com")).unwrap().intent, "greet");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn attach_replays_only_latest_intent() {
        let reg = SessionRegistry::default();
        let a = id("a@x.com");
        reg.upsert_intent(&a, IntentEvent::new("first"));
        reg.upsert_intent(&a, IntentEvent::new("second"));

        let (ch, mut rx) = channel(8);
        let outcome = reg.attach_channel(&a, ch);
        assert_eq!(outcome.superseded, None);
        assert_eq!(outcome.replay, Some(DeliveryOutcome::Delivered));

        assert_eq!(rx.try_recv().unwrap().intent, "second");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn attach_without_pending_has_no_replay() {
        let reg = SessionRegistry::default();
        let (ch, mut rx) = channel(8);
        let outcome = reg.attach_channel(&id("b@x.com"), ch);
        assert_eq!(outcome.replay, None);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn replay_can_be_disabled() {
        let reg = SessionRegistry::new(false);
        let a = id("a@x.com");
        reg.upsert_intent(&a, IntentEvent::new("greet"));
        let (ch, mut rx) = channel(8);
        assert_eq!(reg.attach_channel(&a, ch).replay, None);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        // Still retained as pending.
        assert!(reg.pending_intent(&a).is_some());
    }

    #[test]
    fn upsert_with_channel_delivers() {
        let reg = SessionRegistry::default();
        let b = id("b@x.com");
        let (ch, mut rx) = channel(8);
        reg.attach_channel(&b, ch);
        assert_eq!(reg.upsert_intent(&b, IntentEvent::new("book")), DeliveryOutcome::Delivered);
        assert_eq!(rx.try_recv().unwrap().intent, "book");
    }

    #[test]
    fn stale_detach_keeps_newer_channel() {
        let reg = SessionRegistry::default();
        let c = id("c@x.com");
        let (c1, mut rx1) = channel(8);
        let (c2, mut rx2) = channel(8);
        let s1 = c1.session_id();
        let s2 = c2.session_id();

        reg.attach_channel(&c, c1);
        let outcome = reg.attach_channel(&c, c2);
        assert_eq!(outcome.superseded, Some(s1));

        // The superseded session sees its queue close.
        assert!(matches!(rx1.try_recv(), Err(TryRecvError::Disconnected)));

        assert!(!reg.detach_channel(&c, s1));
        assert_eq!(reg.attached_session(&c), Some(s2));

        reg.upsert_intent(&c, IntentEvent::new("late"));
        assert_eq!(rx2.try_recv().unwrap().intent, "late");

        assert!(reg.detach_channel(&c, s2));
        assert_eq!(reg.attached_session(&c), None);
        assert!(!reg.detach_channel(&c, s2));
    }

    #[test]
    fn detach_unknown_identity_is_noop() {
        let reg = SessionRegistry::default();
        assert!(!reg.detach_channel(&id("nobody@x.com"), Uuid::new_v4()));
        assert!(reg.is_empty());
    }

    #[test]
    fn full_queue_drops_but_keeps_pending() {
        let reg = SessionRegistry::default();
        let a = id("a@x.com");
        let (ch, mut rx) = channel(1);
        reg.attach_channel(&a, ch);

        assert_eq!(reg.upsert_intent(&a, IntentEvent::new("one")), DeliveryOutcome::Delivered);
        assert_eq!(
            reg.upsert_intent(&a, IntentEvent::new("two")),
            DeliveryOutcome::Dropped(PushFailure::Full)
        );
        assert_eq!(reg.pending_intent(&a).unwrap().intent, "two");
        assert_eq!(rx.try_recv().unwrap().intent, "one");
    }

    #[test]
    fn closed_queue_reports_closed() {
        let reg = SessionRegistry::default();
        let a = id("a@x.com");
        let (ch, rx) = channel(4);
        reg.attach_channel(&a, ch);
        drop(rx);
        assert_eq!(
            reg.upsert_intent(&a, IntentEvent::new("lost")),
            DeliveryOutcome::Dropped(PushFailure::Closed)
        );
    }

    #[test]
    fn stats_and_snapshot() {
        let reg = SessionRegistry::default();
        reg.upsert_intent(&id("b@x.com"), IntentEvent::new("book"));
        let (ch, _rx) = channel(4);
        let sid = ch.session_id();
        reg.attach_channel(&id("a@x.com"), ch);

        assert_eq!(
            reg.stats(),
            RegistryStats {
                identities: 2,
                bound_sessions: 1,
                pending_intents: 1,
            }
        );

        let snap = reg.snapshot();
        assert_eq!(snap[0].identity.as_str(), "a@x.com");
        assert_eq!(snap[0].session_id, Some(sid));
        assert_eq!(snap[1].pending_intent.as_deref(), Some("book"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_serialize_per_identity() {
        const N: usize = 64;
        let reg = Arc::new(SessionRegistry::default());
        let a = id("a@x.com");
        let (ch, mut rx) = channel(N);
        reg.attach_channel(&a, ch);

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let reg = reg.clone();
                let a = a.clone();
                tokio::spawn(async move {
                    reg.upsert_intent(&a, IntentEvent::new(format!("e{i}")))
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), DeliveryOutcome::Delivered);
        }

        let mut received = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            received.push(ev.intent);
        }
        assert_eq!(received.len(), N);
        let unique: HashSet<_> = received.iter().cloned().collect();
        assert_eq!(unique.len(), N);

        // The last delivered event is the one left pending.
        let pending = reg.pending_intent(&a).unwrap().intent;
        assert_eq!(received.last(), Some(&pending));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn other_identities_progress_while_one_entry_is_locked() {
        let reg = Arc::new(SessionRegistry::default());
        let hot = id("hot@x.com");
        reg.upsert_intent(&hot, IntentEvent::new("seed"));

        let hot_entry = reg.entry(&hot);
        let guard = hot_entry.lock();

        let handles: Vec<_> = (0..1000)
            .map(|i| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    let user = id(&format!("user{i}@x.com"));
                    let (ch, mut rx) = channel(2);
                    let sid = ch.session_id();
                    reg.attach_channel(&user, ch);
                    reg.upsert_intent(&user, IntentEvent::new("ping"));
                    let got = rx.try_recv().map(|e| e.intent).ok();
                    assert!(reg.detach_channel(&user, sid));
                    got
                })
            })
            .collect();

        let all = tokio::time::timeout(Duration::from_secs(10), async {
            let mut results = Vec::new();
            for h in handles {
                results.push(h.await.unwrap());
            }
            results
        })
        .await
        .expect("unrelated identities must not block on a held entry");

        drop(guard);
        assert!(all.iter().all(|r| r.as_deref() == Some("ping")));
        assert_eq!(reg.len(), 1001);
    }
}
