//! Deduplicated, expiring view of one conversation.

use crate::delivery::ReconcileReport;
use crate::session::RenderedMessage;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use vanish_types::{ConversationKey, EnvelopeId, Identity, MessageEnvelope};

struct Entry {
    message: RenderedMessage,
    seen_at: DateTime<Utc>,
}

/// Messages between two identities, ordered by `createdAt` then id.
///
/// Push and reconciliation may both deliver an envelope; `ingest` keeps the
/// first copy. Entries leave the view when they expire or when a snapshot
/// taken after they were seen no longer contains them.
pub struct Conversation {
    key: ConversationKey,
    entries: BTreeMap<(DateTime<Utc>, EnvelopeId), Entry>,
    index: HashMap<EnvelopeId, DateTime<Utc>>,
}

impl Conversation {
    pub fn new(a: Identity, b: Identity) -> Self {
        Self {
            key: ConversationKey::new(a, b),
            entries: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn contains(&self, id: &EnvelopeId) -> bool {
        self.index.contains_key(id)
    }

    /// True if `envelope` belongs here, is unseen, and has not expired.
    /// Checked before decrypting so duplicates are never opened twice.
    pub fn wants(&self, envelope: &MessageEnvelope, now: DateTime<Utc>) -> bool {
        self.key.contains(envelope.sender())
            && self.key.contains(envelope.receiver())
            && !envelope.is_expired_at(now)
            && !self.contains(&envelope.id())
    }

    pub fn ingest(&mut self, message: RenderedMessage) -> bool {
        self.ingest_at(message, Utc::now())
    }

    /// Adds a rendered message. Returns false for duplicates, expired
    /// messages and messages from another conversation.
    pub fn ingest_at(&mut self, message: RenderedMessage, now: DateTime<Utc>) -> bool {
        if !(self.key.contains(&message.sender) && self.key.contains(&message.receiver))
            || message.is_expired_at(now)
            || self.contains(&message.id)
        {
            return false;
        }
        self.index.insert(message.id, message.created_at);
        self.entries.insert(
            (message.created_at, message.id),
            Entry {
                message,
                seen_at: now,
            },
        );
        true
    }

    pub fn apply_snapshot(&mut self, report: &ReconcileReport) -> usize {
        self.apply_snapshot_at(report, Utc::now())
    }

    /// Drops every entry that has expired at `now`, and every entry seen
    /// before the snapshot started that the snapshot no longer lists.
    /// Returns the number dropped.
    pub fn apply_snapshot_at(&mut self, report: &ReconcileReport, now: DateTime<Utc>) -> usize {
        let live: HashSet<EnvelopeId> = report.ids().collect();
        self.remove_where(|id, entry| {
            entry.message.is_expired_at(now)
                || (entry.seen_at <= report.started_at && !live.contains(id))
        })
    }

    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.remove_where(|_, entry| entry.message.is_expired_at(now))
    }

    pub fn messages(&self) -> impl Iterator<Item = &RenderedMessage> {
        self.entries.values().map(|entry| &entry.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_where(&mut self, mut doomed: impl FnMut(&EnvelopeId, &Entry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, id), entry| !doomed(id, entry));
        let entries = &self.entries;
        self.index
            .retain(|id, created_at| entries.contains_key(&(*created_at, *id)));
        before - self.entries.len()
    }
}
