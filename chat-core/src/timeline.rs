//! Merged message timeline for an open conversation.
//!
//! The timeline combines stored history, live events and optimistic local
//! sends into one ordered, deduplicated view:
//! - Confirmed entries are ordered by `(created_at, id)`
//! - Unconfirmed entries carry an optimistic timestamp no earlier than the
//!   last entry visible at send time, and keep their send order among themselves
//! - A confirmed message is recognised by server id; before that, an
//!   optimistic entry is recognised by its correlation token
//!
//! Content matching is only used for echoes that arrive without a token.

use crate::session::SendError;
use chat_types::{CorrelationToken, Message, MessageCursor, MessageId, MessageKind, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// Delivery state of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Sent optimistically, append still in flight.
    Pending,
    /// Stored by the server.
    Confirmed,
    /// Append failed; kept visible until retried or discarded.
    Failed,
}

/// One visible entry of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Server id, known once confirmed.
    pub message_id: Option<MessageId>,
    /// Correlation token of the local send, if this entry originated here.
    pub token: Option<CorrelationToken>,
    /// Author.
    pub sender_id: UserId,
    /// Text body or media reference.
    pub content: String,
    /// Presentation kind.
    pub kind: MessageKind,
    /// Server time once confirmed, optimistic local time before that.
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    pub status: DeliveryStatus,
    seq: u64,
}

impl TimelineEntry {
    fn from_message(message: Message, seq: u64) -> Self {
        Self {
            message_id: Some(message.id),
            token: message.client_token,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            created_at: message.created_at,
            status: DeliveryStatus::Confirmed,
            seq,
        }
    }

    /// Check if the server has stored this entry.
    pub fn is_confirmed(&self) -> bool {
        self.status == DeliveryStatus::Confirmed
    }

    /// Cursor of the stored message, `None` while unconfirmed.
    pub fn cursor(&self) -> Option<MessageCursor> {
        match (self.status, self.message_id) {
            (DeliveryStatus::Confirmed, Some(id)) => Some(MessageCursor::new(self.created_at, id)),
            _ => None,
        }
    }

    // Confirmed entries sort before unconfirmed ones sharing a timestamp.
    fn sort_key(&self) -> (DateTime<Utc>, u8, Option<MessageId>, u64) {
        match self.status {
            DeliveryStatus::Confirmed => (self.created_at, 0, self.message_id, 0),
            _ => (self.created_at, 1, None, self.seq),
        }
    }
}

/// Result of merging a stored message into the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new entry was added.
    Inserted,
    /// An optimistic entry was replaced by its confirmed message.
    Reconciled,
    /// The message id was already present; nothing changed.
    Duplicate,
}

/// Ordered, deduplicated view of one conversation.
#[derive(Debug, Clone)]
pub struct Timeline {
    local_user: UserId,
    entries: Vec<TimelineEntry>,
    seen: HashSet<MessageId>,
    next_seq: u64,
    max_unconfirmed: usize,
    echo_window: TimeDelta,
}

impl Timeline {
    /// Create an empty timeline for `local_user`.
    ///
    /// `max_unconfirmed` bounds pending plus failed entries. Token-less echoes
    /// from `local_user` are matched against unconfirmed entries whose
    /// timestamp lies within `echo_window` of the echo.
    pub fn new(local_user: UserId, max_unconfirmed: usize, echo_window: Duration) -> Self {
        Self {
            local_user,
            entries: Vec::new(),
            seen: HashSet::new(),
            next_seq: 0,
            max_unconfirmed,
            echo_window: TimeDelta::from_std(echo_window).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Visible entries in display order.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending plus failed entries.
    pub fn unconfirmed_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_confirmed()).count()
    }

    /// Check if a stored message is already visible.
    pub fn contains_message(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Highest cursor among confirmed entries.
    pub fn last_confirmed(&self) -> Option<MessageCursor> {
        self.entries.iter().filter_map(TimelineEntry::cursor).max()
    }

    /// Add an optimistic entry for a local send.
    ///
    /// The entry is stamped `max(now, last visible timestamp)` so it lands after
    /// everything currently on screen.
    pub fn push_pending(
        &mut self,
        token: CorrelationToken,
        content: String,
        kind: MessageKind,
        now: DateTime<Utc>,
    ) -> Result<&TimelineEntry, SendError> {
        if self.unconfirmed_count() >= self.max_unconfirmed {
            return Err(SendError::TooManyPending {
                capacity: self.max_unconfirmed,
            });
        }

        let created_at = self
            .entries
            .last()
            .map(|last| last.created_at.max(now))
            .unwrap_or(now);
        let entry = TimelineEntry {
            message_id: None,
            token: Some(token),
            sender_id: self.local_user.clone(),
            content,
            kind,
            created_at,
            status: DeliveryStatus::Pending,
            seq: self.take_seq(),
        };
        let idx = self.insert_sorted(entry);
        Ok(&self.entries[idx])
    }

    /// Merge a stored message (history, backfill or live event).
    pub fn merge(&mut self, message: Message) -> MergeOutcome {
        if self.seen.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }

        let slot = match message.client_token {
            Some(token) => self.unconfirmed_with_token(token),
            None if message.sender_id == self.local_user => self.unconfirmed_echo_of(&message),
            None => None,
        };

        match slot {
            Some(idx) => {
                self.reconcile(idx, message);
                MergeOutcome::Reconciled
            }
            None => {
                self.insert_confirmed(message);
                MergeOutcome::Inserted
            }
        }
    }

    /// Apply the stored message returned by a successful append of `token`.
    pub fn confirm(&mut self, token: CorrelationToken, message: Message) -> MergeOutcome {
        if self.seen.contains(&message.id) {
            // The echo won the race; drop a shadow it could not match.
            if let Some(idx) = self.unconfirmed_with_token(token) {
                self.entries.remove(idx);
            }
            return MergeOutcome::Duplicate;
        }

        match self.unconfirmed_with_token(token) {
            Some(idx) => {
                self.reconcile(idx, message);
                MergeOutcome::Reconciled
            }
            None => {
                self.insert_confirmed(message);
                MergeOutcome::Inserted
            }
        }
    }

    /// Mark a pending entry as failed. Returns false if no pending entry has `token`.
    pub fn fail(&mut self, token: CorrelationToken) -> bool {
        match self.unconfirmed_with_token(token) {
            Some(idx) if self.entries[idx].status == DeliveryStatus::Pending => {
                self.entries[idx].status = DeliveryStatus::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a failed entry back to pending and return a copy for re-sending.
    pub fn retry(&mut self, token: CorrelationToken) -> Result<TimelineEntry, SendError> {
        let idx = self.failed_with_token(token)?;
        self.entries[idx].status = DeliveryStatus::Pending;
        Ok(self.entries[idx].clone())
    }

    /// Remove a failed entry from the view.
    pub fn discard(&mut self, token: CorrelationToken) -> Result<TimelineEntry, SendError> {
        let idx = self.failed_with_token(token)?;
        Ok(self.entries.remove(idx))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn unconfirmed_with_token(&self, token: CorrelationToken) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.is_confirmed() && e.token == Some(token))
    }

    fn failed_with_token(&self, token: CorrelationToken) -> Result<usize, SendError> {
        let idx = self
            .unconfirmed_with_token(token)
            .ok_or(SendError::UnknownToken)?;
        if self.entries[idx].status != DeliveryStatus::Failed {
            return Err(SendError::NotFailed);
        }
        Ok(idx)
    }

    fn unconfirmed_echo_of(&self, message: &Message) -> Option<usize> {
        self.entries.iter().position(|e| {
            !e.is_confirmed()
                && e.sender_id == message.sender_id
                && e.kind == message.kind
                && e.content == message.content
                && (message.created_at - e.created_at).abs() <= self.echo_window
        })
    }

    fn reconcile(&mut self, idx: usize, message: Message) {
        let mut entry = self.entries.remove(idx);
        let token = entry.token;
        self.seen.insert(message.id);
        let seq = entry.seq;
        entry = TimelineEntry::from_message(message, seq);
        entry.token = entry.token.or(token);
        self.insert_sorted(entry);
    }

    fn insert_confirmed(&mut self, message: Message) {
        self.seen.insert(message.id);
        let seq = self.take_seq();
        self.insert_sorted(TimelineEntry::from_message(message, seq));
    }

    fn insert_sorted(&mut self, entry: TimelineEntry) -> usize {
        let key = entry.sort_key();
        let idx = self.entries.partition_point(|e| e.sort_key() <= key);
        self.entries.insert(idx, entry);
        idx
    }
}
