//! Ledger events and the validation hook

use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::utils;

/// Small integer tag describing what an event is. Payload interpretation is
/// left entirely to the driver.
pub type EventKind = i32;

/// A transfer between parties.
pub const TRANSFER: EventKind = 1;
/// A free-form message.
pub const MESSAGE: EventKind = 2;
/// A contract execution record.
pub const CONTRACT_CALL: EventKind = 3;

/// Hard limit on payload length; longer payloads are truncated on entry.
pub const MAX_PAYLOAD_BYTES: usize = 255;

/// One ledger entry: a type tag, an opaque payload, and the local
/// wall-clock at which it was recorded. Events are hashed once on entry and
/// never touched again, except by the tamper procedure, which breaks that
/// rule on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    payload: Vec<u8>,
    timestamp: String,
    hash: String,
    is_valid: bool,
}

impl Event {
    /// Record an event stamped with the current wall-clock.
    pub fn new(cfg: &Config, kind: EventKind, payload: &[u8]) -> Self {
        Self::at(cfg, kind, payload, utils::timestamp_string())
    }

    /// Record an event with a caller-supplied timestamp.
    pub fn at(cfg: &Config, kind: EventKind, payload: &[u8], timestamp: String) -> Self {
        let mut payload = payload.to_vec();
        payload.truncate(MAX_PAYLOAD_BYTES);

        let mut event = Event {
            kind,
            payload,
            timestamp,
            hash: String::new(),
            is_valid: false,
        };
        event.hash = event.compute_hash(cfg);
        event.is_valid = cfg.validator.validate(&event);

        event
    }

    /// Digest of kind, payload, and timestamp concatenated, the kind
    /// rendered as its decimal string.
    pub fn compute_hash(&self, cfg: &Config) -> String {
        let mut bytes = self.kind.to_string().into_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes.extend_from_slice(self.timestamp.as_bytes());

        cfg.hasher.digest(&bytes)
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[inline]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Overwrite the payload and refresh only this event's hash. The owning
    /// block's Merkle root and hash go stale; nothing on the honest path
    /// calls this.
    pub(crate) fn rewrite_payload(&mut self, cfg: &Config, payload: &[u8]) {
        self.payload = payload[..payload.len().min(MAX_PAYLOAD_BYTES)].to_vec();
        self.hash = self.compute_hash(cfg);
    }
}

/// Pluggable pure predicate run over every event as it enters a block, and
/// again when a broadcast block is screened. The simulator itself accepts
/// everything; the hook is the seam where transaction semantics would go.
#[derive(Clone)]
pub struct EventValidator {
    name: String,
    func: Arc<dyn Fn(&Event) -> bool + Send + Sync + 'static>,
}

impl EventValidator {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        EventValidator {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The shipped default: every event is acceptable.
    pub fn accept_all() -> Self {
        EventValidator::new("accept-all", |_| true)
    }

    pub fn validate(&self, event: &Event) -> bool {
        (self.func)(event)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for EventValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<EventValidator: {}>", self.name)
    }
}

impl PartialEq for EventValidator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventValidator {}
