//! Message transport between block containers.
//!
//! A [`Transport`] is a bag of named point-to-point queues. The protocol
//! layer opens every tag it will ever use up front (persistent channels),
//! then moves [`BoundaryMessage`]s through them. Sends must return
//! immediately; receives are non-blocking polls.
//!
//! [`MemoryTransport`] is the in-process implementation: one unbounded
//! channel per tag. Single-rank runs and tests use it directly; a
//! networked implementation would put a wire format and a progress thread
//! behind the same trait.

use floe_core::{BlockId, Real, TransportError, VarLabel};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What a channel carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Ghost-cell payloads.
    Ghost,
    /// Correction fluxes across a refinement jump.
    Flux,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ghost => "ghost",
            Self::Flux => "flux",
        };
        write!(f, "{s}")
    }
}

/// Identity of one directed channel: source block, destination block,
/// variable, and payload kind.
///
/// Both endpoints derive the same tag independently, which is what makes
/// the channels "persistent": no handshake assigns them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelTag {
    /// Sending block.
    pub src: BlockId,
    /// Receiving block.
    pub dst: BlockId,
    /// The variable the payload belongs to.
    pub var: VarLabel,
    /// Payload kind.
    pub kind: ChannelKind,
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} b{}->b{} {}", self.kind, self.src, self.dst, self.var)
    }
}

/// One cycle-stamped payload.
///
/// `allocated` is the sender's allocation state: a remote sender that has
/// nothing allocated still sends, with `allocated: false` and empty data,
/// so the receiver can complete the cycle and apply its default-fill rule.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryMessage {
    /// The sender's cycle number for its end of this channel.
    pub cycle: u64,
    /// Whether the sender had the variable allocated.
    pub allocated: bool,
    /// Row-major cell values; empty when `allocated` is false.
    pub data: Vec<Real>,
}

/// A bag of named point-to-point message queues.
///
/// Implementations must be callable from any thread; the block containers
/// of one process share a single transport.
pub trait Transport: Send + Sync {
    /// Ensure the queue for `tag` exists. Idempotent; either endpoint may
    /// open first.
    ///
    /// # Errors
    ///
    /// Implementation-defined resource failures. Opening is part of setup,
    /// so a failure here is fatal to the run, never retried.
    fn open(&self, tag: &ChannelTag) -> Result<(), TransportError>;

    /// Enqueue `message` on `tag` without blocking.
    ///
    /// # Errors
    ///
    /// [`TransportError::ChannelUnopened`] if `tag` was never opened, or
    /// [`TransportError::ChannelClosed`] if the peer endpoint is gone.
    fn send(&self, tag: &ChannelTag, message: BoundaryMessage) -> Result<(), TransportError>;

    /// Dequeue the oldest pending message on `tag`, if any.
    ///
    /// `Ok(None)` means nothing has arrived yet; that is the normal idle
    /// answer, not a failure.
    ///
    /// # Errors
    ///
    /// [`TransportError::ChannelUnopened`] if `tag` was never opened, or
    /// [`TransportError::ChannelClosed`] if the peer endpoint is gone.
    fn try_recv(&self, tag: &ChannelTag) -> Result<Option<BoundaryMessage>, TransportError>;
}

struct Route {
    tx: crossbeam_channel::Sender<BoundaryMessage>,
    rx: crossbeam_channel::Receiver<BoundaryMessage>,
}

/// In-process [`Transport`] backed by one unbounded channel per tag.
///
/// Counts messages and cells as they pass through, so tests and
/// single-rank diagnostics can see what the protocol actually moved —
/// most usefully, that a local pair skip moved nothing.
#[derive(Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<ChannelTag, Route>>,
    sent: AtomicU64,
    received: AtomicU64,
    cells_sent: AtomicU64,
}

impl MemoryTransport {
    /// A transport with no routes yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routes opened so far.
    pub fn route_count(&self) -> usize {
        self.routes.lock().unwrap().len()
    }

    /// Total messages accepted by [`send`](Transport::send).
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total messages handed out by [`try_recv`](Transport::try_recv).
    pub fn messages_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Total cell values accepted by [`send`](Transport::send).
    pub fn cells_sent(&self) -> u64 {
        self.cells_sent.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("routes", &self.route_count())
            .field("sent", &self.messages_sent())
            .field("received", &self.messages_received())
            .finish()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, tag: &ChannelTag) -> Result<(), TransportError> {
        let mut routes = self.routes.lock().unwrap();
        routes.entry(tag.clone()).or_insert_with(|| {
            debug!("opening channel {tag}");
            let (tx, rx) = crossbeam_channel::unbounded();
            Route { tx, rx }
        });
        Ok(())
    }

    fn send(&self, tag: &ChannelTag, message: BoundaryMessage) -> Result<(), TransportError> {
        let tx = {
            let routes = self.routes.lock().unwrap();
            let route = routes.get(tag).ok_or_else(|| TransportError::ChannelUnopened {
                tag: tag.to_string(),
            })?;
            route.tx.clone()
        };
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.cells_sent
            .fetch_add(message.data.len() as u64, Ordering::Relaxed);
        tx.send(message).map_err(|_| TransportError::ChannelClosed {
            tag: tag.to_string(),
        })
    }

    fn try_recv(&self, tag: &ChannelTag) -> Result<Option<BoundaryMessage>, TransportError> {
        let rx = {
            let routes = self.routes.lock().unwrap();
            let route = routes.get(tag).ok_or_else(|| TransportError::ChannelUnopened {
                tag: tag.to_string(),
            })?;
            route.rx.clone()
        };
        match rx.try_recv() {
            Ok(message) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                Ok(Some(message))
            }
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(TransportError::ChannelClosed {
                    tag: tag.to_string(),
                })
            }
        }
    }
}

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MemoryTransport>();
};
