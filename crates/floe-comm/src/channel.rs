//! One persistent channel endpoint and its per-cycle state machine.
//!
//! A [`BoundaryChannel`] pairs this block's end of a directed route with
//! the bookkeeping one exchange cycle needs: the cycle counter, whether a
//! send went out, whether a message is even expected, and a stash for
//! messages that raced ahead of the local cycle. Both endpoints advance
//! their counters in lockstep — one `start` per cycle — so a received
//! stamp below the local counter is a leftover to drop, and a stamp above
//! it belongs to a cycle this end has not started yet.

use crate::topology::Neighbor;
use crate::transport::{BoundaryMessage, ChannelKind, ChannelTag, Transport};
use floe_core::{BoundaryError, Real};
use log::debug;

/// Where a channel is within the current exchange cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Between cycles; nothing may be sent or received.
    Idle,
    /// A cycle is open; sends and polls are legal.
    Receiving,
    /// This cycle's inbound work is done; waiting for the cycle to clear.
    Complete,
}

impl ChannelState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Receiving => "receiving",
            Self::Complete => "complete",
        }
    }
}

/// This block's end of one persistent exchange route.
///
/// Ghost channels carry traffic both ways (a send tag and a receive tag);
/// flux channels are one-directional — the finer block only sends, the
/// coarser only receives — so the unused tag is absent.
#[derive(Clone, Debug)]
pub struct BoundaryChannel {
    neighbor: Neighbor,
    kind: ChannelKind,
    send_tag: Option<ChannelTag>,
    recv_tag: Option<ChannelTag>,
    state: ChannelState,
    cycle: u64,
    sent: bool,
    expecting: bool,
    stash: Vec<BoundaryMessage>,
    neighbor_allocated: bool,
    local: bool,
}

impl BoundaryChannel {
    /// A channel in its pre-cycle state. Tags that are `None` disable the
    /// corresponding direction.
    pub fn new(
        neighbor: Neighbor,
        kind: ChannelKind,
        send_tag: Option<ChannelTag>,
        recv_tag: Option<ChannelTag>,
        local: bool,
    ) -> Self {
        Self {
            neighbor,
            kind,
            send_tag,
            recv_tag,
            state: ChannelState::Idle,
            cycle: 0,
            sent: false,
            expecting: false,
            stash: Vec::new(),
            neighbor_allocated: false,
            local,
        }
    }

    /// Open this end's tags on `transport`.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] if the transport cannot set up a
    /// route. Setup failures are fatal; nothing retries an open.
    pub fn open(&self, transport: &dyn Transport) -> Result<(), BoundaryError> {
        for tag in self.send_tag.iter().chain(&self.recv_tag) {
            transport
                .open(tag)
                .map_err(|source| BoundaryError::Transport {
                    tag: tag.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// The neighbor this channel talks to.
    pub fn neighbor(&self) -> &Neighbor {
        &self.neighbor
    }

    /// What the channel carries.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Position within the current cycle.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of cycles started so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether the neighbor lives on this rank.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Whether this channel can send.
    pub fn sends(&self) -> bool {
        self.send_tag.is_some()
    }

    /// Whether this channel can receive.
    pub fn receives(&self) -> bool {
        self.recv_tag.is_some()
    }

    /// Whether this cycle's send already went out (or was skipped).
    pub fn send_done(&self) -> bool {
        self.sent
    }

    /// Whether a message is expected this cycle.
    pub fn expecting(&self) -> bool {
        self.expecting
    }

    /// Whether this cycle's inbound work is finished.
    pub fn is_complete(&self) -> bool {
        self.state == ChannelState::Complete
    }

    /// The neighbor-allocation mirror, as of the last sync.
    pub fn neighbor_allocated(&self) -> bool {
        self.neighbor_allocated
    }

    /// Update the neighbor-allocation mirror from a fresh snapshot.
    pub fn set_neighbor_allocated(&mut self, allocated: bool) {
        self.neighbor_allocated = allocated;
    }

    /// Open the next cycle. `expecting` is whether a message will arrive
    /// on this channel this cycle; a channel not expecting one completes
    /// without polling the transport.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] unless the channel is idle.
    pub fn start(&mut self, expecting: bool) -> Result<(), BoundaryError> {
        if self.state != ChannelState::Idle {
            return Err(BoundaryError::OutOfOrder {
                op: "start_receiving",
                state: self.state.name(),
            });
        }
        self.cycle += 1;
        self.sent = false;
        self.expecting = expecting && self.receives();
        self.state = ChannelState::Receiving;
        Ok(())
    }

    /// Send this cycle's payload. The message is stamped with the current
    /// cycle. Re-sending within one cycle is a no-op, so a retried task
    /// does not duplicate traffic.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] outside an open cycle, or
    /// [`BoundaryError::Transport`] if the transport rejects the message.
    pub fn post_send(
        &mut self,
        transport: &dyn Transport,
        allocated: bool,
        data: Vec<Real>,
    ) -> Result<(), BoundaryError> {
        if self.state != ChannelState::Receiving && self.state != ChannelState::Complete {
            return Err(BoundaryError::OutOfOrder {
                op: "send",
                state: self.state.name(),
            });
        }
        if self.sent {
            return Ok(());
        }
        let Some(tag) = &self.send_tag else {
            return Err(BoundaryError::OutOfOrder {
                op: "send",
                state: "receive-only",
            });
        };
        let message = BoundaryMessage {
            cycle: self.cycle,
            allocated,
            data,
        };
        transport
            .send(tag, message)
            .map_err(|source| BoundaryError::Transport {
                tag: tag.to_string(),
                source,
            })?;
        self.sent = true;
        Ok(())
    }

    /// Record that this cycle's send was resolved without a message — the
    /// local-pair skip.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] outside an open cycle.
    pub fn skip_send(&mut self) -> Result<(), BoundaryError> {
        if self.state != ChannelState::Receiving && self.state != ChannelState::Complete {
            return Err(BoundaryError::OutOfOrder {
                op: "send",
                state: self.state.name(),
            });
        }
        self.sent = true;
        Ok(())
    }

    /// Poll for this cycle's message.
    ///
    /// Returns `Ok(Some(..))` exactly once per cycle, when the message
    /// with the current stamp is available (stashed earlier or freshly
    /// received). Stale stamps are dropped; future stamps are stashed for
    /// the cycles they belong to.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] unless the channel is receiving, or
    /// [`BoundaryError::Transport`] if the transport fails.
    pub fn poll(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Option<BoundaryMessage>, BoundaryError> {
        if self.state != ChannelState::Receiving {
            return Err(BoundaryError::OutOfOrder {
                op: "receive",
                state: self.state.name(),
            });
        }
        let Some(tag) = &self.recv_tag else {
            return Err(BoundaryError::OutOfOrder {
                op: "receive",
                state: "send-only",
            });
        };

        if let Some(pos) = self.stash.iter().position(|m| m.cycle == self.cycle) {
            return Ok(Some(self.stash.swap_remove(pos)));
        }
        loop {
            let message = transport
                .try_recv(tag)
                .map_err(|source| BoundaryError::Transport {
                    tag: tag.to_string(),
                    source,
                })?;
            match message {
                None => return Ok(None),
                Some(m) if m.cycle < self.cycle => {
                    debug!(
                        "channel {tag}: dropping stale message (cycle {} < {})",
                        m.cycle, self.cycle
                    );
                }
                Some(m) if m.cycle > self.cycle => {
                    debug!("channel {tag}: stashing message for future cycle {}", m.cycle);
                    self.stash.push(m);
                }
                Some(m) => return Ok(Some(m)),
            }
        }
    }

    /// Mark this cycle's inbound work finished. Idempotent once receiving.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] if no cycle is open.
    pub fn mark_complete(&mut self) -> Result<(), BoundaryError> {
        match self.state {
            ChannelState::Receiving => {
                self.state = ChannelState::Complete;
                Ok(())
            }
            ChannelState::Complete => Ok(()),
            ChannelState::Idle => Err(BoundaryError::OutOfOrder {
                op: "complete",
                state: self.state.name(),
            }),
        }
    }

    /// Close the cycle: drain leftovers off the transport and return to
    /// idle. Messages stamped for future cycles survive in the stash;
    /// everything at or below the current cycle is dropped.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] if the transport fails while draining.
    pub fn clear(&mut self, transport: &dyn Transport) -> Result<(), BoundaryError> {
        if let Some(tag) = &self.recv_tag {
            loop {
                let message = transport
                    .try_recv(tag)
                    .map_err(|source| BoundaryError::Transport {
                        tag: tag.to_string(),
                        source,
                    })?;
                match message {
                    None => break,
                    Some(m) if m.cycle > self.cycle => self.stash.push(m),
                    Some(m) => {
                        debug!("channel {tag}: discarding message for closed cycle {}", m.cycle);
                    }
                }
            }
        }
        self.stash.retain(|m| m.cycle > self.cycle);
        self.state = ChannelState::Idle;
        Ok(())
    }
}
