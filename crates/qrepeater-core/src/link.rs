//! Link synchronization protocol.
//!
//! Runs on one memory slot of one node, paired with a peer instance on the
//! node at the other end of the link. The two peers open identical attempt
//! windows, latch at most one photon per window, and compare the attempt
//! index each of them latched. Only agreement on a non-negative index counts
//! as entanglement; anything else (loss on one arm, nothing generated) frees
//! the slot and reopens a window.
//!
//! # State Machine
//!
//! ```text
//!  SOURCE                              RESPONDER
//! ┌──────┐ enable source           ┌──────┐
//! │ Init │────────────┐            │ Init │
//! └──────┘            ↓            └──────┘
//!          ┌───────────────────┐       │
//!          │ AwaitingFirstPhoton│      │ (START, t) received
//!          └───────────────────┘       ↓
//!                     │ send START ┌──────────────┐
//!                     └───────────>│ AwaitingStart │
//!                                  └──────────────┘
//!                     ↓                   ↓
//!              ┌────────────────────────────────┐
//!              │ AwaitingWindowOpen (timer = t) │
//!              └────────────────────────────────┘
//!                               ↓
//!              ┌────────────────────────────────┐  photon: latch once
//!              │ Attempting (photon | expiry)   │<──────────┐
//!              └────────────────────────────────┘───────────┘
//!                               │ expiry: send (END, index | -1)
//!                               ↓
//!              ┌────────────────────────────────┐  mismatch: free slot,
//!              │ AwaitingPeerEnd                │──> reopen window
//!              └────────────────────────────────┘
//!                               │ indices agree
//!                               ↓
//!                        ┌────────────┐
//!                        │ Entangled  │ emit ENTANGLED
//!                        └────────────┘
//! ```
//!
//! # Timing
//!
//! The source side picks `start_time` one propagation delay in the future,
//! aligned just before a clock-tick boundary, so the `START` message always
//! reaches the responder before the window opens. Both sides then derive the
//! attempt index of a photon as `floor((now - start_time) / t_clock)`; since
//! the arms of a pair arrive at both ends at the same instant, a pair that
//! survives on both arms yields the same index on both sides.

use qrepeater_proto::{ClassicalMessage, MessageTag};
use tracing::{debug, info, trace};

use crate::{
    config::LinkParams,
    error::ProtocolError,
    node::{LinkId, NodeId, PortName, SlotIndex},
    protocol::{Action, Await, Protocol, Signal, Step, Wakeup},
    time::{SimTime, duration_nanos},
};

/// Which end of the link an instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Controls the link's pair source and chooses the start time
    Source {
        /// Source to enable and disable
        link: LinkId,
    },
    /// Follows the start time chosen by the source side
    Responder,
}

/// Link synchronization stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Constructed, not started
    Init,
    /// Source side: waiting for the first photon of the enabled source
    AwaitingFirstPhoton,
    /// Responder side: waiting for `(START, t)`
    AwaitingStart,
    /// Waiting for the agreed start time
    AwaitingWindowOpen,
    /// Window open: racing photon arrival against window expiry
    Attempting,
    /// Window closed, `END` sent: waiting for the peer's `END`
    AwaitingPeerEnd,
    /// Both sides agreed; terminal
    Entangled,
}

impl LinkState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::AwaitingFirstPhoton => "awaiting first photon",
            Self::AwaitingStart => "awaiting START",
            Self::AwaitingWindowOpen => "awaiting window open",
            Self::Attempting => "attempting",
            Self::AwaitingPeerEnd => "awaiting peer END",
            Self::Entangled => "entangled",
        }
    }
}

/// One end of a link synchronization pair.
#[derive(Debug, Clone)]
pub struct LinkSync {
    name: String,
    node: NodeId,
    role: LinkRole,
    slot: SlotIndex,
    qport: PortName,
    cport: PortName,
    params: LinkParams,
    state: LinkState,
    start_time: SimTime,
    window_end: SimTime,
    success_index: Option<u64>,
    slot_occupied: bool,
    windows_opened: u64,
}

impl LinkSync {
    /// Create an instance storing into `slot`, using the ports of network
    /// interface `nic`.
    pub fn new(
        name: impl Into<String>,
        node: NodeId,
        role: LinkRole,
        slot: SlotIndex,
        nic: usize,
        params: LinkParams,
    ) -> Self {
        Self {
            name: name.into(),
            node,
            role,
            slot,
            qport: PortName::quantum(nic),
            cport: PortName::classical(nic),
            params,
            state: LinkState::Init,
            start_time: SimTime::ZERO,
            window_end: SimTime::ZERO,
            success_index: None,
            slot_occupied: false,
            windows_opened: 0,
        }
    }

    /// Current stage.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Start of the current window.
    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    /// Expiry of the current window.
    pub fn window_end(&self) -> SimTime {
        self.window_end
    }

    /// Index latched in the current window, if any.
    pub fn success_index(&self) -> Option<u64> {
        self.success_index
    }

    /// Number of attempt windows opened since the last start.
    pub fn windows_opened(&self) -> u64 {
        self.windows_opened
    }

    /// Whether both peers agreed.
    pub fn is_entangled(&self) -> bool {
        self.state == LinkState::Entangled
    }

    /// Start time announced by the source side after its first photon at
    /// `now`: one propagation delay ahead, moved to one nanosecond before the
    /// second tick boundary past that point.
    pub fn announced_start(&self, now: SimTime) -> SimTime {
        let tick = duration_nanos(self.params.t_clock).max(1);
        let s = (now + self.params.propagation_delay()).as_nanos();
        SimTime::from_nanos(s.saturating_add(tick - s % tick).saturating_add(tick - 1))
    }

    /// Attempt index of an arrival at `now` in the current window.
    pub fn attempt_index(&self, now: SimTime) -> u64 {
        let tick = duration_nanos(self.params.t_clock).max(1);
        duration_nanos(now - self.start_time) / tick
    }

    /// Free the slot if this instance stored into it.
    fn release_slot(&mut self) -> Option<Action> {
        self.slot_occupied.then(|| {
            self.slot_occupied = false;
            Action::Free { slot: self.slot }
        })
    }

    fn attempt_race(&self) -> Await {
        Await::FirstOf(vec![Await::Port(self.qport), Await::Timer(self.window_end)])
    }

    fn open_window(&mut self, now: SimTime) -> Step {
        self.start_time = now;
        self.window_end = now + self.params.window_span();
        self.success_index = None;
        self.windows_opened += 1;
        self.state = LinkState::Attempting;

        debug!(
            link = %self.name,
            node = self.node,
            start_time = %self.start_time,
            window_end = %self.window_end,
            window = self.windows_opened,
            "attempt window opened"
        );

        Step::awaiting(vec![], self.attempt_race())
    }

    fn unexpected(&self, wakeup: &Wakeup) -> ProtocolError {
        ProtocolError::UnexpectedWakeup {
            protocol: self.name.clone(),
            stage: self.state.as_str(),
            wakeup: wakeup.to_string(),
        }
    }

    fn expect_tag(&self, message: &ClassicalMessage, tag: MessageTag) -> Result<(), ProtocolError> {
        if message.tag() == tag {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedMessage {
                protocol: self.name.clone(),
                expected: tag,
                got: message.tag(),
            })
        }
    }

    fn on_start_message(&mut self, message: &ClassicalMessage) -> Result<Step, ProtocolError> {
        self.expect_tag(message, MessageTag::Start)?;
        let start = SimTime::from_wire(message.value()).ok_or_else(|| {
            ProtocolError::InvalidValue {
                protocol: self.name.clone(),
                tag: MessageTag::Start,
                value: message.value(),
            }
        })?;

        debug!(link = %self.name, node = self.node, start_time = %start, "received START");
        self.start_time = start;
        self.state = LinkState::AwaitingWindowOpen;
        Ok(Step::awaiting(vec![], Await::Timer(start)))
    }

    fn on_peer_end(
        &mut self,
        message: &ClassicalMessage,
        now: SimTime,
    ) -> Result<Step, ProtocolError> {
        self.expect_tag(message, MessageTag::End)?;
        let other = message.end_index();

        match (self.success_index, other) {
            (Some(mine), Some(theirs)) if mine == theirs => {
                info!(
                    link = %self.name,
                    node = self.node,
                    index = mine,
                    windows = self.windows_opened,
                    "entanglement generation successful"
                );
                self.state = LinkState::Entangled;

                let mut actions = vec![Action::Emit(Signal::Entangled)];
                if let LinkRole::Source { link } = self.role {
                    actions.push(Action::DisableSource(link));
                }
                Ok(Step::done(actions))
            },
            (mine, theirs) => {
                debug!(
                    link = %self.name,
                    node = self.node,
                    local = ?mine,
                    peer = ?theirs,
                    "attempt indices disagree, retrying"
                );

                let mut actions: Vec<_> = self.release_slot().into_iter().collect();
                let mut step = self.open_window(now);
                actions.append(&mut step.actions);
                step.actions = actions;
                Ok(step)
            },
        }
    }
}

impl Protocol for LinkSync {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn start(&mut self, _now: SimTime) -> Result<Step, ProtocolError> {
        // A restart owns whatever the previous run left in the slot.
        let mut actions: Vec<_> = self.release_slot().into_iter().collect();
        self.start_time = SimTime::ZERO;
        self.window_end = SimTime::ZERO;
        self.success_index = None;
        self.windows_opened = 0;

        match self.role {
            LinkRole::Source { link } => {
                self.state = LinkState::AwaitingFirstPhoton;
                actions.push(Action::EnableSource(link));
                Ok(Step::awaiting(actions, Await::Port(self.qport)))
            },
            LinkRole::Responder => {
                self.state = LinkState::AwaitingStart;
                Ok(Step::awaiting(actions, Await::Port(self.cport)))
            },
        }
    }

    fn resume(&mut self, wakeup: Wakeup, now: SimTime) -> Result<Step, ProtocolError> {
        match (self.state, &wakeup) {
            (LinkState::AwaitingFirstPhoton, Wakeup::Photon { .. }) => {
                let start = self.announced_start(now);
                debug!(link = %self.name, node = self.node, start_time = %start, "sending START");

                self.start_time = start;
                self.state = LinkState::AwaitingWindowOpen;
                Ok(Step::awaiting(
                    vec![Action::Send {
                        port: self.cport,
                        message: ClassicalMessage::start(start.to_wire()),
                    }],
                    Await::Timer(start),
                ))
            },
            (LinkState::AwaitingStart, Wakeup::Message { message, .. }) => {
                self.on_start_message(message)
            },
            (LinkState::AwaitingWindowOpen, Wakeup::Timer { .. }) => Ok(self.open_window(now)),
            (LinkState::Attempting, Wakeup::Photon { qubit, .. }) => {
                if self.success_index.is_some() {
                    trace!(link = %self.name, node = self.node, "photon ignored, already latched");
                    return Ok(Step::awaiting(vec![], self.attempt_race()));
                }

                let index = self.attempt_index(now);
                debug!(link = %self.name, node = self.node, index, "latched photon");
                self.success_index = Some(index);
                self.slot_occupied = true;

                Ok(Step::awaiting(
                    vec![Action::Store { slot: self.slot, qubit: *qubit }],
                    self.attempt_race(),
                ))
            },
            (LinkState::Attempting, Wakeup::Timer { deadline }) if *deadline == self.window_end => {
                self.state = LinkState::AwaitingPeerEnd;
                Ok(Step::awaiting(
                    vec![Action::Send {
                        port: self.cport,
                        message: ClassicalMessage::end(self.success_index),
                    }],
                    Await::Port(self.cport),
                ))
            },
            (LinkState::AwaitingPeerEnd, Wakeup::Message { message, .. }) => {
                self.on_peer_end(message, now)
            },
            _ => Err(self.unexpected(&wakeup)),
        }
    }
}
