//! Discrete-event scheduler.
//!
//! Owns the logical clock, the classical fabric, the pair sources, the
//! quantum backend and every protocol instance. One [`Scheduler::step`] pops
//! the earliest event, advances the clock to its timestamp and resumes at
//! most one protocol (which may cascade into further events at the same
//! instant, all queued behind already-pending ones).
//!
//! # Delivery rules
//!
//! - Classical ports buffer: a message arriving with nobody waiting is kept
//!   in the port's FIFO inbox and handed over as soon as a protocol on that
//!   node awaits the port.
//! - Quantum ports do not buffer: a photon arriving with nobody waiting is
//!   lost.
//! - A signal reaches only protocols awaiting it at the moment of emission.
//! - Timers and operation completions belong to the suspension that created
//!   them. Leaving that suspension (for any reason) cancels them.

mod journal;
mod queue;

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    time::Duration,
};

use qrepeater_proto::ClassicalMessage;
use tracing::{debug, trace};

pub use self::{
    journal::{Journal, JournalEntry},
    queue::{Event, EventQueue},
};
use crate::{
    backend::{Arm, OpOutcome, QuantumBackend},
    error::RuntimeError,
    node::{LinkId, Node, NodeId, PortId, ProtocolId},
    protocol::{Action, Await, Protocol, Step, Suspend, Wakeup},
    source::PairSource,
    time::{SimTime, duration_nanos},
};

/// Where a protocol instance currently is, from the scheduler's viewpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolStatus {
    /// Installed, never started (or mid-transition)
    Idle,
    /// Parked on a suspension
    Waiting(Await),
    /// Terminated; dormant until restarted
    Done,
}

struct Entry {
    protocol: Box<dyn Protocol>,
    status: ProtocolStatus,
    generation: u64,
    pending_op: Option<(SimTime, OpOutcome)>,
}

struct SourceEntry {
    source: Box<dyn PairSource>,
    arm_a: PortId,
    arm_b: PortId,
    delay: Duration,
    enabled: bool,
    generation: u64,
}

/// Event loop driving protocols against a quantum backend.
pub struct Scheduler<B> {
    now: SimTime,
    queue: EventQueue,
    nodes: BTreeMap<NodeId, Node>,
    channels: HashMap<PortId, (PortId, Duration)>,
    inboxes: HashMap<PortId, VecDeque<ClassicalMessage>>,
    wired_quantum: HashSet<PortId>,
    sources: Vec<SourceEntry>,
    protocols: Vec<Option<Entry>>,
    backend: B,
    journal: Journal,
}

impl<B: QuantumBackend> Scheduler<B> {
    /// Empty scheduler at time zero.
    pub fn new(backend: B) -> Self {
        Self {
            now: SimTime::ZERO,
            queue: EventQueue::new(),
            nodes: BTreeMap::new(),
            channels: HashMap::new(),
            inboxes: HashMap::new(),
            wired_quantum: HashSet::new(),
            sources: Vec::new(),
            protocols: Vec::new(),
            backend,
            journal: Journal::default(),
        }
    }

    /// Current logical time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// History of the run so far.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// The quantum backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of events not yet processed.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Add a node.
    pub fn add_node(&mut self, node: Node) -> Result<(), RuntimeError> {
        if self.nodes.contains_key(&node.id()) {
            return Err(RuntimeError::DuplicateNode(node.id()));
        }
        self.nodes.insert(node.id(), node);
        Ok(())
    }

    fn check_port(&self, port: PortId, quantum: bool) -> Result<(), RuntimeError> {
        let node = self.nodes.get(&port.node).ok_or(RuntimeError::UnknownNode(port.node))?;
        if !node.has_port(port.port) || port.port.is_quantum() != quantum {
            return Err(RuntimeError::UnknownPort(port));
        }
        Ok(())
    }

    /// Connect two classical ports with a duplex channel of fixed `delay`.
    pub fn connect(&mut self, a: PortId, b: PortId, delay: Duration) -> Result<(), RuntimeError> {
        for port in [a, b] {
            self.check_port(port, false)?;
            if self.channels.contains_key(&port) {
                return Err(RuntimeError::PortInUse(port));
            }
        }
        if a == b {
            return Err(RuntimeError::PortInUse(a));
        }

        self.channels.insert(a, (b, delay));
        self.channels.insert(b, (a, delay));
        debug!(a = %a, b = %b, delay_ns = duration_nanos(delay), "classical channel connected");
        Ok(())
    }

    /// Attach a pair source whose arms reach `arm_a` and `arm_b` after
    /// `delay`. The source starts disabled.
    pub fn add_source(
        &mut self,
        source: Box<dyn PairSource>,
        arm_a: PortId,
        arm_b: PortId,
        delay: Duration,
    ) -> Result<LinkId, RuntimeError> {
        for port in [arm_a, arm_b] {
            self.check_port(port, true)?;
            if self.wired_quantum.contains(&port) {
                return Err(RuntimeError::PortInUse(port));
            }
        }
        if arm_a == arm_b {
            return Err(RuntimeError::PortInUse(arm_a));
        }

        self.wired_quantum.insert(arm_a);
        self.wired_quantum.insert(arm_b);
        let link = LinkId(self.sources.len());
        self.sources.push(SourceEntry {
            source,
            arm_a,
            arm_b,
            delay,
            enabled: false,
            generation: 0,
        });
        debug!(link = %link, arm_a = %arm_a, arm_b = %arm_b, "pair source attached");
        Ok(link)
    }

    /// Reserve a handle for a protocol installed later, so that instances
    /// referring to each other can be built.
    pub fn reserve(&mut self) -> ProtocolId {
        self.protocols.push(None);
        ProtocolId(self.protocols.len() - 1)
    }

    /// Install a protocol under a reserved handle.
    pub fn install(
        &mut self,
        id: ProtocolId,
        protocol: Box<dyn Protocol>,
    ) -> Result<(), RuntimeError> {
        if !self.nodes.contains_key(&protocol.node()) {
            return Err(RuntimeError::UnknownNode(protocol.node()));
        }
        let slot = self.protocols.get_mut(id.0).ok_or(RuntimeError::UnknownProtocol(id))?;
        *slot = Some(Entry {
            protocol,
            status: ProtocolStatus::Idle,
            generation: 0,
            pending_op: None,
        });
        Ok(())
    }

    /// Reserve a handle and install `protocol` under it.
    pub fn register(&mut self, protocol: Box<dyn Protocol>) -> Result<ProtocolId, RuntimeError> {
        let id = self.reserve();
        self.install(id, protocol)?;
        Ok(id)
    }

    /// Schedule a protocol to start at the current time.
    pub fn start(&mut self, id: ProtocolId) -> Result<(), RuntimeError> {
        self.entry(id)?;
        self.queue.push(self.now, Event::Start(id));
        Ok(())
    }

    /// Scheduler-side status of a protocol.
    pub fn status(&self, id: ProtocolId) -> Option<&ProtocolStatus> {
        self.protocols.get(id.0)?.as_ref().map(|e| &e.status)
    }

    /// Whether a protocol has terminated.
    pub fn is_done(&self, id: ProtocolId) -> bool {
        matches!(self.status(id), Some(ProtocolStatus::Done))
    }

    /// Installed protocol instance.
    pub fn protocol(&self, id: ProtocolId) -> Option<&dyn Protocol> {
        self.protocols.get(id.0)?.as_ref().map(|e| e.protocol.as_ref())
    }

    /// Process the earliest pending event.
    ///
    /// Returns `false` once the queue is empty.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        let Some((at, event)) = self.queue.pop() else {
            return Ok(false);
        };
        self.now = self.now.max(at);
        self.dispatch(event)?;
        Ok(true)
    }

    /// Process events until none remain.
    ///
    /// Never returns while a source stays enabled; use [`Self::run_until`]
    /// for open-ended runs.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.step()? {}
        Ok(())
    }

    /// Process every event at or before `deadline`, then advance the clock
    /// to `deadline`.
    pub fn run_until(&mut self, deadline: SimTime) -> Result<(), RuntimeError> {
        while self.queue.peek_time().is_some_and(|at| at <= deadline) {
            self.step()?;
        }
        self.now = self.now.max(deadline);
        Ok(())
    }

    fn entry(&self, id: ProtocolId) -> Result<&Entry, RuntimeError> {
        self.protocols
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(RuntimeError::UnknownProtocol(id))
    }

    fn entry_mut(&mut self, id: ProtocolId) -> Result<&mut Entry, RuntimeError> {
        self.protocols
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(RuntimeError::UnknownProtocol(id))
    }

    /// Whether `id` is parked on suspension `generation` and it satisfies
    /// `wants`.
    fn parked_on(
        &self,
        id: ProtocolId,
        generation: Option<u64>,
        wants: impl Fn(&Await) -> bool,
    ) -> bool {
        match self.protocols.get(id.0).and_then(Option::as_ref) {
            Some(Entry { status: ProtocolStatus::Waiting(until), generation: g, .. }) => {
                generation.is_none_or(|want| want == *g) && wants(until)
            },
            _ => false,
        }
    }

    /// First protocol on the port's node that awaits the port.
    fn awaiter_of(&self, port: PortId) -> Option<ProtocolId> {
        self.protocols.iter().enumerate().find_map(|(i, slot)| match slot {
            Some(Entry { protocol, status: ProtocolStatus::Waiting(until), .. })
                if protocol.node() == port.node && until.wants_port(port.port) =>
            {
                Some(ProtocolId(i))
            },
            _ => None,
        })
    }

    fn dispatch(&mut self, event: Event) -> Result<(), RuntimeError> {
        match event {
            Event::Start(id) => self.start_now(id),
            Event::Signal { to, sender, signal } => {
                if self.parked_on(to, None, |a| a.wants_signal(sender, signal.kind())) {
                    self.resume(to, Wakeup::Signal { sender, signal })
                } else {
                    trace!(to = %to, sender = %sender, ?signal, "signal no longer awaited");
                    Ok(())
                }
            },
            Event::Timer { protocol, generation, deadline } => {
                let wants = |a: &Await| a.deadlines().contains(&deadline);
                if self.parked_on(protocol, Some(generation), wants) {
                    self.resume(protocol, Wakeup::Timer { deadline })
                } else {
                    Ok(())
                }
            },
            Event::OpComplete { protocol, generation } => {
                if !self.parked_on(protocol, Some(generation), Await::wants_op) {
                    return Ok(());
                }
                let (_, outcome) = self
                    .entry_mut(protocol)?
                    .pending_op
                    .take()
                    .ok_or(RuntimeError::NoPendingOp(protocol))?;
                self.resume(protocol, Wakeup::QuantumOp(outcome))
            },
            Event::Deliver { to, frame } => {
                let message = ClassicalMessage::decode(&frame)?;
                trace!(port = %to, message = %message, "classical message delivered");

                let inbox = self.inboxes.entry(to).or_default();
                inbox.push_back(message);
                let Some(id) = self.awaiter_of(to) else {
                    return Ok(());
                };
                match self.inboxes.get_mut(&to).and_then(VecDeque::pop_front) {
                    Some(message) => self.resume(id, Wakeup::Message { port: to.port, message }),
                    None => Ok(()),
                }
            },
            Event::Photon { to, qubit } => {
                if let Some(id) = self.awaiter_of(to) {
                    self.resume(id, Wakeup::Photon { port: to.port, qubit })
                } else {
                    trace!(port = %to, pair = qubit.pair, "photon lost, nobody listening");
                    Ok(())
                }
            },
            Event::SourceTick { link, generation } => self.fire_source(link, generation),
        }
    }

    fn start_now(&mut self, id: ProtocolId) -> Result<(), RuntimeError> {
        let now = self.now;
        let entry = self.entry_mut(id)?;
        entry.generation += 1;
        entry.pending_op = None;
        entry.status = ProtocolStatus::Idle;
        debug!(
            protocol = entry.protocol.name(),
            node = entry.protocol.node(),
            at = %now,
            "protocol started"
        );

        let step = entry.protocol.start(now)?;
        self.apply(id, step)
    }

    fn resume(&mut self, id: ProtocolId, wakeup: Wakeup) -> Result<(), RuntimeError> {
        let now = self.now;
        let entry = self.entry_mut(id)?;
        entry.status = ProtocolStatus::Idle;
        trace!(protocol = entry.protocol.name(), wakeup = %wakeup, "resuming");

        let step = entry.protocol.resume(wakeup, now)?;
        self.apply(id, step)
    }

    fn apply(&mut self, id: ProtocolId, mut step: Step) -> Result<(), RuntimeError> {
        let node = self.entry(id)?.protocol.node();
        loop {
            for action in std::mem::take(&mut step.actions) {
                self.execute(id, node, action)?;
            }

            let until = match step.suspend {
                Suspend::Done => {
                    let entry = self.entry_mut(id)?;
                    entry.status = ProtocolStatus::Done;
                    entry.generation += 1;
                    self.journal.record(JournalEntry::Finished { at: self.now, protocol: id });
                    return Ok(());
                },
                Suspend::Await(until) => until,
            };

            // Buffered classical input resumes straight away.
            let buffered = until.classical_ports().into_iter().find_map(|port| {
                let port = PortId::new(node, port);
                self.inboxes.get_mut(&port).and_then(VecDeque::pop_front).map(|m| (port.port, m))
            });
            let Some((port, message)) = buffered else {
                return self.suspend(id, until);
            };

            let now = self.now;
            step = self.entry_mut(id)?.protocol.resume(Wakeup::Message { port, message }, now)?;
        }
    }

    fn suspend(&mut self, id: ProtocolId, until: Await) -> Result<(), RuntimeError> {
        let now = self.now;
        let entry = self.entry_mut(id)?;
        entry.generation += 1;
        let generation = entry.generation;

        let op_at = if until.wants_op() {
            let (at, _) = entry.pending_op.ok_or(RuntimeError::NoPendingOp(id))?;
            Some(at.max(now))
        } else {
            None
        };
        let deadlines = until.deadlines();
        entry.status = ProtocolStatus::Waiting(until);

        if let Some(at) = op_at {
            self.queue.push(at, Event::OpComplete { protocol: id, generation });
        }
        for deadline in deadlines {
            self.queue.push(deadline.max(now), Event::Timer { protocol: id, generation, deadline });
        }
        Ok(())
    }

    fn execute(
        &mut self,
        id: ProtocolId,
        node: NodeId,
        action: Action,
    ) -> Result<(), RuntimeError> {
        let now = self.now;
        match action {
            Action::Send { port, message } => {
                let from = PortId::new(node, port);
                let &(to, delay) = self.channels.get(&from).ok_or(RuntimeError::NoChannel(from))?;
                let frame = message.encode()?;
                trace!(from = %from, to = %to, message = %message, "classical message sent");
                self.queue.push(now + delay, Event::Deliver { to, frame });
            },
            Action::Emit(signal) => {
                self.journal.record(JournalEntry::Signal { at: now, sender: id, node, signal });
                let kind = signal.kind();
                let awaiters: Vec<ProtocolId> = self
                    .protocols
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| match slot {
                        Some(Entry { status: ProtocolStatus::Waiting(until), .. })
                            if until.wants_signal(id, kind) =>
                        {
                            Some(ProtocolId(i))
                        },
                        _ => None,
                    })
                    .collect();
                for to in awaiters {
                    self.queue.push(now, Event::Signal { to, sender: id, signal });
                }
            },
            Action::Start(target) => {
                self.entry(target)?;
                self.queue.push(now, Event::Start(target));
            },
            Action::EnableSource(link) => {
                let entry = self.sources.get_mut(link.0).ok_or(RuntimeError::UnknownLink(link))?;
                entry.enabled = true;
                entry.generation += 1;
                let first = now.align_up(entry.source.period());
                let generation = entry.generation;
                debug!(link = %link, first_tick = %first, "source enabled");
                self.queue.push(first, Event::SourceTick { link, generation });
            },
            Action::DisableSource(link) => {
                let entry = self.sources.get_mut(link.0).ok_or(RuntimeError::UnknownLink(link))?;
                entry.enabled = false;
                entry.generation += 1;
                debug!(link = %link, "source disabled");
            },
            Action::Store { slot, qubit } => self.backend.put(node, slot, qubit)?,
            Action::Free { slot } => {
                self.backend.pop(node, slot)?;
            },
            Action::Apply { op, slots } => {
                let outcome = self.backend.apply_op(node, op, &slots)?;
                let done_at = now + self.backend.op_duration(op);
                trace!(node, %op, ?slots, ?outcome, done_at = %done_at, "quantum operation issued");
                self.entry_mut(id)?.pending_op = Some((done_at, outcome));
            },
            Action::Report(report) => {
                self.journal.record(JournalEntry::Report { at: now, protocol: id, node, report });
            },
        }
        Ok(())
    }

    fn fire_source(&mut self, link: LinkId, generation: u64) -> Result<(), RuntimeError> {
        let now = self.now;
        let entry = self.sources.get_mut(link.0).ok_or(RuntimeError::UnknownLink(link))?;
        if !entry.enabled || entry.generation != generation {
            return Ok(());
        }

        let emissions = entry.source.emit(now);
        let arrival = now + entry.delay;
        let period = Duration::from_nanos(duration_nanos(entry.source.period()).max(1));
        let (arm_a, arm_b) = (entry.arm_a, entry.arm_b);

        for emission in emissions {
            let to = match emission.qubit.arm {
                Arm::A => arm_a,
                Arm::B => arm_b,
            };
            self.queue.push(arrival, Event::Photon { to, qubit: emission.qubit });
        }
        self.queue.push(now + period, Event::SourceTick { link, generation });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use qrepeater_proto::MessageTag;

    use super::*;
    use crate::{
        backend::{QuantumOp, Qubit},
        config::LinkParams,
        error::{BackendError, ProtocolError},
        link::{LinkRole, LinkSync},
        node::{NodeKind, PortName, SlotIndex},
        protocol::{Signal, SignalKind},
        source::Emission,
    };

    /// Slot bookkeeping only: every op yields bit 1 after 3ns.
    #[derive(Default)]
    struct NullBackend {
        stored: Vec<(NodeId, SlotIndex, Qubit)>,
    }

    impl QuantumBackend for NullBackend {
        fn put(&mut self, node: NodeId, slot: SlotIndex, qubit: Qubit) -> Result<(), BackendError> {
            if self.peek(node, slot).is_some() {
                return Err(BackendError::SlotOccupied { node, slot });
            }
            self.stored.push((node, slot, qubit));
            Ok(())
        }

        fn pop(&mut self, node: NodeId, slot: SlotIndex) -> Result<Qubit, BackendError> {
            let pos = self
                .stored
                .iter()
                .position(|&(n, s, _)| n == node && s == slot)
                .ok_or(BackendError::SlotEmpty { node, slot })?;
            Ok(self.stored.remove(pos).2)
        }

        fn peek(&self, node: NodeId, slot: SlotIndex) -> Option<Qubit> {
            self.stored.iter().find(|&&(n, s, _)| n == node && s == slot).map(|&(_, _, q)| q)
        }

        fn apply_op(
            &mut self,
            _: NodeId,
            _: QuantumOp,
            _: &[SlotIndex],
        ) -> Result<OpOutcome, BackendError> {
            Ok(OpOutcome::Bit(1))
        }

        fn op_duration(&self, _: QuantumOp) -> Duration {
            Duration::from_nanos(3)
        }
    }

    /// Emits both arms of a fresh pair on every tick.
    struct EveryTick {
        period: Duration,
        pairs: u64,
    }

    impl PairSource for EveryTick {
        fn period(&self) -> Duration {
            self.period
        }

        fn emit(&mut self, _now: SimTime) -> Vec<Emission> {
            self.pairs += 1;
            vec![
                Emission { qubit: Qubit::new(self.pairs, Arm::A) },
                Emission { qubit: Qubit::new(self.pairs, Arm::B) },
            ]
        }
    }

    type Log = Rc<RefCell<Vec<(u64, String)>>>;

    /// Replays a fixed list of steps and logs every wakeup.
    struct Scripted {
        name: String,
        node: NodeId,
        start: Step,
        script: VecDeque<Step>,
        log: Log,
    }

    impl Scripted {
        fn new(name: &str, node: NodeId, start: Step, script: Vec<Step>, log: &Log) -> Box<Self> {
            Box::new(Self {
                name: name.into(),
                node,
                start,
                script: script.into(),
                log: Rc::clone(log),
            })
        }
    }

    impl Protocol for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn node(&self) -> NodeId {
            self.node
        }

        fn start(&mut self, now: SimTime) -> Result<Step, ProtocolError> {
            self.log.borrow_mut().push((now.as_nanos(), format!("{} start", self.name)));
            Ok(self.start.clone())
        }

        fn resume(&mut self, wakeup: Wakeup, now: SimTime) -> Result<Step, ProtocolError> {
            self.log.borrow_mut().push((now.as_nanos(), format!("{} {wakeup}", self.name)));
            Ok(self.script.pop_front().unwrap_or_else(|| Step::done(vec![])))
        }
    }

    fn two_endpoints() -> Scheduler<NullBackend> {
        let mut sched = Scheduler::new(NullBackend::default());
        sched.add_node(Node::new(1, "a", NodeKind::Endpoint)).unwrap();
        sched.add_node(Node::new(2, "b", NodeKind::Endpoint)).unwrap();
        let (a, b) = (PortId::new(1, PortName::C0), PortId::new(2, PortName::C0));
        sched.connect(a, b, Duration::from_nanos(10)).unwrap();
        sched
    }

    fn entries(log: &Log) -> Vec<(u64, String)> {
        log.borrow().clone()
    }

    #[test]
    fn simultaneous_signals_resume_in_scheduling_order() {
        let mut sched = two_endpoints();
        let log = Log::default();

        let emitter = sched.reserve();
        let wait =
            Step::awaiting(vec![], Await::Signal { sender: emitter, kind: SignalKind::Entangled });
        let first = sched.register(Scripted::new("first", 1, wait.clone(), vec![], &log)).unwrap();
        let second = sched.register(Scripted::new("second", 2, wait, vec![], &log)).unwrap();
        let emit = Step::done(vec![Action::Emit(Signal::Entangled)]);
        sched.install(emitter, Scripted::new("emitter", 1, emit, vec![], &log)).unwrap();

        sched.start(first).unwrap();
        sched.start(second).unwrap();
        sched.start(emitter).unwrap();
        sched.run().unwrap();

        let names: Vec<String> = entries(&log).into_iter().map(|(_, s)| s).collect();
        assert_eq!(names[3], format!("first signal Entangled from {emitter}"));
        assert_eq!(names[4], format!("second signal Entangled from {emitter}"));
        assert!(sched.is_done(first) && sched.is_done(second) && sched.is_done(emitter));
    }

    #[test]
    fn signal_before_await_is_not_delivered() {
        let mut sched = two_endpoints();
        let log = Log::default();

        let emit = Step::done(vec![Action::Emit(Signal::ReadyToSwap)]);
        let emitter = sched.register(Scripted::new("emitter", 1, emit, vec![], &log)).unwrap();
        let ready = Await::Signal { sender: emitter, kind: SignalKind::ReadyToSwap };
        let wait = Step::awaiting(vec![], ready);
        let late = sched.register(Scripted::new("late", 2, wait, vec![], &log)).unwrap();

        sched.start(emitter).unwrap();
        sched.run().unwrap();
        sched.start(late).unwrap();
        sched.run().unwrap();

        assert!(matches!(sched.status(late), Some(ProtocolStatus::Waiting(_))));
        assert_eq!(sched.journal().signals_from(emitter).len(), 1);
    }

    #[test]
    fn classical_messages_are_buffered_until_awaited() {
        let mut sched = two_endpoints();
        let log = Log::default();

        let sender = sched
            .register(Scripted::new(
                "sender",
                1,
                Step::done(vec![
                    Action::Send { port: PortName::C0, message: ClassicalMessage::start(5) },
                    Action::Send { port: PortName::C0, message: ClassicalMessage::end(Some(2)) },
                ]),
                vec![],
                &log,
            ))
            .unwrap();
        let receiver = sched
            .register(Scripted::new(
                "receiver",
                2,
                Step::awaiting(vec![], Await::Timer(SimTime::from_nanos(50))),
                vec![
                    Step::awaiting(vec![], Await::Port(PortName::C0)),
                    Step::awaiting(vec![], Await::Port(PortName::C0)),
                ],
                &log,
            ))
            .unwrap();

        sched.start(sender).unwrap();
        sched.start(receiver).unwrap();
        sched.run().unwrap();

        let log = entries(&log);
        assert_eq!(log[2], (50, "receiver timer at 50ns".to_string()));
        assert_eq!(log[3].0, 50);
        assert!(log[3].1.contains(MessageTag::Start.as_str()));
        assert!(log[4].1.contains(MessageTag::End.as_str()));
        assert!(sched.is_done(receiver));
    }

    #[test]
    fn photons_without_listener_are_lost() {
        let mut sched = two_endpoints();
        let log = Log::default();
        let link = sched
            .add_source(
                Box::new(EveryTick { period: Duration::from_nanos(10), pairs: 0 }),
                PortId::new(1, PortName::Q0),
                PortId::new(2, PortName::Q0),
                Duration::from_nanos(2),
            )
            .unwrap();

        // Only node 1 listens; node 2's arm of pair 1 is dropped.
        let listener = sched
            .register(Scripted::new(
                "listener",
                1,
                Step::awaiting(vec![Action::EnableSource(link)], Await::Port(PortName::Q0)),
                vec![Step::done(vec![Action::DisableSource(link)])],
                &log,
            ))
            .unwrap();

        sched.start(listener).unwrap();
        sched.run().unwrap();

        assert_eq!(
            entries(&log),
            vec![(0, "listener start".into()), (2, "listener photon on q0".into())]
        );
        assert_eq!(sched.pending_events(), 0);
    }

    #[test]
    fn stale_timer_does_not_fire() {
        let mut sched = two_endpoints();
        let log = Log::default();

        let racer = sched
            .register(Scripted::new(
                "racer",
                2,
                Step::awaiting(
                    vec![],
                    Await::FirstOf(vec![
                        Await::Port(PortName::C0),
                        Await::Timer(SimTime::from_nanos(100)),
                    ]),
                ),
                vec![Step::awaiting(vec![], Await::Timer(SimTime::from_nanos(200)))],
                &log,
            ))
            .unwrap();
        let send = Action::Send { port: PortName::C0, message: ClassicalMessage::start(1) };
        let done = Step::done(vec![send]);
        let sender = sched.register(Scripted::new("sender", 1, done, vec![], &log)).unwrap();

        sched.start(racer).unwrap();
        sched.start(sender).unwrap();
        sched.run().unwrap();

        let times: Vec<u64> = entries(&log).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0, 0, 10, 200]);
        assert_eq!(sched.now(), SimTime::from_nanos(200));
    }

    #[test]
    fn quantum_op_completes_after_its_duration() {
        let mut sched = two_endpoints();
        let log = Log::default();
        let apply = Action::Apply { op: QuantumOp::Purify, slots: vec![0, 1] };
        let id = sched
            .register(Scripted::new(
                "op",
                1,
                Step::awaiting(vec![apply], Await::QuantumOp),
                vec![],
                &log,
            ))
            .unwrap();

        sched.start(id).unwrap();
        sched.run().unwrap();

        assert_eq!(entries(&log)[1], (3, "op quantum op outcome Bit(1)".into()));
    }

    #[test]
    fn awaiting_an_op_never_issued_fails() {
        let mut sched = two_endpoints();
        let log = Log::default();
        let wait = Step::awaiting(vec![], Await::QuantumOp);
        let id = sched.register(Scripted::new("op", 1, wait, vec![], &log)).unwrap();

        sched.start(id).unwrap();
        assert!(matches!(sched.run(), Err(RuntimeError::NoPendingOp(p)) if p == id));
    }

    #[test]
    fn wiring_is_validated() {
        let mut sched = two_endpoints();
        let c1 = PortId::new(1, PortName::C1);

        assert!(matches!(
            sched.connect(c1, PortId::new(2, PortName::C0), Duration::ZERO),
            Err(RuntimeError::UnknownPort(_))
        ));
        let (a, b) = (PortId::new(1, PortName::C0), PortId::new(2, PortName::C0));
        assert!(matches!(sched.connect(a, b, Duration::ZERO), Err(RuntimeError::PortInUse(_))));
        assert!(matches!(
            sched.add_node(Node::new(1, "again", NodeKind::Repeater)),
            Err(RuntimeError::DuplicateNode(1))
        ));
        assert!(matches!(sched.start(ProtocolId(9)), Err(RuntimeError::UnknownProtocol(_))));
    }

    #[test]
    fn restarted_links_reuse_their_slots() {
        let mut sched = two_endpoints();
        let link = sched
            .add_source(
                Box::new(EveryTick { period: Duration::from_nanos(10), pairs: 0 }),
                PortId::new(1, PortName::Q0),
                PortId::new(2, PortName::Q0),
                Duration::from_nanos(2),
            )
            .unwrap();
        let params = LinkParams {
            k_attempts: 5,
            t_clock: Duration::from_nanos(10),
            link_length_km: 0.002,
            window_grace: Duration::from_nanos(5),
        };
        let a = sched
            .register(Box::new(LinkSync::new("MS0", 1, LinkRole::Source { link }, 0, 0, params)))
            .unwrap();
        let b = sched
            .register(Box::new(LinkSync::new("MS0", 2, LinkRole::Responder, 0, 0, params)))
            .unwrap();

        sched.start(a).unwrap();
        sched.start(b).unwrap();
        sched.run_until(SimTime::from_nanos(1_000)).unwrap();
        assert!(sched.is_done(a) && sched.is_done(b));

        // Both slots are still held; a restart must free them before storing again
        sched.start(a).unwrap();
        sched.start(b).unwrap();
        sched.run_until(SimTime::from_nanos(2_000)).unwrap();

        assert!(sched.is_done(a) && sched.is_done(b));
        assert_eq!(sched.journal().signals_from(a).len(), 2);
        let slots: Vec<_> = sched.backend().stored.iter().map(|&(n, s, _)| (n, s)).collect();
        assert_eq!(slots.len(), 2);
        assert!(slots.contains(&(1, 0)) && slots.contains(&(2, 0)));
    }

    #[test]
    fn run_until_stops_at_deadline() {
        let mut sched = two_endpoints();
        let log = Log::default();
        let id = sched
            .register(Scripted::new(
                "sleeper",
                1,
                Step::awaiting(vec![], Await::Timer(SimTime::from_nanos(100))),
                vec![],
                &log,
            ))
            .unwrap();

        sched.start(id).unwrap();
        sched.run_until(SimTime::from_nanos(60)).unwrap();
        assert_eq!(sched.now(), SimTime::from_nanos(60));
        assert!(!sched.is_done(id));

        sched.run_until(SimTime::from_nanos(100)).unwrap();
        assert!(sched.is_done(id));
    }
}
