//! The node state machine: ingests messages and timeouts, owns `State`, and drives the
//! Chord protocol. Grounded on `examples/original_source/systems/chord/node.py`'s `Node`
//! class (`start_handler`, `recv_handler`, `timeout_handler`, `end_query`, `try_rectify`,
//! `start_query`, `main_loop`) — this module is a near-direct structural translation,
//! since the spec itself is this file's contract.

use crate::clock::{Clock, Instant};
use crate::error::{ConfigError, NodeError};
use crate::message::Message;
use crate::pointer::Pointer;
use crate::protocol;
use crate::query::{Action, Query};
use crate::state::{NodeConfig, State};
use crate::transport::Transport;

/// Checks I1, I4-I6 against a state a handler is about to return. `debug_assert!`-only: a
/// violation indicates a state-machine bug, so this is a no-op in release builds exactly
/// like every other `debug_assert!` in the crate.
///
/// I2 (at most one query in flight) isn't checked here — it's enforced at the type level
/// by `State::query: Option<Query>` plus `start_query` only ever setting it from `None`,
/// so there is no reachable state for this function to reject.
///
/// I3 (joined implies non-empty succ_list) isn't checked here either: a node that loses
/// every successor halts stabilize in that exact state by design (Open Question (a) in
/// DESIGN.md), so `joined && succ_list.is_empty()` is a real, reachable, documented state
/// rather than a bug — asserting it would panic on the one failure mode this design
/// explicitly tolerates. It's covered instead by the scenario tests in
/// `tests/chord_protocol.rs`, which check recovery once a successor reappears.
fn check_invariants(state: &State) {
    debug_assert_eq!(
        state.query.is_some(),
        state.query_sent.is_some(),
        "I1: query and query_sent must agree on whether a query is in flight"
    );

    // The self-ring is the one legitimate exception to "no self, no duplicates" (I4, I5):
    // a solo node's succ_list/pred both point back at itself by construction.
    let alone = state.succ_list.iter().all(|p| p.id == state.ptr.id);
    if !alone {
        let mut seen = std::collections::HashSet::new();
        for p in &state.succ_list {
            debug_assert_ne!(p.id, state.ptr.id, "I4: succ_list must not contain ptr");
            debug_assert!(seen.insert(p.id), "I4: succ_list must not contain duplicates");
        }
        if let Some(pred) = state.pred {
            debug_assert_ne!(
                pred.id, state.ptr.id,
                "I5: pred must not be ptr unless the node is alone in the ring"
            );
        }
    }

    if state.rectify_with.is_some() {
        debug_assert!(
            state.query.is_some(),
            "I6: rectify_with must be drained whenever the query slot is free"
        );
    }
}

/// Starts tracking `query`, enforcing I2 (at most one query in flight) at the type level:
/// this is the only place `state.query` goes from `None` to `Some`.
fn start_query(
    mut state: State,
    query: Query,
    now: Instant,
) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    if let Some(existing) = &state.query {
        return Err(NodeError::InterruptedQuery(existing.dst));
    }
    log::debug!("starting query to {}: {:?}", query.dst, query.msg);
    let dst = query.dst;
    let msg = query.msg.clone();
    state.query = Some(query);
    state.query_sent = Some(now);
    check_invariants(&state);
    Ok((vec![(dst, msg)], state))
}

/// Completes the in-flight query (on a matching response, or on timeout when `msg` is
/// `None`), runs its continuation, and interprets the resulting `Action`.
fn end_query(
    mut state: State,
    msg: Option<Message>,
    now: Instant,
) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    let query = state
        .query
        .take()
        .expect("end_query called with no in-flight query");
    state.query_sent = None;
    match &msg {
        Some(_) => log::debug!("query to {} completed", query.dst),
        None => log::debug!("query to {} timed out", query.dst),
    }
    let (action, state) = query.cb.invoke(state, msg);
    let result = match action {
        Action::None => {
            if state.joined {
                try_rectify(state, now)
            } else {
                Ok((vec![], state))
            }
        }
        Action::Query(next) => start_query(state, next, now),
        Action::Sends(sends) => {
            if state.joined {
                let (rectify_sends, state) = try_rectify(state, now)?;
                let mut all = sends;
                all.extend(rectify_sends);
                Ok((all, state))
            } else {
                Ok((sends, state))
            }
        }
    };
    if let Ok((_, state)) = &result {
        check_invariants(state);
    }
    result
}

/// Runs the pending rectify check, if any, now that the query slot is free (I6).
fn try_rectify(mut state: State, now: Instant) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    let notifier = match state.rectify_with.take() {
        None => {
            check_invariants(&state);
            return Ok((vec![], state));
        }
        Some(notifier) => notifier,
    };
    if let Some(existing) = &state.query {
        return Err(NodeError::InterruptedQuery(existing.dst));
    }
    let result = match state.pred {
        None => {
            log::debug!("adopting {} as predecessor (had none)", notifier);
            state.pred = Some(notifier);
            Ok((vec![], state))
        }
        Some(pred) => {
            let query = protocol::rectify_query(pred, notifier);
            start_query(state, query, now)
        }
    };
    if let Ok((_, state)) = &result {
        check_invariants(state);
    }
    result
}

/// Dispatches an inbound message (spec §4.4's `recv_handler` table).
fn recv_handler(
    mut state: State,
    src: Pointer,
    msg: Message,
    now: Instant,
) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    let result = match &msg {
        Message::GetBestPredecessor(id) => {
            let best = protocol::best_predecessor(&state, *id);
            Ok((vec![(src, Message::GotBestPredecessor(best))], state))
        }
        Message::GetSuccList => {
            let list = state.succ_list.iter().copied().collect();
            Ok((vec![(src, Message::GotSuccList(list))], state))
        }
        Message::GetPredAndSuccs => {
            let list = state.succ_list.iter().copied().collect();
            Ok((vec![(src, Message::GotPredAndSuccs(state.pred, list))], state))
        }
        Message::Ping => Ok((vec![(src, Message::Pong)], state)),
        Message::Notify => {
            state.rectify_with = Some(src);
            if state.query.is_none() {
                try_rectify(state, now)
            } else {
                Ok((vec![], state))
            }
        }
        _ => {
            let matches_in_flight = state
                .query
                .as_ref()
                .map(|q| q.matches(src, &msg))
                .unwrap_or(false);
            if matches_in_flight {
                end_query(state, Some(msg), now)
            } else {
                Err(NodeError::UnexpectedMessage { from: src, message: msg })
            }
        }
    };
    if let Ok((_, state)) = &result {
        check_invariants(state);
    }
    result
}

/// Drives a stabilize round, a join retry, or a query timeout (spec §4.4's
/// `timeout_handler`).
fn timeout_handler(
    mut state: State,
    now: Instant,
    query_timeout: std::time::Duration,
) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    let result = if state.query.is_none() {
        if state.joined {
            state.last_stabilize = now;
            match state.succ_list.first().copied() {
                Some(succ) => start_query(state, protocol::stabilize_query(succ), now),
                None => {
                    log::warn!("succ_list empty while joined; halting stabilize until a notify repopulates it");
                    Ok((vec![], state))
                }
            }
        } else {
            let known = state.known.ok_or(ConfigError::MissingBootstrapPeer)?;
            start_query(state, protocol::join_query(known, state.ptr.id), now)
        }
    } else if now.duration_since(state.query_sent.expect("I1: query implies query_sent")) > query_timeout {
        end_query(state, None, now)
    } else {
        Ok((vec![], state))
    };
    if let Ok((_, state)) = &result {
        check_invariants(state);
    }
    result
}

/// Builds the initial state transition at startup (spec §4.4's `start_handler`).
fn start_handler(
    mut state: State,
    known: Option<Pointer>,
    now: Instant,
    stabilize_interval: std::time::Duration,
) -> Result<(Vec<(Pointer, Message)>, State), NodeError> {
    let result = if !state.succ_list.is_empty() {
        state.last_stabilize = now;
        Ok((vec![], state))
    } else {
        let known = known.ok_or(ConfigError::MissingBootstrapPeer)?;
        state.known = Some(known);
        state.last_stabilize = now - stabilize_interval;
        start_query(state, protocol::join_query(known, state.ptr.id), now)
    };
    if let Ok((_, state)) = &result {
        check_invariants(state);
    }
    result
}

/// A Chord node: owns `State`, a `Transport`, and a `Clock`, and drives the protocol
/// forward one event at a time.
pub struct Node<T: Transport, C: Clock> {
    state: State,
    transport: T,
    clock: C,
    config: NodeConfig,
    started: bool,
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// A brand-new, unjoined node that will bootstrap through a `known` peer at `start`.
    pub fn new(ptr: Pointer, config: NodeConfig, transport: T, clock: C) -> Self {
        let now = clock.now();
        Node {
            state: State::new(ptr, config.succ_list_len, now),
            transport,
            clock,
            config,
            started: false,
        }
    }

    /// A node pre-seeded with a predecessor and successor list, skipping join. Used for
    /// standing up the first member of a ring, and by tests.
    pub fn new_seeded(
        ptr: Pointer,
        pred: Pointer,
        succ_list: Vec<Pointer>,
        config: NodeConfig,
        transport: T,
        clock: C,
    ) -> Result<Self, ConfigError> {
        let now = clock.now();
        let state = State::seeded(ptr, pred, succ_list, config.succ_list_len, now)?;
        Ok(Node {
            state,
            transport,
            clock,
            config,
            started: false,
        })
    }

    pub fn ptr(&self) -> Pointer {
        self.state.ptr
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Starts the transport and issues the initial join (or, for a pre-seeded node, just
    /// arms the stabilize clock). `known` must be non-null unless the node was constructed
    /// with `new_seeded`.
    pub fn start(&mut self, known: Option<Pointer>) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::Config(ConfigError::AlreadyStarted));
        }
        self.started = true;
        self.transport.start()?;
        let now = self.clock.now();
        let state = std::mem::replace(&mut self.state, dummy_state());
        let (sends, state) = start_handler(state, known, now, self.config.stabilize_interval)?;
        self.state = state;
        self.send_all(sends);
        Ok(())
    }

    fn send_all(&self, sends: Vec<(Pointer, Message)>) {
        for (dst, msg) in sends {
            self.transport.send(dst, msg);
        }
    }

    /// One iteration of the main loop: a timeout check gated the same way the reference
    /// implementation gates it (see DESIGN.md, Open Question (c)), followed by a single
    /// non-blocking transport poll. Recoverable errors (`UnexpectedMessage`) are logged
    /// and swallowed; fatal errors are returned.
    pub fn run_once(&mut self) -> Result<(), NodeError> {
        let now = self.clock.now();
        if now.duration_since(self.state.last_stabilize) > self.config.stabilize_interval {
            let state = std::mem::replace(&mut self.state, dummy_state());
            match timeout_handler(state, now, self.config.query_timeout) {
                Ok((sends, state)) => {
                    self.state = state;
                    self.send_all(sends);
                }
                Err(e) => {
                    log::error!("fatal error in timeout_handler: {}", e);
                    return Err(e);
                }
            }
        }

        if let Some((src, msg)) = self.transport.recv() {
            let now = self.clock.now();
            let state = std::mem::replace(&mut self.state, dummy_state());
            match recv_handler(state, src, msg, now) {
                Ok((sends, state)) => {
                    self.state = state;
                    self.send_all(sends);
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!("{}", e);
                }
                Err(e) => {
                    log::error!("fatal error in recv_handler: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Runs `run_once` forever. Only returns on a fatal `NodeError`.
    pub fn main_loop(&mut self) -> Result<(), NodeError> {
        loop {
            self.run_once()?;
        }
    }
}

/// A placeholder swapped in while a handler owns the real `State` by value; every call
/// site immediately overwrites it with the handler's returned state, so it is never
/// observed.
fn dummy_state() -> State {
    let addr: std::net::SocketAddr = "0.0.0.0:0".parse().unwrap();
    State::new(Pointer::new(addr), 0, Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::transport::Network;
    use std::net::SocketAddr;
    use std::rc::Rc;
    use std::time::Duration;

    fn ptr(port: u16) -> Pointer {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        Pointer::new(addr)
    }

    fn config() -> NodeConfig {
        NodeConfig {
            stabilize_interval: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            succ_list_len: 2,
        }
    }

    #[test]
    fn solo_ring_stays_stable_after_startup() {
        let network = Network::new();
        let a = ptr(7001);
        let transport = network.transport(a);
        let clock = FakeClock::new();
        let mut node =
            Node::new_seeded(a, a, vec![a, a], config(), transport, clock).unwrap();
        node.start(None).unwrap();
        node.run_once().unwrap();
        assert!(node.state().joined);
        assert_eq!(node.state().pred, Some(a));
    }

    #[test]
    fn unexpected_message_is_recoverable() {
        let b = ptr(7011);
        let state = State::new(ptr(7010), 2, Instant::now());
        // A GotSuccList with no in-flight query matching it is unexpected.
        let result = recv_handler(state, b, Message::GotSuccList(vec![b]), Instant::now());
        match result {
            Err(NodeError::UnexpectedMessage { .. }) => {}
            other => panic!("expected UnexpectedMessage, got {:?}", other),
        }
    }

    #[test]
    fn two_node_join_converges_after_one_stabilize_cycle() {
        let network = Network::new();
        let a = ptr(7020);
        let b = ptr(7021);
        let clock = Rc::new(FakeClock::new());

        let mut node_a =
            Node::new_seeded(a, a, vec![a, a], config(), network.transport(a), clock.clone()).unwrap();
        node_a.start(None).unwrap();

        let mut node_b = Node::new(b, config(), network.transport(b), clock.clone());
        node_b.start(Some(a)).unwrap();

        // Drain B's join (best-predecessor round trip through A, then get_succ_list twice).
        for _ in 0..8 {
            node_b.run_once().unwrap();
            node_a.run_once().unwrap();
        }
        assert!(node_b.state().joined);
        assert_eq!(node_b.state().succ_list.first().copied(), Some(a));

        // Force both nodes' stabilize clocks to fire.
        clock.advance(Duration::from_secs(11));
        for _ in 0..8 {
            node_a.run_once().unwrap();
            node_b.run_once().unwrap();
        }

        assert_eq!(node_a.state().pred, Some(b));
        assert_eq!(node_a.state().succ_list.first().copied(), Some(b));
        assert_eq!(node_b.state().pred, Some(a));
        assert_eq!(node_b.state().succ_list.first().copied(), Some(a));
    }
}
