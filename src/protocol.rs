//! The Chord ring maintenance protocol: join bootstrap, periodic stabilize, notify-based
//! predecessor rectification, and iterative predecessor-to-successor lookup, all composed
//! from the primitive queries of §4.3. Grounded line-for-line on
//! `examples/original_source/systems/chord/node.py`.

use crate::id::between;
use crate::message::{Message, MessageKind};
use crate::pointer::Pointer;
use crate::query::{Action, Continuation, Query};
use crate::state::{State, SuccList};

/// `[head] + rest`, truncated to `succ_list_len`, with `me` and duplicate ids dropped.
pub fn make_succs(head: Pointer, rest: Vec<Pointer>, succ_list_len: usize, me: Pointer) -> SuccList {
    let mut out = SuccList::new();
    out.push(head);
    for p in rest {
        if p == me || out.contains(&p) {
            continue;
        }
        out.push(p);
        if out.len() >= succ_list_len {
            break;
        }
    }
    out
}

/// Base one-shot queries (§4.3).
pub fn ping(dst: Pointer, cb: Continuation) -> Query {
    Query::new(dst, Message::Ping, MessageKind::Pong, cb)
}

pub fn get_succ_list(dst: Pointer, cb: Continuation) -> Query {
    Query::new(dst, Message::GetSuccList, MessageKind::GotSuccList, cb)
}

pub fn get_pred_and_succs(dst: Pointer, cb: Continuation) -> Query {
    Query::new(dst, Message::GetPredAndSuccs, MessageKind::GotPredAndSuccs, cb)
}

pub fn get_best_predecessor(dst: Pointer, id: crate::id::Id, cb: Continuation) -> Query {
    Query::new(
        dst,
        Message::GetBestPredecessor(id),
        MessageKind::GotBestPredecessor,
        cb,
    )
}

/// Unsolicited `notify`: no expected reply, so this is a plain send list rather than a
/// `Query`.
pub fn notify(dst: Pointer) -> Vec<(Pointer, Message)> {
    vec![(dst, Message::Notify)]
}

/// Server-side: the closest predecessor of `id` known to this node among
/// `{ptr} ∪ succ_list`, preferring the furthest-forward qualifying successor (Open
/// Question (b), resolved in DESIGN.md). `succ_list` is already ordered nearest-to-furthest
/// from `ptr`, so the last candidate satisfying `between` is the furthest.
pub fn best_predecessor(state: &State, id: crate::id::Id) -> Pointer {
    let mut best = state.ptr;
    for candidate in &state.succ_list {
        if between(state.ptr.id, candidate.id, id) {
            best = *candidate;
        }
    }
    best
}

/// Starts (or restarts, after a timed-out predecessor) a stabilize round against `succ`.
pub fn stabilize_query(succ: Pointer) -> Query {
    get_pred_and_succs(succ, Continuation::StabilizeStep1 { succ })
}

/// Pings the current predecessor to decide whether to adopt `notifier`.
pub fn rectify_query(pred: Pointer, notifier: Pointer) -> Query {
    ping(pred, Continuation::RectifyCheck { pred, notifier })
}

/// Starts the iterative successor lookup that seeds a join.
pub fn join_query(known: Pointer, my_id: crate::id::Id) -> Query {
    get_best_predecessor(
        known,
        my_id,
        Continuation::LookupPredecessorHop { node: known, id: my_id },
    )
}

impl Continuation {
    /// Dispatches on the continuation's tag. Pure: never performs I/O, consumes `state`
    /// and the response (or `None` on timeout) and returns the next `Action` plus the new
    /// `State`.
    pub fn invoke(self, mut state: State, msg: Option<Message>) -> (Action, State) {
        match self {
            Continuation::RectifyCheck { pred, notifier } => {
                let adopt = msg.is_none() || between(pred.id, notifier.id, state.ptr.id);
                if adopt {
                    state.pred = Some(notifier);
                }
                (Action::None, state)
            }

            Continuation::StabilizeStep1 { succ } => match msg {
                Some(Message::GotPredAndSuccs(maybe_new_succ, succs)) => {
                    state.succ_list = make_succs(succ, succs, state.succ_list_len, state.ptr);
                    if let Some(new_succ) = maybe_new_succ {
                        if between(state.ptr.id, new_succ.id, succ.id) {
                            let q = get_succ_list(new_succ, Continuation::StabilizeStep2 { new_succ });
                            return (Action::Query(q), state);
                        }
                    }
                    (Action::Sends(notify(succ)), state)
                }
                _ => {
                    if state.succ_list.first() == Some(&succ) {
                        state.succ_list.remove(0);
                    }
                    match state.succ_list.first().copied() {
                        Some(next) => (Action::Query(stabilize_query(next)), state),
                        None => (Action::None, state),
                    }
                }
            },

            Continuation::StabilizeStep2 { new_succ } => match msg {
                Some(Message::GotSuccList(succs)) => {
                    state.succ_list = make_succs(new_succ, succs, state.succ_list_len, state.ptr);
                    (Action::Sends(notify(new_succ)), state)
                }
                _ => match state.succ_list.first().copied() {
                    Some(succ) => (Action::Sends(notify(succ)), state),
                    None => (Action::None, state),
                },
            },

            Continuation::LookupPredecessorHop { node, id } => match msg {
                Some(Message::GotBestPredecessor(best_pred)) => {
                    if best_pred == node {
                        let q = get_succ_list(node, Continuation::LookupSuccFinish);
                        (Action::Query(q), state)
                    } else {
                        let q = get_best_predecessor(
                            best_pred,
                            id,
                            Continuation::LookupPredecessorHop { node: best_pred, id },
                        );
                        (Action::Query(q), state)
                    }
                }
                _ => (Action::None, state),
            },

            Continuation::LookupSuccFinish => match msg {
                Some(Message::GotSuccList(succs)) => match succs.first().copied() {
                    Some(new_succ) => {
                        let q = get_succ_list(new_succ, Continuation::JoinStep2 { new_succ });
                        (Action::Query(q), state)
                    }
                    None => (Action::None, state),
                },
                _ => (Action::None, state),
            },

            Continuation::JoinStep2 { new_succ } => match msg {
                Some(Message::GotSuccList(succs)) => {
                    state.succ_list = make_succs(new_succ, succs, state.succ_list_len, state.ptr);
                    state.pred = None;
                    state.joined = true;
                    (Action::None, state)
                }
                _ => (Action::None, state),
            },
        }
    }
}
