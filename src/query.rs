//! The generic single-in-flight-RPC engine: `Query`, `Action`, and the `Continuation`
//! tag set. The *meaning* of each continuation variant lives in `protocol.rs`; this module
//! only defines the data shapes, matching the spec's "continuations as data" design note.

use crate::id::Id;
use crate::message::{Message, MessageKind};
use crate::pointer::Pointer;

/// An outstanding remote request: where it went, what was sent, what response kind would
/// satisfy it, and what to do when it is satisfied or times out.
#[derive(Debug, Clone)]
pub struct Query {
    pub dst: Pointer,
    pub msg: Message,
    pub res_kind: MessageKind,
    pub cb: Continuation,
}

impl Query {
    pub fn new(dst: Pointer, msg: Message, res_kind: MessageKind, cb: Continuation) -> Self {
        Query {
            dst,
            msg,
            res_kind,
            cb,
        }
    }

    /// True iff `msg` from `src` satisfies this query.
    pub fn matches(&self, src: Pointer, msg: &Message) -> bool {
        src == self.dst && msg.kind() == self.res_kind
    }
}

/// What a continuation (or `try_rectify`) asks the state machine to do next.
#[derive(Debug, Clone)]
pub enum Action {
    /// The chain of queries this continuation belongs to is finished.
    None,
    /// Chain another query; its `cb` runs when its response or timeout arrives.
    Query(Query),
    /// Fire-and-forget sends with no expected reply (e.g. `notify`).
    Sends(Vec<(Pointer, Message)>),
}

/// The finite set of continuation shapes the protocol composes queries from. Each variant
/// carries exactly the Pointers/ids its corresponding closure in the reference
/// implementation captured lexically.
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Awaiting a `pong` from `pred` to decide whether to adopt `notifier` as the new
    /// predecessor.
    RectifyCheck { pred: Pointer, notifier: Pointer },
    /// Awaiting `got_pred_and_succs` from `succ`, the first step of a stabilize round.
    StabilizeStep1 { succ: Pointer },
    /// Awaiting `got_succ_list` from a tighter successor discovered mid-stabilize.
    StabilizeStep2 { new_succ: Pointer },
    /// Awaiting `got_best_predecessor` from `node` while walking the ring towards the
    /// predecessor of `id`. Used for every hop, including the first (there is no separate
    /// "entry" shape: the first hop and every subsequent hop look identical).
    LookupPredecessorHop { node: Pointer, id: Id },
    /// Awaiting `got_succ_list` from the predecessor the lookup settled on, to read off
    /// the actual successor of the looked-up id.
    LookupSuccFinish,
    /// Awaiting `got_succ_list` from our new successor, to seed our own successor list
    /// after a join completes.
    JoinStep2 { new_succ: Pointer },
}
