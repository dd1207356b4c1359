//! The single mutable record a node owns, plus the constructors that enforce I1-I6.

use crate::clock::Instant;
use crate::error::ConfigError;
use crate::id::SUCC_LIST_LEN;
use crate::pointer::Pointer;
use crate::query::Query;
use smallvec::SmallVec;

pub type SuccList = SmallVec<[Pointer; SUCC_LIST_LEN]>;

/// Tunable parameters fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    pub stabilize_interval: std::time::Duration,
    pub query_timeout: std::time::Duration,
    pub succ_list_len: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            stabilize_interval: std::time::Duration::from_secs(10),
            query_timeout: std::time::Duration::from_secs(10),
            succ_list_len: SUCC_LIST_LEN,
        }
    }
}

/// The node's entire mutable state. Handlers take a `State` by value and return a new
/// `State`; nothing outside a handler's return value is ever mutated.
#[derive(Debug, Clone)]
pub struct State {
    pub ptr: Pointer,
    pub pred: Option<Pointer>,
    pub succ_list: SuccList,
    pub succ_list_len: usize,
    pub joined: bool,
    pub rectify_with: Option<Pointer>,
    pub known: Option<Pointer>,
    pub query: Option<Query>,
    pub query_sent: Option<Instant>,
    pub last_stabilize: Instant,
}

impl State {
    /// Builds a fresh, unjoined state for a brand-new ring member.
    pub fn new(ptr: Pointer, succ_list_len: usize, now: Instant) -> Self {
        State {
            ptr,
            pred: None,
            succ_list: SmallVec::new(),
            succ_list_len,
            joined: false,
            rectify_with: None,
            known: None,
            query: None,
            query_sent: None,
            last_stabilize: now,
        }
    }

    /// Builds a state pre-seeded with a predecessor and successor list, for tests and for
    /// standing up a solo/seed ring member without a bootstrap peer. Rejects inconsistent
    /// combinations per spec §6 rather than panicking.
    pub fn seeded(
        ptr: Pointer,
        pred: Pointer,
        succ_list: Vec<Pointer>,
        expected_len: usize,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        if succ_list.len() != expected_len {
            return Err(ConfigError::WrongSuccListLen {
                actual: succ_list.len(),
                expected: expected_len,
            });
        }
        let mut state = State::new(ptr, expected_len, now);
        state.pred = Some(pred);
        state.succ_list = succ_list.into_iter().collect();
        state.joined = true;
        Ok(state)
    }
}
