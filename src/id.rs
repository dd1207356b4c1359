//! Ring coordinates: ids live in `[0, 2^64)` and wrap via native `u64` arithmetic.

use std::fmt;

/// Default breadth of a node's successor list.
pub const SUCC_LIST_LEN: usize = 4;

/// An identifier on the Chord ring.
///
/// The ring modulus is `2^64`, so wraparound is exactly `u64` wrapping arithmetic; no
/// explicit `% (1 << M)` is needed anywhere `Id` arithmetic is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Id(pub u64);

impl Id {
    pub fn wrapping_add(self, rhs: u64) -> Id {
        Id(self.0.wrapping_add(rhs))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// True iff `x` lies strictly on the open clockwise arc from `a` to `b`.
///
/// `a == b` is treated as the whole ring minus the point itself: anything other than `a`
/// is "between". This is the sole arbiter of every predecessor/successor comparison in the
/// protocol layer.
pub fn between(a: Id, x: Id, b: Id) -> bool {
    if a == b {
        x != a
    } else if a < b {
        a < x && x < b
    } else {
        x > a || x < b
    }
}
