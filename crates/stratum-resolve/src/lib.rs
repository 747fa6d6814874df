//! State resolution for divergent channel branches.
//!
//! Federation delivers events out of order, so a channel's graph routinely
//! has more than one forward extremity. Resolution takes that set of tips
//! and computes the one canonical [`ChannelState`](stratum_types::ChannelState)
//! every server must agree on: unconflicted keys pass through, conflicted
//! keys are re-authorized against a partial state and ordered by the rule
//! catalogue's precedence, then depth, then event id.
//!
//! The algorithm is a pure function of the stored event set. Neither the
//! order events were appended nor the order extremities are supplied may
//! change the result — that confluence guarantee is what keeps independent
//! servers consistent without coordination.

mod error;
mod resolve;

pub use error::ResolveError;
pub use resolve::{resolve, resolve_full, state_at_parents};
