//! Append-only persistence for the channel event graph.
//!
//! This crate is the durability boundary of the Stratum core: events and
//! their parent links are written once through [`append`] and never
//! mutated or deleted. Retrieval covers single events, parent and child
//! links, and the channel's forward extremities (events with no known
//! children — the current tips of the DAG and the inputs to state
//! resolution).
//!
//! The store is a pure graph store. It never evaluates authorization, and
//! no other component may bypass it to mutate history.

mod cache;
mod error;
mod events;

pub use cache::{read_state_cache, write_state_cache};
pub use error::StoreError;
pub use events::{
    append, children_of, forward_extremities, get, has_event, load_events, parents_of,
    AppendOutcome,
};
