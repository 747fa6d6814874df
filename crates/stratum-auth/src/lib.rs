//! Authorization engine for channel events.
//!
//! Given a candidate event and the resolved state at its parents, the
//! engine decides accept or reject. It is rule-driven: an ordered list of
//! predicate rules is supplied by a [`RuleCatalog`], the engine runs every
//! rule and short-circuits on the first rejection, returning a reason tag
//! identifying which precondition failed.
//!
//! The catalogue also supplies the precedence comparator state resolution
//! uses to order conflicting candidates — an injected strategy, so rule
//! sets can be swapped and unit-tested independently of the resolution
//! algorithm.
//!
//! Rejections are data, not exceptions: the engine's return type encodes
//! them, and a rejected event never corrupts store state. The engine
//! itself holds no state and issues no I/O; fetching and resolving the
//! state at a candidate's parents is the resolution engine's job.

mod catalog;
mod decision;
mod engine;
mod rules;
pub mod well_known;

pub use catalog::{state_ids, AuthRule, RuleCatalog, StateEvents};
pub use decision::{AuthDecision, RejectReason};
pub use engine::authorize;
pub use rules::{sender_power, DefaultCatalog};
