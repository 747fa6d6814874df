//! Cross-server invite approval.
//!
//! Inviting a user hosted on another server requires that server's
//! consent. The workflow packages the candidate invite event together with
//! the full state context a remote server needs to authorize it (the
//! remote may hold none of this channel's history), submits it, and acts
//! on the decision: `Pending -> ApprovedRemote | RejectedRemote | TimedOut`,
//! all terminal.
//!
//! Network failure never corrupts local state. Transient errors are
//! retried with bounded exponential backoff; remote rejections are final
//! and never retried; exhausted retries surface as a timeout with no local
//! event appended.

mod approval;
mod db;
mod error;
mod request;
mod submit;
mod types;

pub use approval::process_approval_request;
pub use db::{
    get_approval, peer_base_url, record_outcome, record_pending, upsert_peer, InviteLogEntry,
};
pub use error::FederationError;
pub use request::build_approval_request;
pub use submit::{submit, RetryPolicy, SubmitOutcome, SubmitReport};
pub use types::{ApprovalResponse, Decision, InviteApprovalRequest, InviteContext, InviteStatus};
