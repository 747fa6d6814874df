//! Submitting approval requests to remote peers.

use std::time::Duration;

use crate::types::{ApprovalResponse, Decision, InviteApprovalRequest, InviteStatus};

/// Retry discipline for [`submit`]: a per-attempt timeout, a bounded
/// attempt count, and the base delay doubled between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Terminal result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote approved; the invite may be appended locally.
    Approved,
    /// The remote refused. Final — never retried.
    Rejected { reason: String },
    /// Every attempt timed out or failed transiently. No local event was
    /// appended; surfaced to the inviter as a denial.
    TimedOut,
}

impl SubmitOutcome {
    /// The log status this outcome maps to.
    pub fn status(&self) -> InviteStatus {
        match self {
            SubmitOutcome::Approved => InviteStatus::ApprovedRemote,
            SubmitOutcome::Rejected { .. } => InviteStatus::RejectedRemote,
            SubmitOutcome::TimedOut => InviteStatus::TimedOut,
        }
    }
}

/// Outcome plus how many attempts it took, for the approval log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    pub outcome: SubmitOutcome,
    pub attempts: u32,
}

enum Attempt {
    Decided(SubmitOutcome),
    Transient(String),
}

/// Sends an approval request to a peer's invite endpoint and awaits its
/// decision.
///
/// A decision from the remote — approval or rejection — ends the call
/// immediately. Timeouts, connection failures, and 5xx responses are
/// transient: they are retried up to `policy.max_attempts` with
/// exponentially growing delay, and exhaustion yields
/// [`SubmitOutcome::TimedOut`]. 4xx responses are treated as final
/// rejections. Nothing is written anywhere by this function.
pub async fn submit(
    client: &reqwest::Client,
    request: &InviteApprovalRequest,
    endpoint: &str,
    policy: &RetryPolicy,
) -> SubmitReport {
    let url = format!(
        "{}/api/federation/invite",
        endpoint.trim_end_matches('/')
    );

    let mut attempts = 0;
    while attempts < policy.max_attempts {
        attempts += 1;
        match attempt(client, request, &url, policy.attempt_timeout).await {
            Attempt::Decided(outcome) => return SubmitReport { outcome, attempts },
            Attempt::Transient(cause) => {
                tracing::warn!(
                    event_id = request.object.id.as_str(),
                    url = %url,
                    attempt = attempts,
                    cause = %cause,
                    "invite submission attempt failed"
                );
                if attempts < policy.max_attempts {
                    let backoff = policy.backoff_base * 2u32.saturating_pow(attempts - 1);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    SubmitReport {
        outcome: SubmitOutcome::TimedOut,
        attempts,
    }
}

async fn attempt(
    client: &reqwest::Client,
    request: &InviteApprovalRequest,
    url: &str,
    timeout: Duration,
) -> Attempt {
    let response = client.post(url).timeout(timeout).json(request).send().await;

    match response {
        Ok(response) if response.status().is_success() => {
            match response.json::<ApprovalResponse>().await {
                Ok(body) => Attempt::Decided(match body.decision {
                    Decision::Approved => SubmitOutcome::Approved,
                    Decision::Rejected => SubmitOutcome::Rejected {
                        reason: body
                            .reason
                            .unwrap_or_else(|| "unspecified".to_string()),
                    },
                }),
                Err(err) => Attempt::Transient(format!("unreadable response body: {err}")),
            }
        }
        Ok(response) if response.status().is_client_error() => {
            // The peer understood us and said no; retrying cannot change
            // its mind.
            Attempt::Decided(SubmitOutcome::Rejected {
                reason: format!("remote returned {}", response.status()),
            })
        }
        Ok(response) => Attempt::Transient(format!("remote returned {}", response.status())),
        Err(err) => Attempt::Transient(err.to_string()),
    }
}
