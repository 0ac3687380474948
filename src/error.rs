//! Error taxonomy surfaced by the orchestrator (spec §7).

use crate::selector::EndpointId;
use std::time::Duration;
use thiserror::Error;

/// The kind of failure a `call` or `call_batch` can terminate with.
///
/// Every variant carries just enough context for a caller to decide whether
/// to retry, and where. The cause chain behind `Transport`/`Upstream` is kept
/// short on purpose (spec §7: "a short, bounded cause chain").
#[derive(Debug, Error)]
pub enum CallError {
    /// The token bucket denied the request; `retry_after` is the shortest
    /// duration until a token would be available.
    #[error("rate limited on {endpoint:?}, retry after {retry_after:?}")]
    RateLimited {
        endpoint: Option<EndpointId>,
        retry_after: Duration,
    },

    /// The circuit for `endpoint` is open and not currently admitting calls.
    #[error("circuit open for endpoint {endpoint:?}")]
    BreakerOpen { endpoint: EndpointId },

    /// The request sat on the bounded admission queue long enough to be
    /// dropped by the oldest-drop policy.
    #[error("request evicted from the admission queue")]
    QueueEvicted,

    /// The request's deadline (explicit or endpoint default) elapsed.
    #[error("deadline exceeded after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Non-2xx HTTP or a JSON-RPC error payload came back from `endpoint`.
    #[error("upstream error from {endpoint:?}: status={status:?} kind={body_kind}")]
    Upstream {
        endpoint: EndpointId,
        status: Option<u16>,
        body_kind: String,
        #[source]
        cause: Option<Box<CallError>>,
    },

    /// A socket, DNS, TLS, or decode failure below the protocol layer.
    #[error("transport failure on {endpoint:?}: {message}")]
    Transport {
        endpoint: Option<EndpointId>,
        message: String,
        #[source]
        cause: Option<Box<CallError>>,
    },

    /// The caller cancelled the request, or `shutdown()` was in progress.
    #[error("request cancelled")]
    Cancelled,

    /// Caller misuse: an unknown method used where a mapping is required,
    /// or an out-of-range argument (e.g. `n > burst` to the rate limiter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Maximum depth of the `source()` cause chain kept on an error (spec §7:
/// "a short, bounded cause chain").
pub const MAX_CAUSE_DEPTH: usize = 3;

impl CallError {
    /// The endpoint this failure is attributed to, if any.
    pub fn endpoint(&self) -> Option<EndpointId> {
        match self {
            CallError::RateLimited { endpoint, .. } => *endpoint,
            CallError::BreakerOpen { endpoint } => Some(*endpoint),
            CallError::Upstream { endpoint, .. } => Some(*endpoint),
            CallError::Transport { endpoint, .. } => *endpoint,
            CallError::QueueEvicted
            | CallError::Timeout { .. }
            | CallError::Cancelled
            | CallError::InvalidArgument(_) => None,
        }
    }

    /// A caller-facing retry hint, when the failure is plausibly transient.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            CallError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    fn depth(err: &CallError) -> usize {
        match err {
            CallError::Upstream { cause, .. } | CallError::Transport { cause, .. } => {
                1 + cause.as_deref().map(Self::depth).unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Attaches `previous` as this error's cause, when `self` is a variant
    /// that carries one and the chain hasn't already reached
    /// [`MAX_CAUSE_DEPTH`]. Used by the failover loop to thread each failed
    /// endpoint's error into the next attempt's, so a caller who only sees
    /// the last failure can still walk `source()` back through what every
    /// excluded endpoint returned (spec §7(e)).
    pub fn chain_cause(self, previous: CallError) -> Self {
        if Self::depth(&previous) >= MAX_CAUSE_DEPTH {
            return self;
        }
        match self {
            CallError::Upstream {
                endpoint,
                status,
                body_kind,
                cause: None,
            } => CallError::Upstream {
                endpoint,
                status,
                body_kind,
                cause: Some(Box::new(previous)),
            },
            CallError::Transport {
                endpoint,
                message,
                cause: None,
            } => CallError::Transport {
                endpoint,
                message,
                cause: Some(Box::new(previous)),
            },
            other => other,
        }
    }
}

impl Clone for CallError {
    fn clone(&self) -> Self {
        match self {
            CallError::RateLimited {
                endpoint,
                retry_after,
            } => CallError::RateLimited {
                endpoint: *endpoint,
                retry_after: *retry_after,
            },
            CallError::BreakerOpen { endpoint } => CallError::BreakerOpen { endpoint: *endpoint },
            CallError::QueueEvicted => CallError::QueueEvicted,
            CallError::Timeout { elapsed } => CallError::Timeout { elapsed: *elapsed },
            CallError::Upstream {
                endpoint,
                status,
                body_kind,
                cause,
            } => CallError::Upstream {
                endpoint: *endpoint,
                status: *status,
                body_kind: body_kind.clone(),
                cause: cause.clone(),
            },
            CallError::Transport {
                endpoint,
                message,
                cause,
            } => CallError::Transport {
                endpoint: *endpoint,
                message: message.clone(),
                cause: cause.clone(),
            },
            CallError::Cancelled => CallError::Cancelled,
            CallError::InvalidArgument(s) => CallError::InvalidArgument(s.clone()),
        }
    }
}
