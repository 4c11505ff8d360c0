//! Connection supervisor
//!
//! Wraps one connection attempt with a deadline and a cancellation token.
//! The attempt is a future that settles exactly once, as a tunnel or as one
//! [`SocksError`]. Whichever way it ends, the in-flight stream is owned by
//! the attempt's future and is closed when that future is dropped.

use crate::error::SocksError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Progress of one connection attempt
///
/// Ordered: an attempt only ever moves forward, and the last three
/// variants are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NegotiationState {
    /// Created, not yet polled
    Pending,
    /// Dialing the proxy
    Connecting,
    /// SOCKS5 greeting sent
    VersionGreeting,
    /// Waiting for the method selection
    AuthNegotiating,
    /// Username/password sub-negotiation in progress
    AuthVerifying,
    /// CONNECT request being sent
    ConnectRequesting,
    /// Waiting for the CONNECT reply
    ReplyAwaiting,
    /// Tunnel ready
    Established,
    /// Attempt failed
    Failed,
    /// Attempt cancelled by the caller
    Cancelled,
}

impl NegotiationState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NegotiationState::Established | NegotiationState::Failed | NegotiationState::Cancelled
        )
    }
}

/// Forward-only state cell shared by an attempt and its handle
#[derive(Debug, Clone)]
pub struct StateTracker {
    tx: Arc<watch::Sender<NegotiationState>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Create a tracker in [`NegotiationState::Pending`]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NegotiationState::Pending);
        StateTracker { tx: Arc::new(tx) }
    }

    /// Move to `next` if that is forward and the attempt has not settled
    ///
    /// Returns whether the transition happened.
    pub fn advance(&self, next: NegotiationState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_terminal() || next <= *current {
                return false;
            }
            trace!("Negotiation state {:?} -> {:?}", current, next);
            *current = next;
            true
        })
    }

    /// Current state
    pub fn current(&self) -> NegotiationState {
        *self.tx.borrow()
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.tx.subscribe()
    }

    /// Record the terminal state for `result`
    ///
    /// If a cancellation won the race, the result is replaced by
    /// [`SocksError::Cancelled`] and any tunnel in it is dropped.
    fn settle<T>(&self, result: Result<T, SocksError>) -> Result<T, SocksError> {
        let terminal = match &result {
            Ok(_) => NegotiationState::Established,
            Err(SocksError::Cancelled) => NegotiationState::Cancelled,
            Err(_) => NegotiationState::Failed,
        };

        if self.advance(terminal) || self.current() != NegotiationState::Cancelled {
            result
        } else {
            Err(SocksError::Cancelled)
        }
    }
}

/// Execution context of one attempt: its deadline and cancellation
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Bound on the whole attempt, dial included
    pub timeout: Duration,
    /// Cancelled to abort the attempt
    pub cancel: CancellationToken,
}

impl AttemptContext {
    /// Context with its own cancellation token
    pub fn new(timeout: Duration) -> Self {
        AttemptContext {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Also cancel the attempt when `parent` is cancelled
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }
}

/// Caller's side of a running attempt
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    cancel: CancellationToken,
    state: StateTracker,
}

impl AttemptHandle {
    /// Cancel the attempt; a no-op once it has settled
    pub fn cancel(&self) {
        self.cancel.cancel();
        if self.state.advance(NegotiationState::Cancelled) {
            debug!("Connection attempt cancelled");
        }
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.state.current()
    }

    /// Watch the negotiation state
    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }
}

/// A supervised connection attempt
///
/// Resolves once to the established value or the failure. Dropping it
/// aborts the attempt and closes its stream.
pub struct ConnectAttempt<T> {
    future: Pin<Box<dyn Future<Output = Result<T, SocksError>> + Send>>,
    handle: AttemptHandle,
}

impl<T> ConnectAttempt<T> {
    /// Handle for cancelling or observing the attempt from elsewhere
    pub fn handle(&self) -> AttemptHandle {
        self.handle.clone()
    }

    /// Cancel the attempt
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.handle.state()
    }
}

impl<T> std::fmt::Debug for ConnectAttempt<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectAttempt")
            .field("state", &self.handle.state())
            .finish()
    }
}

impl<T> Future for ConnectAttempt<T> {
    type Output = Result<T, SocksError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

/// Run `work` under the deadline and cancellation of `ctx`
///
/// `work` receives the tracker and reports intermediate states through it;
/// the terminal state is recorded here.
pub fn supervise<T, F, Fut>(ctx: AttemptContext, work: F) -> ConnectAttempt<T>
where
    T: Send + 'static,
    F: FnOnce(StateTracker) -> Fut,
    Fut: Future<Output = Result<T, SocksError>> + Send + 'static,
{
    let state = StateTracker::new();
    let handle = AttemptHandle {
        cancel: ctx.cancel.clone(),
        state: state.clone(),
    };
    let work = work(state.clone());

    let future = async move {
        let AttemptContext { timeout, cancel } = ctx;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SocksError::Cancelled),
            result = tokio::time::timeout(timeout, work) => match result {
                Ok(result) => result,
                Err(_) => {
                    debug!("Connection attempt timed out after {:?}", timeout);
                    Err(SocksError::TimeoutExceeded(timeout))
                }
            },
        };
        state.settle(result)
    };

    ConnectAttempt {
        future: Box::pin(future),
        handle,
    }
}
