//! Callback Transport Adapter
//!
//! Many host network stacks report results through a completion callback
//! invoked on a thread of their choosing. [`CallbackTransport`] turns such a
//! stack into a [`NetworkTransport`] by handing it a single-use
//! [`Completion`] and awaiting the paired [`PendingResponse`].

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};
use crate::transport::{NetworkTransport, Request, Response};

/// Single-use completion handle given to a callback-style transport.
///
/// `complete` consumes the handle, so a response can be delivered at most
/// once. Dropping the handle without completing resolves the paired
/// [`PendingResponse`] with [`BridgeError::CompletionDropped`].
#[derive(Debug)]
pub struct Completion {
    sender: oneshot::Sender<Result<Response>>,
}

impl Completion {
    /// Deliver the transport result. Safe to call from any thread; never blocks.
    pub fn complete(self, result: Result<Response>) {
        // The receiver may be gone if the caller stopped waiting.
        let _ = self.sender.send(result);
    }

    pub fn succeed(self, response: Response) {
        self.complete(Ok(response));
    }

    pub fn fail(self, error: BridgeError) {
        self.complete(Err(error));
    }
}

/// Future side of a [`Completion`].
#[derive(Debug)]
pub struct PendingResponse {
    receiver: oneshot::Receiver<Result<Response>>,
}

impl Future for PendingResponse {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::CompletionDropped)))
    }
}

/// Create a linked completion/future pair.
pub fn completion_pair() -> (Completion, PendingResponse) {
    let (sender, receiver) = oneshot::channel();
    (Completion { sender }, PendingResponse { receiver })
}

/// Adapts a callback-style platform transport to [`NetworkTransport`].
///
/// ```ignore
/// use bridge_traits::completion::CallbackTransport;
/// use bridge_traits::transport::Response;
///
/// let transport = CallbackTransport::new(|request, completion| {
///     std::thread::spawn(move || completion.succeed(Response::new(200, request.body)));
/// });
/// ```
pub struct CallbackTransport<F> {
    dispatch: F,
}

impl<F> CallbackTransport<F>
where
    F: Fn(Request, Completion) + Send + Sync,
{
    pub fn new(dispatch: F) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl<F> NetworkTransport for CallbackTransport<F>
where
    F: Fn(Request, Completion) + Send + Sync,
{
    async fn send(&self, request: Request) -> Result<Response> {
        let (completion, pending) = completion_pair();
        (self.dispatch)(request, completion);
        pending.await
    }
}
