//! Functions and types used to handle incoming namespace connections.
//!
//! # Middlewares
//! Middlewares run once per connection attempt, before the socket is connected, in the order they
//! were registered with [`Namespace::middleware`](crate::ns::Namespace::middleware).
//! The first middleware that returns an error stops the chain. The client then receives an
//! ERROR packet holding the error message and the socket is discarded.
//!
//! Middlewares must be async. They are defined with the [`ConnectMiddleware`] trait which is
//! automatically implemented for any `Fn(Arc<Socket<A>>) -> impl Future<Output = Result<(), E>>`
//! where `E: Display`.
//!
//! # Connection handlers
//! Once a socket is connected, the namespace `connect` and then `connection` listeners are called
//! with it. They are plain functions registered with
//! [`Namespace::on_connection`](crate::ns::Namespace::on_connection) or
//! [`Namespace::on_connect`](crate::ns::Namespace::on_connect).
use std::{fmt, future::Future, sync::Arc};

use futures_util::future::BoxFuture;

use crate::{adapter::Adapter, socket::Socket};

/// The error returned by a rejecting middleware.
pub type MiddlewareError = Box<dyn fmt::Display + Send>;

/// A function called with every newly connected socket of a namespace.
pub type ConnectionHandler<A> = dyn Fn(Arc<Socket<A>>) + Send + Sync + 'static;

/// Define a middleware run before a socket is connected to a namespace.
pub trait ConnectMiddleware<A: Adapter>: Send + Sync + 'static {
    /// Call the middleware with the candidate socket.
    fn call(&self, socket: Arc<Socket<A>>) -> BoxFuture<'static, Result<(), MiddlewareError>>;
}

impl<A, F, Fut, E> ConnectMiddleware<A> for F
where
    A: Adapter,
    F: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn call(&self, socket: Arc<Socket<A>>) -> BoxFuture<'static, Result<(), MiddlewareError>> {
        let fut = (self)(socket);
        Box::pin(async move { fut.await.map_err(|e| Box::new(e) as MiddlewareError) })
    }
}
