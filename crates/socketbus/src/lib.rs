#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::match_on_vec_items,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
//! Socketbus is the session layer of a realtime event bus.
//!
//! It multiplexes independent event channels, called namespaces, over one transport connection
//! per client, tracks the socket of each client in each namespace, broadcasts to rooms and
//! correlates acknowledgements with the events they answer.
//!
//! ## Table of contents
//! * [Architecture](#architecture)
//! * [Usage](#usage)
//! * [Handlers](#handlers)
//! * [Emitting data](#emitting-data)
//! * [Acknowledgements](#acknowledgements)
//! * [Rooms](#rooms)
//! * [Adapters](#adapters)
//! * [Feature flags](#feature-flags)
//!
//! ## Architecture
//! The transport is not part of this crate. Any transport can drive an [`Engine`] through the
//! [`TransportHandler`] trait, by handing it a [`Connection`] for every opened connection and
//! by forwarding the received frames and the close notifications.
//!
//! * The [`Engine`] is the registry of the namespaces and of the connected clients.
//! * A [`Client`](client::Client) is bound to one connection. It decodes the frames with the
//!   configured parser and routes the packets to its sockets. Its inbound traffic is processed
//!   by a single task.
//! * A [`Namespace`](ns::Namespace) runs its middlewares against every connection attempt and
//!   notifies its listeners of every connected socket.
//! * A [`Socket`](socket::Socket) is one client connected to one namespace.
//!
//! ## Usage
//! ```rust,no_run
//! use socketbus::Engine;
//! use serde_json::json;
//!
//! let engine = Engine::new();
//! engine.on_connection(|socket| {
//!     socket.emit("login", &json!({ "active": 1 })).ok();
//!     socket.broadcast().emit("user.joined", &socket.id).ok();
//!
//!     socket.on("message", |socket, args, _| {
//!         socket.broadcast().emit("message", &args).ok();
//!     });
//!     socket.on_disconnect(|socket, reason| {
//!         println!("socket {} disconnected: {reason}", socket.id);
//!     });
//! });
//! ```
//!
//! ## Handlers
//! Handlers are plain functions registered by event name, called synchronously in registration
//! order. See the [`handler`] module.
//! * [`Namespace::on_connection`](ns::Namespace::on_connection) is called with every connected
//!   socket, after it joined its private room and received its CONNECT packet.
//! * [`Socket::on`](socket::Socket::on) is called with every occurrence of an event.
//! * [`Socket::on_disconnect`](socket::Socket::on_disconnect) is called once, after the socket
//!   was removed from its rooms, its namespace and its client.
//! * [`Namespace::middleware`](ns::Namespace::middleware) runs async checks before a socket is
//!   connected.
//!
//! ## Emitting data
//! Any [`serde::Serialize`] value can be emitted. A serialized array is sent as positional
//! arguments, `()` as no argument and any other value as a single argument.
//! To send an array as one argument, wrap it in a tuple or another array.
//!
//! The targets of an emit are selected with [`BroadcastOperators`](operators::BroadcastOperators):
//! * [`Socket::to`](socket::Socket::to): the sockets of the given rooms, except the sender.
//! * [`Socket::broadcast`](socket::Socket::broadcast): every socket of the namespace, except the sender.
//! * [`Socket::volatile`](socket::Socket::volatile): the packet may be dropped if a client
//!   cannot receive it right now.
//!
//! ## Acknowledgements
//! * [`Socket::emit_with_ack`](socket::Socket::emit_with_ack) registers a callback called with
//!   the acknowledged data.
//! * [`Socket::emit_with_ack_future`](socket::Socket::emit_with_ack_future) returns an
//!   [`AckFuture`](ack::AckFuture) that times out after [`EngineConfig::ack_timeout`].
//! * A message handler receives an [`AckSender`](ack::AckSender) when the client expects an
//!   acknowledgement. Only its first use sends the ACK packet.
//!
//! ## Rooms
//! Every socket joins a room named after its id when it connects. Other rooms are joined with
//! [`Socket::join`](socket::Socket::join), which completes once the adapter recorded it.
//!
//! ## Adapters
//! The room membership of each namespace is owned by an [`Adapter`](adapter::Adapter).
//! The default [`LocalAdapter`](adapter::LocalAdapter) keeps it in memory. Another one can be
//! set with [`EngineBuilder::with_adapter`].
//!
//! ## Feature flags
//! * `tracing`: enables logging with the [`tracing`](https://docs.rs/tracing) crate.

pub mod ack;
pub mod adapter;
pub mod client;
pub mod handler;
pub mod ns;
pub mod operators;
pub mod socket;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use errors::{
    AckError, AdapterError, BroadcastError, EmitError, ParserError, SendError, SocketError,
};
pub use socket::DisconnectReason;
pub use socketbus_core::{
    DEFAULT_NS, Sid, Str, Value,
    packet::{Packet, PacketData},
    parser::{Decoder, Parse},
    transport::{CloseReason, Connection, Frame, ReadyState, TransportHandler},
};
pub use socketbus_parser_json::JsonParser;

mod config;
mod engine;
mod errors;
