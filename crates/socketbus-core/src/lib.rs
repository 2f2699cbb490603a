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
//! Core types shared by the socketbus crates.
//!
//! This crate has no runtime dependency. It describes the three boundaries of the session layer:
//! * the [transport](transport) a client is bound to,
//! * the [codec](parser) that turns packets into frames and back,
//! * the [adapter](adapter) that owns room membership and broadcast fan-out.

pub mod adapter;
pub mod errors;
pub mod packet;
pub mod parser;
pub mod sid;
pub mod transport;

use std::borrow::Cow;

pub use serde_json::Value;
pub use sid::Sid;

/// A string that can be either borrowed for the program lifetime or owned. Used for namespace paths.
pub type Str = Cow<'static, str>;

/// The name of the default namespace.
pub const DEFAULT_NS: &str = "/";
