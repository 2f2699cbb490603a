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
    rust_2024_compatibility,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]

//! The JSON parser sub-crate for the socketbus crate.
//!
//! This is the default parser implementation. Each packet is written as one text frame
//! holding a JSON record:
//! ```text
//! {"type": <packet type>, "nsp": <namespace>, "data": <payload>, "id": <ack id>}
//! ```
//! `data` and `id` are omitted when the packet has none.
//!
//! When decoding, a text frame may also hold a JSON array of such records. Every record
//! is then yielded in order.
use socketbus_core::{
    errors::ParserError,
    packet::Packet,
    parser::{Decoder, Parse},
    transport::Frame,
};

/// Parse and serialize from and into the JSON packet format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Parse for JsonParser {
    fn encode(&self, packet: &Packet) -> Result<Vec<Frame>, ParserError> {
        let data = serde_json::to_string(packet)?;
        Ok(vec![Frame::Text(data)])
    }

    fn decoder(&self) -> Box<dyn Decoder> {
        Box::new(JsonDecoder::default())
    }
}

/// A [`Decoder`] for the [`JsonParser`] format.
#[derive(Debug, Default)]
pub struct JsonDecoder {
    destroyed: bool,
}

impl Decoder for JsonDecoder {
    fn add(&mut self, frame: Frame) -> Result<Vec<Packet>, ParserError> {
        if self.destroyed {
            #[cfg(feature = "tracing")]
            tracing::debug!("frame received on a destroyed decoder, ignoring");
            return Ok(Vec::new());
        }
        let data = match frame {
            Frame::Text(data) => data,
            Frame::Binary(_) => return Err(ParserError::UnexpectedBinaryPacket),
        };

        if data.trim_start().starts_with('[') {
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(vec![serde_json::from_str(&data)?])
        }
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}
