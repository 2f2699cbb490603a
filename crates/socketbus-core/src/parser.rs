//! The codec boundary.
//!
//! A [`Parse`] implementation turns a [`Packet`] into one or more [`Frame`]s and creates
//! a [`Decoder`] per connection to rebuild packets from incoming frames.
use std::fmt;

use crate::{errors::ParserError, packet::Packet, transport::Frame};

/// All parsers should implement this trait.
pub trait Parse: fmt::Debug + Send + Sync + 'static {
    /// Convert a packet into the frames to write on the transport
    fn encode(&self, packet: &Packet) -> Result<Vec<Frame>, ParserError>;

    /// Create a new decoder for a connection.
    fn decoder(&self) -> Box<dyn Decoder>;
}

/// A stateful decoder, bound to one connection.
pub trait Decoder: Send + 'static {
    /// Feed a frame to the decoder.
    /// Returns every packet completed by this frame, in arrival order. It may be empty
    /// if the frame only carries part of a packet.
    fn add(&mut self, frame: Frame) -> Result<Vec<Packet>, ParserError>;

    /// Release any partial state. The decoder must not be used afterward.
    fn destroy(&mut self);
}
