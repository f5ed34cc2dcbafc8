//! Protocol module containing the frame type and the text codec.

pub mod codec;
pub mod frame;

pub use codec::{encode_array, encode_closing, escape, CodecError};
pub use frame::{close, Frame};
