//! Streaming response support.

pub mod chunked;

pub use chunked::{
    chunked_channel, encode_chunk, ChunkEvent, ChunkedReader, ChunkedWriter, CollectedBody,
    ResponseHead, StreamError,
};
