//! HTTP header processing for the parts of a message head a body depends on
//!
//! # Components
//!
//! - [`encode_request_head`] / [`encode_response_head`]: serialize a message head
//!   - Request line or status line
//!   - Header fields, framing fields included
//!
//! - [`encode_trailer`]: serializes the trailer section after a chunked body
//!
//! - [`TrailerDecoder`] / [`read_trailer`]: parse the trailer section after a chunked body
//!   - Stops exactly at the terminating blank line
//!   - Enforces field count and size limits

mod header_encoder;
mod trailer_decoder;

pub use header_encoder::{encode_request_head, encode_response_head, encode_trailer};
pub use trailer_decoder::{MAX_TRAILER_BYTES, MAX_TRAILER_HEADERS, TrailerDecoder, read_trailer};
