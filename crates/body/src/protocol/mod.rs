//! Message-level types shared by requests and responses.
//!
//! - **Headers** ([`RequestHeader`], [`ResponseHeader`]): wrappers around the
//!   `http` crate types that also carry the trailer of a chunked body
//! - **Framing** ([`TransferLength`], [`BodyHeader`]): how the length of a body is
//!   declared and how it is derived from the header fields
//! - **Bodies** ([`body`]): body storage, streaming readers and the producer bridge
//! - **Errors** ([`BodyError`]): every failure reported by this crate

mod error;
pub use error::BodyError;

mod message;
pub use message::BodyHeader;
pub use message::TransferLength;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHeader;

mod multipart;
pub use multipart::MultipartForm;

pub mod body;
