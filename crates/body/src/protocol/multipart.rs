use bytes::Bytes;
use std::fmt::Debug;

use crate::protocol::BodyError;

/// A parsed or constructed `multipart/form-data` form attached to a request.
///
/// The form itself lives outside this crate. A request only needs to know how
/// to serialize the form when it has no other body, and how to release any
/// temporary files the form holds.
pub trait MultipartForm: Debug + Send {
    /// The boundary used in the `Content-Type` header.
    fn boundary(&self) -> &str;

    /// Serializes the form into a request body.
    fn marshal(&self) -> Result<Bytes, BodyError>;

    /// Removes temporary files that back uploaded parts.
    fn remove_files(&mut self) {}
}
