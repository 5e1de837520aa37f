//! Reader for HTTP bodies with a Content-Length header.
//!
//! This module reads a payload whose size is given by the Content-Length header,
//! as defined in [RFC 7230 Section 3.3.2](https://tools.ietf.org/html/rfc7230#section-3.3.2).

use std::cmp;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

use crate::pool::BodyBuf;
use crate::protocol::BodyError;
use crate::utils::clamp_len;

/// The most capacity reserved for a fixed-size body before its bytes arrive.
pub const FIXED_INITIAL_CAPACITY: usize = 64 * 1024;

/// Appends exactly `length` bytes from `src` to `dst`.
///
/// At most [`FIXED_INITIAL_CAPACITY`] bytes are reserved up front; past that
/// the buffer grows as bytes arrive, so a declared length alone never
/// allocates. On early end of input the bytes already read stay in `dst` and
/// [`BodyError::UnexpectedEnd`] reports how far the read got.
pub async fn read_fixed<R>(src: &mut R, dst: &mut BodyBuf, length: u64) -> Result<(), BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    if length == 0 {
        return Ok(());
    }

    dst.reserve(cmp::min(clamp_len(length), FIXED_INITIAL_CAPACITY));

    let mut remaining = length;
    while remaining > 0 {
        let available = src.fill_buf().await?;
        if available.is_empty() {
            return Err(BodyError::unexpected_end(length - remaining, length));
        }

        let len = cmp::min(clamp_len(remaining), available.len());
        dst.extend_from_slice(&available[..len]);
        src.consume(len);
        remaining -= len as u64;
    }

    trace!(size = length, "read fixed size body");
    Ok(())
}
