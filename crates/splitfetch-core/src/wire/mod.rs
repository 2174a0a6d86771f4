//! Raw HTTP/1.1 framing for ranged reads.
//!
//! The request side pre-renders everything but the starting offset once per
//! locator; the response side reads just the status line and header block
//! from a buffered stream, leaving the body bytes in the reader.

mod request;
mod response;

pub use request::{RequestTarget, RequestTemplate};
pub use response::{read_response_head, ParseError, ResponseHead};
