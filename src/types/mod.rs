//! Shared types of the middleware stack: requests, responses, bodies and
//! the crate-wide error kind.

mod body;
mod error;
mod request;
mod response;

pub use body::Body;
pub use error::{ErrorKind, Result};
pub use request::{
    attach_cancel_signal, cancel_signal, clone_request, ensure_request_id, request_id, Request,
    RequestId,
};
pub use response::Response;
