//! # API Module
//!
//! Thin HTTP handlers over the gateway dispatcher. The MCP stdio surface
//! is the primary transport; these routes exist for health probes and
//! ad-hoc inspection.

pub mod account;
pub mod block;
pub mod health;

use axum::http::StatusCode;

use crate::rpc::error::{ErrorKind, GatewayError};

/// Map a gateway failure onto an HTTP status.
pub(crate) fn status_for(err: &GatewayError) -> StatusCode {
    match err.kind() {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Throttled => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Network | ErrorKind::Protocol | ErrorKind::Decode => StatusCode::BAD_GATEWAY,
    }
}
