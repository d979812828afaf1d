// src/rpc/error.rs

use thiserror::Error;

/// Closed classification of gateway failures, surfaced to tool callers so
/// they can distinguish "this request is wrong" from "try again later".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed tool input or ABI encode failure. Never retried.
    InvalidArgument,
    /// Rate budget exhausted and the bounded wait elapsed.
    Throttled,
    /// Connection/timeout failure that outlived the retry budget.
    Network,
    /// The upstream returned a shape we cannot parse. Never retried.
    Protocol,
    /// A fetched response failed ABI decoding. The result is not cached.
    Decode,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Throttled => "throttled",
            Self::Network => "network_error",
            Self::Protocol => "protocol_error",
            Self::Decode => "decode_error",
        }
    }
}

/// Error type shared by the transport, cache, codec, and dispatcher.
///
/// Cloneable so coalesced cache waiters can each receive the failure of the
/// single underlying fetch.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rate budget exhausted: {0}")]
    Throttled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("decode error at byte {offset}: {reason}")]
    Decode { offset: usize, reason: String },
}

impl GatewayError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::Decode { offset, reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Throttled(_) => ErrorKind::Throttled,
            Self::Network(_) => ErrorKind::Network,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Whether a caller could reasonably reissue the same request later.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Network(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// How to treat a JSON-RPC error object returned by an upstream node.
///
/// Client and execution errors are the caller's problem; provider errors are
/// the upstream's and are worth retrying elsewhere; parse errors mean the
/// upstream is misbehaving; rate limits want backoff, not blame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorClass {
    Client,
    Execution,
    Provider,
    RateLimit,
    Parse,
}

impl RpcErrorClass {
    /// Standard JSON-RPC codes: -32700 parse, -32600..-32602 client,
    /// -32603 internal, -32005 limit exceeded. The -32000..-32099 server
    /// range needs the message to tell execution reverts from provider
    /// faults.
    pub fn classify(code: i64, message: &str) -> Self {
        match code {
            -32700 => Self::Parse,
            -32602..=-32600 => Self::Client,
            -32603 => Self::Provider,
            -32005 => Self::RateLimit,
            -32099..=-32000 => {
                let m = message.to_lowercase();
                if m.contains("revert")
                    || m.contains("out of gas")
                    || m.contains("insufficient funds")
                    || m.contains("nonce too low")
                    || m.contains("gas too low")
                {
                    Self::Execution
                } else {
                    Self::Provider
                }
            }
            _ => Self::Provider,
        }
    }

    /// Transient classes are retried (possibly on another endpoint) before
    /// being surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider | Self::RateLimit)
    }

    /// Whether this error says anything bad about the endpoint itself.
    pub fn penalizes_endpoint(&self) -> bool {
        matches!(self, Self::Provider | Self::Parse)
    }

    /// The error the caller sees once retries are exhausted (or immediately
    /// for non-transient classes).
    pub fn into_gateway_error(self, code: i64, message: &str) -> GatewayError {
        match self {
            Self::Client | Self::Execution => {
                GatewayError::InvalidArgument(format!("upstream rejected call ({code}): {message}"))
            }
            Self::Parse => {
                GatewayError::Protocol(format!("upstream parse error ({code}): {message}"))
            }
            Self::RateLimit => {
                GatewayError::Throttled(format!("upstream rate limit ({code}): {message}"))
            }
            Self::Provider => {
                GatewayError::Network(format!("upstream error ({code}): {message}"))
            }
        }
    }
}
