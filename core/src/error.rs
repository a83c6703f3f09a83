//! Error types for the Canvas client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server returned an unexpected
//! status." All other non-2xx responses land in `HttpError` with the raw
//! status code and body for debugging.
//!
//! `MissingAccountId` and `MissingField` are raised by the user service
//! itself; every other variant originates in the resource client or the
//! transport and is passed through untouched.

use thiserror::Error;

/// Errors returned by the resource client and `UserService` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No account id was passed and no default account id is configured.
    #[error("no account id given and no default account id configured")]
    MissingAccountId,

    /// A response object lacked a key the mapping requires.
    #[error("response is missing required field `{field}`")]
    MissingField { field: &'static str },

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A `Link` header pointed the next page at a different origin than
    /// the configured base URL.
    #[error("refusing to follow next-page link to another origin: {url}")]
    ForeignLink { url: String },

    /// The request never produced a response (DNS, connect, TLS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// Client configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
