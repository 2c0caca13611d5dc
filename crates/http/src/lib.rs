//! Almoner HTTP client
//!
//! Every back-office screen talks to the REST API through [`AlmonerClient`]. The
//! client attaches the session's access token, refreshes an expired session at
//! most once per failure episode no matter how many requests observe the 401,
//! replays the rejected requests, and terminates the session when the refresh
//! itself is refused.

pub mod client;
pub mod types;

pub use client::{
    AlmonerClient, AlmonerClientBuilder,
    config::ClientConfig,
    error::ClientError,
    request::{MultipartForm, OutboundRequest},
    session::{FileSessionStore, MemorySessionStore, Session, SessionStore},
};
pub use types::{Credentials, Page};
