//! Synchronous client for the Canvas LMS users API.
//!
//! # Overview
//! `UserService` reads user profiles, course rosters, logins and page views,
//! creates users and updates logins. It maps Canvas JSON into plain records
//! and builds request payloads from them.
//!
//! # Design
//! - `UserService` talks to Canvas only through the `ResourceClient` trait,
//!   so the mapping logic is tested against a recording fake.
//! - `CanvasClient` implements `ResourceClient` over a `Transport`; it owns
//!   auth headers, query encoding, `Link`-header pagination and status
//!   interpretation.
//! - `UreqTransport` performs the actual blocking round-trip.
//! - Records are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod config;
pub mod error;
pub mod http;
pub mod resource;
pub mod sis;
pub mod types;
pub mod users;

pub use config::CanvasConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use resource::{CanvasClient, Params, ResourceClient};
pub use sis::SisField;
pub use types::{Enrollment, Grades, Login, PageView, User};
pub use users::UserService;
