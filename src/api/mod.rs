//! # API Module
//!
//! HTTP endpoints of the download service, built on [Axum](https://docs.rs/axum).
//!
//! ## Endpoints
//!
//! ### Downloads
//!
//! - [`start_download`] - `POST /download/start`, registers a job and returns
//!   its id immediately
//! - [`download_status`] - `GET /download/status/{job_id}`, the job's current
//!   status, progress and message
//! - [`download_file`] - `GET /download/file/{job_id}`, streams the finished
//!   file while the job is `done` and not yet expired
//!
//! ### Authentication
//!
//! - [`token`] - `POST /token`, PKCE authorization-code exchange on behalf of
//!   the frontend
//! - [`refresh`] - `POST /refresh`, refresh-token grant
//!
//! ### Monitoring
//!
//! - [`ping`] - liveness plus availability of the external tools
//!
//! ## Errors
//!
//! Only request-shape and lookup problems produce HTTP errors here (`400`,
//! `404`), always as `{"error": "<text>"}`. A job failing is never an HTTP
//! error; clients see it by polling the status endpoint.

mod download;
mod health;
mod token;

pub use download::{content_disposition, download_file, download_status, start_download};
pub use health::ping;
pub use token::{refresh, token};
