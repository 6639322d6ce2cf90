//! # CLI Module
//!
//! Client-side commands. The server itself is started from `main`; the
//! commands here talk to an already running instance over HTTP.
//!
//! - [`fetch`] - Submits a track, follows the job with a progress bar and
//!   saves the finished file
//!
//! ```bash
//! tunefetch serve
//! tunefetch fetch https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC
//! tunefetch fetch spotify:track:4uLU6hMCjMI75M1A2tKUQC --server http://nas:5000 --output ~/Music
//! ```

mod fetch;

pub use fetch::fetch;
pub use fetch::filename_from_disposition;
