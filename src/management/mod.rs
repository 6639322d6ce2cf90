mod auth;
mod expiry;
mod registry;

pub use auth::TokenManager;
pub use expiry::ExpiryScheduler;
pub use registry::JobRegistry;
