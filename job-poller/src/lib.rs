pub mod client;
pub mod error;
pub mod progress;
pub mod session;
pub mod state;


pub use client::{GenerationApi, HttpGenerationApi};
pub use error::PollerError;
pub use session::{GenerationSession, PollerConfig, SessionSnapshot};
pub use state::SessionState;
