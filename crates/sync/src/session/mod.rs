pub mod directory;
pub mod manager;

pub use directory::{MemoryDirectory, SessionDirectory};
pub use manager::{GameSession, SessionError, SessionEvent, SessionManager};
