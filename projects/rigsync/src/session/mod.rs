pub mod catalog;
pub mod events;
pub mod filename;
pub mod matcher;

pub use catalog::{search, SessionRow};
pub use filename::{BehaviorSession, VideoSession};
pub use matcher::{best_video, match_sessions, SessionMatch};
