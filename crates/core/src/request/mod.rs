//! Requests, audiobooks, download history and the lifecycle state machine.

mod history;
mod machine;
mod sqlite_store;
mod store;
mod types;

pub use history::{DownloadHistory, DownloadStatus, NewDownloadHistory};
pub use machine::can_transition;
pub use sqlite_store::SqliteRequestStore;
pub use store::{NewRequest, RequestError, RequestFilter, RequestStore};
pub use types::{Audiobook, NewAudiobook, Request, RequestStatus, RequestType};
