//! Testing utilities and mock implementations for E2E tests.
//!
//! Mock implementations of every external client trait: recorded calls,
//! controllable state and scripted failures, no real infrastructure.

mod mock_indexer;
mod mock_library;
mod mock_metadata;
mod mock_notifier;
mod mock_scraper;
mod mock_torrent_client;
mod mock_usenet_client;

pub use mock_indexer::MockIndexer;
pub use mock_library::{MockLibrary, RecordedScan};
pub use mock_metadata::MockMetadataProvider;
pub use mock_notifier::MockNotifier;
pub use mock_scraper::MockScraper;
pub use mock_torrent_client::MockTorrentClient;
pub use mock_usenet_client::MockUsenetClient;
