//! End-to-end pipeline tests over the in-process broker and mock clients.

use std::sync::Arc;
use std::time::Duration;

use shelfarr_core::testing::{MockIndexer, MockNotifier, MockScraper, MockTorrentClient};
use shelfarr_core::{
    App, ClientSet, Config, DirectDownloadRegistry, DownloadClientKind, DownloadStatus,
    JobPayload, JobStatus, JobStore, JobType, MemoryBroker, MetadataCacheStore, NewAudiobook,
    NewDownloadHistory, NewRequest, NotificationKind, OrganizeFilesProcessor, Processor,
    ProcessorContext, ProcessorHandler, Protocol, QueueBroker, QueuedJob, ReleaseCandidate,
    Request, RequestStatus, RequestStore, RequestType, SendNotificationProcessor,
    SqliteJobStore, SqliteMetadataCache, SqliteRequestStore, SqliteScheduledJobStore,
    StartDirectDownloadProcessor, StoreListener,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Harness {
    ctx: Arc<ProcessorContext>,
    broker: Arc<MemoryBroker>,
    jobs: Arc<SqliteJobStore>,
    notifier: Arc<MockNotifier>,
    scraper: Arc<MockScraper>,
    _tempdir: TempDir,
}

fn test_config(tempdir: &TempDir) -> Config {
    let download_dir = tempdir.path().join("downloads");
    let media_dir = tempdir.path().join("media");
    std::fs::create_dir_all(&download_dir).unwrap();
    std::fs::create_dir_all(&media_dir).unwrap();

    shelfarr_core::load_config_from_str(&format!(
        r#"
[paths]
download_dir = "{}"
media_dir = "{}"

[[indexers]]
id = 1
name = "indexer-a"
priority = 10
"#,
        download_dir.display(),
        media_dir.display(),
    ))
    .unwrap()
}

fn harness() -> Harness {
    let tempdir = TempDir::new().unwrap();
    let config = Arc::new(test_config(&tempdir));

    let store = Arc::new(SqliteRequestStore::in_memory().unwrap());
    let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
    let scheduled = Arc::new(SqliteScheduledJobStore::in_memory().unwrap());
    let cache = Arc::new(SqliteMetadataCache::in_memory().unwrap());

    let listener = StoreListener::new(Arc::clone(&jobs) as _).with_scheduled_store(Arc::clone(&scheduled) as _);
    let broker = Arc::new(MemoryBroker::with_listener(Arc::new(listener)));

    let notifier = Arc::new(MockNotifier::new());
    let scraper = Arc::new(MockScraper::new());
    let clients = ClientSet {
        notifier: Some(Arc::clone(&notifier) as _),
        scraper: Some(Arc::clone(&scraper) as _),
        ..Default::default()
    };

    let ctx = Arc::new(ProcessorContext {
        config,
        store,
        jobs: Arc::clone(&jobs) as _,
        scheduled,
        cache: Arc::clone(&cache) as Arc<dyn MetadataCacheStore>,
        broker: Arc::clone(&broker) as _,
        clients,
        downloads: Arc::new(DirectDownloadRegistry::new()),
        http: reqwest::Client::new(),
    });

    Harness {
        ctx,
        broker,
        jobs,
        notifier,
        scraper,
        _tempdir: tempdir,
    }
}

fn make_request(ctx: &ProcessorContext, request_type: RequestType) -> Request {
    let audiobook = ctx
        .store
        .create_audiobook(NewAudiobook {
            title: "The Name of the Wind".to_string(),
            author: "Patrick Rothfuss".to_string(),
            asin: Some("B0036I54I6".to_string()),
            cover_art_url: None,
            ..Default::default()
        })
        .unwrap();
    ctx.store
        .create_request(NewRequest {
            user_id: "user-1".to_string(),
            request_type,
            audiobook_id: audiobook.id,
            max_import_retries: None,
        })
        .unwrap()
}

fn advance_to(ctx: &ProcessorContext, request_id: &str, chain: &[(RequestStatus, RequestStatus)]) {
    for (from, to) in chain {
        ctx.store
            .transition(request_id, &[*from], *to)
            .unwrap()
            .unwrap();
    }
}

fn queued(payload: JobPayload) -> QueuedJob {
    QueuedJob {
        broker_id: "test-job".to_string(),
        job_type: payload.job_type(),
        payload,
        priority: 0,
        attempt: 1,
        max_attempts: 3,
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

// --- Scenario: happy torrent pipeline through the full App ---

#[tokio::test(start_paused = true)]
async fn test_happy_torrent_pipeline() {
    let tempdir = TempDir::new().unwrap();
    let config = test_config(&tempdir);
    let download_dir = config.paths.download_dir.clone();
    let media_dir = config.paths.media_dir.clone();

    let store = Arc::new(SqliteRequestStore::in_memory().unwrap());
    let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
    let scheduled = Arc::new(SqliteScheduledJobStore::in_memory().unwrap());
    let cache = Arc::new(SqliteMetadataCache::in_memory().unwrap());

    let indexer = Arc::new(MockIndexer::new());
    indexer
        .set_results(vec![ReleaseCandidate {
            title: "The Name of the Wind [M4B]".to_string(),
            indexer_id: 1,
            indexer_name: "indexer-a".to_string(),
            indexer_priority: 10,
            download_url: "http://indexer-a/release.torrent".to_string(),
            protocol: Protocol::Torrent,
            size_bytes: 500 * 1024 * 1024,
            seeders: 25,
            flags: vec![],
            mirror_urls: vec![],
        }])
        .await;
    let torrent = Arc::new(MockTorrentClient::with_save_path(
        download_dir.to_string_lossy(),
    ));

    let app = App::new(
        Arc::new(config),
        Arc::clone(&store) as _,
        Arc::clone(&jobs) as _,
        scheduled,
        cache,
        ClientSet {
            indexer: Some(indexer),
            torrent: Some(Arc::clone(&torrent) as _),
            ..Default::default()
        },
    );
    app.start().await.unwrap();

    let request = app
        .submit_request(
            "user-1",
            RequestType::Audiobook,
            NewAudiobook {
                title: "The Name of the Wind".to_string(),
                author: "Patrick Rothfuss".to_string(),
                asin: Some("B0036I54I6".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let request_id = request.id.clone();

    // Search selects the candidate, handoff submits it.
    {
        let store = Arc::clone(&store);
        let id = request_id.clone();
        wait_until(
            move || {
                store.get_request(&id).unwrap().unwrap().status == RequestStatus::Downloading
            },
            "request downloading",
        )
        .await;
    }
    assert_eq!(torrent.added_urls().await, vec!["http://indexer-a/release.torrent"]);

    // Monitor observes partial progress.
    torrent.set_progress("hash-0001", 0.45).await;
    {
        let store = Arc::clone(&store);
        let id = request_id.clone();
        wait_until(
            move || store.get_request(&id).unwrap().unwrap().progress >= 45,
            "progress reached 45",
        )
        .await;
    }

    // Stage the completed download, then let the client report done.
    let content_dir = download_dir.join("torrent-hash-0001");
    std::fs::create_dir_all(&content_dir).unwrap();
    std::fs::write(content_dir.join("The Name of the Wind.m4b"), b"audio-bytes").unwrap();
    std::fs::write(content_dir.join("cover.jpg"), b"cover-bytes").unwrap();
    torrent.set_progress("hash-0001", 1.0).await;

    {
        let store = Arc::clone(&store);
        let id = request_id.clone();
        wait_until(
            move || store.get_request(&id).unwrap().unwrap().status == RequestStatus::Downloaded,
            "request downloaded",
        )
        .await;
    }

    let final_request = store.get_request(&request_id).unwrap().unwrap();
    assert_eq!(final_request.progress, 100);
    assert!(final_request.error_message.is_none());

    // Files landed in the rendered library folder.
    let target = media_dir.join("Patrick Rothfuss/The Name of the Wind B0036I54I6");
    assert!(target.join("The Name of the Wind.m4b").exists());
    assert!(target.join("cover.jpg").exists());
    assert!(!content_dir.join("The Name of the Wind.m4b").exists());

    let audiobook = store.get_audiobook(&final_request.audiobook_id).unwrap().unwrap();
    assert_eq!(
        audiobook.file_path.as_deref(),
        Some(target.to_string_lossy().as_ref())
    );

    // History captured the authoritative path and completion.
    let history = store.latest_selected_history(&request_id).unwrap().unwrap();
    assert!(history.selected);
    assert_eq!(history.download_client, DownloadClientKind::Qbittorrent);
    assert_eq!(
        history.download_path.as_deref(),
        Some(content_dir.to_string_lossy().as_ref())
    );
    assert_eq!(history.download_status, DownloadStatus::Completed);

    // Every pipeline step left an audit row; the search one completed.
    let audit = jobs.find_by_request(&request_id).unwrap();
    assert!(audit.iter().any(|j| j.job_type == JobType::SearchIndexers
        && j.status == JobStatus::Completed));
    assert!(audit.iter().any(|j| j.job_type == JobType::OrganizeFiles
        && j.status == JobStatus::Completed));

    app.stop().await;
}

// --- Scenario: retryable import (path appears later) ---

#[tokio::test]
async fn test_retryable_import_then_success() {
    let h = harness();
    let request = make_request(&h.ctx, RequestType::Audiobook);
    advance_to(
        &h.ctx,
        &request.id,
        &[
            (RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload),
            (RequestStatus::AwaitingDownload, RequestStatus::Downloading),
            (RequestStatus::Downloading, RequestStatus::AwaitingImport),
        ],
    );

    let missing = h
        .ctx
        .config
        .paths
        .download_dir
        .join("not-there-yet")
        .to_string_lossy()
        .into_owned();
    let payload = JobPayload::OrganizeFiles {
        request_id: request.id.clone(),
        audiobook_id: request.audiobook_id.clone(),
        download_path: missing.clone(),
    };

    let organize = OrganizeFilesProcessor;
    let outcome = organize
        .process(payload.clone(), &h.ctx, &queued(payload.clone()))
        .await
        .unwrap();
    assert!(!outcome.success);

    let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(after.status, RequestStatus::AwaitingImport);
    assert_eq!(after.import_attempts, 1);
    assert!(after.error_message.is_some());

    // The path shows up before the scheduled retry.
    let content_dir = h.ctx.config.paths.download_dir.join("not-there-yet");
    std::fs::create_dir_all(&content_dir).unwrap();
    std::fs::write(content_dir.join("book.m4b"), b"audio").unwrap();

    let outcome = organize
        .process(payload.clone(), &h.ctx, &queued(payload))
        .await
        .unwrap();
    assert!(outcome.success, "second attempt should succeed: {}", outcome.message);

    let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(after.status, RequestStatus::Downloaded);
    assert_eq!(after.import_attempts, 1);
    assert!(after.error_message.is_none());
}

// --- Scenario: import retries exhaust into warn + notification ---

#[tokio::test]
async fn test_import_exhaustion_warns_and_notifies() {
    let h = harness();
    // Register only the notification processor so the warn notification
    // actually publishes.
    h.broker
        .set_processor(
            JobType::SendNotification,
            1,
            Arc::new(ProcessorHandler::new(
                Arc::clone(&h.ctx),
                Arc::new(SendNotificationProcessor),
            )),
        )
        .await;

    let request = make_request(&h.ctx, RequestType::Audiobook);
    advance_to(
        &h.ctx,
        &request.id,
        &[
            (RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload),
            (RequestStatus::AwaitingDownload, RequestStatus::Downloading),
            (RequestStatus::Downloading, RequestStatus::AwaitingImport),
        ],
    );

    // An existing directory with zero audio files consumes attempts.
    let empty_dir = h.ctx.config.paths.download_dir.join("empty-release");
    std::fs::create_dir_all(&empty_dir).unwrap();
    let payload = JobPayload::OrganizeFiles {
        request_id: request.id.clone(),
        audiobook_id: request.audiobook_id.clone(),
        download_path: empty_dir.to_string_lossy().into_owned(),
    };

    let organize = OrganizeFilesProcessor;
    for expected_attempts in 1..=3u32 {
        let outcome = organize
            .process(payload.clone(), &h.ctx, &queued(payload.clone()))
            .await
            .unwrap();
        assert!(!outcome.success);

        let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(after.import_attempts, expected_attempts);
        if expected_attempts < 3 {
            assert_eq!(after.status, RequestStatus::AwaitingImport);
        } else {
            assert_eq!(after.status, RequestStatus::Warn);
        }
    }

    // warn requires the exhausted budget and fires a request_error.
    let mut published = Vec::new();
    for _ in 0..100 {
        published = h.notifier.published().await;
        if !published.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(published.len(), 1, "expected one published notification");
    let (kind, body) = &published[0];
    assert_eq!(*kind, NotificationKind::RequestError);
    assert_eq!(body["title"], "The Name of the Wind");
    assert_eq!(body["author"], "Patrick Rothfuss");
    assert_eq!(body["user"], "user-1");
    assert!(body["message"].as_str().unwrap().contains("no audio files"));
}

// --- Scenario: direct download falls back across mirrors ---

#[tokio::test]
async fn test_direct_download_mirror_fallback() {
    let h = harness();
    let request = make_request(&h.ctx, RequestType::Ebook);
    advance_to(
        &h.ctx,
        &request.id,
        &[(RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload)],
    );

    let mirrors = vec![
        "http://mirror-1/page".to_string(),
        "http://mirror-2/page".to_string(),
        "http://mirror-3/page".to_string(),
    ];
    let history = h
        .ctx
        .store
        .insert_history(NewDownloadHistory {
            request_id: request.id.clone(),
            download_client: DownloadClientKind::Direct,
            download_client_id: None,
            torrent_hash: None,
            nzb_id: None,
            torrent_name: Some("The Name of the Wind".to_string()),
            indexer_name: Some("indexer-a".to_string()),
            torrent_url: Some(serde_json::to_string(&mirrors).unwrap()),
        })
        .unwrap();

    // Mirrors 1 and 2 never resolve; mirror 3 serves 4 MB from a local
    // socket.
    let body = vec![0x42u8; 4 * 1024 * 1024];
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = body.clone();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            served.len()
        );
        socket.write_all(header.as_bytes()).await.unwrap();
        socket.write_all(&served).await.unwrap();
    });
    h.scraper
        .resolve("http://mirror-3/page", &format!("http://{addr}/book.epub"), "epub")
        .await;

    let payload = JobPayload::StartDirectDownload {
        request_id: request.id.clone(),
        download_history_id: history.id,
        mirror_urls: mirrors,
        target_filename: "Patrick Rothfuss - The Name of the Wind.epub".to_string(),
        expected_size: Some(body.len() as u64),
    };
    let outcome = StartDirectDownloadProcessor
        .process(payload.clone(), &h.ctx, &queued(payload))
        .await
        .unwrap();
    assert!(outcome.success, "direct download should succeed: {}", outcome.message);
    assert_eq!(outcome.details["mirror"], 2);

    // All three mirrors were attempted in order.
    assert_eq!(
        h.scraper.requested_pages().await,
        vec![
            "http://mirror-1/page",
            "http://mirror-2/page",
            "http://mirror-3/page"
        ]
    );

    let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(after.status, RequestStatus::AwaitingImport);

    let dest = h
        .ctx
        .config
        .paths
        .download_dir
        .join("Patrick Rothfuss - The Name of the Wind.epub");
    assert_eq!(std::fs::read(&dest).unwrap().len(), body.len());

    let history = h.ctx.store.get_history(history.id).unwrap().unwrap();
    assert_eq!(history.download_status, DownloadStatus::Completed);
    assert_eq!(
        history.download_path.as_deref(),
        Some(dest.to_string_lossy().as_ref())
    );

    // The organize job is queued behind the monitor hop.
    let counts = h.broker.counts().await;
    assert!(counts.waiting + counts.delayed >= 2);
}

// --- Scenario: all mirrors fail ---

#[tokio::test]
async fn test_direct_download_all_mirrors_fail() {
    let h = harness();
    let request = make_request(&h.ctx, RequestType::Ebook);
    advance_to(
        &h.ctx,
        &request.id,
        &[(RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload)],
    );
    let history = h
        .ctx
        .store
        .insert_history(NewDownloadHistory {
            request_id: request.id.clone(),
            download_client: DownloadClientKind::Direct,
            download_client_id: None,
            torrent_hash: None,
            nzb_id: None,
            torrent_name: None,
            indexer_name: None,
            torrent_url: None,
        })
        .unwrap();

    let payload = JobPayload::StartDirectDownload {
        request_id: request.id.clone(),
        download_history_id: history.id,
        mirror_urls: vec![
            "http://mirror-1/page".to_string(),
            "http://mirror-2/page".to_string(),
        ],
        target_filename: "book.epub".to_string(),
        expected_size: None,
    };
    let outcome = StartDirectDownloadProcessor
        .process(payload.clone(), &h.ctx, &queued(payload))
        .await
        .unwrap();
    assert!(!outcome.success);

    let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(after.status, RequestStatus::Failed);
    assert!(after.error_message.unwrap().contains("mirrors failed"));

    let history = h.ctx.store.get_history(history.id).unwrap().unwrap();
    assert_eq!(history.download_status, DownloadStatus::Failed);
}

// --- Soft-deleted and cancelled requests are untouchable ---

#[tokio::test]
async fn test_processors_refuse_deleted_and_cancelled_requests() {
    let h = harness();
    let request = make_request(&h.ctx, RequestType::Audiobook);
    advance_to(
        &h.ctx,
        &request.id,
        &[
            (RequestStatus::AwaitingSearch, RequestStatus::AwaitingDownload),
            (RequestStatus::AwaitingDownload, RequestStatus::Downloading),
        ],
    );
    h.ctx.store.soft_delete(&request.id).unwrap();

    let payload = JobPayload::MonitorDownload {
        request_id: request.id.clone(),
        download_history_id: 1,
        download_client_id: "TORR-1".to_string(),
        download_client: DownloadClientKind::Qbittorrent,
    };
    let outcome = shelfarr_core::MonitorDownloadProcessor
        .process(payload.clone(), &h.ctx, &queued(payload))
        .await
        .unwrap();
    assert!(outcome.success);

    // No monitor self-enqueue happened, and nothing was written.
    assert_eq!(h.broker.counts().await.delayed, 0);
    let after = h.ctx.store.get_request(&request.id).unwrap().unwrap();
    assert_eq!(after.status, RequestStatus::Downloading);
    assert_eq!(after.progress, 0);
    assert_eq!(h.jobs.find_by_request(&request.id).unwrap().len(), 0);
}
