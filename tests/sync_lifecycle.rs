//! Sync client lifecycle against a file-backed config store

mod common;

use common::*;
use std::sync::Arc;
use survey_sync_core::{
    ConfigStore, DisplayOption, FetchError, FetchErrorCode, FileConfigStore, SurveySyncError,
    SyncClient, SyncState,
};
use tempfile::TempDir;

fn client_with(
    fetcher: Arc<ScriptedFetcher>,
    updater: Arc<UnreachableUpdater>,
    store: Arc<FileConfigStore>,
) -> SyncClient {
    SyncClient::new(fetcher, updater, store)
}

#[tokio::test]
async fn test_persisted_config_survives_restart_without_remote_calls() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(dir.path().join("config.json")));
    let surveys = vec![
        survey("s1", DisplayOption::RespondMultiple),
        survey("s2", DisplayOption::DisplayOnce),
    ];

    let fetcher = ScriptedFetcher::ok(fresh_environment(surveys));
    let first = client_with(fetcher.clone(), Arc::default(), store.clone());
    first.setup(ENV, APP_URL).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    let filtered = first.filtered_surveys().await;
    assert_eq!(ids(&filtered), vec!["s1", "s2"]);

    // a new process reads the same file
    let offline = ScriptedFetcher::failing(FetchError::network("offline"));
    let updater = Arc::new(UnreachableUpdater::default());
    let second = client_with(offline.clone(), updater.clone(), store);
    second.setup(ENV, APP_URL).await.unwrap();

    assert_eq!(offline.calls(), 0);
    assert_eq!(updater.calls(), 0);
    assert_eq!(second.state().await, SyncState::Ready);
    assert_eq!(second.filtered_surveys().await, filtered);
}

#[tokio::test]
async fn test_forbidden_first_setup_is_fatal_and_recorded() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(dir.path().join("config.json")));

    let fetcher = ScriptedFetcher::failing(FetchError::forbidden("No access"));
    let client = client_with(fetcher.clone(), Arc::default(), store.clone());

    let err = client.setup(ENV, APP_URL).await.unwrap_err();
    match &err {
        SurveySyncError::SetupFailed { code, message } => {
            assert_eq!(*code, FetchErrorCode::Forbidden);
            assert_eq!(message, "No access");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("Could not set up"));

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains(r#""value":"error""#));

    // retrying inside the backoff window makes no remote call
    let retry = client_with(fetcher.clone(), Arc::default(), store);
    retry.setup(ENV, APP_URL).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(retry.state().await, SyncState::Error);
}

#[tokio::test]
async fn test_concurrent_setup_runs_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(dir.path().join("config.json")));
    let fetcher = ScriptedFetcher::ok(fresh_environment(vec![survey(
        "s1",
        DisplayOption::RespondMultiple,
    )]));
    let client = Arc::new(client_with(fetcher.clone(), Arc::default(), store));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(
            async move { client.setup(ENV, APP_URL).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(fetcher.calls(), 1);
    assert!(client.is_setup());
}

#[tokio::test]
async fn test_unreadable_store_is_treated_as_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, b"not json at all").unwrap();
    let store = Arc::new(FileConfigStore::new(&path));

    let fetcher = ScriptedFetcher::ok(fresh_environment(vec![]));
    let client = client_with(fetcher.clone(), Arc::default(), store.clone());
    client.setup(ENV, APP_URL).await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    let stored = store.load().await.unwrap().unwrap();
    assert!(stored.matches(ENV, APP_URL));
}

#[tokio::test]
async fn test_tear_down_keeps_environment_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(dir.path().join("config.json")));
    let fetcher = ScriptedFetcher::ok(fresh_environment(vec![survey(
        "s1",
        DisplayOption::RespondMultiple,
    )]));

    let client = client_with(fetcher, Arc::default(), store.clone());
    client.setup(ENV, APP_URL).await.unwrap();
    client.tear_down().await;

    let stored = store.load().await.unwrap().unwrap();
    assert!(stored.environment.is_some());
    assert!(stored.user.data.is_anonymous());
    assert!(client.is_setup());
}
