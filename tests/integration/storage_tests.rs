//! Persistence of variables and history across sessions.

use super::{init_test_env, test_config};
use rest_workbench::config::ClientConfig;
use rest_workbench::models::{AuthSpec, Collection, HttpMethod, RequestDefinition};
use rest_workbench::pipeline::{Orchestrator, Session};
use rest_workbench::storage::{FileStorage, Storage};
use rest_workbench::variables::{ScopeKey, Variable, VariableScope};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn history_config(limit: usize) -> ClientConfig {
    ClientConfig {
        save_history: true,
        history_limit: limit,
        ..test_config(5000)
    }
}

async fn seeded_storage(dir: &TempDir, api_url: &str) -> Arc<FileStorage> {
    let storage = Arc::new(FileStorage::new(dir.path().join("data")));
    storage
        .set_variable(
            &ScopeKey::Environment("dev".to_string()),
            "apiUrl",
            &Variable::new(api_url),
        )
        .await
        .expect("Failed to seed variables");
    storage
}

#[tokio::test]
async fn test_script_writes_survive_a_new_session() {
    init_test_env();
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-5"})))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir, &mock_server.uri()).await;
    let collection = Collection::new("c1", "Auth");

    let mut request = RequestDefinition::new("open", HttpMethod::POST, "{{apiUrl}}/session");
    request.test_script = r#"
        pm.environment.set("token", pm.response.json().token);
        pm.collectionVariables.set("opened", "yes");
        pm.variables.set("scratch", "kept in memory");
    "#
    .to_string();

    let orchestrator = Orchestrator::from_config(&test_config(5000))
        .unwrap()
        .with_storage(storage.clone());
    let mut session = Session::load(storage.as_ref(), Some("dev"), Some(&collection))
        .await
        .unwrap();
    orchestrator.send(&mut session, &request).await.unwrap();
    assert!(session.store.pending_writes().is_empty());

    let reopened = FileStorage::new(dir.path().join("data"));
    let session = Session::load(&reopened, Some("dev"), Some(&collection))
        .await
        .unwrap();
    assert_eq!(session.store.get("token"), Some("t-5".to_string()));
    assert_eq!(
        session.store.get_scoped(VariableScope::Collection, "opened"),
        Some("yes".to_string())
    );
    assert_eq!(session.store.get("scratch"), None);
}

#[tokio::test]
async fn test_history_is_sanitized_and_capped() {
    init_test_env();
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "sid=secret")
                .insert_header("X-Request-Id", "r-1")
                .set_body_json(json!({"id": 1})),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir, &mock_server.uri()).await;
    let orchestrator = Orchestrator::from_config(&history_config(2))
        .unwrap()
        .with_storage(storage.clone());

    let mut request = RequestDefinition::new("me", HttpMethod::GET, "{{apiUrl}}/me");
    request.auth = AuthSpec::Bearer {
        token: "very-secret".to_string(),
    };
    request.add_header("X-Client", "tests");
    request.test_script = "status 200".to_string();

    let mut session = Session::load(storage.as_ref(), Some("dev"), None)
        .await
        .unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let outcome = orchestrator.send(&mut session, &request).await.unwrap();
        ids.push(outcome.history_id.expect("history written"));
    }

    let history = storage.get_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, ids[1]);
    assert_eq!(history[1].id, ids[2]);

    let entry = &history[1];
    assert_eq!(entry.request_id.as_deref(), Some("me"));
    assert_eq!(entry.request.header("Authorization"), None);
    assert_eq!(entry.request.header("X-Client"), Some("tests"));
    assert!(!entry.response.headers.contains("set-cookie"));
    assert_eq!(entry.response.header("x-request-id"), Some("r-1"));
    assert_eq!(entry.summary().passed, 1);
}

#[tokio::test]
async fn test_history_disabled() {
    init_test_env();
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir, &mock_server.uri()).await;
    let orchestrator = Orchestrator::from_config(&test_config(5000))
        .unwrap()
        .with_storage(storage.clone());

    let request = RequestDefinition::new("ping", HttpMethod::GET, "{{apiUrl}}/ping");
    let mut session = Session::load(storage.as_ref(), Some("dev"), None)
        .await
        .unwrap();
    let outcome = orchestrator.send(&mut session, &request).await.unwrap();

    assert_eq!(outcome.history_id, None);
    assert!(storage.get_history().await.unwrap().is_empty());
}
