//! Collection runs where later requests depend on earlier responses.

use super::{dev_session, orchestrator, test_config};
use rest_workbench::models::{Collection, HttpMethod, RequestDefinition};
use rest_workbench::pipeline::{BatchRunner, RunStatus};
use rest_workbench::variables::{ScopeKey, Variable};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chained_collection() -> Collection {
    let mut collection = Collection::new("users-api", "Users API");
    collection
        .variables
        .insert("userPath".to_string(), Variable::new("/users/42"));

    let mut login = RequestDefinition::new("login", HttpMethod::POST, "{{apiUrl}}/login");
    login.name = "Login".to_string();
    login.test_script = r#"
        pm.test("logged in", () => pm.response.to.have.status(200));
        const body = pm.response.json();
        if (body.token) {
            pm.environment.set("token", body.token);
        }
    "#
    .to_string();

    let mut profile = RequestDefinition::new("profile", HttpMethod::GET, "{{apiUrl}}{{userPath}}");
    profile.name = "Profile".to_string();
    profile.pre_request_script = "addHeaderWithVar X-Token token".to_string();
    profile.test_script = "status 200\njsonValueEquals name Ada".to_string();

    collection.requests = vec![login, profile];
    collection
}

#[tokio::test]
async fn test_token_flows_to_next_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-7"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("X-Token", "t-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut collection = chained_collection();
    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str())]);
    session.store.load_scope(
        ScopeKey::Collection(collection.id.clone()),
        collection.variables.clone(),
    );

    let runner = BatchRunner::new(orchestrator(&test_config(5000)));
    let summary = runner.run_collection(&mut session, &mut collection).await;

    assert!(summary.is_success(), "{:?}", summary);
    assert_eq!(summary.tests().passed, 3);
    assert_eq!(session.store.get("token"), Some("t-7".to_string()));

    let profile = collection.request("profile").expect("profile request");
    let last = profile
        .last_response_execution
        .as_ref()
        .expect("last execution recorded");
    assert_eq!(last.response.status, 200);
    assert_eq!(last.test_results.len(), 2);
    assert_eq!(
        profile
            .last_request_execution
            .as_ref()
            .and_then(|r| r.header("X-Token")),
        Some("t-7")
    );
}

#[tokio::test]
async fn test_failed_login_aborts_dependent_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "denied"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut collection = chained_collection();
    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str())]);
    session.store.load_scope(
        ScopeKey::Collection(collection.id.clone()),
        collection.variables.clone(),
    );

    let runner = BatchRunner::new(orchestrator(&test_config(5000)));
    let summary = runner.run_collection(&mut session, &mut collection).await;

    assert!(!summary.is_success());
    assert_eq!(summary.runs.len(), 2);
    match &summary.runs[0].status {
        RunStatus::Completed { code, test_results, .. } => {
            assert_eq!(*code, 401);
            assert!(!test_results[0].passed);
        }
        other => panic!("login should complete, got {:?}", other),
    }
    assert!(summary.runs[1].is_aborted());
}
