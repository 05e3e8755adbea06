//! End-to-end sends through the real HTTP transport against a mock server.

use super::{dev_session, orchestrator, test_config};
use rest_workbench::executor::TransportError;
use rest_workbench::models::{ApiKeyLocation, AuthSpec, BodyType, HttpMethod, RequestDefinition};
use rest_workbench::pipeline::PipelineError;
use rest_workbench::variables::VariableScope;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_interpolated_url_and_pre_request_header() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("X-Trace", "abc"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Request-Id", "req-1")
                .set_body_json(json!({"users": [{"id": 1}, {"id": 2}], "total": 2})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("list", HttpMethod::GET, "{{apiUrl}}/users");
    request.params.insert("page".to_string(), "{{page}}".to_string());
    request.pre_request_script = "addHeader X-Trace abc".to_string();
    request.test_script = [
        "status 200",
        "jsonHasProperty users",
        "jsonArrayLengthEquals users 2",
        "jsonValueEquals total 2",
        "headerValueEquals X-Request-Id req-1",
        "setVarFromHeader requestId X-Request-Id",
    ]
    .join("\n");

    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str()), ("page", "2")]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("send should complete");

    assert!(outcome.test_results.iter().all(|r| r.passed), "{:?}", outcome.test_results);
    assert_eq!(outcome.test_results.len(), 6);
    assert_eq!(outcome.request.url, format!("{}/users?page=2", mock_server.uri()));
    assert_eq!(outcome.response.body["total"], json!(2));
    assert_eq!(
        session.store.get_scoped(VariableScope::Environment, "requestId"),
        Some("req-1".to_string())
    );
    assert_eq!(request.url, "{{apiUrl}}/users");
}

#[tokio::test]
async fn test_json_body_round_trip() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "Ada", "tags": ["admin"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7, "name": "Ada"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("create", HttpMethod::POST, "{{apiUrl}}/users");
    request.set_body(r#"{"name": "{{userName}}", "tags": ["admin"]}"#, BodyType::Json);
    request.test_script = "status 201\njsonValueEquals id 7\njsonValueEquals name Ada".to_string();

    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str()), ("userName", "Ada")]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("send should complete");

    assert_eq!(outcome.summary().failed, 0, "{:?}", outcome.test_results);
    assert_eq!(outcome.response.status, 201);
    assert_eq!(outcome.response.status_text, "Created");
    assert_eq!(
        outcome.request.body.as_deref(),
        Some(r#"{"name": "Ada", "tags": ["admin"]}"#)
    );
}

#[tokio::test]
async fn test_urlencoded_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("user=ada&note=two+words"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("login", HttpMethod::POST, format!("{}/login", mock_server.uri()));
    request.add_header("Content-Type", "text/plain");
    request.set_body("user={{user}}&note=two words", BodyType::UrlEncoded);
    request.test_script = "status 204".to_string();

    let mut session = dev_session(&[("user", "ada")]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("send should complete");

    assert!(outcome.test_results[0].passed);
    assert_eq!(outcome.response.body_text, "");
}

#[tokio::test]
async fn test_auth_headers_and_query_key() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer t-42"))
        .and(query_param("api_key", "k1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/basic"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = orchestrator(&test_config(5000));
    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str()), ("token", "t-42")]);

    let mut bearer = RequestDefinition::new("bearer", HttpMethod::GET, "{{apiUrl}}/secure");
    bearer.auth = AuthSpec::Bearer {
        token: "{{token}}".to_string(),
    };
    bearer.test_script = "status 200\nbodyContains ok".to_string();
    let outcome = orchestrator.send(&mut session, &bearer).await.unwrap();
    assert_eq!(outcome.summary().failed, 0, "{:?}", outcome.test_results);

    let mut keyed = bearer.clone();
    keyed.id = "keyed".to_string();
    keyed.auth = AuthSpec::ApiKey {
        key: "api_key".to_string(),
        value: "k1".to_string(),
        add_to: ApiKeyLocation::Query,
    };
    keyed.add_header("Authorization", "Bearer {{token}}");
    let outcome = orchestrator.send(&mut session, &keyed).await.unwrap();
    assert_eq!(outcome.summary().failed, 0, "{:?}", outcome.test_results);

    let mut basic = RequestDefinition::new("basic", HttpMethod::GET, "{{apiUrl}}/basic");
    basic.auth = AuthSpec::Basic {
        username: "user".to_string(),
        password: "pass".to_string(),
    };
    basic.test_script = "status 200".to_string();
    let outcome = orchestrator.send(&mut session, &basic).await.unwrap();
    assert!(outcome.test_results[0].passed);
}

#[tokio::test]
async fn test_not_found_is_a_completed_send() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("missing", HttpMethod::GET, format!("{}/missing", mock_server.uri()));
    request.test_script = "status 200\nbodyContains no such".to_string();

    let mut session = dev_session(&[]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("a 404 still completes the send");

    assert_eq!(outcome.response.status, 404);
    assert!(outcome.response.is_client_error());
    assert_eq!(outcome.response.body, json!("no such thing"));
    assert!(!outcome.test_results[0].passed);
    assert_eq!(
        outcome.test_results[0].error.as_deref(),
        Some("Expected status 200 but got 404")
    );
    assert!(outcome.test_results[1].passed);
}

#[tokio::test]
async fn test_timeout_aborts_send() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&mock_server)
        .await;

    let request = RequestDefinition::new("slow", HttpMethod::GET, format!("{}/slow", mock_server.uri()));
    let mut session = dev_session(&[]);
    let result = orchestrator(&test_config(100)).send(&mut session, &request).await;

    match result {
        Err(PipelineError::Transport(TransportError::Timeout(ms))) => assert_eq!(ms, 100),
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undefined_variable_never_reaches_server() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("r1", HttpMethod::GET, mock_server.uri());
    request.pre_request_script = "addHeaderWithVar X-Token missingToken".to_string();

    let mut session = dev_session(&[]);
    let err = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UndefinedVariable(_)));
    assert!(err.to_string().contains("missingToken"));
}

#[tokio::test]
async fn test_malformed_json_body_never_reaches_server() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut request = RequestDefinition::new("r1", HttpMethod::POST, mock_server.uri());
    request.set_body("{\"a\": ", BodyType::Json);

    let mut session = dev_session(&[]);
    let err = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_unresolved_host_is_invalid_url() {
    let request = RequestDefinition::new("r1", HttpMethod::GET, "{{neverDefined}}/path");
    let mut session = dev_session(&[]);
    let err = orchestrator(&test_config(1000))
        .send(&mut session, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Transport(TransportError::InvalidUrl(_))), "{:?}", err);
}
