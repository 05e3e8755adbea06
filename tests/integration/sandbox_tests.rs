//! Postman-style test scripts run against live responses.

use super::{dev_session, orchestrator, test_config};
use rest_workbench::models::{HttpMethod, RequestDefinition};
use rest_workbench::scripts::sandbox::SCRIPT_ERROR_NAME;
use rest_workbench::variables::VariableScope;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn token_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Session", "s-1")
                .set_body_json(json!({
                    "token": "t-99",
                    "expiresIn": 3600,
                    "roles": ["reader", "writer"],
                    "profile": {"name": "Ada", "active": true}
                })),
        )
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_pm_script_assertions_and_writes() {
    let mock_server = token_server().await;
    let mut request = RequestDefinition::new("auth", HttpMethod::POST, "{{apiUrl}}/auth");
    request.test_script = r#"
        const body = pm.response.json();

        pm.test("status is 200", function () {
            pm.response.to.have.status(200);
        });

        pm.test("token is present", () => {
            pm.expect(body).to.have.property("token");
            pm.expect(body.token).to.be.a("string");
            pm.expect(body.roles).to.include("writer");
            pm.expect(body.profile).to.eql({ name: "Ada", active: true });
        });

        pm.test("expiry is an hour", () => {
            pm.expect(body.expiresIn).to.be.within(3000, 4000);
        });

        pm.test("deliberately wrong", () => {
            pm.expect(body.roles.length).to.equal(3);
        });

        pm.environment.set("authToken", body.token);
        pm.collectionVariables.set("session", pm.response.headers.get("X-Session"));
        pm.globals.set("roles", body.roles.join(","));
    "#
    .to_string();

    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str())]);
    session.store.set_current_collection(Some("c1".to_string()));
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("send should complete");

    let names: Vec<&str> = outcome.test_results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["status is 200", "token is present", "expiry is an hour", "deliberately wrong"]
    );
    assert!(outcome.test_results[..3].iter().all(|r| r.passed), "{:?}", outcome.test_results);
    assert!(!outcome.test_results[3].passed);

    assert_eq!(session.store.get("authToken"), Some("t-99".to_string()));
    assert_eq!(
        session.store.get_scoped(VariableScope::Collection, "session"),
        Some("s-1".to_string())
    );
    assert_eq!(
        session.store.get_scoped(VariableScope::Global, "roles"),
        Some("reader,writer".to_string())
    );
}

#[tokio::test]
async fn test_script_error_becomes_failed_result() {
    let mock_server = token_server().await;
    let mut request = RequestDefinition::new("auth", HttpMethod::POST, "{{apiUrl}}/auth");
    request.test_script = r#"
        pm.test("before", () => {});
        const profile = pm.response.json().missing;
        profile.name;
    "#
    .to_string();

    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str())]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("script errors do not abort the send");

    assert_eq!(outcome.test_results.len(), 2);
    assert!(outcome.test_results[0].passed);
    assert_eq!(outcome.test_results[1].name, SCRIPT_ERROR_NAME);
    assert!(!outcome.test_results[1].passed);
}

#[tokio::test]
async fn test_syntax_error_is_reported() {
    let mock_server = token_server().await;
    let mut request = RequestDefinition::new("auth", HttpMethod::POST, "{{apiUrl}}/auth");
    request.test_script = "pm.test('broken', () => { pm.expect(1).to.equal(1);".to_string();

    let mut session = dev_session(&[("apiUrl", mock_server.uri().as_str())]);
    let outcome = orchestrator(&test_config(5000))
        .send(&mut session, &request)
        .await
        .expect("syntax errors do not abort the send");

    assert_eq!(outcome.test_results.len(), 1);
    assert_eq!(outcome.test_results[0].name, SCRIPT_ERROR_NAME);
    assert!(outcome.test_results[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("SyntaxError"));
}
