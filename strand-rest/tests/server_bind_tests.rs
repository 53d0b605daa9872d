//! In-process tests of the server binder's routing, parameter extraction
//! and error mapping.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use strand_rest::{bind_contract, Contract, OpBuilder, RestError};
use tower::util::ServiceExt; // for `oneshot`

mod common;

fn test_app() -> Router {
    common::init_tracing();
    let items = Contract::new("Items").operation(
        OpBuilder::new("getText").handler(|_| async { Ok(json!("Hello, World")) }),
    );
    let api = Contract::new("DemoApi")
        .with_root("/api/")
        .operation(
            OpBuilder::new("getName")
                .param("id")
                .handler(|params| async move {
                    let id: u32 = params.get("id")?;
                    Ok(json!(format!("<user {id}>")))
                }),
        )
        .operation(
            OpBuilder::new("addNewUser")
                .param("name")
                .handler(|params| async move {
                    let name: String = params.get("name")?;
                    Ok(json!(format!("created {name}")))
                }),
        )
        .operation(
            OpBuilder::new("getGreeting")
                .param_default("salutation", json!("Hello"))
                .param("name")
                .handler(|params| async move {
                    let salutation: String = params.get("salutation")?;
                    let name: String = params.get("name")?;
                    Ok(json!(format!("{salutation}, {name}")))
                }),
        )
        .operation(OpBuilder::new("index").handler(|_| async { Ok(json!({})) }))
        .operation(OpBuilder::new("items").getter().sub(items))
        .operation(OpBuilder::new("boom").handler(|_| async {
            Err(RestError::internal("something broke"))
        }))
        .operation(OpBuilder::new("getTeapot").handler(|_| async {
            Err(RestError::status(StatusCode::IM_A_TEAPOT, "short and stout"))
        }));
    bind_contract(api).expect("contract binds")
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!(null));
    (status, json)
}

#[tokio::test]
async fn legacy_id_routes_take_the_id_from_the_path() {
    let (status, body) = get(test_app(), "/api/5/name").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("<user 5>"));
}

#[tokio::test]
async fn missing_body_is_a_protocol_error() {
    let request = Request::builder()
        .uri("/api/new_user")
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(test_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["statusMessage"].as_str().unwrap();
    assert!(message.contains("body"), "message names the body: {message}");
}

#[tokio::test]
async fn body_parameters_reach_the_handler() {
    let (status, body) = post_json(test_app(), "/api/new_user", json!({"name": "Ada"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("created Ada"));
}

#[tokio::test]
async fn sub_contracts_mount_under_their_getter() {
    let (status, body) = get(test_app(), "/api/items/text").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Hello, World"));
}

#[tokio::test]
async fn index_serves_the_prefix_root() {
    let (status, body) = get(test_app(), "/api/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn declared_defaults_substitute_for_missing_parameters() {
    let (status, body) = get(test_app(), "/api/greeting?name=Bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Hello, Bob"));

    let (status, body) = get(test_app(), "/api/greeting?name=Bob&salutation=Hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("Hi, Bob"));
}

#[tokio::test]
async fn missing_parameter_without_default_fails() {
    let (status, body) = get(test_app(), "/api/greeting?salutation=Hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["statusMessage"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn status_errors_propagate_verbatim() {
    let (status, body) = get(test_app(), "/api/teapot").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body["statusMessage"], json!("short and stout"));
    assert!(body.get("statusDebugMessage").is_none());
}

#[tokio::test]
async fn unexpected_errors_map_to_500_with_debug_message() {
    let (status, body) = post_json(test_app(), "/api/boom", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["statusMessage"], json!("something broke"));
    assert!(body["statusDebugMessage"].is_string());
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (status, _) = get(test_app(), "/api/no_such_thing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
