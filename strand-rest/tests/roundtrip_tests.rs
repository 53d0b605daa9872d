//! Client/server round trips over a loopback listener: the same contract
//! description drives both binders, so every call must agree on the wire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use strand_rest::{
    bind_contract, ClientParams, Contract, OpBuilder, RestClient, RestError,
};

mod common;

fn demo_contract() -> Contract {
    let items = Contract::new("Items").operation(
        OpBuilder::new("getText").handler(|_| async { Ok(json!("Hello, World")) }),
    );
    Contract::new("DemoApi")
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
                    let _name: String = params.get("name")?;
                    Ok(json!({}))
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
        .operation(
            OpBuilder::new("sumAll")
                .param("values")
                .handler(|params| async move {
                    let values: Vec<i64> = params.get("values")?;
                    Ok(json!(values.iter().sum::<i64>()))
                }),
        )
        .operation(
            OpBuilder::new("queryTotal")
                .param("values")
                .handler(|params| async move {
                    let values: Vec<i64> = params.get("values")?;
                    Ok(json!(values.iter().sum::<i64>()))
                }),
        )
        .operation(
            OpBuilder::new("tagNote")
                .method(strand_rest::Method::POST)
                .path("compound/:tag")
                .param("_tag")
                .param("note")
                .handler(|params| async move {
                    let tag: String = params.get("_tag")?;
                    let note: String = params.get("note")?;
                    Ok(json!(format!("{tag}: {note}")))
                }),
        )
        .operation(OpBuilder::new("getTeapot").handler(|_| async {
            Err(RestError::status(StatusCode::IM_A_TEAPOT, "short and stout"))
        }))
        .operation(OpBuilder::new("index").handler(|_| async { Ok(json!(["users", "items"])) }))
        .operation(OpBuilder::new("items").getter().sub(items))
}

async fn start_client() -> RestClient {
    common::init_tracing();
    let contract = demo_contract();
    let spec = contract.spec();
    let router = bind_contract(contract).expect("contract binds");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    RestClient::new(&format!("http://{addr}"), spec).unwrap()
}

#[tokio::test]
async fn typed_get_round_trips() {
    let client = start_client().await;
    let name: String = client
        .call_as("getName", ClientParams::new().arg("id", &5).unwrap())
        .await
        .unwrap();
    assert_eq!(name, "<user 5>");
}

#[tokio::test]
async fn void_post_round_trips() {
    let client = start_client().await;
    client
        .call_void("addNewUser", ClientParams::new().arg("name", &"Ada").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn composite_parameters_travel_in_the_body() {
    let client = start_client().await;
    let sum: i64 = client
        .call_as(
            "sumAll",
            ClientParams::new().arg("values", &vec![1, 2, 3, 4]).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(sum, 10);
}

#[tokio::test]
async fn composite_query_parameters_travel_as_json_text() {
    let client = start_client().await;
    let total: i64 = client
        .call_as(
            "queryTotal",
            ClientParams::new().arg("values", &vec![5, 6, 7]).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(total, 18);
}

#[tokio::test]
async fn omitted_defaults_are_filled_in() {
    let client = start_client().await;
    let greeting: String = client
        .call_as("getGreeting", ClientParams::new().arg("name", &"Bob").unwrap())
        .await
        .unwrap();
    assert_eq!(greeting, "Hello, Bob");

    let greeting: String = client
        .call_as(
            "getGreeting",
            ClientParams::new()
                .arg("salutation", &"Hi")
                .unwrap()
                .arg("name", &"Bob")
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(greeting, "Hi, Bob");
}

#[tokio::test]
async fn omitting_a_required_parameter_is_a_client_visible_protocol_error() {
    let client = start_client().await;
    let err = client
        .call_as::<String>("getGreeting", ClientParams::new())
        .await
        .unwrap_err();
    match err {
        RestError::Status { status, message } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(message.contains("name"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn overridden_paths_substitute_placeholders() {
    let client = start_client().await;
    let tagged: String = client
        .call_as(
            "tagNote",
            ClientParams::new()
                .arg("_tag", &"urgent")
                .unwrap()
                .arg("note", &"call back")
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(tagged, "urgent: call back");
}

#[tokio::test]
async fn status_errors_surface_with_their_message() {
    let client = start_client().await;
    let err = client
        .call("getTeapot", ClientParams::new())
        .await
        .unwrap_err();
    match err {
        RestError::Status { status, message } => {
            assert_eq!(status, StatusCode::IM_A_TEAPOT);
            assert_eq!(message, "short and stout");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn index_addresses_the_prefix_root() {
    let client = start_client().await;
    let listing: Vec<String> = client.call_as("index", ClientParams::new()).await.unwrap();
    assert_eq!(listing, vec!["users", "items"]);
}

#[tokio::test]
async fn sub_clients_reach_the_mounted_child() {
    let client = start_client().await;
    let items = client.sub("items").unwrap();
    let text: String = items.call_as("getText", ClientParams::new()).await.unwrap();
    assert_eq!(text, "Hello, World");
}

#[tokio::test]
async fn request_filters_see_every_request() {
    common::init_tracing();
    let contract = demo_contract();
    let spec = contract.spec();
    let router = bind_contract(contract).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let filtered = Arc::new(AtomicUsize::new(0));
    let counter = filtered.clone();
    let client = RestClient::new(&format!("http://{addr}"), spec)
        .unwrap()
        .with_request_filter(move |request| {
            counter.fetch_add(1, Ordering::SeqCst);
            request.header("x-demo-auth", "secret")
        });
    let _: String = client
        .call_as("getName", ClientParams::new().arg("id", &1).unwrap())
        .await
        .unwrap();
    assert_eq!(filtered.load(Ordering::SeqCst), 1);

    // The filter propagates into sub-contract clients.
    let items = client.sub("items").unwrap();
    let _: String = items.call_as("getText", ClientParams::new()).await.unwrap();
    assert_eq!(filtered.load(Ordering::SeqCst), 2);
}
