//! Server binder: walks a contract and registers one route per operation.

use crate::contract::{Contract, OpKind, OpSpec, Params};
use crate::error::{ErrorBody, RestError, RestResult};
use crate::route::{root_path, route_for};
use crate::value::RestValue;

use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{self, MethodFilter};
use axum::{Json, Router};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct OpRuntime {
    spec: OpSpec,
    method: Method,
    handler: crate::contract::Handler,
}

/// Turn a contract into an axum [`Router`].
///
/// Routes mount under the contract's root path; sub-contracts mount
/// recursively. Fails on descriptor problems (a sub-contract getter with
/// parameters, an operation without a handler).
pub fn bind_contract(contract: Contract) -> RestResult<Router> {
    let prefix = root_path(&contract.name, contract.root.as_deref(), contract.style);
    mount(Router::new(), &prefix, contract)
}

fn mount(mut router: Router, prefix: &str, contract: Contract) -> RestResult<Router> {
    let style = contract.style;
    for op in contract.ops {
        let route = route_for(&op.spec, style);
        match op.kind {
            OpKind::Sub(child) => {
                if !op.spec.params.is_empty() {
                    return Err(RestError::contract(format!(
                        "sub-contract getter {:?} must not take parameters",
                        op.spec.name
                    )));
                }
                let child_prefix = format!("{prefix}{}/", route.path);
                router = mount(router, &child_prefix, child)?;
            }
            OpKind::Handler(handler) => {
                let runtime = Arc::new(OpRuntime {
                    spec: op.spec,
                    method: route.method.clone(),
                    handler,
                });
                let full = format!("{prefix}{}", route.path);
                debug!(method = %route.method, path = %full, "registering route");
                router = add_route(router, &full, &route.method, runtime.clone())?;
                // Legacy: a first parameter literally named `id` also
                // registers under an injected `:id` placeholder.
                if runtime.spec.params.first().is_some_and(|p| p.name == "id") {
                    let legacy = if route.path.is_empty() {
                        format!("{prefix}:id")
                    } else {
                        format!("{prefix}:id/{}", route.path)
                    };
                    debug!(method = %route.method, path = %legacy, "registering legacy id route");
                    router = add_route(router, &legacy, &route.method, runtime)?;
                }
            }
            OpKind::Declared => {
                return Err(RestError::contract(format!(
                    "operation {:?} has no handler",
                    op.spec.name
                )));
            }
        }
    }
    Ok(router)
}

fn add_route(
    router: Router,
    path: &str,
    method: &Method,
    op: Arc<OpRuntime>,
) -> RestResult<Router> {
    let filter = MethodFilter::try_from(method.clone())
        .map_err(|_| RestError::contract(format!("unroutable HTTP method {method}")))?;
    let handler = move |Path(paths): Path<HashMap<String, String>>,
                        Query(query): Query<HashMap<String, String>>,
                        headers: HeaderMap,
                        body: Bytes| {
        let op = op.clone();
        async move {
            match handle_request(&op, &paths, &query, &headers, &body).await {
                Ok(value) => (StatusCode::OK, Json(value)).into_response(),
                Err(err) => error_response(err),
            }
        }
    };
    Ok(router.route(path, routing::on(filter, handler)))
}

async fn handle_request(
    op: &OpRuntime,
    paths: &HashMap<String, String>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> RestResult<Value> {
    let params = extract_params(op, paths, query, headers, body)?;
    (op.handler)(params).await
}

/// Pull every declared parameter out of the request, by the placement
/// rules: legacy `id` and `_name` parameters from path placeholders, the
/// rest from the query string (GET/HEAD) or the JSON body object.
fn extract_params(
    op: &OpRuntime,
    paths: &HashMap<String, String>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> RestResult<Params> {
    let reads_query = op.method == Method::GET || op.method == Method::HEAD;
    let needs_body = !reads_query
        && op.spec.params.iter().enumerate().any(|(index, param)| {
            !(index == 0 && param.name == "id") && !param.name.starts_with('_')
        });

    let body_object: Option<Map<String, Value>> = if needs_body {
        let json_content = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        if !json_content || body.is_empty() {
            return Err(RestError::protocol(
                "Missing JSON request body (Content-Type must be application/json)",
            ));
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(object)) => Some(object),
            Ok(_) => {
                return Err(RestError::protocol(
                    "Request body must be a JSON object keyed by parameter name",
                ))
            }
            Err(err) => {
                return Err(RestError::protocol(format!(
                    "Undeserializable request body: {err}"
                )))
            }
        }
    } else {
        None
    };

    let mut params = Params::new();
    for (index, param) in op.spec.params.iter().enumerate() {
        let value = if index == 0 && param.name == "id" {
            match paths.get("id") {
                Some(text) => RestValue::Scalar(text.clone()),
                None => fallback(param, "Parameter \"id\" not set")?,
            }
        } else if let Some(placeholder) = param.name.strip_prefix('_') {
            match paths.get(placeholder) {
                Some(text) => RestValue::Scalar(text.clone()),
                None => {
                    return Err(RestError::protocol(format!(
                        "Path parameter {placeholder:?} not set"
                    )))
                }
            }
        } else if reads_query {
            match query.get(&param.name) {
                Some(text) => RestValue::Scalar(text.clone()),
                None => fallback(param, &format!("Missing query parameter {:?}", param.name))?,
            }
        } else {
            match body_object
                .as_ref()
                .and_then(|object| object.get(&param.name))
            {
                Some(value) => RestValue::Json(value.clone()),
                None => fallback(param, &format!("Missing body parameter {:?}", param.name))?,
            }
        };
        params.insert(param.name.clone(), value);
    }
    Ok(params)
}

fn fallback(param: &crate::contract::ParamSpec, message: &str) -> RestResult<RestValue> {
    match &param.default {
        Some(default) => Ok(RestValue::Json(default.clone())),
        None => Err(RestError::protocol(message.to_string())),
    }
}

/// Map an error onto its wire shape: the status plus a `statusMessage`
/// body, with a sanitized `statusDebugMessage` for unexpected failures.
fn error_response(err: RestError) -> Response {
    let status = err.status_code();
    let body = ErrorBody {
        status_message: err.status_message(),
        status_debug_message: (status == StatusCode::INTERNAL_SERVER_ERROR)
            .then(|| sanitized_debug(&err)),
    };
    warn!(%status, message = %body.status_message, "request failed");
    (status, Json(body)).into_response()
}

fn sanitized_debug(err: &RestError) -> String {
    format!("{err:?}").replace(['\n', '\r'], " ")
}

/// Bind a contract and serve it until the listener fails.
pub async fn serve(contract: Contract, addr: SocketAddr) -> RestResult<()> {
    let router = bind_contract(contract)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| RestError::internal(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, "serving contract");
    axum::serve(listener, router)
        .await
        .map_err(|err| RestError::internal(format!("server failed: {err}")))
}
