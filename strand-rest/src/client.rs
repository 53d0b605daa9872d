//! Client binder: implements a contract by issuing HTTP/JSON requests.

use crate::contract::{ContractSpec, OpEntry, OpSpec};
use crate::error::{ErrorBody, RestError, RestResult};
use crate::route::{root_path, route_for};
use crate::value::{rest_text, to_tagged};

use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Hook that may mutate every outgoing request (auth headers and the like).
pub type RequestFilter = Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;

/// Arguments of one client call, in declaration order.
///
/// Each value carries the sideband "already JSON" flag: values without a
/// bare scalar form render as JSON text in query strings.
#[derive(Clone, Debug, Default)]
pub struct ClientParams {
    entries: Vec<ParamEntry>,
}

#[derive(Clone, Debug)]
struct ParamEntry {
    name: String,
    value: Value,
    already_json: bool,
}

impl ClientParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named argument.
    pub fn arg<T: Serialize>(mut self, name: &str, value: &T) -> RestResult<Self> {
        let (value, already_json) = to_tagged(value)?;
        self.entries.push(ParamEntry {
            name: name.to_string(),
            value,
            already_json,
        });
        Ok(self)
    }

    fn get(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// HTTP/JSON client for a contract.
///
/// Builds URLs, parameter placement and verbs from the same descriptor the
/// server binder uses, so the two agree on the wire by construction.
pub struct RestClient {
    base: Url,
    spec: ContractSpec,
    http: reqwest::Client,
    filter: Option<RequestFilter>,
}

impl RestClient {
    /// Create a client for a contract served at `server_url`.
    ///
    /// The contract's root-path rule is applied on top of the URL, mirroring
    /// where the server mounted it.
    pub fn new(server_url: &str, spec: ContractSpec) -> RestResult<Self> {
        let mut base = Url::parse(server_url)
            .map_err(|err| RestError::contract(format!("invalid base URL: {err}")))?;
        let root = root_path(&spec.name, spec.root.as_deref(), spec.style);
        push_segments(&mut base, &root, |name| {
            Err(RestError::contract(format!(
                "root path cannot contain placeholder {name:?}"
            )))
        })?;
        Ok(Self {
            base,
            spec,
            http: reqwest::Client::new(),
            filter: None,
        })
    }

    /// Install a request filter, applied to every outgoing request and
    /// propagated to sub-contract clients.
    pub fn with_request_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Invoke an operation and return the raw JSON result.
    pub async fn call(&self, operation: &str, params: ClientParams) -> RestResult<Value> {
        let spec = self.find_call(operation)?;
        let route = route_for(spec, self.spec.style);
        let mut url = self.base.clone();

        let legacy_id = spec.params.first().is_some_and(|p| p.name == "id");
        if route.path_overridden {
            // Overridden paths bind their :name placeholders to the
            // underscore-prefixed arguments.
            push_segments(&mut url, &route.path, |name| {
                let key = format!("_{name}");
                params
                    .get(&key)
                    .map(|entry| rest_text(&entry.value))
                    .ok_or_else(|| {
                        RestError::contract(format!(
                            "missing path argument {key:?} for operation {operation:?}"
                        ))
                    })
            })?;
        } else {
            if legacy_id {
                let id = params.get("id").ok_or_else(|| {
                    RestError::contract(format!(
                        "missing \"id\" argument for operation {operation:?}"
                    ))
                })?;
                push_one(&mut url, &rest_text(&id.value))?;
            }
            push_segments(&mut url, &route.path, |name| {
                Err(RestError::contract(format!(
                    "derived path cannot contain placeholder {name:?}"
                )))
            })?;
            // An empty derived path (an `index` operation) addresses the
            // prefix root, which mounts with a trailing slash.
            if route.path.is_empty() && !legacy_id {
                push_one(&mut url, "")?;
            }
        }

        let reads_query = route.method == Method::GET || route.method == Method::HEAD;
        let mut body = Map::new();
        for entry in &params.entries {
            if entry.name.starts_with('_') || (legacy_id && entry.name == "id") {
                continue;
            }
            if reads_query {
                url.query_pairs_mut()
                    .append_pair(&entry.name, &query_text(entry));
            } else {
                body.insert(entry.name.clone(), entry.value.clone());
            }
        }

        let mut request = self.http.request(route.method.clone(), url.clone());
        if !reads_query {
            request = request.json(&Value::Object(body));
        }
        if let Some(filter) = &self.filter {
            request = filter(request);
        }
        trace!(method = %route.method, %url, "issuing request");
        let response = request
            .send()
            .await
            .map_err(|err| RestError::Transport(err.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| RestError::Transport(err.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .map(|body| body.status_message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown status")
                        .to_string()
                });
            return Err(RestError::status(status, message));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(RestError::from)
    }

    /// Invoke an operation and deserialize the result.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: ClientParams,
    ) -> RestResult<T> {
        let value = self.call(operation, params).await?;
        serde_json::from_value(value).map_err(RestError::from)
    }

    /// Invoke a void operation, ignoring the `{}` result body.
    pub async fn call_void(&self, operation: &str, params: ClientParams) -> RestResult<()> {
        self.call(operation, params).await.map(|_| ())
    }

    /// Materialize the client of a sub-contract getter. The child inherits
    /// the transport and the request filter.
    pub fn sub(&self, operation: &str) -> RestResult<RestClient> {
        let (spec, child) = self
            .spec
            .ops
            .iter()
            .find_map(|entry| match entry {
                OpEntry::Sub { spec, contract } if spec.name == operation => {
                    Some((spec, contract.as_ref()))
                }
                _ => None,
            })
            .ok_or_else(|| {
                RestError::contract(format!("unknown sub-contract getter {operation:?}"))
            })?;
        let route = route_for(spec, self.spec.style);
        let mut base = self.base.clone();
        push_segments(&mut base, &route.path, |name| {
            Err(RestError::contract(format!(
                "sub-contract mount cannot contain placeholder {name:?}"
            )))
        })?;
        Ok(RestClient {
            base,
            spec: (*child).clone(),
            http: self.http.clone(),
            filter: self.filter.clone(),
        })
    }

    fn find_call(&self, operation: &str) -> RestResult<&OpSpec> {
        self.spec
            .ops
            .iter()
            .find_map(|entry| match entry {
                OpEntry::Call(spec) if spec.name == operation => Some(spec),
                _ => None,
            })
            .ok_or_else(|| RestError::contract(format!("unknown operation {operation:?}")))
    }
}

fn query_text(entry: &ParamEntry) -> String {
    if entry.already_json {
        entry.value.to_string()
    } else {
        rest_text(&entry.value)
    }
}

/// Append the segments of `path` to the URL, resolving `:name` placeholders
/// through `resolve`. Values are percent-encoded by the URL writer.
fn push_segments(
    url: &mut Url,
    path: &str,
    mut resolve: impl FnMut(&str) -> RestResult<String>,
) -> RestResult<()> {
    let mut failure = None;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| RestError::contract("base URL cannot carry path segments"))?;
        segments.pop_if_empty();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix(':') {
                match resolve(name) {
                    Ok(value) => {
                        segments.push(&value);
                    }
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            } else {
                segments.push(segment);
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn push_one(url: &mut Url, segment: &str) -> RestResult<()> {
    url.path_segments_mut()
        .map_err(|()| RestError::contract("base URL cannot carry path segments"))?
        .pop_if_empty()
        .push(segment);
    Ok(())
}
