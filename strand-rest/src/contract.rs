//! Data-first service contracts.
//!
//! A [`Contract`] describes a set of named operations with typed parameters;
//! the server binder turns it into routes at startup and the client binder
//! mirrors the same description into outgoing requests. Operations either
//! carry an async handler (server side) or return a sub-contract, which
//! mounts a hierarchical resource.

use crate::error::{RestError, RestResult};
use crate::route::MethodStyle;
use crate::value::RestValue;

use futures::future::BoxFuture;
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Property accessor classification of an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Property {
    /// An ordinary method.
    #[default]
    None,
    /// A property getter: GET at the identifier.
    Getter,
    /// A property setter: PUT at the identifier.
    Setter,
}

/// Descriptor of one operation: everything both binders need except the
/// handler itself.
#[derive(Clone, Debug)]
pub struct OpSpec {
    /// Operation identifier the route is derived from.
    pub name: String,
    /// Explicit HTTP method override.
    pub method: Option<Method>,
    /// Explicit relative path override (may contain `:name` placeholders
    /// bound to underscore-prefixed parameters).
    pub path: Option<String>,
    /// Property accessor classification.
    pub property: Property,
    /// Declared parameters, in order.
    pub params: Vec<ParamSpec>,
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// Parameter name. A leading underscore binds it to a `:name` path
    /// placeholder; a first parameter literally named `id` uses the legacy
    /// `:id` route.
    pub name: String,
    /// Substituted when the request omits the parameter; without it an
    /// omission is a protocol error.
    pub default: Option<Value>,
}

/// Boxed async operation handler.
pub type Handler = Arc<dyn Fn(Params) -> BoxFuture<'static, RestResult<Value>> + Send + Sync>;

pub(crate) enum OpKind {
    /// Server-side operation.
    Handler(Handler),
    /// Sub-contract getter; mounts the child at `<prefix><path>/`.
    Sub(Contract),
    /// Descriptor-only operation (client side); binding it is an error.
    Declared,
}

/// An operation inside a contract.
pub struct Operation {
    pub(crate) spec: OpSpec,
    pub(crate) kind: OpKind,
}

/// Extracted parameters handed to a handler.
pub struct Params {
    values: HashMap<String, RestValue>,
}

impl Params {
    pub(crate) fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: String, value: RestValue) {
        self.values.insert(name, value);
    }

    /// Decode the named parameter into its declared type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> RestResult<T> {
        self.values
            .get(name)
            .ok_or_else(|| RestError::protocol(format!("Missing parameter {name:?}")))?
            .decode()
    }
}

/// Fluent builder for one operation.
pub struct OpBuilder {
    spec: OpSpec,
}

impl OpBuilder {
    /// Start describing an operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            spec: OpSpec {
                name: name.into(),
                method: None,
                path: None,
                property: Property::None,
                params: Vec::new(),
            },
        }
    }

    /// Override the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.spec.method = Some(method);
        self
    }

    /// Override the relative path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.spec.path = Some(path.into());
        self
    }

    /// Mark as a property getter.
    pub fn getter(mut self) -> Self {
        self.spec.property = Property::Getter;
        self
    }

    /// Mark as a property setter.
    pub fn setter(mut self) -> Self {
        self.spec.property = Property::Setter;
        self
    }

    /// Declare a required parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.spec.params.push(ParamSpec {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a parameter with a default.
    pub fn param_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.spec.params.push(ParamSpec {
            name: name.into(),
            default: Some(default),
        });
        self
    }

    /// Finish with an async handler.
    pub fn handler<F, Fut>(self, handler: F) -> Operation
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RestResult<Value>> + Send + 'static,
    {
        Operation {
            spec: self.spec,
            kind: OpKind::Handler(Arc::new(
                move |params| -> BoxFuture<'static, RestResult<Value>> {
                    Box::pin(handler(params))
                },
            )),
        }
    }

    /// Finish as a sub-contract getter. Must have zero parameters.
    pub fn sub(self, contract: Contract) -> Operation {
        Operation {
            spec: self.spec,
            kind: OpKind::Sub(contract),
        }
    }

    /// Finish without a handler. Useful for contracts that only drive a
    /// client; the server binder rejects it.
    pub fn declare(self) -> Operation {
        Operation {
            spec: self.spec,
            kind: OpKind::Declared,
        }
    }
}

/// A named set of operations mapped onto HTTP.
pub struct Contract {
    pub(crate) name: String,
    pub(crate) root: Option<String>,
    pub(crate) style: MethodStyle,
    pub(crate) ops: Vec<Operation>,
}

impl Contract {
    /// Start a contract. Without further configuration it mounts at `/` and
    /// uses the lower-underscored style.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            style: MethodStyle::default(),
            ops: Vec::new(),
        }
    }

    /// Mount at an explicit root path.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Mount at a prefix derived from the stylised contract name.
    pub fn with_derived_root(mut self) -> Self {
        self.root = Some(String::new());
        self
    }

    /// Set the naming style for derived paths.
    pub fn with_style(mut self, style: MethodStyle) -> Self {
        self.style = style;
        self
    }

    /// Add an operation.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.ops.push(operation);
        self
    }

    /// Handler-free descriptor of this contract, as consumed by
    /// [`RestClient`](crate::RestClient).
    pub fn spec(&self) -> ContractSpec {
        ContractSpec {
            name: self.name.clone(),
            root: self.root.clone(),
            style: self.style,
            ops: self
                .ops
                .iter()
                .map(|op| match &op.kind {
                    OpKind::Sub(child) => OpEntry::Sub {
                        spec: op.spec.clone(),
                        contract: Box::new(child.spec()),
                    },
                    OpKind::Handler(_) | OpKind::Declared => OpEntry::Call(op.spec.clone()),
                })
                .collect(),
        }
    }
}

/// Handler-free mirror of a [`Contract`].
#[derive(Clone, Debug)]
pub struct ContractSpec {
    /// Contract identifier (used for derived roots).
    pub name: String,
    /// Root-path override; see [`root_path`](crate::route::root_path).
    pub root: Option<String>,
    /// Naming style for derived paths.
    pub style: MethodStyle,
    /// Operation descriptors.
    pub ops: Vec<OpEntry>,
}

/// One entry of a [`ContractSpec`].
#[derive(Clone, Debug)]
pub enum OpEntry {
    /// A callable operation.
    Call(OpSpec),
    /// A sub-contract getter.
    Sub {
        /// The getter's descriptor.
        spec: OpSpec,
        /// The child contract.
        contract: Box<ContractSpec>,
    },
}
