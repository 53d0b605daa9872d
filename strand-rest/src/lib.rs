//! Contract-to-HTTP binder.
//!
//! Maps a statically described service contract onto an HTTP/JSON surface,
//! in both directions: [`bind_contract`] registers one axum route per
//! operation with the verb and path derived mechanically from the operation
//! name, and [`RestClient`] implements the same contract by issuing
//! matching requests. Because both sides derive the wire shape from the
//! same descriptor, they agree on it by construction.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use strand_rest::{bind_contract, Contract, OpBuilder};
//!
//! let api = Contract::new("UserApi")
//!     .with_root("/api/")
//!     .operation(
//!         OpBuilder::new("getName")
//!             .param("id")
//!             .handler(|params| async move {
//!                 let id: u32 = params.get("id")?;
//!                 Ok(json!(format!("<user {id}>")))
//!             }),
//!     );
//! let router = bind_contract(api).unwrap();
//! # let _ = router;
//! ```

mod client;
mod contract;
mod error;
mod route;
mod server;
mod value;


pub use client::{ClientParams, RequestFilter, RestClient};
pub use contract::{
    Contract, ContractSpec, Handler, OpBuilder, OpEntry, OpSpec, Operation, ParamSpec, Params,
    Property,
};
pub use error::{ErrorBody, RestError, RestResult};
pub use route::{
    adjust_method_style, method_from_name, root_path, route_for, MethodStyle, RouteSpec,
};
pub use server::{bind_contract, serve};
pub use value::{is_scalar, rest_text, RestValue};

// The verb type both binders speak.
pub use http::Method;
