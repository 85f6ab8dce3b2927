//! Reified generic parameters for class-based object models.
//!
//! This crate bundles the workspace for downstream users:
//!
//! - [`solver`]: declarations, parameter graphs, the resolution engine, the
//!   specialization registry and dispatch proxies
//! - [`common`]: name interning, limits and options
//! - [`schema`]: loading declaration hierarchies from JSON
//!
//! plus the tracing setup and (behind the `cli` feature) the `reify` command
//! line driver.

pub use reify_common as common;
pub use reify_solver as solver;

pub use reify_common::{Atom, ReifyOptions, ShardedInterner};
pub use reify_solver::{
    Applied, ArgExpr, BaseSpec, CallContext, DeclId, DeclarationInfo, DispatchProxy, Member,
    ParamInfo, ParamRef, Receiver, ReifyError, ReifyResult, Specialization, TypeSystem, Value,
};

pub mod schema;
pub use schema::{LoadedSchema, Schema, SchemaError};

pub mod tracing_config;

#[cfg(feature = "cli")]
pub mod cli;
