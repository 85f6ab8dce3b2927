//! Reified generic parameters for a class-based object model.
//!
//! Given a declaration generic over some parameters and an application of it
//! to concrete arguments, this crate
//!
//! - produces a canonical, cacheable [`Specialization`] handle,
//! - makes that handle the receiver of alias-aware operations, including
//!   across ancestor redirection (see [`dispatch`]),
//! - answers what each ancestor parameter slot holds as seen from any
//!   declaration or specialization (see [`resolve`]).
//!
//! [`TypeSystem`] is the entry point.

pub mod types;
pub use types::{ArgExpr, BaseSpec, DeclId, ParamInfo, ParamRef, ResolvedArgs, Value};

pub mod error;
pub use error::{DeclarationError, ErrorKind, Provenance, ReifyError, ReifyResult};

// Declaration arena
pub mod def;
pub use def::{DeclEntry, DeclFlags, DeclarationInfo, DeclarationStore};

// Member-resolution order
pub mod mro;

// Parameter graph builder
pub mod param_graph;
pub use param_graph::{ParamGraph, ParamGraphBuilder, ParamNode};

// Resolution engine
pub mod resolve;
pub use resolve::{ResolutionEngine, ResolutionPlan, Root, SlotPlan, SlotSource, TracePath};

// Specialization registry
pub mod specialize;
pub use specialize::{RegistryStats, Specialization, SpecializationRegistry};

// Interception installer and collaborators
pub mod install;
pub use install::{
    ApplyHook, EntryPointDetector, FlagProtocol, ForeignProtocol, InstallOutcome, Interceptor,
    MroEntryPoints, NativeApply,
};

// Dispatch proxy and ancestor redirection
pub mod dispatch;
pub use dispatch::{BoundMember, CallContext, DispatchProxy, Member, OperationKind, Receiver};

pub mod format;
pub use format::ValueFormatter;

pub mod system;
pub use system::{Applied, TypeSystem};

#[cfg(test)]
#[path = "../tests/test_fixtures.rs"]
pub(crate) mod test_fixtures;

#[cfg(test)]
#[path = "../tests/concurrency_tests.rs"]
mod concurrency_tests;

#[cfg(test)]
#[path = "../tests/property_tests.rs"]
mod property_tests;
