//! Centralized limits and capacity hints for the reify type system.
//!
//! Keeping these values in one place avoids inconsistent copies across the
//! solver, the CLI and the options defaults.

// =============================================================================
// Recursion Depth Limits
// =============================================================================

/// Maximum nesting depth of dispatched calls.
///
/// Every `call`, `call_base` or `invoke` made through a call context adds one
/// level. An operation that redirects to itself (or two declarations that
/// redirect to each other through a misconfigured resolution order) would
/// otherwise recurse until the stack overflows; past this depth the call
/// fails with `DepthExceeded` instead.
pub const MAX_DISPATCH_DEPTH: u32 = 256;

/// Maximum nesting depth when evaluating nested argument expressions.
///
/// Argument expressions such as `Base[List[Dict[str, T]]]` are evaluated
/// recursively. Declarations are built from finite schemas, so this only
/// guards against pathological inputs.
pub const MAX_EXPR_DEPTH: u32 = 64;

// =============================================================================
// Capacity Hints
// =============================================================================

/// Initial capacity of the declaration arena.
pub const DECLARATION_STORE_CAPACITY: usize = 256;

/// Initial capacity of the specialization registry.
///
/// Workloads typically keep a few hundred distinct specializations alive;
/// the registry grows past this on demand.
pub const SPECIALIZATION_CACHE_CAPACITY: usize = 1024;

/// Initial capacity of the resolution plan cache, keyed by
/// (start declaration, ancestor).
pub const PLAN_CACHE_CAPACITY: usize = 512;

/// Inline capacity for per-node forwarding-edge lists.
///
/// Most parameters forward into one or two base slots.
pub const INLINE_EDGES: usize = 2;
