//! Interception installer.
//!
//! Applying arguments to an intercepted declaration yields a dispatch proxy
//! over the canonical specialization instead of a plain structural value.
//! The hook is installed at most once per declaration: eagerly by the
//! registration callback when the declaration (or its ancestry) needs it, or
//! lazily on first apply. Installation is race-tolerant; concurrent attempts
//! converge on the single stored hook.
//!
//! Two collaborators are consulted: the foreign-managed predicate, and the
//! detector that finds a declaration's native "apply arguments" entry point.

use crate::def::{DeclEntry, DeclFlags, DeclarationStore};
use crate::error::ReifyResult;
use crate::types::{DeclId, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

// =============================================================================
// Collaborators
// =============================================================================

/// Decides whether a declaration runs its own generic protocol.
pub trait ForeignProtocol: Send + Sync {
    fn is_foreign(&self, store: &DeclarationStore, decl: DeclId) -> bool;
}

/// Foreign when any declaration in the resolution order carries
/// [`DeclFlags::FOREIGN_MANAGED`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FlagProtocol;

impl ForeignProtocol for FlagProtocol {
    fn is_foreign(&self, store: &DeclarationStore, decl: DeclId) -> bool {
        let Some(entry) = store.get(decl) else {
            return false;
        };
        entry.mro.iter().any(|&d| {
            store
                .get(d)
                .is_some_and(|e| e.info.flags.contains(DeclFlags::FOREIGN_MANAGED))
        })
    }
}

pub type ApplyFn = dyn Fn(&[Value]) -> ReifyResult<Vec<Value>> + Send + Sync;

/// A declaration's native "apply arguments" operation. It may rewrite the
/// argument list before specialization, or reject it.
#[derive(Clone)]
pub struct NativeApply(Arc<ApplyFn>);

impl NativeApply {
    pub fn new(f: impl Fn(&[Value]) -> ReifyResult<Vec<Value>> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, args: &[Value]) -> ReifyResult<Vec<Value>> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for NativeApply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NativeApply(..)")
    }
}

/// Finds the entry point to wrap for a declaration.
pub trait EntryPointDetector: Send + Sync {
    fn detect(&self, store: &DeclarationStore, decl: DeclId) -> Option<NativeApply>;
}

/// Uses the nearest native entry point along the resolution order.
#[derive(Clone, Copy, Debug, Default)]
pub struct MroEntryPoints;

impl EntryPointDetector for MroEntryPoints {
    fn detect(&self, store: &DeclarationStore, decl: DeclId) -> Option<NativeApply> {
        let entry = store.get(decl)?;
        entry
            .mro
            .iter()
            .find_map(|&d| store.get(d).and_then(|e| e.info.native_apply.clone()))
    }
}

// =============================================================================
// Hook
// =============================================================================

/// The installed interception for one declaration.
#[derive(Clone, Debug)]
pub struct ApplyHook {
    pub decl: DeclId,
    /// Wrapped entry point; `None` means arguments pass through unchanged.
    pub native: Option<NativeApply>,
    /// Installation sequence number within the interceptor.
    pub sequence: u64,
}

impl ApplyHook {
    /// Run the wrapped entry point over the arguments.
    pub fn prepare(&self, args: &[Value]) -> ReifyResult<Vec<Value>> {
        match &self.native {
            Some(native) => native.call(args),
            None => Ok(args.to_vec()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    SkippedForeign,
}

// =============================================================================
// Interceptor
// =============================================================================

pub struct Interceptor {
    foreign: Arc<dyn ForeignProtocol>,
    entry_points: Arc<dyn EntryPointDetector>,
    installs: AtomicU64,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("installs", &self.install_count())
            .finish()
    }
}

impl Interceptor {
    pub fn new(
        foreign: Arc<dyn ForeignProtocol>,
        entry_points: Arc<dyn EntryPointDetector>,
    ) -> Self {
        Self {
            foreign,
            entry_points,
            installs: AtomicU64::new(0),
        }
    }

    pub fn foreign(&self) -> &Arc<dyn ForeignProtocol> {
        &self.foreign
    }

    pub fn is_foreign(&self, store: &DeclarationStore, decl: DeclId) -> bool {
        self.foreign.is_foreign(store, decl)
    }

    pub fn native_apply(&self, store: &DeclarationStore, decl: DeclId) -> Option<NativeApply> {
        self.entry_points.detect(store, decl)
    }

    /// Install the hook on `entry` unless it is foreign-managed or already
    /// intercepted.
    pub fn install(&self, store: &DeclarationStore, entry: &DeclEntry) -> InstallOutcome {
        if self.is_foreign(store, entry.id) {
            trace!(decl = entry.id.0, "skipping foreign-managed declaration");
            return InstallOutcome::SkippedForeign;
        }

        let mut installed_here = false;
        entry.hook.get_or_init(|| {
            installed_here = true;
            ApplyHook {
                decl: entry.id,
                native: self.entry_points.detect(store, entry.id),
                sequence: self.installs.fetch_add(1, Ordering::SeqCst) + 1,
            }
        });

        if installed_here {
            debug!(decl = entry.id.0, "interception installed");
            InstallOutcome::Installed
        } else {
            InstallOutcome::AlreadyInstalled
        }
    }

    /// Whether a declaration should be intercepted: it or an ancestor has an
    /// alias-aware member, or an ancestor is already intercepted.
    pub fn wants_hook(&self, store: &DeclarationStore, entry: &DeclEntry) -> bool {
        if entry.info.has_alias_aware_members() {
            return true;
        }
        entry.mro.iter().skip(1).any(|&d| {
            store
                .get(d)
                .is_some_and(|e| e.is_intercepted() || e.info.has_alias_aware_members())
        })
    }

    /// Registration callback.
    pub fn on_register(&self, store: &DeclarationStore, entry: &Arc<DeclEntry>) {
        if self.wants_hook(store, entry) {
            self.install(store, entry);
        }
    }

    /// The hook for `entry`, installing it first if the declaration wants one.
    pub fn ensure<'e>(&self, store: &DeclarationStore, entry: &'e DeclEntry) -> Option<&'e ApplyHook> {
        if entry.hook.get().is_none() && self.wants_hook(store, entry) {
            self.install(store, entry);
        }
        entry.hook.get()
    }

    pub fn hook<'e>(&self, entry: &'e DeclEntry) -> Option<&'e ApplyHook> {
        entry.hook.get()
    }

    /// Number of hooks installed so far.
    pub fn install_count(&self) -> u64 {
        self.installs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "../tests/install_tests.rs"]
mod tests;
