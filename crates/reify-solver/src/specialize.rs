//! Specialization registry.
//!
//! A `Specialization` is a declaration applied to one value per parameter.
//! Handles are canonical: equal (declaration, arguments) pairs map to the same
//! allocation for as long as anyone holds it. The registry only keeps `Weak`
//! references, and a specialization removes its own entry when the last
//! handle is dropped.
//!
//! Each instance carries a generation number and a memo of resolution
//! results. Both die with the instance, so a re-created specialization never
//! observes stale state.

use crate::def::DeclarationStore;
use crate::error::{ReifyError, ReifyResult};
use crate::install::ForeignProtocol;
use crate::types::{DeclId, ParamRef, ResolvedArgs, Value};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reify_common::limits::SPECIALIZATION_CACHE_CAPACITY;
use rustc_hash::FxBuildHasher;
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Registry key: declaration identity plus the structural argument tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpecKey {
    pub decl: DeclId,
    pub args: Arc<[Value]>,
}

// =============================================================================
// Specialization
// =============================================================================

pub struct SpecializationData {
    decl: DeclId,
    args: Arc<[Value]>,
    generation: u64,
    memo: DashMap<(DeclId, bool), ResolvedArgs, FxBuildHasher>,
    registry: Weak<RegistryShared>,
}

impl Drop for SpecializationData {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.evict(&SpecKey {
                decl: self.decl,
                args: Arc::clone(&self.args),
            });
        }
    }
}

/// Canonical handle for "declaration applied to these arguments".
///
/// Cloning is cheap. Equality and hashing are by identity: two handles are
/// equal exactly when they share one allocation, which the registry
/// guarantees for structurally equal requests made while a handle is alive.
#[derive(Clone)]
pub struct Specialization(Arc<SpecializationData>);

impl Specialization {
    #[inline]
    pub fn decl(&self) -> DeclId {
        self.0.decl
    }

    #[inline]
    pub fn args(&self) -> &Arc<[Value]> {
        &self.0.args
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    pub fn ptr_eq(&self, other: &Specialization) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The structural value this specialization stands for.
    pub fn as_value(&self) -> Value {
        Value::Applied {
            decl: self.0.decl,
            args: Arc::clone(&self.0.args),
        }
    }

    pub fn key(&self) -> SpecKey {
        SpecKey {
            decl: self.0.decl,
            args: Arc::clone(&self.0.args),
        }
    }

    /// Number of memoized resolution results.
    pub fn memo_len(&self) -> usize {
        self.0.memo.len()
    }

    pub fn memoized(&self, ancestor: DeclId, fallback_to_bound: bool) -> Option<ResolvedArgs> {
        self.0
            .memo
            .get(&(ancestor, fallback_to_bound))
            .map(|r| Arc::clone(r.value()))
    }

    /// Return the memoized result for `ancestor`, computing it on a miss.
    ///
    /// `compute` runs without any lock held. Concurrent misses may compute
    /// twice; the first stored result wins.
    pub fn memoize(
        &self,
        ancestor: DeclId,
        fallback_to_bound: bool,
        compute: impl FnOnce() -> ReifyResult<ResolvedArgs>,
    ) -> ReifyResult<ResolvedArgs> {
        if let Some(hit) = self.memoized(ancestor, fallback_to_bound) {
            return Ok(hit);
        }
        let computed = compute()?;
        let stored = self
            .0
            .memo
            .entry((ancestor, fallback_to_bound))
            .or_insert(computed);
        Ok(Arc::clone(stored.value()))
    }
}

impl PartialEq for Specialization {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Specialization {}

impl Hash for Specialization {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specialization")
            .field("decl", &self.0.decl)
            .field("args", &self.0.args)
            .field("generation", &self.0.generation)
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

struct RegistryShared {
    entries: DashMap<SpecKey, Weak<SpecializationData>, FxBuildHasher>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl RegistryShared {
    /// Remove `key` if its entry no longer has live holders. A newer live
    /// entry under the same key is left alone.
    fn evict(&self, key: &SpecKey) {
        if self
            .entries
            .remove_if(key, |_, weak| weak.strong_count() == 0)
            .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(decl = key.decl.0, "specialization evicted");
        }
    }
}

/// Registry counters, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries currently in the cache.
    pub entries: usize,
    /// Entries whose specialization is still held somewhere.
    pub live: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Canonicalizing cache of specializations.
pub struct SpecializationRegistry {
    shared: Arc<RegistryShared>,
    foreign: Arc<dyn ForeignProtocol>,
}

impl std::fmt::Debug for SpecializationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecializationRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

impl SpecializationRegistry {
    pub fn new(foreign: Arc<dyn ForeignProtocol>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                entries: DashMap::with_capacity_and_hasher(
                    SPECIALIZATION_CACHE_CAPACITY,
                    FxBuildHasher,
                ),
                next_generation: AtomicU64::new(1),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
            foreign,
        }
    }

    /// Canonical specialization of `decl` with `args`.
    ///
    /// Missing trailing arguments take the parameter default, or an open
    /// placeholder for the slot when there is none.
    pub fn specialize(
        &self,
        store: &DeclarationStore,
        decl: DeclId,
        args: &[Value],
    ) -> ReifyResult<Specialization> {
        let key = self.canonical_key(store, decl, args).inspect_err(|error| {
            debug!(decl = decl.0, %error, "specialize failed");
        })?;

        let existing = self.shared.entries.get(&key).and_then(|w| w.upgrade());
        if let Some(data) = existing {
            self.shared.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Specialization(data));
        }

        let fresh = Arc::new(SpecializationData {
            decl,
            args: Arc::clone(&key.args),
            generation: self.shared.next_generation.fetch_add(1, Ordering::Relaxed),
            memo: DashMap::with_hasher(FxBuildHasher),
            registry: Arc::downgrade(&self.shared),
        });

        // The shard lock is held for the whole match. Nothing that could be
        // the last strong reference may be dropped inside it, since dropping
        // evicts and evicting takes the same lock.
        let canonical = match self.shared.entries.entry(key) {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(live) => {
                    self.shared.hits.fetch_add(1, Ordering::Relaxed);
                    live
                }
                None => {
                    occupied.insert(Arc::downgrade(&fresh));
                    self.shared.misses.fetch_add(1, Ordering::Relaxed);
                    Arc::clone(&fresh)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(&fresh));
                self.shared.misses.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&fresh)
            }
        };
        drop(fresh);

        trace!(
            decl = decl.0,
            generation = canonical.generation,
            "specialization ready"
        );
        Ok(Specialization(canonical))
    }

    fn canonical_key(
        &self,
        store: &DeclarationStore,
        decl: DeclId,
        args: &[Value],
    ) -> ReifyResult<SpecKey> {
        let entry = store.entry(decl)?;
        if !entry.info.is_generic() {
            return Err(ReifyError::NotGeneric { decl });
        }
        if self.foreign.is_foreign(store, decl) {
            return Err(ReifyError::ForeignManaged { decl });
        }
        let arity = entry.arity();
        if args.len() > arity {
            return Err(ReifyError::ArityMismatch {
                decl,
                expected: arity,
                found: args.len(),
            });
        }

        let mut full = Vec::with_capacity(arity);
        full.extend_from_slice(args);
        for (index, param) in entry.info.params.iter().enumerate().skip(args.len()) {
            full.push(
                param
                    .default
                    .clone()
                    .unwrap_or(Value::Param(ParamRef::new(decl, index as u32))),
            );
        }
        Ok(SpecKey {
            decl,
            args: full.into(),
        })
    }

    /// The live specialization for exactly these (already complete)
    /// arguments, without creating one.
    pub fn lookup(&self, decl: DeclId, args: &[Value]) -> Option<Specialization> {
        let key = SpecKey {
            decl,
            args: args.into(),
        };
        self.shared
            .entries
            .get(&key)
            .and_then(|w| w.upgrade())
            .map(Specialization)
    }

    /// Whether a structural value is backed by a live specialization.
    pub fn is_live(&self, value: &Value) -> bool {
        match value {
            Value::Applied { decl, args } => self
                .shared
                .entries
                .get(&SpecKey {
                    decl: *decl,
                    args: Arc::clone(args),
                })
                .is_some_and(|w| w.strong_count() > 0),
            _ => false,
        }
    }

    /// Number of cache entries, live or awaiting eviction.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        // Counting via strong_count never creates a strong reference, so no
        // eviction can run while the shards are being iterated.
        let live = self
            .shared
            .entries
            .iter()
            .filter(|r| r.value().strong_count() > 0)
            .count();
        RegistryStats {
            entries: self.shared.entries.len(),
            live,
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[path = "../tests/specialize_tests.rs"]
mod tests;
