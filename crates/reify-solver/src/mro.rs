//! Member-resolution order via C3 linearization.
//!
//! The order is computed once, when a declaration is registered, from the
//! already-known orders of its bases. Local precedence (base-list order) and
//! monotonicity are preserved; base lists that cannot satisfy both are
//! rejected.

use crate::error::DeclarationError;
use crate::types::DeclId;
use smallvec::SmallVec;
use std::sync::Arc;

/// Linearize `decl` given its direct bases and each base's own order.
///
/// `base_orders[i]` must be the order of `bases[i]` and start with it.
pub fn linearize(
    decl: DeclId,
    bases: &[DeclId],
    base_orders: &[Arc<[DeclId]>],
) -> Result<Vec<DeclId>, DeclarationError> {
    debug_assert_eq!(bases.len(), base_orders.len());

    let mut result = Vec::with_capacity(1 + base_orders.iter().map(|o| o.len()).sum::<usize>());
    result.push(decl);

    if bases.is_empty() {
        return Ok(result);
    }

    // Each sequence is consumed from the front; `heads[i]` is the cursor.
    let mut sequences: SmallVec<[&[DeclId]; 4]> = base_orders.iter().map(|o| &o[..]).collect();
    sequences.push(bases);
    let mut heads: SmallVec<[usize; 4]> = SmallVec::from_elem(0, sequences.len());

    loop {
        let mut remaining = false;
        let mut picked = None;

        for (i, seq) in sequences.iter().enumerate() {
            let Some(&candidate) = seq.get(heads[i]) else {
                continue;
            };
            remaining = true;
            let in_tail = sequences
                .iter()
                .zip(heads.iter())
                .any(|(other, &head)| other.get(head + 1..).is_some_and(|t| t.contains(&candidate)));
            if !in_tail {
                picked = Some(candidate);
                break;
            }
        }

        if !remaining {
            return Ok(result);
        }

        let Some(next) = picked else {
            return Err(DeclarationError::InconsistentResolutionOrder {
                bases: bases.to_vec(),
            });
        };

        result.push(next);
        for (seq, head) in sequences.iter().zip(heads.iter_mut()) {
            if seq.get(*head) == Some(&next) {
                *head += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/mro_tests.rs"]
mod tests;
