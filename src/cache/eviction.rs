//! Eviction Planner Module
//!
//! Picks least-recently-touched entries across every namespace until
//! enough bytes would be freed.

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Eviction Plan ==
/// Entries chosen for eviction, oldest touch first.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// `(namespace, key)` pairs to remove
    pub victims: Vec<(String, String)>,
    /// Bytes freed once the victims are removed
    pub freed: u64,
}

// == Plan ==
/// Plans an eviction freeing at least `needed` bytes.
///
/// Candidates are sorted ascending by touch order and taken until the
/// running total reaches `needed`. Nothing is removed here; the caller
/// commits the plan, so a failed plan leaves the table untouched.
///
/// # Errors
/// `EvictionInsufficient` if every candidate together frees less than
/// `needed`.
pub fn plan<'a, I>(candidates: I, needed: u64) -> Result<EvictionPlan>
where
    I: IntoIterator<Item = &'a CacheEntry>,
{
    let mut ordered: Vec<&CacheEntry> = candidates.into_iter().collect();
    ordered.sort_by_key(|entry| entry.touch_order());

    let mut plan = EvictionPlan::default();
    for entry in ordered {
        if plan.freed >= needed {
            break;
        }
        plan.freed += entry.size_bytes;
        plan.victims.push((entry.namespace.clone(), entry.key.clone()));
    }

    if plan.freed < needed {
        return Err(CacheError::EvictionInsufficient {
            needed,
            freed: plan.freed,
        });
    }
    Ok(plan)
}
