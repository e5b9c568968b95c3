//! Reconciliation of opening legs with the closing legs that settled them.
//!
//! Legs are partitioned by (source, symbol). Within a partition each opening
//! leg, in order-id order, claims closing legs with a higher order id through
//! the first tier that succeeds:
//!
//! 1. [`match_by_accumulation`]: the shortest ascending prefix of unmatched
//!    closings whose summed volume lands within tolerance of the opening.
//! 2. [`match_one_to_one`]: the first single closing whose volume is within
//!    tolerance.
//!
//! Closings still unclaimed afterwards are attached to the opening with the
//! nearest order id ([`match_nearest`]). Closings in a partition without any
//! opening stay unmatched and are counted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::leg::Leg;

pub const RELATIVE_TOLERANCE: f64 = 0.02;
pub const ABSOLUTE_TOLERANCE: f64 = 1e-6;

/// Identifier shared by an opening leg and its closings: `source|symbol-orderId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn new(source: &str, symbol: &str, order_id: u64) -> Self {
        MatchKey(format!("{source}|{symbol}-{order_id}"))
    }

    pub fn for_opening(leg: &Leg) -> Self {
        Self::new(leg.source(), leg.symbol(), leg.order_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a leg obtained its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Opening,
    Accumulated,
    OneToOne,
    Nearest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegMatch {
    pub key: MatchKey,
    /// Index of the opening leg in the reconciled slice.
    pub opening: usize,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub openings: usize,
    pub accumulated: usize,
    pub one_to_one: usize,
    pub nearest: usize,
    pub unmatched_closings: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// One slot per input leg, in input order.
    pub matches: Vec<Option<LegMatch>>,
    pub stats: MatchStats,
}

/// `math.isclose`-style comparison with the reconciliation tolerances.
pub fn within_tolerance(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff <= (RELATIVE_TOLERANCE * a.abs().max(b.abs())).max(ABSOLUTE_TOLERANCE)
}

/// A tier over identical inputs: the opening and its candidate closings
/// (unmatched, same partition, higher order id, ascending). Returns the
/// positions in `candidates` to claim.
pub type MatchStrategy = fn(&Leg, &[&Leg]) -> Option<Vec<usize>>;

pub fn match_by_accumulation(opening: &Leg, candidates: &[&Leg]) -> Option<Vec<usize>> {
    let target = opening.volume();
    let mut sum = 0.0;
    for (i, leg) in candidates.iter().enumerate() {
        sum += leg.volume();
        if within_tolerance(sum, target) {
            return Some((0..=i).collect());
        }
        if sum > target {
            return None;
        }
    }
    None
}

pub fn match_one_to_one(opening: &Leg, candidates: &[&Leg]) -> Option<Vec<usize>> {
    candidates
        .iter()
        .position(|leg| within_tolerance(leg.volume(), opening.volume()))
        .map(|i| vec![i])
}

/// Returns the position in `openings` whose order id is nearest to the
/// closing's. Ties go to the lower order id.
pub fn match_nearest(closing: &Leg, openings: &[&Leg]) -> Option<usize> {
    openings
        .iter()
        .enumerate()
        .min_by_key(|(_, o)| (o.order_id().abs_diff(closing.order_id()), o.order_id()))
        .map(|(i, _)| i)
}

const TIERS: [(MatchTier, MatchStrategy); 2] = [
    (MatchTier::Accumulated, match_by_accumulation),
    (MatchTier::OneToOne, match_one_to_one),
];

/// Assigns keys across `legs`. Never fails.
pub fn reconcile(legs: &[Leg]) -> Reconciliation {
    let mut result = Reconciliation {
        matches: vec![None; legs.len()],
        stats: MatchStats::default(),
    };

    let mut partitions: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
    for (i, leg) in legs.iter().enumerate() {
        partitions
            .entry((leg.source(), leg.symbol()))
            .or_default()
            .push(i);
    }

    for indices in partitions.values_mut() {
        indices.sort_by_key(|&i| legs[i].order_id());
        reconcile_partition(legs, indices, &mut result);
    }

    result
}

fn reconcile_partition(legs: &[Leg], indices: &[usize], result: &mut Reconciliation) {
    let openings: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| legs[i].is_opening())
        .collect();
    let closings: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| legs[i].is_closing())
        .collect();

    for &open_idx in &openings {
        let opening = &legs[open_idx];
        let key = MatchKey::for_opening(opening);
        result.matches[open_idx] = Some(LegMatch {
            key: key.clone(),
            opening: open_idx,
            tier: MatchTier::Opening,
        });
        result.stats.openings += 1;

        let pool: Vec<usize> = closings
            .iter()
            .copied()
            .filter(|&c| result.matches[c].is_none() && legs[c].order_id() > opening.order_id())
            .collect();
        let candidates: Vec<&Leg> = pool.iter().map(|&c| &legs[c]).collect();

        for (tier, strategy) in TIERS {
            if let Some(claimed) = strategy(opening, &candidates) {
                for pos in claimed {
                    let c = pool[pos];
                    result.matches[c] = Some(LegMatch {
                        key: key.clone(),
                        opening: open_idx,
                        tier,
                    });
                    match tier {
                        MatchTier::Accumulated => result.stats.accumulated += 1,
                        _ => result.stats.one_to_one += 1,
                    }
                }
                tracing::debug!("{} matched via {:?}", key, tier);
                break;
            }
        }
    }

    let opening_legs: Vec<&Leg> = openings.iter().map(|&i| &legs[i]).collect();
    for &c in &closings {
        if result.matches[c].is_some() {
            continue;
        }
        match match_nearest(&legs[c], &opening_legs) {
            Some(pos) => {
                let open_idx = openings[pos];
                let key = MatchKey::for_opening(&legs[open_idx]);
                tracing::warn!(
                    "closing order {} force-assigned to {}",
                    legs[c].order_id(),
                    key
                );
                result.matches[c] = Some(LegMatch {
                    key,
                    opening: open_idx,
                    tier: MatchTier::Nearest,
                });
                result.stats.nearest += 1;
            }
            None => {
                tracing::warn!(
                    "closing order {} in {} has no opening for {}",
                    legs[c].order_id(),
                    legs[c].source(),
                    legs[c].symbol()
                );
                result.stats.unmatched_closings += 1;
            }
        }
    }
}
