//! Priority merge of tentative groups into a non-overlapping partition.
//!
//! Tentative groups from all passes are ordered by method priority
//! (exact, then perceptual image, then similar name). Walking that order,
//! each group loses the members an earlier surviving group already claimed;
//! groups left with fewer than two members are dropped. The survivors are
//! returned largest first.

use std::collections::HashSet;

use super::groups::Candidate;

/// Merge `tentative` groups so every record index appears at most once.
///
/// `rescore` is called for each surviving group whose membership shrank and
/// returns its new confidence.
pub fn priority_merge<F>(mut tentative: Vec<Candidate>, rescore: F) -> Vec<Candidate>
where
    F: Fn(&Candidate) -> f64,
{
    // stable: equal priorities keep pass order
    tentative.sort_by_key(|c| c.method.priority());

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut merged: Vec<Candidate> = Vec::with_capacity(tentative.len());

    for candidate in tentative {
        let before = candidate.members.len();
        let mut local = HashSet::with_capacity(before);
        let survivors: Vec<usize> = candidate
            .members
            .iter()
            .copied()
            .filter(|idx| !claimed.contains(idx) && local.insert(*idx))
            .collect();

        if survivors.len() < 2 {
            log::trace!(
                "Dropping {} group: {} of {} members already claimed",
                candidate.method,
                before - survivors.len(),
                before
            );
            continue;
        }

        claimed.extend(survivors.iter().copied());
        let changed = survivors.len() != before;
        let mut kept = Candidate {
            members: survivors,
            method: candidate.method,
            confidence: candidate.confidence,
        };
        if changed {
            kept.confidence = rescore(&kept).clamp(0.0, 1.0);
        }
        merged.push(kept);
    }

    merged.sort_by(|a, b| b.members.len().cmp(&a.members.len()));

    if let Err(idx) = check_partition(&merged) {
        log::error!("Merge invariant violated: record {idx} is in two groups or a group is undersized");
        debug_assert!(false, "merge invariant violated at record {idx}");
    }

    merged
}

/// Verify that no index repeats across groups and every group has two members.
///
/// Returns the first offending index (or the first member of an undersized group).
pub fn check_partition(groups: &[Candidate]) -> Result<(), usize> {
    let mut seen = HashSet::new();
    for group in groups {
        if group.members.len() < 2 {
            return Err(group.members.first().copied().unwrap_or(usize::MAX));
        }
        for &idx in &group.members {
            if !seen.insert(idx) {
                return Err(idx);
            }
        }
    }
    Ok(())
}
