use itertools::Itertools;

use super::{observation::Observation, TrackParams};

struct Candidate {
    distance: f64,
    chain: usize,
    /// Position of the observation within its frame.
    slot: usize,
}

/// Links observations into chains, frame by frame.
///
/// Every chain whose last observation is at most `max_gap_frames` frames back
/// may take one observation within `max_displacement_px`. Pairs are accepted
/// greedily by distance, then by the older chain, then by the observation's
/// `(y, x)`. Observations left over start new chains, so chain indices follow
/// first appearance.
///
/// `observations` must be in frame order. Returns the chain of each one.
pub fn link(observations: &[Observation], params: &TrackParams) -> Vec<usize> {
    let mut chain_of = Vec::with_capacity(observations.len());
    // Last observation of every chain, and the chains still open for linking
    let mut tails: Vec<usize> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for (frame, group) in &observations.iter().enumerate().chunk_by(|(_, o)| o.frame) {
        let current: Vec<usize> = group.map(|(i, _)| i).collect();

        open.retain(|&chain| {
            let gap = frame as i64 - observations[tails[chain]].frame as i64 - 1;
            (0..=params.max_gap_frames as i64).contains(&gap)
        });

        let mut candidates: Vec<Candidate> = open
            .iter()
            .flat_map(|&chain| {
                let prior = &observations[tails[chain]];
                current.iter().enumerate().filter_map(move |(slot, &i)| {
                    let distance = prior.distance(&observations[i]);
                    (distance <= params.max_displacement_px).then_some(Candidate { distance, chain, slot })
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            let (oa, ob) = (&observations[current[a.slot]], &observations[current[b.slot]]);
            a.distance
                .total_cmp(&b.distance)
                .then(a.chain.cmp(&b.chain))
                .then(oa.y().total_cmp(&ob.y()))
                .then(oa.x().total_cmp(&ob.x()))
                .then(a.slot.cmp(&b.slot))
        });

        let mut matched: Vec<Option<usize>> = vec![None; current.len()];
        let mut taken: Vec<usize> = Vec::new();
        for candidate in candidates {
            if matched[candidate.slot].is_none() && !taken.contains(&candidate.chain) {
                matched[candidate.slot] = Some(candidate.chain);
                taken.push(candidate.chain);
            }
        }

        for (slot, &i) in current.iter().enumerate() {
            let chain = match matched[slot] {
                Some(chain) => chain,
                None => {
                    tails.push(i);
                    open.push(tails.len() - 1);
                    tails.len() - 1
                }
            };
            tails[chain] = i;
            chain_of.push(chain);
        }
    }

    chain_of
}
