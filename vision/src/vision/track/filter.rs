use std::collections::BTreeMap;

/// Drops chains with fewer than `min_len` observations and numbers the rest
/// `0, 1, 2, ...` in order of first appearance.
pub fn filter_short_tracks(chain_of: &[usize], min_len: usize) -> Vec<Option<i64>> {
    let mut lengths: BTreeMap<usize, usize> = BTreeMap::new();
    for &chain in chain_of {
        *lengths.entry(chain).or_default() += 1;
    }

    let mut ids: BTreeMap<usize, i64> = BTreeMap::new();
    chain_of
        .iter()
        .map(|chain| {
            if lengths[chain] < min_len {
                return None;
            }
            let next = ids.len() as i64;
            Some(*ids.entry(*chain).or_insert(next))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_chains_are_dropped_and_ids_compacted() {
        let ids = filter_short_tracks(&[0, 1, 2, 1, 2, 3, 2], 2);
        assert_eq!(ids, vec![None, Some(0), Some(1), Some(0), Some(1), None, Some(1)]);
    }

    #[test]
    fn min_len_one_keeps_orphans() {
        assert_eq!(filter_short_tracks(&[0, 1, 0], 1), vec![Some(0), Some(1), Some(0)]);
        assert!(filter_short_tracks(&[], 3).is_empty());
    }
}
