//! Codebook reordering for coding efficiency.
//!
//! Palette indices are transmitted as deltas from the previous index, so
//! the transmission order should keep indices that appear near each other
//! in the block stream numerically close. The reorderer below is a greedy
//! double-ended insertion heuristic over the adjacency weights of the
//! observed index sequence; it is deterministic for a given input, with
//! ties broken toward the lower index.

use std::collections::HashMap;
use tessera_transcoder::SelectorEntry;

/// A permutation pair between cluster ("old") order and transmission
/// ("new") order, with `old_to_new[new_to_old[i]] == i`.
pub struct PaletteIndexReorderer {
    pub old_to_new: Vec<u32>,
    pub new_to_old: Vec<u32>,
}

impl PaletteIndexReorderer {
    /// Orders `num_syms` palette entries to minimize the summed |delta|
    /// over `indices`, the sequence of palette references in stream order.
    pub fn new(indices: &[u32], num_syms: usize) -> Self {
        let mut totals = vec![0u64; num_syms];
        let mut adjacency: Vec<HashMap<u32, u64>> = vec![HashMap::new(); num_syms];
        for window in indices.windows(2) {
            let (a, b) = (window[0], window[1]);
            if a != b {
                *adjacency[a as usize].entry(b).or_insert(0) += 1;
                *adjacency[b as usize].entry(a).or_insert(0) += 1;
            }
        }
        for &i in indices {
            totals[i as usize] += 1;
        }

        let mut placed_pos: Vec<Option<i64>> = vec![None; num_syms];

        // Seed with the most-referenced entry.
        let seed = (0..num_syms)
            .max_by_key(|&i| (totals[i], std::cmp::Reverse(i)))
            .unwrap_or(0);
        placed_pos[seed] = Some(0);
        let mut front = 0i64;
        let mut back = 0i64;

        let mut order: Vec<u32> = vec![seed as u32];

        let mut remaining: Vec<usize> = (0..num_syms).filter(|&i| i != seed).collect();
        while !remaining.is_empty() {
            // Strongest attachment to the placed set wins; unattached
            // entries wait until only they are left and then append in
            // index order.
            let mut best_k = 0usize;
            let mut best_weight = 0u64;
            for (k, &cand) in remaining.iter().enumerate() {
                let weight: u64 = adjacency[cand]
                    .iter()
                    .filter(|(&other, _)| placed_pos[other as usize].is_some())
                    .map(|(_, &w)| w)
                    .sum();
                if weight > best_weight {
                    best_weight = weight;
                    best_k = k;
                }
            }
            let cand = remaining.remove(best_k);

            // Pull toward the weighted center of its placed neighbors.
            let cost = |pos: i64| -> u64 {
                adjacency[cand]
                    .iter()
                    .filter_map(|(&other, &w)| {
                        placed_pos[other as usize].map(|p| w * (pos - p).unsigned_abs())
                    })
                    .sum()
            };
            if cost(front - 1) < cost(back + 1) {
                front -= 1;
                placed_pos[cand] = Some(front);
                order.insert(0, cand as u32);
            } else {
                back += 1;
                placed_pos[cand] = Some(back);
                order.push(cand as u32);
            }
        }

        let mut old_to_new = vec![0u32; num_syms];
        for (new_index, &old_index) in order.iter().enumerate() {
            old_to_new[old_index as usize] = new_index as u32;
        }
        Self::from_old_to_new(old_to_new)
    }

    pub fn from_old_to_new(old_to_new: Vec<u32>) -> Self {
        let mut new_to_old = vec![0u32; old_to_new.len()];
        for (old_index, &new_index) in old_to_new.iter().enumerate() {
            new_to_old[new_index as usize] = old_index as u32;
        }
        Self {
            old_to_new,
            new_to_old,
        }
    }

    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }
}

/// Intra-chunk selector ordering: 32 entries at a time are re-sorted into
/// a nearest-Hamming-distance chain, except the chunk around the
/// most-frequent entry, which keeps its order to preserve coder locality.
pub fn optimize_selector_palette_order(
    remap: &mut PaletteIndexReorderer,
    selectors: &[SelectorEntry],
    all_selector_indices: &[u32],
) {
    const CHUNK: usize = 32;
    let num = remap.len();
    if num == 0 {
        return;
    }

    let mut new_hist = vec![0u64; num];
    for &old in all_selector_indices {
        new_hist[remap.old_to_new[old as usize] as usize] += 1;
    }
    let max_hist_index = (0..num)
        .max_by_key(|&i| (new_hist[i], std::cmp::Reverse(i)))
        .unwrap_or(0) as i64;

    let hamming = |a: &SelectorEntry, b: &SelectorEntry| -> u32 {
        (0..4)
            .map(|j| (a.get_byte(j) ^ b.get_byte(j)).count_ones())
            .sum()
    };

    let mut optimized_order: Vec<u32> = Vec::with_capacity(num);
    let mut start = 0usize;
    while start < num {
        let end = (start + CHUNK).min(num);

        let protected = (start as i64) < max_hist_index + 16 && (end as i64) > max_hist_index - 16;
        if protected {
            optimized_order.extend((start..end).map(|i| i as u32));
            start = end;
            continue;
        }

        let mut prev_entry = selectors[remap.new_to_old[start] as usize];
        optimized_order.push(start as u32);

        let mut remaining: Vec<u32> = ((start + 1)..end).map(|i| i as u32).collect();
        while !remaining.is_empty() {
            let mut best_k = 0usize;
            let mut best_dist = u32::MAX;
            for (k, &cand) in remaining.iter().enumerate() {
                let dist = hamming(&prev_entry, &selectors[remap.new_to_old[cand as usize] as usize]);
                if dist < best_dist {
                    best_dist = dist;
                    best_k = k;
                }
            }
            let chosen = remaining.remove(best_k);
            prev_entry = selectors[remap.new_to_old[chosen as usize] as usize];
            optimized_order.push(chosen);
        }

        start = end;
    }

    let new_to_old: Vec<u32> = optimized_order
        .iter()
        .map(|&i| remap.new_to_old[i as usize])
        .collect();
    let mut old_to_new = vec![0u32; num];
    for (new_index, &old_index) in new_to_old.iter().enumerate() {
        old_to_new[old_index as usize] = new_index as u32;
    }
    remap.old_to_new = old_to_new;
    remap.new_to_old = new_to_old;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_are_inverses() {
        let seq = [3u32, 3, 1, 1, 2, 2, 2, 0, 3, 1];
        let remap = PaletteIndexReorderer::new(&seq, 5);
        for i in 0..5 {
            assert_eq!(remap.old_to_new[remap.new_to_old[i] as usize], i as u32);
        }
    }

    #[test]
    fn adjacent_sequence_entries_land_close() {
        // A sequence alternating between two entries should place them
        // next to each other in transmission order.
        let seq = [7u32, 2, 7, 2, 7, 2, 7, 2, 5];
        let remap = PaletteIndexReorderer::new(&seq, 8);
        let d = (remap.old_to_new[7] as i64 - remap.old_to_new[2] as i64).abs();
        assert_eq!(d, 1);
    }

    #[test]
    fn deterministic() {
        let seq: Vec<u32> = (0..200).map(|i| (i * 7 + i / 13) % 40).collect();
        let a = PaletteIndexReorderer::new(&seq, 40);
        let b = PaletteIndexReorderer::new(&seq, 40);
        assert_eq!(a.old_to_new, b.old_to_new);
    }
}
