//! Feasible leaving sets for the optimized family.
//!
//! A leaving is a candidate shown list. It is *prefix constrained* when every prefix can be
//! built by repeatedly taking the top unused document of one of the input rankings. The full
//! set grows combinatorially, so enumeration is capped at [`MAX_LEAVING_LENGTH`] positions and
//! [`MAX_FEASIBLE_LEAVINGS`] lists; exceeding either is an error rather than a truncation,
//! since a truncated set no longer supports an unbiased distribution.
//!
//! Enumeration is breadth first over an arena of partial lists. Each node stores its parent,
//! the document it appended, a bitmask of used documents and one cursor per ranking; a list is
//! read back by walking parent links.
//!
//! Variants:
//! - [`AllowedLeavings::Sample`] draws `sample_size` random prefix-constrained walks instead of
//!   enumerating, for inputs where the full set is too large.
//! - [`AllowedLeavings::PrefixConstraintVa`] keeps each vertical's documents in one contiguous
//!   block. Block start and size are bounded by where that vertical sits in the input rankings,
//!   the block content is itself a leaving of the vertical's sub-rankings, and the remaining
//!   slots are a leaving of the web sub-rankings.

use rand::{Rng, RngCore};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::document::{doc_ids, DocId, Document};
use crate::error::ComparisonError;

/// Longest list the optimized family will build.
pub const MAX_LEAVING_LENGTH: usize = 10;
/// Distinct documents the enumerator can track (one bit each).
pub const MAX_DOCUMENTS: usize = 128;
/// Upper bound on the size of a feasible leaving set.
pub const MAX_FEASIBLE_LEAVINGS: usize = 200_000;
/// Default number of random walks for [`AllowedLeavings::Sample`].
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Which lists the optimizer may put probability on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllowedLeavings {
    /// Every prefix-constrained list.
    #[default]
    PrefixConstraint,
    /// Prefix constrained per content type, verticals kept contiguous.
    PrefixConstraintVa,
    /// A random sample of prefix-constrained lists.
    Sample,
}

impl AllowedLeavings {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrefixConstraint => "prefix_constraint",
            Self::PrefixConstraintVa => "prefix_constraint_va",
            Self::Sample => "sample",
        }
    }
}

impl FromStr for AllowedLeavings {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix_constraint" => Ok(Self::PrefixConstraint),
            "prefix_constraint_va" => Ok(Self::PrefixConstraintVa),
            "sample" => Ok(Self::Sample),
            _ => Err(ComparisonError::invalid_option(
                "allowed_leavings",
                s,
                "expected `prefix_constraint`, `prefix_constraint_va` or `sample`",
            )),
        }
    }
}

impl fmt::Display for AllowedLeavings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeavingConfig {
    pub allowed: AllowedLeavings,
    /// Random walks drawn by [`AllowedLeavings::Sample`].
    pub sample_size: usize,
    /// Only the top `prefix_bound` documents of each ranking may be placed.
    pub prefix_bound: Option<usize>,
}

impl Default for LeavingConfig {
    fn default() -> Self {
        Self {
            allowed: AllowedLeavings::PrefixConstraint,
            sample_size: DEFAULT_SAMPLE_SIZE,
            prefix_bound: None,
        }
    }
}

impl LeavingConfig {
    pub fn validate(&self) -> Result<(), ComparisonError> {
        if self.allowed == AllowedLeavings::Sample && self.sample_size == 0 {
            return Err(ComparisonError::invalid_option(
                "sample_size",
                "0",
                "sampling needs at least one walk",
            ));
        }
        if self.prefix_bound == Some(0) {
            return Err(ComparisonError::invalid_option(
                "prefix_bound",
                "0",
                "expected a positive bound",
            ));
        }
        Ok(())
    }
}

/// Rankings re-expressed over dense document indices.
struct Universe {
    docs: Vec<Document>,
    rankings: Vec<Vec<u8>>,
}

impl Universe {
    fn new(rankings: &[Vec<Document>]) -> Result<Self, ComparisonError> {
        let mut docs: Vec<Document> = Vec::new();
        let mut index: HashMap<Document, u8> = HashMap::new();
        let mut dense = Vec::with_capacity(rankings.len());
        for ranking in rankings {
            let mut row = Vec::with_capacity(ranking.len());
            for doc in ranking {
                let i = match index.get(doc) {
                    Some(&i) => i,
                    None => {
                        if docs.len() >= MAX_DOCUMENTS {
                            let distinct: HashSet<&Document> = rankings.iter().flatten().collect();
                            return Err(ComparisonError::TooManyDocuments {
                                count: distinct.len(),
                                cap: MAX_DOCUMENTS,
                            });
                        }
                        let i = docs.len() as u8;
                        index.insert(doc.clone(), i);
                        docs.push(doc.clone());
                        i
                    }
                };
                row.push(i);
            }
            dense.push(row);
        }
        Ok(Self {
            docs,
            rankings: dense,
        })
    }

    /// Move every cursor past documents already used.
    fn advance(&self, used: u128, cursors: &[usize]) -> Vec<usize> {
        self.rankings
            .iter()
            .zip(cursors)
            .map(|(ranking, &c)| {
                let mut c = c;
                while c < ranking.len() && used & bit(ranking[c]) != 0 {
                    c += 1;
                }
                c
            })
            .collect()
    }

    /// Distinct documents that may come next, in ranking order.
    fn options(&self, cursors: &[usize], prefix_bound: Option<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.rankings.len());
        for (ranking, &c) in self.rankings.iter().zip(cursors) {
            let limit = prefix_bound.map_or(ranking.len(), |b| b.min(ranking.len()));
            if c < limit && !out.contains(&ranking[c]) {
                out.push(ranking[c]);
            }
        }
        out
    }

    fn documents(&self, dense: &[u8]) -> Vec<Document> {
        dense.iter().map(|&i| self.docs[i as usize].clone()).collect()
    }
}

fn bit(i: u8) -> u128 {
    1u128 << i
}

struct Node {
    parent: Option<usize>,
    doc: u8,
    depth: usize,
    used: u128,
    cursors: Vec<usize>,
}

fn check_length(length: usize) -> Result<(), ComparisonError> {
    if length > MAX_LEAVING_LENGTH {
        return Err(ComparisonError::LengthExceedsCap {
            length,
            cap: MAX_LEAVING_LENGTH,
        });
    }
    Ok(())
}

/// Longest list `prefix_bound` still permits, at most `length`.
///
/// A bound of `b` leaves only the distinct documents among each ranking's top `b` placeable,
/// and every prefix-constrained walk places all of them before running dry.
pub fn reachable_length(
    rankings: &[Vec<Document>],
    length: usize,
    prefix_bound: Option<usize>,
) -> usize {
    let Some(bound) = prefix_bound else {
        return length;
    };
    let placeable: HashSet<&Document> = rankings
        .iter()
        .flat_map(|r| r.iter().take(bound))
        .collect();
    let reachable = length.min(placeable.len());
    if reachable < length {
        trace!(
            target: "multileave.leavings",
            length,
            reachable,
            prefix_bound = bound,
            "prefix bound shortens the leavings"
        );
    }
    reachable
}

/// Every prefix-constrained list of [`reachable_length`] documents.
pub fn prefix_constrained_leavings(
    rankings: &[Vec<Document>],
    length: usize,
    prefix_bound: Option<usize>,
) -> Result<Vec<Vec<Document>>, ComparisonError> {
    check_length(length)?;
    let length = reachable_length(rankings, length, prefix_bound);
    let universe = Universe::new(rankings)?;
    let mut arena = vec![Node {
        parent: None,
        doc: 0,
        depth: 0,
        used: 0,
        cursors: vec![0; universe.rankings.len()],
    }];
    let mut frontier: VecDeque<usize> = VecDeque::from([0]);
    let mut leaves: Vec<usize> = Vec::new();

    while let Some(id) = frontier.pop_front() {
        let (depth, used) = (arena[id].depth, arena[id].used);
        if depth == length {
            leaves.push(id);
            if leaves.len() > MAX_FEASIBLE_LEAVINGS {
                return Err(ComparisonError::TooManyLeavings {
                    cap: MAX_FEASIBLE_LEAVINGS,
                });
            }
            continue;
        }
        let cursors = universe.advance(used, &arena[id].cursors);
        for doc in universe.options(&cursors, prefix_bound) {
            arena.push(Node {
                parent: Some(id),
                doc,
                depth: depth + 1,
                used: used | bit(doc),
                cursors: cursors.clone(),
            });
            frontier.push_back(arena.len() - 1);
        }
        if frontier.len() > MAX_FEASIBLE_LEAVINGS {
            return Err(ComparisonError::TooManyLeavings {
                cap: MAX_FEASIBLE_LEAVINGS,
            });
        }
    }

    let lists: Vec<Vec<Document>> = leaves
        .into_iter()
        .map(|leaf| {
            let mut dense = Vec::with_capacity(length);
            let mut cur = Some(leaf);
            while let Some(id) = cur {
                let node = &arena[id];
                if node.parent.is_some() {
                    dense.push(node.doc);
                }
                cur = node.parent;
            }
            dense.reverse();
            universe.documents(&dense)
        })
        .collect();
    debug!(
        target: "multileave.leavings",
        rankings = rankings.len(),
        length,
        nodes = arena.len(),
        leavings = lists.len(),
        "enumerated prefix-constrained leavings"
    );
    Ok(lists)
}

/// Up to `sample_size` distinct prefix-constrained lists drawn by uniform random walks.
pub fn sampled_leavings(
    rankings: &[Vec<Document>],
    length: usize,
    prefix_bound: Option<usize>,
    sample_size: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<Vec<Document>>, ComparisonError> {
    check_length(length)?;
    let length = reachable_length(rankings, length, prefix_bound);
    let universe = Universe::new(rankings)?;
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut lists = Vec::new();
    'walks: for _ in 0..sample_size {
        let mut used = 0u128;
        let mut cursors = vec![0; universe.rankings.len()];
        let mut dense = Vec::with_capacity(length);
        while dense.len() < length {
            cursors = universe.advance(used, &cursors);
            let options = universe.options(&cursors, prefix_bound);
            if options.is_empty() {
                continue 'walks;
            }
            let doc = options[rng.random_range(0..options.len())];
            used |= bit(doc);
            dense.push(doc);
        }
        if seen.insert(dense.clone()) {
            lists.push(universe.documents(&dense));
        }
    }
    debug!(
        target: "multileave.leavings",
        sample_size,
        leavings = lists.len(),
        "sampled leavings"
    );
    Ok(lists)
}

/// Where one vertical may go: its block start and size ranges plus its sub-rankings.
struct VerticalBlock {
    starts: (usize, usize),
    sizes: (usize, usize),
    rankings: Vec<Vec<Document>>,
}

fn vertical_block(rankings: &[Vec<Document>], name: &str, length: usize) -> VerticalBlock {
    let mut starts: Option<(usize, usize)> = None;
    let mut sizes: Option<(usize, usize)> = None;
    let mut sub = Vec::new();
    let mut absent = false;
    for ranking in rankings {
        let of_type: Vec<(usize, &Document)> = ranking
            .iter()
            .enumerate()
            .filter(|(_, d)| d.doc_type().as_str() == name && !d.doc_type().is_web())
            .collect();
        let Some(&(start, _)) = of_type.first() else {
            absent = true;
            continue;
        };
        let size = of_type.len();
        starts = Some(starts.map_or((start, start), |(lo, hi)| (lo.min(start), hi.max(start))));
        sizes = Some(sizes.map_or((size, size), |(lo, hi)| (lo.min(size), hi.max(size))));
        sub.push(of_type.into_iter().map(|(_, d)| d.clone()).collect());
    }
    let (start_lo, start_hi) = starts.unwrap_or((0, 0));
    let (size_lo, size_hi) = sizes.unwrap_or((0, 0));
    VerticalBlock {
        starts: (start_lo, start_hi.min(length)),
        sizes: (if absent { 0 } else { size_lo }, size_hi.min(length)),
        rankings: sub,
    }
}

/// Lists that keep every vertical in one contiguous block.
pub fn vertical_aware_leavings(
    rankings: &[Vec<Document>],
    length: usize,
    prefix_bound: Option<usize>,
) -> Result<Vec<Vec<Document>>, ComparisonError> {
    check_length(length)?;
    let verticals: BTreeSet<&str> = rankings
        .iter()
        .flatten()
        .filter(|d| !d.doc_type().is_web())
        .map(|d| d.doc_type().as_str())
        .collect();
    if verticals.is_empty() {
        return prefix_constrained_leavings(rankings, length, prefix_bound);
    }

    // (start, block) choices per vertical; `None` leaves the vertical out.
    let mut choices: Vec<Vec<Option<(usize, Vec<Document>)>>> = Vec::new();
    for name in &verticals {
        let block = vertical_block(rankings, name, length);
        let mut options: Vec<Option<(usize, Vec<Document>)>> = Vec::new();
        if block.sizes.0 == 0 {
            options.push(None);
        }
        for size in block.sizes.0.max(1)..=block.sizes.1 {
            let contents = prefix_constrained_leavings(&block.rankings, size, None)?;
            for start in block.starts.0..=block.starts.1 {
                if start + size > length {
                    continue;
                }
                options.extend(contents.iter().map(|c| Some((start, c.clone()))));
            }
        }
        choices.push(options);
    }

    let mut placements: Vec<Vec<(usize, Vec<Document>)>> = vec![Vec::new()];
    for options in &choices {
        let mut next = Vec::new();
        for placed in &placements {
            for option in options {
                match option {
                    None => next.push(placed.clone()),
                    Some((start, block)) => {
                        let end = start + block.len();
                        let overlaps = placed
                            .iter()
                            .any(|(s, b)| *start < s + b.len() && *s < end);
                        if !overlaps {
                            let mut extended = placed.clone();
                            extended.push((*start, block.clone()));
                            next.push(extended);
                        }
                    }
                }
            }
        }
        if next.len() > MAX_FEASIBLE_LEAVINGS {
            return Err(ComparisonError::TooManyLeavings {
                cap: MAX_FEASIBLE_LEAVINGS,
            });
        }
        placements = next;
    }

    let web: Vec<Vec<Document>> = rankings
        .iter()
        .map(|r| r.iter().filter(|d| d.doc_type().is_web()).cloned().collect())
        .collect();
    let mut web_leavings: HashMap<usize, Vec<Vec<Document>>> = HashMap::new();
    let mut seen: HashSet<Vec<DocId>> = HashSet::new();
    let mut lists = Vec::new();
    for placed in &placements {
        let occupied: usize = placed.iter().map(|(_, b)| b.len()).sum();
        let need = length - occupied.min(length);
        if !web_leavings.contains_key(&need) {
            let fill = prefix_constrained_leavings(&web, need, prefix_bound)?;
            web_leavings.insert(need, fill);
        }
        let Some(fills) = web_leavings.get(&need) else {
            continue;
        };
        for fill in fills {
            let mut slots: Vec<Option<Document>> = vec![None; length];
            for (start, block) in placed {
                for (offset, doc) in block.iter().enumerate() {
                    slots[start + offset] = Some(doc.clone());
                }
            }
            let mut web_docs = fill.iter();
            let list: Vec<Document> = slots
                .into_iter()
                .filter_map(|slot| slot.or_else(|| web_docs.next().cloned()))
                .collect();
            if list.len() == length && seen.insert(doc_ids(&list)) {
                lists.push(list);
            }
            if lists.len() > MAX_FEASIBLE_LEAVINGS {
                return Err(ComparisonError::TooManyLeavings {
                    cap: MAX_FEASIBLE_LEAVINGS,
                });
            }
        }
    }
    if lists.is_empty() {
        if let Some(bound) = prefix_bound {
            return Err(ComparisonError::invalid_option(
                "prefix_bound",
                bound.to_string(),
                format!("no vertical-aware list of length {length} fits within the bound"),
            ));
        }
    }
    debug!(
        target: "multileave.leavings",
        verticals = verticals.len(),
        placements = placements.len(),
        leavings = lists.len(),
        "enumerated vertical-aware leavings"
    );
    Ok(lists)
}

/// The leaving set selected by `cfg`.
pub fn feasible_leavings(
    rankings: &[Vec<Document>],
    length: usize,
    cfg: &LeavingConfig,
    rng: &mut dyn RngCore,
) -> Result<Vec<Vec<Document>>, ComparisonError> {
    match cfg.allowed {
        AllowedLeavings::PrefixConstraint => {
            prefix_constrained_leavings(rankings, length, cfg.prefix_bound)
        }
        AllowedLeavings::PrefixConstraintVa => {
            vertical_aware_leavings(rankings, length, cfg.prefix_bound)
        }
        AllowedLeavings::Sample => {
            sampled_leavings(rankings, length, cfg.prefix_bound, cfg.sample_size, rng)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn docs(ids: &[usize]) -> Vec<Document> {
        ids.iter().copied().map(Document::new).collect()
    }

    fn ids(lists: &[Vec<Document>]) -> BTreeSet<Vec<DocId>> {
        lists.iter().map(|l| doc_ids(l)).collect()
    }

    #[test]
    fn two_rankings_branch_at_every_disagreement() {
        let rankings = [docs(&[0, 1, 2]), docs(&[2, 1, 0])];
        let lists = prefix_constrained_leavings(&rankings, 2, None).unwrap();
        let expected: BTreeSet<Vec<DocId>> =
            [vec![0, 1], vec![0, 2], vec![2, 0], vec![2, 1]].into_iter().collect();
        assert_eq!(ids(&lists), expected);
    }

    #[test]
    fn identical_rankings_have_one_leaving() {
        let rankings = [docs(&[3, 1, 2]), docs(&[3, 1, 2])];
        let lists = prefix_constrained_leavings(&rankings, 3, None).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(doc_ids(&lists[0]), vec![3, 1, 2]);
    }

    #[test]
    fn prefix_bound_limits_each_ranking() {
        let rankings = [docs(&[0, 1, 2]), docs(&[2, 1, 0])];
        let lists = prefix_constrained_leavings(&rankings, 2, Some(1)).unwrap();
        let expected: BTreeSet<Vec<DocId>> = [vec![0, 2], vec![2, 0]].into_iter().collect();
        assert_eq!(ids(&lists), expected);
    }

    #[test]
    fn tight_prefix_bound_shortens_the_lists() {
        let rankings = [docs(&[0, 1, 2, 3]), docs(&[1, 0, 3, 2])];
        assert_eq!(reachable_length(&rankings, 3, Some(1)), 2);
        assert_eq!(reachable_length(&rankings, 3, None), 3);

        let lists = prefix_constrained_leavings(&rankings, 3, Some(1)).unwrap();
        let expected: BTreeSet<Vec<DocId>> = [vec![0, 1], vec![1, 0]].into_iter().collect();
        assert_eq!(ids(&lists), expected);

        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sampled_leavings(&rankings, 3, Some(1), 20, &mut rng).unwrap();
        assert!(!sampled.is_empty());
        assert!(ids(&sampled).is_subset(&expected));
    }

    #[test]
    fn length_beyond_cap_is_rejected() {
        let rankings = [docs(&(0..12).collect::<Vec<_>>())];
        let err = prefix_constrained_leavings(&rankings, 11, None).unwrap_err();
        assert_eq!(
            err,
            ComparisonError::LengthExceedsCap {
                length: 11,
                cap: MAX_LEAVING_LENGTH
            }
        );
    }

    #[test]
    fn samples_are_a_subset_of_the_full_set() {
        let rankings = [docs(&[0, 1, 2, 3]), docs(&[3, 2, 1, 0]), docs(&[1, 3, 0, 2])];
        let full = ids(&prefix_constrained_leavings(&rankings, 3, None).unwrap());
        let mut rng = StdRng::seed_from_u64(4);
        let sampled = sampled_leavings(&rankings, 3, None, 50, &mut rng).unwrap();
        assert!(!sampled.is_empty());
        let sampled = ids(&sampled);
        assert!(sampled.is_subset(&full));
    }

    #[test]
    fn vertical_documents_stay_contiguous() {
        let image = |id| Document::with_type(id, "Image");
        let rankings = [
            vec![Document::new(0), image(5), image(6), Document::new(1)],
            vec![image(6), image(5), Document::new(0), Document::new(1)],
        ];
        let lists = vertical_aware_leavings(&rankings, 4, None).unwrap();
        assert!(!lists.is_empty());
        for list in &lists {
            let positions: Vec<usize> = list
                .iter()
                .enumerate()
                .filter(|(_, d)| !d.doc_type().is_web())
                .map(|(i, _)| i)
                .collect();
            assert_eq!(positions.len(), 2, "{:?}", doc_ids(list));
            assert_eq!(positions[1], positions[0] + 1, "{:?}", doc_ids(list));
            assert!(positions[0] <= 1);
        }
        assert!(ids(&lists).contains(&vec![6, 5, 0, 1]));
        assert!(ids(&lists).contains(&vec![0, 5, 6, 1]));
    }

    #[test]
    fn allowed_leavings_parse() {
        assert_eq!(
            "prefix_constraint_va".parse::<AllowedLeavings>(),
            Ok(AllowedLeavings::PrefixConstraintVa)
        );
        assert!("everything".parse::<AllowedLeavings>().is_err());
    }
}
