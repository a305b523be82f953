//! PDCCH CCE grid: collision-free DCI placement within one TTI.
//!
//! Allocations are kept in a flat, append-only tree. Each call to
//! [`PdcchGrid::alloc_dci`] adds one level: every node of the previous level is
//! expanded with every free candidate of the new DCI, and duplicate combinations
//! (same cumulative mask) are pruned. A level therefore holds all distinct ways
//! of placing every DCI allocated so far, and the first node of the last level
//! is the first-fit placement.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::bitmask::PdcchMask;
use crate::outcome::AllocType;
use crate::search_space::{aggr_level, ControlTables, DciLocations, NOF_AGGR_LEVELS};
use crate::tti::{self, TTI_INVALID};
use crate::user::GridUser;
use crate::{log_checks, log_debug};

/// One DCI placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DciAlloc {
    /// RNTI of the user, or 0 for broadcast/paging/RAR
    pub rnti: u16,
    pub alloc_type: AllocType,
    pub aggr_idx: u32,
    /// First CCE of the DCI
    pub ncce: u32,
    /// CCEs occupied by this DCI
    pub current_mask: PdcchMask,
    /// CCEs occupied by this DCI and every DCI on its path to the root
    pub total_mask: PdcchMask,
}

/// DCI placements along one path of the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PdcchAllocResult {
    /// Placements in allocation order
    pub allocs: Vec<DciAlloc>,
    pub total_mask: PdcchMask,
}

/// Whether `alloc` and every DCI on its path lie within `nof_cce` CCEs.
fn fits_in(alloc: &DciAlloc, nof_cce: u32) -> bool {
    alloc
        .total_mask
        .highest_set()
        .map_or(true, |pos| pos < nof_cce as usize)
}

#[derive(Clone, Debug)]
struct TreeNode {
    parent: Option<usize>,
    alloc: DciAlloc,
}

/// CCE allocator for one cell.
#[derive(Clone, Debug)]
pub struct PdcchGrid {
    tables: Arc<ControlTables>,
    verbosity: u8,

    tti_rx: u32,
    sf_idx: u32,
    cfi: u32,
    /// Node range `[prev_start, prev_end)` of the last allocated level
    prev_start: usize,
    prev_end: usize,
    tree: Vec<TreeNode>,
    nof_dci_allocs: usize,
}

impl PdcchGrid {
    /// Create a grid over the cell's precomputed candidate tables.
    pub fn new(tables: Arc<ControlTables>, verbosity: u8) -> Self {
        Self {
            tables,
            verbosity,
            tti_rx: TTI_INVALID,
            sf_idx: 0,
            cfi: 1,
            prev_start: 0,
            prev_end: 0,
            tree: Vec::new(),
            nof_dci_allocs: 0,
        }
    }

    /// Discard every allocation and start TTI `tti_rx` with CFI `start_cfi`.
    ///
    /// An out-of-range `start_cfi` keeps the previous CFI.
    pub fn new_tti(&mut self, tti_rx: u32, start_cfi: u32) {
        self.tti_rx = tti_rx;
        self.sf_idx = tti::sf_idx(tti::tti_tx_dl(tti_rx));
        self.reset();
        if !self.set_cfi(start_cfi) {
            log_checks!(
                self.verbosity,
                "invalid start CFI {} for tti_rx={}, keeping CFI {}",
                start_cfi,
                tti_rx,
                self.cfi
            );
        }
    }

    fn reset(&mut self) {
        self.prev_start = 0;
        self.prev_end = 0;
        self.tree.clear();
        self.nof_dci_allocs = 0;
    }

    /// Change the CFI.
    ///
    /// Rejected when `cfi` is not 1..=3, or when no placement combination of the
    /// DCIs allocated so far fits in the new control region. Otherwise the
    /// combinations that no longer fit are dropped from the tree, so the
    /// committed placement may move to another combination.
    pub fn set_cfi(&mut self, cfi: u32) -> bool {
        let Some(nof_cce) = self.tables.nof_cce(cfi) else {
            return false;
        };
        if self.prev_end > self.prev_start {
            let leaves = self.prev_start..self.prev_end;
            let nof_fitting = self.tree[leaves.clone()]
                .iter()
                .filter(|node| fits_in(&node.alloc, nof_cce))
                .count();
            if nof_fitting == 0 {
                log_checks!(
                    self.verbosity,
                    "cannot set CFI={}: none of {} combinations of {} DCIs fits in {} CCEs",
                    cfi,
                    leaves.len(),
                    self.nof_dci_allocs,
                    nof_cce
                );
                return false;
            }
            if nof_fitting < leaves.len() {
                self.prune_to_fitting(nof_cce);
            }
        }

        for node in self.tree.iter_mut() {
            node.alloc.current_mask.resize(nof_cce as usize);
            node.alloc.total_mask.resize(nof_cce as usize);
        }
        self.cfi = cfi;
        true
    }

    /// Keep only the last-level nodes whose path fits in `nof_cce` CCEs, and
    /// their ancestors. Relative node order is preserved.
    fn prune_to_fitting(&mut self, nof_cce: u32) {
        let mut keep = vec![false; self.tree.len()];
        for leaf in self.prev_start..self.prev_end {
            if !fits_in(&self.tree[leaf].alloc, nof_cce) {
                continue;
            }
            let mut node = Some(leaf);
            while let Some(i) = node {
                if keep[i] {
                    break;
                }
                keep[i] = true;
                node = self.tree[i].parent;
            }
        }

        // Parents always precede their children, so one forward pass remaps them
        let mut new_index = vec![None; self.tree.len()];
        let mut pruned = Vec::with_capacity(self.tree.len());
        let mut first_leaf = None;
        for (old, node) in self.tree.drain(..).enumerate() {
            if !keep[old] {
                continue;
            }
            if old >= self.prev_start && first_leaf.is_none() {
                first_leaf = Some(pruned.len());
            }
            new_index[old] = Some(pruned.len());
            pruned.push(TreeNode {
                parent: node.parent.and_then(|p| new_index[p]),
                alloc: node.alloc,
            });
        }
        self.tree = pruned;
        self.prev_end = self.tree.len();
        self.prev_start = first_leaf.unwrap_or(self.prev_end);
    }

    fn loc_table<'a>(
        &'a self,
        alloc_type: AllocType,
        user: Option<&'a dyn GridUser>,
    ) -> Option<&'a DciLocations> {
        match alloc_type {
            AllocType::DlBroadcast | AllocType::DlPaging => self.tables.common(self.cfi),
            AllocType::DlRar => self.tables.rar(self.cfi, self.sf_idx),
            AllocType::DlData | AllocType::UlData => {
                user.and_then(|u| u.dci_locations(self.cfi, self.sf_idx))
            }
        }
    }

    /// Allocate a DCI of `alloc_type` at aggregation index `aggr_idx`.
    ///
    /// Returns false, leaving the grid untouched, if no combination of the
    /// existing allocations leaves a free candidate.
    pub fn alloc_dci(
        &mut self,
        alloc_type: AllocType,
        aggr_idx: u32,
        user: Option<&dyn GridUser>,
    ) -> bool {
        if aggr_idx as usize >= NOF_AGGR_LEVELS {
            log_checks!(self.verbosity, "invalid aggregation index {}", aggr_idx);
            return false;
        }
        let Some(dci_locs) = self.loc_table(alloc_type, user).copied() else {
            log_checks!(
                self.verbosity,
                "no DCI location table for {} (cfi={})",
                alloc_type,
                self.cfi
            );
            return false;
        };

        if self.prev_end > 0 {
            for parent in self.prev_start..self.prev_end {
                self.update_alloc_tree(Some(parent), aggr_idx, user, alloc_type, &dci_locs);
            }
        } else {
            self.update_alloc_tree(None, aggr_idx, user, alloc_type, &dci_locs);
        }

        if self.tree.len() == self.prev_end {
            log_checks!(
                self.verbosity,
                "DCI collision for {} rnti=0x{:x} L={}",
                alloc_type,
                user.map_or(0, |u| u.rnti()),
                aggr_level(aggr_idx)
            );
            return false;
        }

        self.prev_start = self.prev_end;
        self.prev_end = self.tree.len();
        self.nof_dci_allocs += 1;

        log_debug!(self.verbosity, "{}", self.result_string(false));
        true
    }

    /// Append every free child of `parent` for the new DCI to the current level.
    fn update_alloc_tree(
        &mut self,
        parent: Option<usize>,
        aggr_idx: u32,
        user: Option<&dyn GridUser>,
        alloc_type: AllocType,
        dci_locs: &DciLocations,
    ) {
        let nof_cce = self.nof_cces();
        let l = aggr_level(aggr_idx);
        let cum_mask = match parent {
            Some(idx) => self.tree[idx].alloc.total_mask,
            None => PdcchMask::new(nof_cce as usize),
        };
        let tti_tx_dl = tti::tti_tx_dl(self.tti_rx);

        for &ncce in dci_locs.candidates(aggr_idx) {
            if ncce + l > nof_cce {
                continue;
            }
            if alloc_type == AllocType::DlData
                && user.is_some_and(|u| u.pucch_sr_collision(tti_tx_dl, ncce))
            {
                continue;
            }

            let mut alloc_mask = PdcchMask::new(nof_cce as usize);
            alloc_mask.fill(ncce as usize, (ncce + l) as usize);
            if cum_mask.intersects(&alloc_mask) {
                continue;
            }

            let total_mask = cum_mask.union(&alloc_mask);
            // Same CCE usage as a sibling combination already in this level
            if self.tree[self.prev_end..]
                .iter()
                .any(|node| node.alloc.total_mask == total_mask)
            {
                continue;
            }

            self.tree.push(TreeNode {
                parent,
                alloc: DciAlloc {
                    rnti: user.map_or(0, |u| u.rnti()),
                    alloc_type,
                    aggr_idx,
                    ncce,
                    current_mask: alloc_mask,
                    total_mask,
                },
            });
        }
    }

    /// Placements along the path ending at node `idx` of the last level.
    ///
    /// Returns an empty result with an all-zero mask if nothing is allocated or
    /// `idx` is out of range.
    pub fn get_allocs(&self, idx: usize) -> PdcchAllocResult {
        let empty = PdcchAllocResult {
            allocs: Vec::new(),
            total_mask: PdcchMask::new(self.nof_cces() as usize),
        };
        if self.prev_end == self.prev_start || idx >= self.prev_end - self.prev_start {
            return empty;
        }

        let leaf = self.prev_start + idx;
        let mut allocs = Vec::with_capacity(self.nof_dci_allocs);
        let mut node = Some(leaf);
        while let Some(i) = node {
            allocs.push(self.tree[i].alloc);
            node = self.tree[i].parent;
        }
        allocs.reverse();

        PdcchAllocResult {
            allocs,
            total_mask: self.tree[leaf].alloc.total_mask,
        }
    }

    /// The committed placement set: the first-fit path of the tree.
    pub fn read_allocations(&self) -> PdcchAllocResult {
        self.get_allocs(0)
    }

    pub fn cfi(&self) -> u32 {
        self.cfi
    }

    pub fn nof_cces(&self) -> u32 {
        self.tables.nof_cce(self.cfi).unwrap_or(0)
    }

    /// Number of DCIs allocated this TTI.
    pub fn nof_allocs(&self) -> usize {
        self.nof_dci_allocs
    }

    /// Number of distinct placements of all DCIs allocated this TTI.
    pub fn nof_alloc_combinations(&self) -> usize {
        self.prev_end - self.prev_start
    }

    pub fn tti_rx(&self) -> u32 {
        self.tti_rx
    }

    pub fn sf_idx(&self) -> u32 {
        self.sf_idx
    }

    /// Human-readable dump of every placement combination in the last level.
    pub fn result_string(&self, verbose: bool) -> String {
        let mut out = format!(
            "PDCCH allocations cfi={}, nof_cce={}, {} combinations",
            self.cfi,
            self.nof_cces(),
            self.nof_alloc_combinations()
        );
        for idx in 0..self.nof_alloc_combinations() {
            let result = self.get_allocs(idx);
            let _ = write!(out, "\n  combination {}: mask={}", idx, result.total_mask);
            if verbose {
                for alloc in &result.allocs {
                    let _ = write!(
                        out,
                        "\n    > rnti=0x{:x} {}: {} / {}",
                        alloc.rnti, alloc.alloc_type, alloc.current_mask, alloc.total_mask
                    );
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NOF_CFIS;
    use crate::search_space::{UserSearchSpace, NOF_SF};
    use crate::user::SchedUser;

    /// Tables where common and RAR candidates are {0, 4, 8} at L=4 and
    /// {0, 2, 4, 6} at L=2.
    fn tables(nof_cce: [u32; NOF_CFIS]) -> Arc<ControlTables> {
        let common = DciLocations::from_candidates([&[0, 1, 2], &[0, 2, 4, 6], &[0, 4, 8], &[0]]);
        Arc::new(
            ControlTables::from_tables(nof_cce, [common; NOF_CFIS], [[common; NOF_SF]; NOF_CFIS])
                .unwrap(),
        )
    }

    fn grid() -> PdcchGrid {
        let mut grid = PdcchGrid::new(tables([12, 24, 36]), 0);
        grid.new_tti(100, 1);
        grid
    }

    fn user(rnti: u16, cands: [&[u32]; 4]) -> SchedUser {
        SchedUser::with_search_space(UserSearchSpace::uniform(
            rnti,
            DciLocations::from_candidates(cands),
        ))
    }

    fn assert_path_disjoint(result: &PdcchAllocResult) {
        let mut union = PdcchMask::new(result.total_mask.len());
        for (i, a) in result.allocs.iter().enumerate() {
            for b in &result.allocs[i + 1..] {
                assert!(!a.current_mask.intersects(&b.current_mask));
            }
            union |= a.current_mask;
        }
        assert_eq!(union, result.total_mask);
    }

    #[test]
    fn test_new_tti_resets() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        grid.new_tti(101, 2);
        assert_eq!(grid.nof_allocs(), 0);
        assert_eq!(grid.nof_alloc_combinations(), 0);
        assert_eq!(grid.cfi(), 2);
        assert_eq!(grid.nof_cces(), 24);
        assert!(grid.read_allocations().allocs.is_empty());
    }

    #[test]
    fn test_sf_idx_follows_tx_tti() {
        let grid = grid();
        assert_eq!(grid.tti_rx(), 100);
        assert_eq!(grid.sf_idx(), 4);
    }

    #[test]
    fn test_first_fit_placement() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        let result = grid.read_allocations();
        assert_eq!(result.allocs.len(), 1);
        assert_eq!(result.allocs[0].ncce, 0);
        assert_eq!(result.total_mask.ones().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        // All three L=4 candidates fit in 12 CCEs
        assert_eq!(grid.nof_alloc_combinations(), 3);
    }

    #[test]
    fn test_allocations_never_overlap() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlPaging, 2, None));
        assert!(grid.alloc_dci(AllocType::DlRar, 2, None));
        assert_eq!(grid.nof_allocs(), 3);
        assert!(!grid.alloc_dci(AllocType::DlRar, 2, None));
        assert_eq!(grid.nof_allocs(), 3);

        for idx in 0..grid.nof_alloc_combinations() {
            let result = grid.get_allocs(idx);
            assert_eq!(result.allocs.len(), 3);
            assert_path_disjoint(&result);
            assert_eq!(result.total_mask.count(), 12);
        }
    }

    #[test]
    fn test_collision_leaves_state_unchanged() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        let before = grid.read_allocations();
        let combinations = grid.nof_alloc_combinations();

        assert!(!grid.alloc_dci(AllocType::DlBroadcast, 1, None));
        assert_eq!(grid.read_allocations(), before);
        assert_eq!(grid.nof_alloc_combinations(), combinations);
        assert_eq!(grid.nof_allocs(), 3);
    }

    #[test]
    fn test_aggregation_level_exceeding_region() {
        let mut grid = PdcchGrid::new(tables([4, 24, 36]), 0);
        grid.new_tti(0, 1);
        // L=8 does not fit in 4 CCEs
        assert!(!grid.alloc_dci(AllocType::DlBroadcast, 3, None));
        assert_eq!(grid.nof_allocs(), 0);
        assert_eq!(grid.nof_alloc_combinations(), 0);
    }

    #[test]
    fn test_invalid_aggregation_index() {
        let mut grid = grid();
        assert!(!grid.alloc_dci(AllocType::DlBroadcast, 4, None));
        assert_eq!(grid.nof_allocs(), 0);
    }

    #[test]
    fn test_alternatives_avoid_greedy_dead_end() {
        // user_a can use CCEs 0-3 or 4-7; user_b can only use 0-3.
        // First-fit alone would place user_a at 0 and block user_b.
        let mut grid = grid();
        let user_a = user(0x46, [&[], &[], &[0, 4], &[]]);
        let user_b = user(0x47, [&[], &[], &[0], &[]]);
        assert!(grid.alloc_dci(AllocType::DlData, 2, Some(&user_a)));
        assert_eq!(grid.nof_alloc_combinations(), 2);
        assert!(grid.alloc_dci(AllocType::DlData, 2, Some(&user_b)));

        let result = grid.read_allocations();
        assert_eq!(result.allocs[0].rnti, 0x46);
        assert_eq!(result.allocs[0].ncce, 4);
        assert_eq!(result.allocs[1].rnti, 0x47);
        assert_eq!(result.allocs[1].ncce, 0);
        assert_path_disjoint(&result);
    }

    #[test]
    fn test_duplicate_combinations_pruned() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        // {0,4}, {0,8}, {4,8} in some order; {4,0} etc. pruned
        assert_eq!(grid.nof_alloc_combinations(), 3);
    }

    #[test]
    fn test_user_without_table_fails() {
        let mut grid = grid();
        assert!(!grid.alloc_dci(AllocType::DlData, 0, None));
        assert_eq!(grid.nof_allocs(), 0);
    }

    #[test]
    fn test_pucch_sr_collision_skips_candidate() {
        let mut grid = grid();
        let mut u = user(0x46, [&[0, 1], &[], &[], &[]]);
        u.sr_blocked_cces = vec![0];
        assert!(grid.alloc_dci(AllocType::DlData, 0, Some(&u)));
        assert_eq!(grid.read_allocations().allocs[0].ncce, 1);

        // The SR check only applies to DL data
        let mut grid = self::grid();
        assert!(grid.alloc_dci(AllocType::UlData, 0, Some(&u)));
        assert_eq!(grid.read_allocations().allocs[0].ncce, 0);
    }

    #[test]
    fn test_set_cfi_range() {
        let mut grid = grid();
        assert!(!grid.set_cfi(0));
        assert!(!grid.set_cfi(4));
        assert_eq!(grid.cfi(), 1);
        assert!(grid.set_cfi(3));
        assert_eq!(grid.nof_cces(), 36);
    }

    #[test]
    fn test_set_cfi_rejects_when_nothing_fits() {
        let mut grid = PdcchGrid::new(tables([8, 12, 36]), 0);
        grid.new_tti(0, 2);
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        // Three DCIs at L=4 need 12 CCEs
        assert!(!grid.set_cfi(1));
        assert_eq!(grid.cfi(), 2);
        assert_eq!(grid.nof_alloc_combinations(), 1);
        assert_eq!(grid.read_allocations().allocs.len(), 3);
    }

    #[test]
    fn test_set_cfi_shrinks_to_fitting_combinations() {
        let mut grid = PdcchGrid::new(tables([8, 12, 36]), 0);
        grid.new_tti(0, 2);
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        // Combinations {0,4}, {0,8} and {4,8}
        assert_eq!(grid.nof_alloc_combinations(), 3);
        let committed = grid.read_allocations();
        assert_eq!(committed.total_mask.highest_set(), Some(7));

        // Only {0,4} fits in the 8 CCEs of CFI 1
        assert!(grid.set_cfi(1));
        assert_eq!(grid.cfi(), 1);
        assert_eq!(grid.nof_alloc_combinations(), 1);
        let result = grid.read_allocations();
        assert_eq!(result.allocs.len(), 2);
        assert_eq!(result.allocs[0].ncce, 0);
        assert_eq!(result.allocs[1].ncce, 4);
        assert_eq!(result.total_mask.len(), 8);
        assert_eq!(result.total_mask.count(), 8);

        // Allocation continues on the pruned tree
        assert!(!grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert!(grid.set_cfi(3));
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        assert_eq!(grid.read_allocations().allocs.len(), 3);
        assert_eq!(grid.read_allocations().total_mask.len(), 36);
    }

    #[test]
    fn test_new_tti_invalid_cfi_keeps_previous() {
        let mut grid = grid();
        grid.new_tti(5, 3);
        grid.new_tti(6, 9);
        assert_eq!(grid.cfi(), 3);
    }

    #[test]
    fn test_result_string() {
        let mut grid = grid();
        assert!(grid.alloc_dci(AllocType::DlBroadcast, 2, None));
        let dump = grid.result_string(true);
        assert!(dump.contains("3 combinations"));
        assert!(dump.contains("DL_BC"));
    }
}
