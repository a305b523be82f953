//! Per-TTI resource grid: DL RBG mask, UL PRB mask and the PDCCH grid.
//!
//! Every allocation is a two-resource transaction. The data mask is checked
//! first, then the DCI is placed, and only when both succeed is the data mask
//! committed. A failed attempt leaves the grid exactly as it was.

use std::sync::Arc;

use crate::bitmask::{PrbMask, RbgMask};
use crate::config::{CellConfig, GridConfigError};
use crate::outcome::{AllocOutcome, AllocType};
use crate::search_space::{aggr_level, ControlTables, NOF_AGGR_LEVELS};
use crate::tti::{self, TTI_INVALID};
use crate::user::{GridUser, UlAlloc};
use crate::{log_allocs, log_checks};

use super::pdcch::PdcchGrid;

/// Half-open RBG range `[rbg_start, rbg_end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RbgRange {
    pub rbg_start: u32,
    pub rbg_end: u32,
}

impl RbgRange {
    pub fn new(rbg_start: u32, rbg_end: u32) -> Self {
        Self { rbg_start, rbg_end }
    }

    pub fn len(&self) -> u32 {
        self.rbg_end.saturating_sub(self.rbg_start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a broadcast, paging or RAR allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DlCtrlAlloc {
    pub outcome: AllocOutcome,
    pub rbg_range: RbgRange,
}

impl From<AllocOutcome> for DlCtrlAlloc {
    fn from(outcome: AllocOutcome) -> Self {
        Self {
            outcome,
            rbg_range: RbgRange::default(),
        }
    }
}

/// Resource grid of one cell for the TTI being scheduled.
#[derive(Clone, Debug)]
pub struct TtiGrid {
    cell: Arc<CellConfig>,
    verbosity: u8,
    nof_prb: u32,
    nof_rbgs: u32,
    si_n_rbg: u32,
    rar_n_rbg: u32,

    tti_rx: u32,
    tti_tx_dl: u32,
    tti_tx_ul: u32,
    sfn: u32,
    pdcch_alloc: PdcchGrid,

    avail_rbg: u32,
    dl_mask: RbgMask,
    ul_mask: PrbMask,
}

impl TtiGrid {
    /// Create a grid for `cell` using precomputed PDCCH tables.
    ///
    /// The tables must have been built for the cell's CCE counts.
    pub fn new(cell: Arc<CellConfig>, tables: Arc<ControlTables>) -> Result<Self, GridConfigError> {
        cell.validate()?;
        if tables.nof_cce_per_cfi() != cell.nof_cce_per_cfi {
            return Err(GridConfigError::TablesMismatch {
                cell: cell.nof_cce_per_cfi,
                tables: tables.nof_cce_per_cfi(),
            });
        }
        let verbosity = cell.verbosity;
        let nof_rbgs = cell.nof_rbgs();
        Ok(Self {
            verbosity,
            nof_prb: cell.nof_prb,
            nof_rbgs,
            si_n_rbg: cell.si_n_rbg(),
            rar_n_rbg: cell.rar_n_rbg(),
            tti_rx: TTI_INVALID,
            tti_tx_dl: 0,
            tti_tx_ul: 0,
            sfn: 0,
            pdcch_alloc: PdcchGrid::new(tables, verbosity),
            avail_rbg: nof_rbgs,
            dl_mask: RbgMask::new(nof_rbgs as usize),
            ul_mask: PrbMask::new(cell.nof_prb as usize),
            cell,
        })
    }

    /// Create a grid, computing the PDCCH tables from the cell configuration.
    pub fn from_config(cell: CellConfig) -> Result<Self, GridConfigError> {
        let tables = Arc::new(ControlTables::new(&cell)?);
        Self::new(Arc::new(cell), tables)
    }

    /// Start scheduling TTI `tti_rx`, discarding every allocation.
    pub fn new_tti(&mut self, tti_rx: u32, start_cfi: u32) {
        self.tti_rx = tti_rx;
        self.tti_tx_dl = tti::tti_tx_dl(tti_rx);
        self.tti_tx_ul = tti::tti_tx_ul(tti_rx);
        self.sfn = tti::sfn(self.tti_tx_dl);

        self.dl_mask.reset();
        self.ul_mask.reset();
        self.avail_rbg = self.nof_rbgs;

        self.pdcch_alloc.new_tti(tti_rx, start_cfi);
        log_allocs!(
            self.verbosity,
            "tti_rx={} tti_tx_dl={} tti_tx_ul={} sfn={} cfi={}",
            self.tti_rx,
            self.tti_tx_dl,
            self.tti_tx_ul,
            self.sfn,
            self.pdcch_alloc.cfi()
        );
    }

    /// Reserve RBGs and a DCI for broadcast, paging or RAR.
    ///
    /// The range starts at the first RBG not yet consumed and has a fixed size
    /// per category.
    pub fn alloc_dl_ctrl(&mut self, aggr_idx: u32, alloc_type: AllocType) -> DlCtrlAlloc {
        if !alloc_type.is_dl_ctrl() {
            log_checks!(
                self.verbosity,
                "{} is not a DL control allocation",
                alloc_type
            );
            return AllocOutcome::Error.into();
        }

        let rbg_start = self.nof_rbgs - self.avail_rbg;
        let n_rbg = if alloc_type == AllocType::DlRar {
            self.rar_n_rbg
        } else {
            self.si_n_rbg
        };
        let range = RbgRange::new(rbg_start, rbg_start + n_rbg);
        if range.rbg_end > self.nof_rbgs {
            log_checks!(
                self.verbosity,
                "no space for {} RBGs {}..{}",
                alloc_type,
                range.rbg_start,
                range.rbg_end
            );
            return AllocOutcome::DataCollision.into();
        }

        let mut ctrl_mask = RbgMask::new(self.nof_rbgs as usize);
        ctrl_mask.fill(range.rbg_start as usize, range.rbg_end as usize);
        DlCtrlAlloc {
            outcome: self.alloc_dl(aggr_idx, alloc_type, &ctrl_mask, None),
            rbg_range: range,
        }
    }

    /// Reserve `user_mask` RBGs and a DL DCI for `user`.
    ///
    /// `user_mask` must span exactly the cell's RBGs.
    pub fn alloc_dl_data(&mut self, user: &dyn GridUser, user_mask: &RbgMask) -> AllocOutcome {
        if user_mask.none() || user_mask.len() != self.nof_rbgs as usize {
            log_checks!(
                self.verbosity,
                "invalid RBG mask {} for rnti=0x{:x}",
                user_mask,
                user.rnti()
            );
            return AllocOutcome::Error;
        }
        let aggr_idx = user.aggr_idx(AllocType::DlData);
        self.alloc_dl(aggr_idx, AllocType::DlData, user_mask, Some(user))
    }

    fn valid_aggr_idx(&self, aggr_idx: u32, alloc_type: AllocType, rnti: u16) -> bool {
        if (aggr_idx as usize) < NOF_AGGR_LEVELS {
            return true;
        }
        log_checks!(
            self.verbosity,
            "invalid aggregation index {} for {} rnti=0x{:x}",
            aggr_idx,
            alloc_type,
            rnti
        );
        false
    }

    /// Common DL path: data check, DCI placement, then commit.
    fn alloc_dl(
        &mut self,
        aggr_idx: u32,
        alloc_type: AllocType,
        alloc_mask: &RbgMask,
        user: Option<&dyn GridUser>,
    ) -> AllocOutcome {
        let rnti = user.map_or(0, |u| u.rnti());
        if !self.valid_aggr_idx(aggr_idx, alloc_type, rnti) {
            return AllocOutcome::Error;
        }

        if self.dl_mask.intersects(alloc_mask) {
            log_checks!(
                self.verbosity,
                "RBG collision for {} rnti=0x{:x}: mask={} dl_mask={}",
                alloc_type,
                rnti,
                alloc_mask,
                self.dl_mask
            );
            return AllocOutcome::DataCollision;
        }

        if !self.pdcch_alloc.alloc_dci(alloc_type, aggr_idx, user) {
            log_checks!(
                self.verbosity,
                "no DCI space for {} rnti=0x{:x} (cfi={}, L={})",
                alloc_type,
                rnti,
                self.pdcch_alloc.cfi(),
                aggr_level(aggr_idx)
            );
            return AllocOutcome::ControlCollision;
        }

        self.dl_mask |= *alloc_mask;
        self.avail_rbg -= alloc_mask.count();
        log_allocs!(
            self.verbosity,
            "allocated {} rnti=0x{:x} rbgs={} avail_rbg={}",
            alloc_type,
            rnti,
            alloc_mask,
            self.avail_rbg
        );
        AllocOutcome::Success
    }

    /// Reserve UL PRBs and, if `needs_pdcch`, a UL DCI for `user`.
    ///
    /// Non-adaptive retransmissions and Msg3 reuse an existing grant and skip
    /// the DCI.
    pub fn alloc_ul_data(
        &mut self,
        user: &dyn GridUser,
        alloc: UlAlloc,
        needs_pdcch: bool,
    ) -> AllocOutcome {
        let rb_end = match alloc.rb_end() {
            Some(end) if alloc.length > 0 && end <= self.nof_prb => end,
            _ => {
                log_checks!(
                    self.verbosity,
                    "invalid UL allocation {:?} for rnti=0x{:x}",
                    alloc,
                    user.rnti()
                );
                return AllocOutcome::Error;
            }
        };
        let aggr_idx = user.aggr_idx(AllocType::UlData);
        if needs_pdcch && !self.valid_aggr_idx(aggr_idx, AllocType::UlData, user.rnti()) {
            return AllocOutcome::Error;
        }

        let mut new_mask = PrbMask::new(self.nof_prb as usize);
        new_mask.fill(alloc.rb_start as usize, rb_end as usize);
        if self.ul_mask.intersects(&new_mask) {
            log_checks!(
                self.verbosity,
                "PRB collision for rnti=0x{:x}: {}..{}",
                user.rnti(),
                alloc.rb_start,
                rb_end
            );
            return AllocOutcome::DataCollision;
        }

        if needs_pdcch
            && !self
                .pdcch_alloc
                .alloc_dci(AllocType::UlData, aggr_idx, Some(user))
        {
            log_checks!(
                self.verbosity,
                "no DCI space for UL grant rnti=0x{:x}",
                user.rnti()
            );
            return AllocOutcome::ControlCollision;
        }

        self.ul_mask |= new_mask;
        log_allocs!(
            self.verbosity,
            "allocated UL rnti=0x{:x} prbs={}..{}",
            user.rnti(),
            alloc.rb_start,
            rb_end
        );
        AllocOutcome::Success
    }

    pub fn cell(&self) -> &CellConfig {
        &self.cell
    }

    pub fn nof_rbgs(&self) -> u32 {
        self.nof_rbgs
    }

    pub fn avail_rbgs(&self) -> u32 {
        self.avail_rbg
    }

    pub fn dl_mask(&self) -> &RbgMask {
        &self.dl_mask
    }

    pub fn ul_mask(&self) -> &PrbMask {
        &self.ul_mask
    }

    pub fn cfi(&self) -> u32 {
        self.pdcch_alloc.cfi()
    }

    /// Change the CFI of the PDCCH grid.
    pub fn set_cfi(&mut self, cfi: u32) -> bool {
        self.pdcch_alloc.set_cfi(cfi)
    }

    pub fn pdcch_grid(&self) -> &PdcchGrid {
        &self.pdcch_alloc
    }

    pub fn tti_rx(&self) -> u32 {
        self.tti_rx
    }

    pub fn tti_tx_dl(&self) -> u32 {
        self.tti_tx_dl
    }

    pub fn tti_tx_ul(&self) -> u32 {
        self.tti_tx_ul
    }

    pub fn sfn(&self) -> u32 {
        self.sfn
    }

    pub fn sf_idx(&self) -> u32 {
        self.pdcch_alloc.sf_idx()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_space::{DciLocations, UserSearchSpace};
    use crate::user::SchedUser;

    /// 100 PRBs = 25 RBGs, 12 CCEs for CFI 1.
    fn cell_100() -> CellConfig {
        CellConfig {
            nof_prb: 100,
            nof_cce_per_cfi: [12, 50, 84],
            ..CellConfig::default()
        }
    }

    fn grid() -> TtiGrid {
        let mut grid = TtiGrid::from_config(cell_100()).unwrap();
        grid.new_tti(100, 1);
        grid
    }

    fn user(rnti: u16) -> SchedUser {
        SchedUser::new(&cell_100(), rnti)
    }

    /// User whose only DCI candidate is CCE 0 at L=1.
    fn user_at_cce0(rnti: u16) -> SchedUser {
        SchedUser::with_search_space(UserSearchSpace::uniform(
            rnti,
            DciLocations::from_candidates([&[0], &[], &[], &[]]),
        ))
    }

    fn rbgs(positions: &[usize]) -> RbgMask {
        RbgMask::from_bits(25, positions)
    }

    fn assert_rbg_accounting(grid: &TtiGrid) {
        assert_eq!(
            grid.avail_rbgs() + grid.dl_mask().count(),
            grid.nof_rbgs()
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = CellConfig {
            nof_prb: 42,
            ..CellConfig::default()
        };
        assert_eq!(
            TtiGrid::from_config(cfg).unwrap_err(),
            GridConfigError::UnsupportedBandwidth(42)
        );
    }

    #[test]
    fn test_tables_must_match_cell() {
        let other = Arc::new(ControlTables::new(&CellConfig::default()).unwrap());
        assert_eq!(
            TtiGrid::new(Arc::new(cell_100()), other).unwrap_err(),
            GridConfigError::TablesMismatch {
                cell: [12, 50, 84],
                tables: [3, 12, 20],
            }
        );

        let cell = Arc::new(cell_100());
        let tables = Arc::new(ControlTables::new(&cell).unwrap());
        assert!(TtiGrid::new(cell, tables).is_ok());
    }

    #[test]
    fn test_new_tti_derives_indices() {
        let mut grid = grid();
        assert_eq!(grid.tti_rx(), 100);
        assert_eq!(grid.tti_tx_dl(), 104);
        assert_eq!(grid.tti_tx_ul(), 108);
        assert_eq!(grid.sfn(), 10);
        assert_eq!(grid.sf_idx(), 4);

        grid.new_tti(10239, 1);
        assert_eq!(grid.tti_tx_dl(), 3);
        assert_eq!(grid.tti_tx_ul(), 7);
        assert_eq!(grid.sfn(), 0);
    }

    #[test]
    fn test_new_tti_resets_state() {
        let mut grid = grid();
        assert!(grid.alloc_dl_ctrl(2, AllocType::DlBroadcast).outcome.is_success());
        assert!(grid.alloc_dl_data(&user(0x46), &rbgs(&[3, 4])).is_success());
        assert!(grid
            .alloc_ul_data(&user(0x46), UlAlloc::new(0, 10), false)
            .is_success());

        grid.new_tti(101, 1);
        assert_eq!(grid.avail_rbgs(), grid.nof_rbgs());
        assert!(grid.dl_mask().none());
        assert!(grid.ul_mask().none());
        assert_eq!(grid.pdcch_grid().nof_allocs(), 0);
    }

    #[test]
    fn test_broadcast_then_user_scenario() {
        let mut grid = grid();
        assert_eq!(grid.nof_rbgs(), 25);
        assert_eq!(grid.pdcch_grid().nof_cces(), 12);

        let ctrl = grid.alloc_dl_ctrl(2, AllocType::DlBroadcast);
        assert_eq!(ctrl.outcome, AllocOutcome::Success);
        assert_eq!(ctrl.rbg_range, RbgRange::new(0, 1));
        assert!(grid.dl_mask().test(0));

        let user_a = user(0x46);
        assert_eq!(
            grid.alloc_dl_data(&user_a, &rbgs(&[3, 4])),
            AllocOutcome::Success
        );
        let after_a = *grid.dl_mask();
        assert!(after_a.test(3) && after_a.test(4));

        let user_b = user(0x47);
        assert_eq!(
            grid.alloc_dl_data(&user_b, &rbgs(&[4, 5])),
            AllocOutcome::DataCollision
        );
        assert_eq!(*grid.dl_mask(), after_a);
        assert!(!grid.dl_mask().test(5));
        assert_eq!(grid.pdcch_grid().nof_allocs(), 2);
        assert_rbg_accounting(&grid);
    }

    #[test]
    fn test_ctrl_ranges_are_consecutive() {
        let mut grid = grid();
        let bc = grid.alloc_dl_ctrl(2, AllocType::DlBroadcast);
        let rar = grid.alloc_dl_ctrl(2, AllocType::DlRar);
        assert!(bc.outcome.is_success());
        assert!(rar.outcome.is_success());
        assert_eq!(rar.rbg_range.rbg_start, bc.rbg_range.rbg_end);
        assert_eq!(grid.avail_rbgs(), 23);
    }

    #[test]
    fn test_ctrl_rejects_data_types() {
        let mut grid = grid();
        let result = grid.alloc_dl_ctrl(2, AllocType::DlData);
        assert_eq!(result.outcome, AllocOutcome::Error);
        assert!(grid.dl_mask().none());
    }

    #[test]
    fn test_ctrl_without_space() {
        let cfg = CellConfig {
            nof_prb: 6,
            ..CellConfig::default()
        };
        let mut grid = TtiGrid::from_config(cfg).unwrap();
        grid.new_tti(0, 3);
        // SI takes 4 of 6 RBGs, a second one does not fit
        assert!(grid.alloc_dl_ctrl(2, AllocType::DlBroadcast).outcome.is_success());
        let second = grid.alloc_dl_ctrl(2, AllocType::DlPaging);
        assert_eq!(second.outcome, AllocOutcome::DataCollision);
        assert_eq!(grid.avail_rbgs(), 2);
    }

    #[test]
    fn test_dci_collision_rolls_back_rbgs() {
        let mut grid = grid();
        assert!(grid
            .alloc_dl_data(&user_at_cce0(0x46), &rbgs(&[1, 2]))
            .is_success());
        let mask_before = *grid.dl_mask();

        // Free RBGs, but the only DCI candidate is taken
        let outcome = grid.alloc_dl_data(&user_at_cce0(0x47), &rbgs(&[10, 11]));
        assert_eq!(outcome, AllocOutcome::ControlCollision);
        assert_eq!(*grid.dl_mask(), mask_before);
        assert!(!grid.dl_mask().test(10));
        assert_rbg_accounting(&grid);
        assert_eq!(grid.pdcch_grid().nof_allocs(), 1);
    }

    #[test]
    fn test_invalid_dl_masks() {
        let mut grid = grid();
        assert_eq!(
            grid.alloc_dl_data(&user(0x46), &RbgMask::new(25)),
            AllocOutcome::Error
        );
        assert_eq!(
            grid.alloc_dl_data(&user(0x46), &RbgMask::from_bits(30, &[27])),
            AllocOutcome::Error
        );
        assert_eq!(grid.pdcch_grid().nof_allocs(), 0);
    }

    #[test]
    fn test_dl_mask_width_must_match_cell() {
        let mut grid = grid();
        let u = user(0x46);
        assert_eq!(
            grid.alloc_dl_data(&u, &RbgMask::from_bits(100, &[3])),
            AllocOutcome::Error
        );
        assert_eq!(
            grid.alloc_dl_data(&u, &RbgMask::from_bits(10, &[3])),
            AllocOutcome::Error
        );
        assert_eq!(grid.dl_mask().len(), 25);
        assert!(grid.dl_mask().none());

        assert!(grid.alloc_dl_data(&u, &rbgs(&[3])).is_success());
        assert_eq!(grid.dl_mask().len(), 25);
    }

    #[test]
    fn test_invalid_aggr_idx_is_error() {
        let cfg = CellConfig {
            verbosity: crate::logging::VERBOSITY_CHECKS,
            ..cell_100()
        };
        let mut grid = TtiGrid::from_config(cfg).unwrap();
        grid.new_tti(100, 1);

        let ctrl = grid.alloc_dl_ctrl(40, AllocType::DlBroadcast);
        assert_eq!(ctrl.outcome, AllocOutcome::Error);

        let mut u = user(0x46);
        u.dl_aggr_idx = 4;
        u.ul_aggr_idx = 33;
        assert_eq!(grid.alloc_dl_data(&u, &rbgs(&[3])), AllocOutcome::Error);
        assert_eq!(
            grid.alloc_ul_data(&u, UlAlloc::new(0, 4), true),
            AllocOutcome::Error
        );

        assert!(grid.dl_mask().none());
        assert!(grid.ul_mask().none());
        assert_eq!(grid.avail_rbgs(), grid.nof_rbgs());
        assert_eq!(grid.pdcch_grid().nof_allocs(), 0);
    }

    #[test]
    fn test_rbg_accounting_over_many_allocations() {
        let mut grid = grid();
        for (i, rnti) in (0x46..0x4a).enumerate() {
            let mask = rbgs(&[2 * i, 2 * i + 1]);
            let _ = grid.alloc_dl_data(&user(rnti), &mask);
            assert_rbg_accounting(&grid);
        }
        assert!(grid.avail_rbgs() < grid.nof_rbgs());
    }

    #[test]
    fn test_ul_collision() {
        let mut grid = grid();
        let u = user(0x46);
        assert!(grid.alloc_ul_data(&u, UlAlloc::new(0, 10), true).is_success());
        let before = *grid.ul_mask();
        assert_eq!(
            grid.alloc_ul_data(&user(0x47), UlAlloc::new(5, 10), true),
            AllocOutcome::DataCollision
        );
        assert_eq!(*grid.ul_mask(), before);
        assert_eq!(grid.ul_mask().count(), 10);
    }

    #[test]
    fn test_ul_without_pdcch_skips_dci() {
        let mut grid = grid();
        assert!(grid
            .alloc_ul_data(&user(0x46), UlAlloc::new(20, 4), false)
            .is_success());
        assert_eq!(grid.pdcch_grid().nof_allocs(), 0);
        assert_eq!(grid.ul_mask().count(), 4);
    }

    #[test]
    fn test_ul_dci_collision_rolls_back_prbs() {
        let mut grid = grid();
        assert!(grid
            .alloc_ul_data(&user_at_cce0(0x46), UlAlloc::new(0, 5), true)
            .is_success());
        assert_eq!(
            grid.alloc_ul_data(&user_at_cce0(0x47), UlAlloc::new(50, 5), true),
            AllocOutcome::ControlCollision
        );
        assert_eq!(grid.ul_mask().count(), 5);
        assert!(!grid.ul_mask().test(50));
    }

    #[test]
    fn test_ul_out_of_range() {
        let mut grid = grid();
        assert_eq!(
            grid.alloc_ul_data(&user(0x46), UlAlloc::new(95, 10), true),
            AllocOutcome::Error
        );
        assert_eq!(
            grid.alloc_ul_data(&user(0x46), UlAlloc::new(0, 0), true),
            AllocOutcome::Error
        );
        assert_eq!(
            grid.alloc_ul_data(&user(0x46), UlAlloc::new(u32::MAX, 1), false),
            AllocOutcome::Error
        );
        assert!(grid.ul_mask().none());
    }

    #[test]
    fn test_set_cfi_through_grid() {
        let mut grid = grid();
        assert!(grid.set_cfi(2));
        assert_eq!(grid.cfi(), 2);
        assert!(!grid.set_cfi(0));
        assert_eq!(grid.cfi(), 2);
    }
}
