//! Scheduler-facing view of one TTI.
//!
//! [`DlTtiSched`] and [`UlTtiSched`] are the only entry points for DL/UL
//! scheduling policies. [`TtiSched`] implements both on top of a [`TtiGrid`] and
//! records which user got which resources, so that the DCIs can later be
//! matched with their placements.

use rustc_hash::FxHashSet;

use crate::bitmask::{PrbMask, RbgMask};
use crate::config::GridConfigError;
use crate::outcome::{AllocOutcome, AllocType};
use crate::user::{GridUser, UlAlloc};
use crate::{log_allocs, log_checks};

use super::pdcch::DciAlloc;
use super::tti_grid::{RbgRange, TtiGrid};

/// SI-RNTI used for system information broadcast.
pub const SIRNTI: u16 = 0xFFFF;
/// P-RNTI used for paging.
pub const PRNTI: u16 = 0xFFFE;

/// Interface used by DL scheduling policies.
pub trait DlTtiSched {
    /// Allocate `user_mask` RBGs and a DL DCI for `user` on HARQ process `pid`.
    fn alloc_dl_user(&mut self, user: &dyn GridUser, user_mask: &RbgMask, pid: u32)
        -> AllocOutcome;
    fn dl_mask(&self) -> &RbgMask;
    fn tti_tx_dl(&self) -> u32;
    /// Number of OFDM symbols of the control region.
    fn nof_ctrl_symbols(&self) -> u32;
    fn is_dl_alloc(&self, user: &dyn GridUser) -> bool;
}

/// Interface used by UL scheduling policies.
pub trait UlTtiSched {
    fn alloc_ul_user(&mut self, user: &dyn GridUser, alloc: UlAlloc) -> AllocOutcome;
    fn ul_mask(&self) -> &PrbMask;
    fn tti_tx_ul(&self) -> u32;
    fn is_ul_alloc(&self, user: &dyn GridUser) -> bool;
}

/// Kind of a UL grant, which decides whether it needs a DCI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UlAllocKind {
    NewTx,
    /// Retransmission with a different allocation
    AdaptRetx,
    /// Retransmission reusing the previous allocation
    NoAdaptRetx,
    /// Msg3, granted by the RAR
    Msg3,
}

impl UlAllocKind {
    pub fn needs_pdcch(self) -> bool {
        matches!(self, UlAllocKind::NewTx | UlAllocKind::AdaptRetx)
    }
}

/// Payload-specific part of a broadcast, paging or RAR allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtrlKind {
    Sib { sib_idx: u32 },
    Paging { payload_len: u32 },
    Rar { ra_rnti: u16, nof_grants: u32 },
}

impl CtrlKind {
    pub fn alloc_type(&self) -> AllocType {
        match self {
            CtrlKind::Sib { .. } => AllocType::DlBroadcast,
            CtrlKind::Paging { .. } => AllocType::DlPaging,
            CtrlKind::Rar { .. } => AllocType::DlRar,
        }
    }

    pub fn rnti(&self) -> u16 {
        match self {
            CtrlKind::Sib { .. } => SIRNTI,
            CtrlKind::Paging { .. } => PRNTI,
            CtrlKind::Rar { ra_rnti, .. } => *ra_rnti,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtrlAlloc {
    pub kind: CtrlKind,
    pub dci_idx: usize,
    pub rbg_range: RbgRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DlDataAlloc {
    pub rnti: u16,
    pub pid: u32,
    pub user_mask: RbgMask,
    pub dci_idx: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UlDataAlloc {
    pub rnti: u16,
    pub alloc: UlAlloc,
    pub kind: UlAllocKind,
    /// None when the grant has no DCI
    pub dci_idx: Option<usize>,
}

/// Allocations of one cell for one TTI.
#[derive(Clone, Debug)]
pub struct TtiSched {
    tti_alloc: TtiGrid,
    ctrl_allocs: Vec<CtrlAlloc>,
    dl_data_allocs: Vec<DlDataAlloc>,
    ul_data_allocs: Vec<UlDataAlloc>,
    dl_users: FxHashSet<u16>,
    ul_users: FxHashSet<u16>,
}

impl TtiSched {
    pub fn new(tti_alloc: TtiGrid) -> Self {
        Self {
            tti_alloc,
            ctrl_allocs: Vec::new(),
            dl_data_allocs: Vec::new(),
            ul_data_allocs: Vec::new(),
            dl_users: FxHashSet::default(),
            ul_users: FxHashSet::default(),
        }
    }

    /// Start TTI `tti_rx`, dropping every record and grid allocation.
    pub fn new_tti(&mut self, tti_rx: u32, start_cfi: u32) -> Result<(), GridConfigError> {
        if !(1..=3).contains(&start_cfi) {
            return Err(GridConfigError::InvalidCfi(start_cfi));
        }
        self.ctrl_allocs.clear();
        self.dl_data_allocs.clear();
        self.ul_data_allocs.clear();
        self.dl_users.clear();
        self.ul_users.clear();
        self.tti_alloc.new_tti(tti_rx, start_cfi);
        Ok(())
    }

    fn verbosity(&self) -> u8 {
        self.tti_alloc.cell().verbosity
    }

    fn last_dci_idx(&self) -> usize {
        self.tti_alloc.pdcch_grid().nof_allocs() - 1
    }

    fn alloc_ctrl(&mut self, aggr_idx: u32, kind: CtrlKind) -> AllocOutcome {
        let result = self.tti_alloc.alloc_dl_ctrl(aggr_idx, kind.alloc_type());
        if !result.outcome.is_success() {
            return result.outcome;
        }
        let dci_idx = self.last_dci_idx();
        self.ctrl_allocs.push(CtrlAlloc {
            kind,
            dci_idx,
            rbg_range: result.rbg_range,
        });
        AllocOutcome::Success
    }

    /// Allocate a SIB transmission.
    pub fn alloc_bc(&mut self, aggr_idx: u32, sib_idx: u32) -> AllocOutcome {
        self.alloc_ctrl(aggr_idx, CtrlKind::Sib { sib_idx })
    }

    /// Allocate a paging transmission of `payload_len` bytes.
    pub fn alloc_paging(&mut self, aggr_idx: u32, payload_len: u32) -> AllocOutcome {
        self.alloc_ctrl(aggr_idx, CtrlKind::Paging { payload_len })
    }

    /// Allocate a RAR carrying `nof_grants` Msg3 grants.
    pub fn alloc_rar(&mut self, aggr_idx: u32, ra_rnti: u16, nof_grants: u32) -> AllocOutcome {
        if nof_grants == 0 {
            log_checks!(
                self.verbosity(),
                "RAR for ra_rnti=0x{:x} without grants",
                ra_rnti
            );
            return AllocOutcome::Error;
        }
        self.alloc_ctrl(
            aggr_idx,
            CtrlKind::Rar {
                ra_rnti,
                nof_grants,
            },
        )
    }

    /// Allocate the PRBs of a Msg3 granted by a RAR.
    pub fn alloc_ul_msg3(&mut self, user: &dyn GridUser, alloc: UlAlloc) -> AllocOutcome {
        self.alloc_ul(user, alloc, UlAllocKind::Msg3)
    }

    fn alloc_ul(&mut self, user: &dyn GridUser, alloc: UlAlloc, kind: UlAllocKind) -> AllocOutcome {
        if self.is_ul_alloc(user) {
            log_checks!(
                self.verbosity(),
                "attempt to allocate UL twice for rnti=0x{:x}",
                user.rnti()
            );
            return AllocOutcome::Error;
        }

        let needs_pdcch = kind.needs_pdcch();
        let outcome = self.tti_alloc.alloc_ul_data(user, alloc, needs_pdcch);
        if !outcome.is_success() {
            return outcome;
        }

        let dci_idx = needs_pdcch.then(|| self.last_dci_idx());
        self.ul_data_allocs.push(UlDataAlloc {
            rnti: user.rnti(),
            alloc,
            kind,
            dci_idx,
        });
        self.ul_users.insert(user.rnti());
        log_allocs!(
            self.verbosity(),
            "UL {:?} rnti=0x{:x} dci_idx={:?}",
            kind,
            user.rnti(),
            dci_idx
        );
        AllocOutcome::Success
    }

    pub fn ctrl_allocs(&self) -> &[CtrlAlloc] {
        &self.ctrl_allocs
    }

    pub fn dl_data_allocs(&self) -> &[DlDataAlloc] {
        &self.dl_data_allocs
    }

    pub fn ul_data_allocs(&self) -> &[UlDataAlloc] {
        &self.ul_data_allocs
    }

    /// Committed placement of the DCI with index `dci_idx`.
    pub fn dci_for(&self, dci_idx: usize) -> Option<DciAlloc> {
        self.tti_alloc
            .pdcch_grid()
            .read_allocations()
            .allocs
            .get(dci_idx)
            .copied()
    }

    pub fn grid(&self) -> &TtiGrid {
        &self.tti_alloc
    }

    pub fn grid_mut(&mut self) -> &mut TtiGrid {
        &mut self.tti_alloc
    }
}

impl DlTtiSched for TtiSched {
    fn alloc_dl_user(
        &mut self,
        user: &dyn GridUser,
        user_mask: &RbgMask,
        pid: u32,
    ) -> AllocOutcome {
        if self.is_dl_alloc(user) {
            log_checks!(
                self.verbosity(),
                "attempt to assign multiple HARQ pids to rnti=0x{:x}",
                user.rnti()
            );
            return AllocOutcome::Error;
        }

        let outcome = self.tti_alloc.alloc_dl_data(user, user_mask);
        if !outcome.is_success() {
            return outcome;
        }

        let dci_idx = self.last_dci_idx();
        self.dl_data_allocs.push(DlDataAlloc {
            rnti: user.rnti(),
            pid,
            user_mask: *user_mask,
            dci_idx,
        });
        self.dl_users.insert(user.rnti());
        AllocOutcome::Success
    }

    fn dl_mask(&self) -> &RbgMask {
        self.tti_alloc.dl_mask()
    }

    fn tti_tx_dl(&self) -> u32 {
        self.tti_alloc.tti_tx_dl()
    }

    fn nof_ctrl_symbols(&self) -> u32 {
        let extra = if self.tti_alloc.cell().nof_prb <= 10 { 1 } else { 0 };
        self.tti_alloc.cfi() + extra
    }

    fn is_dl_alloc(&self, user: &dyn GridUser) -> bool {
        self.dl_users.contains(&user.rnti())
    }
}

impl UlTtiSched for TtiSched {
    /// Classifies the grant from the user's pending retransmission.
    fn alloc_ul_user(&mut self, user: &dyn GridUser, alloc: UlAlloc) -> AllocOutcome {
        let kind = match user.pending_ul_retx(self.tti_alloc.tti_tx_ul()) {
            Some(prev) if prev == alloc => UlAllocKind::NoAdaptRetx,
            Some(_) => UlAllocKind::AdaptRetx,
            None => UlAllocKind::NewTx,
        };
        self.alloc_ul(user, alloc, kind)
    }

    fn ul_mask(&self) -> &PrbMask {
        self.tti_alloc.ul_mask()
    }

    fn tti_tx_ul(&self) -> u32 {
        self.tti_alloc.tti_tx_ul()
    }

    fn is_ul_alloc(&self, user: &dyn GridUser) -> bool {
        self.ul_users.contains(&user.rnti())
    }
}
