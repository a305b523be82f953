//! Connected users as seen by the TTI grid.
//!
//! The grid only reads from users: their search space, the aggregation level
//! their DCIs need and whether an uplink retransmission is pending.

use crate::config::CellConfig;
use crate::outcome::AllocType;
use crate::search_space::{DciLocations, UserSearchSpace};

/// Contiguous uplink PRB allocation `[rb_start, rb_start + length)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UlAlloc {
    pub rb_start: u32,
    pub length: u32,
}

impl UlAlloc {
    pub fn new(rb_start: u32, length: u32) -> Self {
        Self { rb_start, length }
    }

    /// One past the last PRB, or None if the range overflows `u32`.
    #[inline]
    pub fn rb_end(&self) -> Option<u32> {
        self.rb_start.checked_add(self.length)
    }
}

/// A user the grid can allocate resources for.
pub trait GridUser {
    fn rnti(&self) -> u16;

    /// DCI candidate table for the given CFI and subframe index.
    fn dci_locations(&self, cfi: u32, sf_idx: u32) -> Option<&DciLocations>;

    /// Aggregation index (0..=3) needed for a DCI of the given category.
    fn aggr_idx(&self, alloc_type: AllocType) -> u32;

    /// Whether placing a DL DCI at `ncce` would collide with this user's
    /// PUCCH scheduling-request resources in `tti_tx_dl`.
    fn pucch_sr_collision(&self, _tti_tx_dl: u32, _ncce: u32) -> bool {
        false
    }

    /// Allocation of a pending UL retransmission for `tti_tx_ul`, if any.
    fn pending_ul_retx(&self, _tti_tx_ul: u32) -> Option<UlAlloc> {
        None
    }
}

/// Plain user record backed by a precomputed [`UserSearchSpace`].
#[derive(Clone, Debug)]
pub struct SchedUser {
    search_space: UserSearchSpace,
    pub dl_aggr_idx: u32,
    pub ul_aggr_idx: u32,
    /// CCE starts that collide with this user's PUCCH SR resources
    pub sr_blocked_cces: Vec<u32>,
    pub pending_ul_retx: Option<UlAlloc>,
}

impl SchedUser {
    /// Create a user with its search space derived from the cell configuration.
    pub fn new(cell: &CellConfig, rnti: u16) -> Self {
        Self::with_search_space(UserSearchSpace::new(cell, rnti))
    }

    pub fn with_search_space(search_space: UserSearchSpace) -> Self {
        Self {
            search_space,
            dl_aggr_idx: 0,
            ul_aggr_idx: 0,
            sr_blocked_cces: Vec::new(),
            pending_ul_retx: None,
        }
    }
}

impl GridUser for SchedUser {
    fn rnti(&self) -> u16 {
        self.search_space.rnti()
    }

    fn dci_locations(&self, cfi: u32, sf_idx: u32) -> Option<&DciLocations> {
        self.search_space.get(cfi, sf_idx)
    }

    fn aggr_idx(&self, alloc_type: AllocType) -> u32 {
        match alloc_type {
            AllocType::UlData => self.ul_aggr_idx,
            _ => self.dl_aggr_idx,
        }
    }

    fn pucch_sr_collision(&self, _tti_tx_dl: u32, ncce: u32) -> bool {
        self.sr_blocked_cces.contains(&ncce)
    }

    fn pending_ul_retx(&self, _tti_tx_ul: u32) -> Option<UlAlloc> {
        self.pending_ul_retx
    }
}
