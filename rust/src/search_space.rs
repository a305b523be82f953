//! PDCCH candidate location tables (search spaces).
//!
//! Tables are computed once, when a cell or a user is configured, and are
//! read-only while scheduling.

use crate::config::{CellConfig, GridConfigError, NOF_CFIS};

/// Number of aggregation levels (L = 1, 2, 4, 8).
pub const NOF_AGGR_LEVELS: usize = 4;
/// Maximum number of candidates per aggregation level.
pub const MAX_LOCS_PER_LEVEL: usize = 6;
/// Subframes per radio frame.
pub const NOF_SF: usize = 10;

/// Candidates per aggregation index in the UE-specific search space.
const UE_NOF_CANDIDATES: [usize; NOF_AGGR_LEVELS] = [6, 6, 2, 2];
/// Only the first 16 CCEs belong to the common search space.
const COMMON_SPACE_CCES: u32 = 16;
const YK_A: u64 = 39827;
const YK_D: u64 = 65537;

/// Number of CCEs spanned by aggregation index `aggr_idx`.
#[inline]
pub fn aggr_level(aggr_idx: u32) -> u32 {
    1 << aggr_idx
}

/// Candidate starting CCEs, grouped by aggregation index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DciLocations {
    cce_start: [[u32; MAX_LOCS_PER_LEVEL]; NOF_AGGR_LEVELS],
    nof_loc: [usize; NOF_AGGR_LEVELS],
}

impl DciLocations {
    /// Build a table from explicit candidate lists, one per aggregation index.
    ///
    /// Entries beyond [`MAX_LOCS_PER_LEVEL`] are dropped.
    pub fn from_candidates(per_level: [&[u32]; NOF_AGGR_LEVELS]) -> Self {
        let mut table = Self::default();
        for (aggr_idx, cands) in per_level.iter().enumerate() {
            for &ncce in cands.iter() {
                table.push(aggr_idx, ncce);
            }
        }
        table
    }

    /// Common search space for a control region of `nof_cce` CCEs.
    pub fn common(nof_cce: u32) -> Self {
        let mut table = Self::default();
        let space = nof_cce.min(COMMON_SPACE_CCES);
        for aggr_idx in (2..NOF_AGGR_LEVELS).rev() {
            let l = aggr_level(aggr_idx as u32);
            for i in 0..space / l {
                table.push(aggr_idx, l * i);
            }
        }
        table
    }

    /// UE-specific search space of `rnti` in subframe `sf_idx`.
    pub fn ue_specific(nof_cce: u32, sf_idx: u32, rnti: u16) -> Self {
        let mut yk = rnti as u64;
        for _ in 0..=sf_idx {
            yk = (YK_A * yk) % YK_D;
        }

        let mut table = Self::default();
        for aggr_idx in (0..NOF_AGGR_LEVELS).rev() {
            let l = aggr_level(aggr_idx as u32);
            if nof_cce < l {
                continue;
            }
            let nof_blocks = (nof_cce / l) as u64;
            for m in 0..UE_NOF_CANDIDATES[aggr_idx] as u64 {
                let ncce = l * ((yk + m) % nof_blocks) as u32;
                if ncce + l <= nof_cce {
                    table.push(aggr_idx, ncce);
                }
            }
        }
        table
    }

    fn push(&mut self, aggr_idx: usize, ncce: u32) -> bool {
        let n = self.nof_loc[aggr_idx];
        if n >= MAX_LOCS_PER_LEVEL {
            return false;
        }
        self.cce_start[aggr_idx][n] = ncce;
        self.nof_loc[aggr_idx] += 1;
        true
    }

    /// Candidate starting CCEs for `aggr_idx`, in search order.
    pub fn candidates(&self, aggr_idx: u32) -> &[u32] {
        let idx = aggr_idx as usize;
        if idx >= NOF_AGGR_LEVELS {
            return &[];
        }
        &self.cce_start[idx][..self.nof_loc[idx]]
    }

    pub fn nof_candidates(&self, aggr_idx: u32) -> usize {
        self.candidates(aggr_idx).len()
    }
}

/// Candidate tables for the cell-wide categories (broadcast, paging, RAR).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlTables {
    common: [DciLocations; NOF_CFIS],
    rar: [[DciLocations; NOF_SF]; NOF_CFIS],
    nof_cce: [u32; NOF_CFIS],
}

impl ControlTables {
    /// Compute the common and RAR tables for every CFI of the cell.
    pub fn new(cell: &CellConfig) -> Result<Self, GridConfigError> {
        cell.validate()?;
        let mut common = [DciLocations::default(); NOF_CFIS];
        let mut rar = [[DciLocations::default(); NOF_SF]; NOF_CFIS];
        for cfix in 0..NOF_CFIS {
            let nof_cce = cell.nof_cce_per_cfi[cfix];
            common[cfix] = DciLocations::common(nof_cce);
            // RA-RNTI DCIs are sent in the common search space in every subframe
            for sf_table in rar[cfix].iter_mut() {
                *sf_table = DciLocations::common(nof_cce);
            }
        }
        Ok(Self {
            common,
            rar,
            nof_cce: cell.nof_cce_per_cfi,
        })
    }

    /// Build tables from explicitly supplied locations.
    pub fn from_tables(
        nof_cce: [u32; NOF_CFIS],
        common: [DciLocations; NOF_CFIS],
        rar: [[DciLocations; NOF_SF]; NOF_CFIS],
    ) -> Result<Self, GridConfigError> {
        for (cfix, &n) in nof_cce.iter().enumerate() {
            if n == 0 || n as usize > crate::bitmask::MAX_MASK_BITS {
                return Err(GridConfigError::InvalidCceCount {
                    cfi: cfix as u32 + 1,
                    nof_cce: n,
                });
            }
        }
        Ok(Self {
            common,
            rar,
            nof_cce,
        })
    }

    /// CCE counts the tables were built for, indexed by CFI - 1.
    pub fn nof_cce_per_cfi(&self) -> [u32; NOF_CFIS] {
        self.nof_cce
    }

    /// CCE count for `cfi` in 1..=3.
    pub fn nof_cce(&self, cfi: u32) -> Option<u32> {
        cfi_index(cfi).map(|cfix| self.nof_cce[cfix])
    }

    pub fn common(&self, cfi: u32) -> Option<&DciLocations> {
        cfi_index(cfi).map(|cfix| &self.common[cfix])
    }

    pub fn rar(&self, cfi: u32, sf_idx: u32) -> Option<&DciLocations> {
        let cfix = cfi_index(cfi)?;
        self.rar[cfix].get(sf_idx as usize)
    }
}

/// UE-specific search space of one RNTI for every CFI and subframe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSearchSpace {
    rnti: u16,
    locations: [[DciLocations; NOF_SF]; NOF_CFIS],
}

impl UserSearchSpace {
    pub fn new(cell: &CellConfig, rnti: u16) -> Self {
        let mut locations = [[DciLocations::default(); NOF_SF]; NOF_CFIS];
        for (cfix, per_sf) in locations.iter_mut().enumerate() {
            let nof_cce = cell.nof_cce_per_cfi[cfix];
            for (sf_idx, table) in per_sf.iter_mut().enumerate() {
                *table = DciLocations::ue_specific(nof_cce, sf_idx as u32, rnti);
            }
        }
        Self { rnti, locations }
    }

    /// Use the same table for every CFI and subframe.
    pub fn uniform(rnti: u16, table: DciLocations) -> Self {
        Self {
            rnti,
            locations: [[table; NOF_SF]; NOF_CFIS],
        }
    }

    pub fn rnti(&self) -> u16 {
        self.rnti
    }

    pub fn get(&self, cfi: u32, sf_idx: u32) -> Option<&DciLocations> {
        let cfix = cfi_index(cfi)?;
        self.locations[cfix].get(sf_idx as usize)
    }
}

fn cfi_index(cfi: u32) -> Option<usize> {
    if (1..=NOF_CFIS as u32).contains(&cfi) {
        Some(cfi as usize - 1)
    } else {
        None
    }
}
