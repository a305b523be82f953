//! Per-TTI resource grid of an LTE eNodeB MAC scheduler.
//!
//! Each TTI the grid tracks which DL RBGs, UL PRBs and PDCCH CCEs are taken and
//! commits conflict-free allocations for broadcast, paging, random access and
//! per-user traffic. Scheduling policies drive it through [`DlTtiSched`] and
//! [`UlTtiSched`].

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

pub mod bitmask;
mod config;
pub mod grid;
pub mod logging;
mod models;
mod outcome;
pub mod search_space;
pub mod tti;
mod user;

pub use bitmask::{BoundedMask, PdcchMask, PrbMask, RbgMask};
pub use config::{CellConfig, GridConfigError};
pub use grid::{
    CtrlAlloc, CtrlKind, DciAlloc, DlCtrlAlloc, DlDataAlloc, DlTtiSched, PdcchAllocResult,
    PdcchGrid, RbgRange, TtiGrid, TtiSched, UlAllocKind, UlDataAlloc, UlTtiSched,
};
pub use models::{PyDciAllocation, PySchedUser};
pub use outcome::{AllocOutcome, AllocType};
pub use search_space::{ControlTables, DciLocations, UserSearchSpace};
pub use user::{GridUser, SchedUser, UlAlloc};

fn config_err(err: GridConfigError) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(err.to_string())
}

/// Resource grid of one cell (PyO3 wrapper around [`TtiSched`]).
#[pyclass(name = "TtiGrid")]
pub struct PyTtiGrid {
    sched: TtiSched,
}

#[pymethods]
impl PyTtiGrid {
    /// Create a grid for a cell.
    ///
    /// # Raises
    /// * ValueError if the cell configuration is invalid
    #[new]
    fn new(cell: CellConfig) -> PyResult<Self> {
        let grid = TtiGrid::from_config(cell).map_err(config_err)?;
        Ok(Self {
            sched: TtiSched::new(grid),
        })
    }

    /// Start scheduling a TTI, discarding every allocation of the previous one.
    #[pyo3(signature = (tti_rx, start_cfi=1))]
    fn new_tti(&mut self, tti_rx: u32, start_cfi: u32) -> PyResult<()> {
        self.sched.new_tti(tti_rx, start_cfi).map_err(config_err)
    }

    fn set_cfi(&mut self, cfi: u32) -> bool {
        self.sched.grid_mut().set_cfi(cfi)
    }

    fn alloc_bc(&mut self, aggr_idx: u32, sib_idx: u32) -> AllocOutcome {
        self.sched.alloc_bc(aggr_idx, sib_idx)
    }

    fn alloc_paging(&mut self, aggr_idx: u32, payload_len: u32) -> AllocOutcome {
        self.sched.alloc_paging(aggr_idx, payload_len)
    }

    fn alloc_rar(&mut self, aggr_idx: u32, ra_rnti: u16, nof_grants: u32) -> AllocOutcome {
        self.sched.alloc_rar(aggr_idx, ra_rnti, nof_grants)
    }

    /// Allocate the given RBG indices and a DL DCI for a user.
    #[pyo3(signature = (user, rbgs, pid=0))]
    fn alloc_dl_user(
        &mut self,
        user: PyRef<'_, PySchedUser>,
        rbgs: Vec<usize>,
        pid: u32,
    ) -> AllocOutcome {
        let mask = RbgMask::from_bits(self.sched.grid().nof_rbgs() as usize, &rbgs);
        if mask.count() as usize != rbgs.len() {
            // Out-of-range or repeated RBG indices
            return AllocOutcome::Error;
        }
        self.sched.alloc_dl_user(&user.inner, &mask, pid)
    }

    fn alloc_ul_user(
        &mut self,
        user: PyRef<'_, PySchedUser>,
        rb_start: u32,
        length: u32,
    ) -> AllocOutcome {
        self.sched
            .alloc_ul_user(&user.inner, UlAlloc::new(rb_start, length))
    }

    fn alloc_ul_msg3(
        &mut self,
        user: PyRef<'_, PySchedUser>,
        rb_start: u32,
        length: u32,
    ) -> AllocOutcome {
        self.sched
            .alloc_ul_msg3(&user.inner, UlAlloc::new(rb_start, length))
    }

    fn is_dl_alloc(&self, user: PyRef<'_, PySchedUser>) -> bool {
        self.sched.is_dl_alloc(&user.inner)
    }

    fn is_ul_alloc(&self, user: PyRef<'_, PySchedUser>) -> bool {
        self.sched.is_ul_alloc(&user.inner)
    }

    /// Allocated DL RBG indices.
    #[getter]
    fn dl_mask(&self) -> Vec<usize> {
        self.sched.dl_mask().ones().collect()
    }

    /// Allocated UL PRB indices.
    #[getter]
    fn ul_mask(&self) -> Vec<usize> {
        self.sched.ul_mask().ones().collect()
    }

    #[getter]
    fn avail_rbgs(&self) -> u32 {
        self.sched.grid().avail_rbgs()
    }

    #[getter]
    fn nof_rbgs(&self) -> u32 {
        self.sched.grid().nof_rbgs()
    }

    #[getter]
    fn cfi(&self) -> u32 {
        self.sched.grid().cfi()
    }

    #[getter]
    fn nof_ctrl_symbols(&self) -> u32 {
        self.sched.nof_ctrl_symbols()
    }

    #[getter]
    fn tti_tx_dl(&self) -> u32 {
        self.sched.tti_tx_dl()
    }

    #[getter]
    fn tti_tx_ul(&self) -> u32 {
        self.sched.tti_tx_ul()
    }

    #[getter]
    fn sfn(&self) -> u32 {
        self.sched.grid().sfn()
    }

    #[getter]
    fn nof_alloc_combinations(&self) -> usize {
        self.sched.grid().pdcch_grid().nof_alloc_combinations()
    }

    /// Committed DCI placements in allocation order.
    fn dci_allocations(&self) -> Vec<PyDciAllocation> {
        self.sched
            .grid()
            .pdcch_grid()
            .read_allocations()
            .allocs
            .iter()
            .map(PyDciAllocation::from)
            .collect()
    }

    fn __repr__(&self) -> String {
        let grid = self.sched.grid();
        format!(
            "TtiGrid(tti_rx={}, cfi={}, avail_rbgs={}/{}, dcis={})",
            grid.tti_rx(),
            grid.cfi(),
            grid.avail_rbgs(),
            grid.nof_rbgs(),
            grid.pdcch_grid().nof_allocs()
        )
    }
}

/// The enb_grid.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<AllocOutcome>()?;
    m.add_class::<AllocType>()?;
    m.add_class::<PyDciAllocation>()?;
    m.add_class::<PySchedUser>()?;

    // Config types
    m.add_class::<CellConfig>()?;

    // Grid
    m.add_class::<PyTtiGrid>()?;

    Ok(())
}

