//! Python-facing data types.

use pyo3::prelude::*;

use crate::config::CellConfig;
use crate::grid::DciAlloc;
use crate::outcome::AllocType;
use crate::user::{GridUser, SchedUser, UlAlloc};

/// A committed DCI placement.
#[pyclass(name = "DciAllocation")]
#[derive(Clone, Debug)]
pub struct PyDciAllocation {
    #[pyo3(get)]
    pub rnti: u16,
    #[pyo3(get)]
    pub alloc_type: AllocType,
    #[pyo3(get)]
    pub aggr_idx: u32,
    #[pyo3(get)]
    pub ncce: u32,
    /// CCEs occupied by this DCI
    #[pyo3(get)]
    pub cces: Vec<usize>,
}

impl From<&DciAlloc> for PyDciAllocation {
    fn from(alloc: &DciAlloc) -> Self {
        Self {
            rnti: alloc.rnti,
            alloc_type: alloc.alloc_type,
            aggr_idx: alloc.aggr_idx,
            ncce: alloc.ncce,
            cces: alloc.current_mask.ones().collect(),
        }
    }
}

#[pymethods]
impl PyDciAllocation {
    fn __repr__(&self) -> String {
        format!(
            "DciAllocation(rnti=0x{:x}, type={}, aggr_idx={}, ncce={})",
            self.rnti, self.alloc_type, self.aggr_idx, self.ncce
        )
    }
}

/// A connected user with its UE-specific search space.
#[pyclass(name = "SchedUser")]
#[derive(Clone, Debug)]
pub struct PySchedUser {
    pub inner: SchedUser,
}

#[pymethods]
impl PySchedUser {
    #[new]
    #[pyo3(signature = (cell, rnti, dl_aggr_idx=0, ul_aggr_idx=0, sr_blocked_cces=None, pending_ul_retx=None))]
    fn new(
        cell: &CellConfig,
        rnti: u16,
        dl_aggr_idx: u32,
        ul_aggr_idx: u32,
        sr_blocked_cces: Option<Vec<u32>>,
        pending_ul_retx: Option<(u32, u32)>,
    ) -> Self {
        let mut inner = SchedUser::new(cell, rnti);
        inner.dl_aggr_idx = dl_aggr_idx;
        inner.ul_aggr_idx = ul_aggr_idx;
        inner.sr_blocked_cces = sr_blocked_cces.unwrap_or_default();
        inner.pending_ul_retx = pending_ul_retx.map(|(start, len)| UlAlloc::new(start, len));
        Self { inner }
    }

    #[getter]
    fn rnti(&self) -> u16 {
        self.inner.rnti()
    }

    #[getter]
    fn get_pending_ul_retx(&self) -> Option<(u32, u32)> {
        self.inner
            .pending_ul_retx
            .map(|alloc| (alloc.rb_start, alloc.length))
    }

    #[setter]
    fn set_pending_ul_retx(&mut self, value: Option<(u32, u32)>) {
        self.inner.pending_ul_retx = value.map(|(start, len)| UlAlloc::new(start, len));
    }

    fn __repr__(&self) -> String {
        format!(
            "SchedUser(rnti=0x{:x}, dl_aggr_idx={}, ul_aggr_idx={})",
            self.inner.rnti(),
            self.inner.dl_aggr_idx,
            self.inner.ul_aggr_idx
        )
    }
}
