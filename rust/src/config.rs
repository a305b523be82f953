//! Cell configuration consumed by the TTI grid.

use pyo3::prelude::*;
use thiserror::Error;

use crate::bitmask::MAX_MASK_BITS;

/// Number of supported control formats (CFI 1..=3).
pub const NOF_CFIS: usize = 3;

/// Errors raised while validating a cell configuration.
///
/// These are construction preconditions: a grid is never built from a
/// configuration that fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridConfigError {
    #[error("Unsupported cell bandwidth: {0} PRBs")]
    UnsupportedBandwidth(u32),
    #[error("CFI {cfi} has an invalid number of CCEs: {nof_cce}")]
    InvalidCceCount { cfi: u32, nof_cce: u32 },
    #[error("Mask of {0} bits exceeds the supported width")]
    MaskTooWide(u32),
    #[error("Invalid CFI: {0}")]
    InvalidCfi(u32),
    #[error("Invalid reserved PRB count for {what}: {nof_prb}")]
    InvalidReservedPrbs { what: &'static str, nof_prb: u32 },
    #[error("PDCCH tables built for CCE counts {tables:?}, cell has {cell:?}")]
    TablesMismatch {
        cell: [u32; NOF_CFIS],
        tables: [u32; NOF_CFIS],
    },
}

/// Static configuration of one radio cell.
///
/// `nof_cce_per_cfi` is the element-mapping descriptor of the radio hardware:
/// the number of CCEs available in the control region for CFI 1, 2 and 3.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellConfig {
    /// Cell bandwidth in PRBs (6, 15, 25, 50, 75 or 100)
    #[pyo3(get, set)]
    pub nof_prb: u32,
    /// Number of CCEs for each CFI, indexed by `cfi - 1`
    #[pyo3(get, set)]
    pub nof_cce_per_cfi: [u32; NOF_CFIS],
    /// PRBs reserved for each SIB / paging transmission
    #[pyo3(get, set)]
    pub si_n_prb: u32,
    /// PRBs reserved for each RAR transmission
    #[pyo3(get, set)]
    pub rar_n_prb: u32,
    /// Logging verbosity (0=silent, 1=allocations, 2=checks, 3=debug)
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            nof_prb: 25,
            nof_cce_per_cfi: [3, 12, 20],
            si_n_prb: 4,
            rar_n_prb: 3,
            verbosity: 0,
        }
    }
}

impl CellConfig {
    /// Check the configuration can back a TTI grid.
    pub fn validate(&self) -> Result<(), GridConfigError> {
        if !matches!(self.nof_prb, 6 | 15 | 25 | 50 | 75 | 100) {
            return Err(GridConfigError::UnsupportedBandwidth(self.nof_prb));
        }
        if self.nof_prb as usize > MAX_MASK_BITS {
            return Err(GridConfigError::MaskTooWide(self.nof_prb));
        }
        for (cfix, &nof_cce) in self.nof_cce_per_cfi.iter().enumerate() {
            if nof_cce == 0 || nof_cce as usize > MAX_MASK_BITS {
                return Err(GridConfigError::InvalidCceCount {
                    cfi: cfix as u32 + 1,
                    nof_cce,
                });
            }
        }
        if self.si_n_prb == 0 || self.si_n_prb > self.nof_prb {
            return Err(GridConfigError::InvalidReservedPrbs {
                what: "SI",
                nof_prb: self.si_n_prb,
            });
        }
        if self.rar_n_prb == 0 || self.rar_n_prb > self.nof_prb {
            return Err(GridConfigError::InvalidReservedPrbs {
                what: "RAR",
                nof_prb: self.rar_n_prb,
            });
        }
        Ok(())
    }

    /// RBG size P for resource allocation type 0.
    pub fn rbg_size(&self) -> u32 {
        match self.nof_prb {
            0..=10 => 1,
            11..=26 => 2,
            27..=63 => 3,
            _ => 4,
        }
    }

    /// Total number of downlink RBGs.
    pub fn nof_rbgs(&self) -> u32 {
        self.nof_prb.div_ceil(self.rbg_size())
    }

    /// RBGs reserved for one broadcast or paging allocation.
    pub fn si_n_rbg(&self) -> u32 {
        self.si_n_prb.div_ceil(self.rbg_size())
    }

    /// RBGs reserved for one RAR allocation.
    pub fn rar_n_rbg(&self) -> u32 {
        self.rar_n_prb.div_ceil(self.rbg_size())
    }

    /// Number of CCEs for a CFI in 1..=3.
    pub fn nof_cce(&self, cfi: u32) -> Option<u32> {
        if (1..=NOF_CFIS as u32).contains(&cfi) {
            Some(self.nof_cce_per_cfi[cfi as usize - 1])
        } else {
            None
        }
    }
}

#[pymethods]
impl CellConfig {
    #[new]
    #[pyo3(signature = (
        nof_prb=None,
        nof_cce_per_cfi=None,
        si_n_prb=None,
        rar_n_prb=None,
        verbosity=0
    ))]
    fn new(
        nof_prb: Option<u32>,
        nof_cce_per_cfi: Option<[u32; NOF_CFIS]>,
        si_n_prb: Option<u32>,
        rar_n_prb: Option<u32>,
        verbosity: u8,
    ) -> Self {
        let defaults = Self::default();
        Self {
            nof_prb: nof_prb.unwrap_or(defaults.nof_prb),
            nof_cce_per_cfi: nof_cce_per_cfi.unwrap_or(defaults.nof_cce_per_cfi),
            si_n_prb: si_n_prb.unwrap_or(defaults.si_n_prb),
            rar_n_prb: rar_n_prb.unwrap_or(defaults.rar_n_prb),
            verbosity,
        }
    }

    #[getter(nof_rbgs)]
    fn py_nof_rbgs(&self) -> u32 {
        self.nof_rbgs()
    }

    fn __repr__(&self) -> String {
        format!(
            "CellConfig(nof_prb={}, nof_cce_per_cfi={:?}, si_n_prb={}, rar_n_prb={}, verbosity={})",
            self.nof_prb,
            self.nof_cce_per_cfi,
            self.si_n_prb,
            self.rar_n_prb,
            crate::logging::level_name(self.verbosity)
        )
    }
}
