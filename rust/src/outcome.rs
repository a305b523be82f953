//! Allocation outcome and allocation category types.

use pyo3::prelude::*;
use std::fmt;

/// Result of an allocation attempt against the TTI grid.
///
/// Every outcome other than `Success` leaves the grid exactly as it was before
/// the attempt.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocOutcome {
    Success,
    /// No free PDCCH candidate for the requested aggregation level.
    ControlCollision,
    /// The requested RBG/PRB mask overlaps an existing allocation.
    DataCollision,
    /// Invalid request, or the default value of an unset outcome.
    Error,
}

impl Default for AllocOutcome {
    fn default() -> Self {
        AllocOutcome::Error
    }
}

impl AllocOutcome {
    #[inline]
    pub fn is_success(self) -> bool {
        self == AllocOutcome::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocOutcome::Success => "success",
            AllocOutcome::ControlCollision => "control collision",
            AllocOutcome::DataCollision => "data collision",
            AllocOutcome::Error => "error",
        }
    }
}

#[pymethods]
impl AllocOutcome {
    fn __bool__(&self) -> bool {
        self.is_success()
    }

    fn __str__(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for AllocOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AllocOutcome> for bool {
    fn from(outcome: AllocOutcome) -> bool {
        outcome.is_success()
    }
}

/// Category of an allocation, which selects the PDCCH candidate table.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocType {
    /// System information broadcast (SI-RNTI).
    DlBroadcast,
    /// Paging (P-RNTI).
    DlPaging,
    /// Random access response (RA-RNTI).
    DlRar,
    /// Per-user downlink data.
    DlData,
    /// Per-user uplink grant.
    UlData,
}

impl AllocType {
    /// True for broadcast, paging and RAR allocations.
    pub fn is_dl_ctrl(self) -> bool {
        matches!(
            self,
            AllocType::DlBroadcast | AllocType::DlPaging | AllocType::DlRar
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllocType::DlBroadcast => "DL_BC",
            AllocType::DlPaging => "DL_PCCH",
            AllocType::DlRar => "DL_RAR",
            AllocType::DlData => "DL_DATA",
            AllocType::UlData => "UL_DATA",
        }
    }
}

impl fmt::Display for AllocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
