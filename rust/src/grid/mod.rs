//! Per-TTI resource grid for the MAC scheduler.
//!
//! [`PdcchGrid`] places DCIs on the control channel, [`TtiGrid`] owns the DL/UL
//! data masks and commits data + DCI allocations together, and [`TtiSched`]
//! exposes both to scheduling policies through [`DlTtiSched`] and [`UlTtiSched`].

mod pdcch;
mod tti_grid;
mod tti_sched;

pub use pdcch::{DciAlloc, PdcchAllocResult, PdcchGrid};
pub use tti_grid::{DlCtrlAlloc, RbgRange, TtiGrid};
pub use tti_sched::{
    CtrlAlloc, CtrlKind, DlDataAlloc, DlTtiSched, TtiSched, UlAllocKind, UlDataAlloc, UlTtiSched,
    PRNTI, SIRNTI,
};
