//! TTI counter arithmetic.

/// TTI counter wraps every 1024 frames of 10 subframes.
pub const NOF_TTIS: u32 = 10240;
/// Subframes between reception and the DL transmission it schedules.
pub const TX_DELAY: u32 = 4;
/// Subframes between reception and the UL transmission it schedules.
pub const UL_TX_DELAY: u32 = 2 * TX_DELAY;
/// Marks a grid that has not started a TTI yet.
pub const TTI_INVALID: u32 = NOF_TTIS + 1;

#[inline]
pub fn tti_add(tti: u32, delta: u32) -> u32 {
    (tti + delta) % NOF_TTIS
}

/// DL transmission TTI for a reception TTI.
#[inline]
pub fn tti_tx_dl(tti_rx: u32) -> u32 {
    tti_add(tti_rx, TX_DELAY)
}

/// UL transmission TTI for a reception TTI.
#[inline]
pub fn tti_tx_ul(tti_rx: u32) -> u32 {
    tti_add(tti_rx, UL_TX_DELAY)
}

#[inline]
pub fn sfn(tti: u32) -> u32 {
    tti / 10
}

#[inline]
pub fn sf_idx(tti: u32) -> u32 {
    tti % 10
}
