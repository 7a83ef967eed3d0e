//! Adaptive modulation and coding tables.
//!
//! Maps channel-quality reports to MCS indices through spectral efficiency.

/// Number of usable MCS indices (0..=28); also the number of fill buckets.
pub const MCS_COUNT: usize = 29;

/// Number of CQI values (0..=15).
pub const CQI_COUNT: usize = 16;

/// Target bit error rate used when converting SINR to spectral efficiency.
const TARGET_BER: f64 = 0.00005;

/// Spectral efficiency (bits per resource element) per MCS index.
pub const SPECTRAL_EFFICIENCY_FOR_MCS: [f64; MCS_COUNT] = [
    0.15, 0.19, 0.23, 0.31, 0.38, 0.49, 0.6, 0.74, 0.88, 1.03, 1.18, 1.33, 1.48, 1.7, 1.91, 2.16,
    2.41, 2.57, 2.73, 3.03, 3.32, 3.61, 3.9, 4.21, 4.52, 4.82, 5.12, 5.33, 5.55,
];

/// Spectral efficiency per CQI value. CQI 0 means out of range.
pub const SPECTRAL_EFFICIENCY_FOR_CQI: [f64; CQI_COUNT] = [
    0.0, 0.15, 0.23, 0.38, 0.6, 0.88, 1.18, 1.48, 1.91, 2.41, 2.73, 3.32, 3.9, 4.52, 5.12, 5.55,
];

/// Highest MCS whose spectral efficiency does not exceed `efficiency`.
fn mcs_for_efficiency(efficiency: f64) -> u8 {
    let mut mcs = 0;
    while mcs + 1 < MCS_COUNT && SPECTRAL_EFFICIENCY_FOR_MCS[mcs + 1] <= efficiency {
        mcs += 1;
    }
    mcs as u8
}

/// MCS for a wideband downlink CQI. Values above the table saturate.
pub fn mcs_from_cqi(cqi: u8) -> u8 {
    let cqi = (cqi as usize).min(CQI_COUNT - 1);
    mcs_for_efficiency(SPECTRAL_EFFICIENCY_FOR_CQI[cqi])
}

/// Achievable spectral efficiency for a linear SINR at the target BER.
pub fn spectral_efficiency_from_sinr(sinr_linear: f64) -> f64 {
    let gap = -(5.0 * TARGET_BER).ln() / 1.5;
    (1.0 + sinr_linear.max(0.0) / gap).log2()
}

/// MCS for a linear wideband SINR.
pub fn mcs_from_sinr(sinr_linear: f64) -> u8 {
    mcs_for_efficiency(spectral_efficiency_from_sinr(sinr_linear))
}

/// Mean of the linear per-chunk SINR samples; `None` when no finite sample exists.
pub fn wideband_sinr(samples: &[f64]) -> Option<f64> {
    let (sum, count) = samples
        .iter()
        .filter(|s| s.is_finite())
        .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
