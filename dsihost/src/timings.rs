//! Timing computation: pure functions, no hardware access.
//!
//! Everything here is exact integer arithmetic: the escape clock
//! divider, the protocol timeout tick conversion, and the transcoder
//! timing register encodation. The sequencer consumes the results
//! verbatim, so the off-by-one register bias and the rounding directions
//! are all load-bearing.

use alloc::vec::Vec;

use crate::config::{ConfigError, DualLink, LinkConfig, OperationMode, PixelFormat, VideoModeFormat, VideoTiming};
use crate::regs;

const fn div_round_up(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

const fn div_round_closest(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

/// Escape clock divider for a link.
///
/// The AFE clock is the byte clock seen by the analog front end:
/// `round_closest(bitrate_khz * bpp / lane_count)`. The divider brings
/// it at or below the maximum escape clock, rounding up, and is masked
/// to the 9-bit register field.
pub fn escape_clock_divisor(bitrate_khz: u32, bits_per_pixel: u32, lane_count: u8) -> u32 {
    let afe_clk_khz = div_round_closest(
        bitrate_khz as u64 * bits_per_pixel as u64,
        lane_count.max(1) as u64,
    );
    let div = div_round_up(afe_clk_khz, regs::DSI_MAX_ESC_CLK_KHZ as u64);
    (div as u32) & regs::ESC_CLK_DIV_MASK
}

/// Convert the HS-TX and LP-RX timeout requests from nanoseconds into
/// escape-clock tick counts.
///
/// Derivation: `BYTE_CLK_COUNT = TIME_NS / (8 * UI)` with
/// `UI(ns) = 10^6 / bitrate_khz`, so
/// `ticks = t_ns * 8 * 10^6 / (esc_clk_ns * bitrate_khz * 10^3)`,
/// rounded up. A nonzero request never collapses to zero ticks: the
/// hardware would treat that as an immediate timeout.
pub fn protocol_timeouts(
    hs_tx_timeout_ns: u32,
    lp_rx_timeout_ns: u32,
    escape_clk_ns: u32,
    bitrate_khz: u32,
) -> (u32, u32) {
    let divisor = escape_clk_ns as u64 * bitrate_khz as u64 * 1_000;

    let ticks = |t_ns: u32| -> u32 {
        if t_ns == 0 || divisor == 0 {
            return 0;
        }
        div_round_up(t_ns as u64 * 8_000_000, divisor).max(1) as u32
    };

    (ticks(hs_tx_timeout_ns), ticks(lp_rx_timeout_ns))
}

/// Encoded transcoder timing register values for one mode-set. Computed
/// once per mode-set and consumed immediately; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscoderTimingValues {
    pub htotal: u32,
    /// Programmed in video mode only
    pub hsync: Option<u32>,
    pub vtotal: u32,
    pub vsync: u32,
    pub vsync_shift: u32,
}

/// Derive the transcoder timing register values from the link
/// configuration and the requested mode.
///
/// Dual-link halves the horizontal active and total (each port drives
/// half of every scan line); a front-back split adds the pixel overlap
/// back to the active width. Every total/sync field is encoded as the
/// required pixel count minus one.
///
/// Validation failures are returned alongside the values, which are
/// still fully computed; conformance to the panel's limits is the
/// caller's responsibility, not this layer's.
pub fn transcoder_timings(
    cfg: &LinkConfig,
    mode: &VideoTiming,
) -> (TranscoderTimingValues, Vec<ConfigError>) {
    let mut errors = Vec::new();

    let mut hactive = mode.hactive;
    let mut htotal = mode.htotal;
    let mut hsync_start = mode.hsync_start;
    let mut hsync_end = mode.hsync_end;
    let hsync_size = mode.hsync_size();
    let hback_porch = mode.hback_porch();

    // the shift between hsync and the vsync event, from the undivided mode
    let vsync_shift = mode.hsync_start.wrapping_sub(mode.htotal / 2);

    if cfg.dual_link.is_dual() {
        hactive /= 2;
        if let DualLink::FrontBack { pixel_overlap } = cfg.dual_link {
            hactive += pixel_overlap;
        }
        htotal /= 2;
    }

    // hardware floor of 256 pixels, checked against the undivided mode
    if mode.hactive < 256 {
        errors.push(ConfigError::HactiveTooNarrow(mode.hactive));
    }

    if cfg.pixel_format == PixelFormat::Rgb666Loose && hactive % 4 != 0 {
        errors.push(ConfigError::HactiveNotMultipleOf4(hactive));
    }

    let htotal_reg = u32::from(hactive).wrapping_sub(1)
        | (u32::from(htotal).wrapping_sub(1) << regs::TRANS_TIMING_SHIFT);

    let mut hsync_reg = None;
    if cfg.operation_mode == OperationMode::VideoStream {
        match cfg.video_mode_format {
            VideoModeFormat::SyncPulse => {
                if hsync_size < 16 {
                    errors.push(ConfigError::HsyncTooNarrow(hsync_size));
                }
            }
            VideoModeFormat::SyncEvent => {
                if hsync_size < mode.hsync_start {
                    errors.push(ConfigError::HsyncSizeBelowStart {
                        size: hsync_size,
                        start: mode.hsync_start,
                    });
                }
            }
            // reported when the transcoder function is configured
            VideoModeFormat::Burst => {}
        }

        if hback_porch < 16 {
            errors.push(ConfigError::HbackPorchTooNarrow(hback_porch));
        }

        if cfg.dual_link.is_dual() {
            hsync_start /= 2;
            hsync_end /= 2;
        }

        hsync_reg = Some(
            u32::from(hsync_start).wrapping_sub(1)
                | (u32::from(hsync_end).wrapping_sub(1) << regs::TRANS_TIMING_SHIFT),
        );
    }

    let vtotal_reg = u32::from(mode.vactive).wrapping_sub(1)
        | (u32::from(mode.vtotal).wrapping_sub(1) << regs::TRANS_TIMING_SHIFT);

    if mode.vsync_end < mode.vsync_start || mode.vsync_end > mode.vtotal {
        errors.push(ConfigError::VsyncEndOutOfRange {
            start: mode.vsync_start,
            end: mode.vsync_end,
            total: mode.vtotal,
        });
    }
    if mode.vsync_start < mode.vactive {
        errors.push(ConfigError::VsyncStartBeforeActive {
            start: mode.vsync_start,
            active: mode.vactive,
        });
    }

    let vsync_reg = u32::from(mode.vsync_start).wrapping_sub(1)
        | (u32::from(mode.vsync_end).wrapping_sub(1) << regs::TRANS_TIMING_SHIFT);

    // a shift distance, not a pixel count: no minus-one bias; it sits in
    // the upper field like the paired timing registers
    let vsync_shift_reg = u32::from(vsync_shift) << regs::TRANS_TIMING_SHIFT;

    (
        TranscoderTimingValues {
            htotal: htotal_reg,
            hsync: hsync_reg,
            vtotal: vtotal_reg,
            vsync: vsync_reg,
            vsync_shift: vsync_shift_reg,
        },
        errors,
    )
}
