//! Link configuration and mode data.
//!
//! A [`LinkConfig`] is immutable for the lifetime of a link session; the
//! requested [`VideoTiming`] arrives per mode-set. Both are plain data;
//! parsing panel description blocks into a configuration is the host
//! stack's job.

use core::fmt;

/// Physical DSI port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A,
    B,
}

impl Port {
    pub fn index(self) -> u32 {
        match self {
            Port::A => 0,
            Port::B => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Port::A => "A",
            Port::B => "B",
        }
    }
}

/// Ordered set of the ports belonging to a link: one for single-link,
/// two for dual-link. Port A always iterates before port B so that
/// bring-up and tear-down fan out over the pair in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSet {
    dual: bool,
}

impl PortSet {
    pub fn single() -> Self {
        PortSet { dual: false }
    }

    pub fn dual() -> Self {
        PortSet { dual: true }
    }

    pub fn len(&self) -> usize {
        if self.dual {
            2
        } else {
            1
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = Port> {
        [Port::A, Port::B].into_iter().take(self.len())
    }
}

/// Apply `op` to every port of the set, in fixed A-then-B order.
pub fn for_each_port(ports: PortSet, mut op: impl FnMut(Port)) {
    for port in ports.iter() {
        op(port);
    }
}

/// Pixel format on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb888,
    /// 18 bpp payload loosely packed into 24-bit words
    Rgb666Loose,
    Rgb666Packed,
    Rgb565,
}

impl PixelFormat {
    /// Bits per pixel as carried on the link
    pub fn bpp(self) -> u32 {
        match self {
            PixelFormat::Rgb888 | PixelFormat::Rgb666Loose => 24,
            PixelFormat::Rgb666Packed => 18,
            PixelFormat::Rgb565 => 16,
        }
    }

    /// Transcoder pixel-format field code
    pub fn format_code(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 0x0,
            PixelFormat::Rgb666Packed => 0x1,
            PixelFormat::Rgb666Loose => 0x2,
            PixelFormat::Rgb888 => 0x3,
        }
    }
}

/// Dual-link operation: one frame split across both ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualLink {
    None,
    /// Each port drives one contiguous half of every scan line; the
    /// halves overlap by `pixel_overlap` pixels.
    FrontBack { pixel_overlap: u16 },
    /// Alternate pixels are distributed between the ports.
    PixelAlternate,
}

impl DualLink {
    pub fn is_dual(self) -> bool {
        !matches!(self, DualLink::None)
    }
}

/// Link operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Continuous pixel stream from the transcoder
    VideoStream,
    /// Pixel data pushed as explicit commands
    CommandMode,
}

/// Video-mode sync signalling. Only the first two are implemented by the
/// transcoder; requesting `Burst` is reported as a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoModeFormat {
    SyncPulse,
    SyncEvent,
    Burst,
}

/// Input pipe feeding the DSI transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipe {
    A,
    B,
    C,
}

/// Opaque, hardware-encoded D-PHY lane timing parameter words, supplied
/// by configuration. Turnaround parameters stay at hardware defaults
/// (the sequencer only applies the low-bitrate TA_SURE override).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DphyTimings {
    pub clock: u32,
    pub data: u32,
}

/// Everything the sequencer needs to know about one link. Immutable per
/// session.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Data lanes in use, 1–4
    pub lane_count: u8,
    /// Link bitrate in kHz, nonzero
    pub bitrate_khz: u32,
    pub pixel_format: PixelFormat,
    pub dual_link: DualLink,
    pub operation_mode: OperationMode,
    /// Sync signalling, video mode only
    pub video_mode_format: VideoModeFormat,
    /// Escape clock period in nanoseconds
    pub escape_clk_ns: u32,
    /// Append end-of-transmission packets
    pub eotp_enabled: bool,
    /// Transmit in BGR component order
    pub bgr_enabled: bool,
    /// T_INIT master count, hardware units
    pub init_count: u16,
    pub hs_tx_timeout_ns: u32,
    pub lp_rx_timeout_ns: u32,
    pub dphy: DphyTimings,
    pub pipe: Pipe,
}

impl LinkConfig {
    /// Ports driven by this link, derived from the dual-link mode.
    pub fn port_set(&self) -> PortSet {
        if self.dual_link.is_dual() {
            PortSet::dual()
        } else {
            PortSet::single()
        }
    }

    /// Check the configuration invariants. Violations are reported, not
    /// corrected; the sequencer proceeds best-effort either way.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.lane_count < 1 || self.lane_count > 4 {
            return Err(ConfigError::LaneCountOutOfRange(self.lane_count));
        }
        if self.bitrate_khz == 0 {
            return Err(ConfigError::ZeroBitrate);
        }
        Ok(())
    }
}

/// Requested pixel timing for one mode-set. Sync sizes and porches are
/// derived, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTiming {
    pub hactive: u16,
    pub htotal: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub vactive: u16,
    pub vtotal: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
}

impl VideoTiming {
    pub fn hsync_size(&self) -> u16 {
        self.hsync_end.wrapping_sub(self.hsync_start)
    }

    pub fn hfront_porch(&self) -> u16 {
        self.hsync_start.wrapping_sub(self.hactive)
    }

    pub fn hback_porch(&self) -> u16 {
        self.htotal.wrapping_sub(self.hsync_end)
    }
}

/// Unsupported or out-of-range configuration. Reported and logged; the
/// offending step still programs best-effort values; not requesting
/// unsupported configurations is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    LaneCountOutOfRange(u8),
    ZeroBitrate,
    /// Horizontal active below the 256-pixel hardware floor
    HactiveTooNarrow(u16),
    /// Loosely packed RGB666 needs horizontal active in multiples of 4
    HactiveNotMultipleOf4(u16),
    /// Sync-pulse video mode needs an hsync of at least 16 pixels
    HsyncTooNarrow(u16),
    /// Sync-event video mode needs hsync size >= hsync start
    HsyncSizeBelowStart { size: u16, start: u16 },
    HbackPorchTooNarrow(u16),
    VsyncEndOutOfRange { start: u16, end: u16, total: u16 },
    VsyncStartBeforeActive { start: u16, active: u16 },
    /// Burst video-mode format is not implemented by the transcoder
    UnsupportedVideoModeFormat,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LaneCountOutOfRange(n) => {
                write!(f, "lane count {} outside 1-4", n)
            }
            ConfigError::ZeroBitrate => write!(f, "link bitrate is zero"),
            ConfigError::HactiveTooNarrow(h) => {
                write!(f, "hactive {} is less than 256 pixels", h)
            }
            ConfigError::HactiveNotMultipleOf4(h) => {
                write!(f, "hactive {} pixels is not a multiple of 4", h)
            }
            ConfigError::HsyncTooNarrow(s) => write!(f, "hsync size {} < 16 pixels", s),
            ConfigError::HsyncSizeBelowStart { size, start } => {
                write!(f, "hsync size {} < hsync start {}", size, start)
            }
            ConfigError::HbackPorchTooNarrow(p) => {
                write!(f, "hback porch {} < 16 pixels", p)
            }
            ConfigError::VsyncEndOutOfRange { start, end, total } => {
                write!(f, "vsync end {} outside [{}, {}]", end, start, total)
            }
            ConfigError::VsyncStartBeforeActive { start, active } => {
                write!(f, "vsync start {} less than vactive {}", start, active)
            }
            ConfigError::UnsupportedVideoModeFormat => {
                write!(f, "video mode format unsupported")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LinkConfig {
        LinkConfig {
            lane_count: 4,
            bitrate_khz: 1_200_000,
            pixel_format: PixelFormat::Rgb888,
            dual_link: DualLink::None,
            operation_mode: OperationMode::VideoStream,
            video_mode_format: VideoModeFormat::SyncPulse,
            escape_clk_ns: 50,
            eotp_enabled: true,
            bgr_enabled: false,
            init_count: 0x7D0,
            hs_tx_timeout_ns: 1_000_000,
            lp_rx_timeout_ns: 1_000_000,
            dphy: DphyTimings {
                clock: 0x0002_0E08,
                data: 0x0A0B_0C0D,
            },
            pipe: Pipe::A,
        }
    }

    #[test]
    fn test_port_set_ordering() {
        let single: alloc::vec::Vec<Port> = PortSet::single().iter().collect();
        assert_eq!(single, [Port::A]);
        let dual: alloc::vec::Vec<Port> = PortSet::dual().iter().collect();
        assert_eq!(dual, [Port::A, Port::B]);

        let mut seen = alloc::vec::Vec::new();
        for_each_port(PortSet::dual(), |p| seen.push(p));
        assert_eq!(seen, [Port::A, Port::B]);
    }

    #[test]
    fn test_port_set_from_dual_link() {
        let mut cfg = test_config();
        assert_eq!(cfg.port_set().len(), 1);
        cfg.dual_link = DualLink::FrontBack { pixel_overlap: 4 };
        assert_eq!(cfg.port_set().len(), 2);
        cfg.dual_link = DualLink::PixelAlternate;
        assert_eq!(cfg.port_set().len(), 2);
    }

    #[test]
    fn test_pixel_format_bpp() {
        assert_eq!(PixelFormat::Rgb888.bpp(), 24);
        assert_eq!(PixelFormat::Rgb666Loose.bpp(), 24);
        assert_eq!(PixelFormat::Rgb666Packed.bpp(), 18);
        assert_eq!(PixelFormat::Rgb565.bpp(), 16);
    }

    #[test]
    fn test_config_invariants() {
        assert!(test_config().check().is_ok());

        let mut cfg = test_config();
        cfg.lane_count = 0;
        assert_eq!(cfg.check(), Err(ConfigError::LaneCountOutOfRange(0)));
        cfg.lane_count = 5;
        assert_eq!(cfg.check(), Err(ConfigError::LaneCountOutOfRange(5)));

        let mut cfg = test_config();
        cfg.bitrate_khz = 0;
        assert_eq!(cfg.check(), Err(ConfigError::ZeroBitrate));
    }

    #[test]
    fn test_derived_timings() {
        // standard 1920x1080@60
        let t = VideoTiming {
            hactive: 1920,
            htotal: 2200,
            hsync_start: 2008,
            hsync_end: 2052,
            vactive: 1080,
            vtotal: 1125,
            vsync_start: 1084,
            vsync_end: 1089,
        };
        assert_eq!(t.hsync_size(), 44);
        assert_eq!(t.hfront_porch(), 88);
        assert_eq!(t.hback_porch(), 148);
    }
}
