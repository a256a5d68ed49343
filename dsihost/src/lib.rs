//! DSI host controller driver: link bring-up and tear-down sequencing.
//!
//! Control-plane logic for a two-port combo-PHY DSI host block. The
//! driver owns the fixed, hardware-mandated ordering of register
//! programming steps that takes a panel link from off to streaming
//! pixels, and the mirrored ordering that takes it back down:
//!
//! ```text
//! IO power → escape clock → lane power → lane sequencing → vswing
//!   → DDI buffer → D-PHY timing → protocol timeouts → transcoder
//!   → panel vendor sequence → transcoder timing → pipe enable
//!   → backlight
//! ```
//!
//! Everything the sequencer touches outside the register block is an
//! injected collaborator (register transport, panel vendor sequence,
//! DCS command channel, backlight, power domains), so the whole state
//! machine runs against a simulated register file in tests.
//!
//! Hardware condition waits are bounded polls; a poll that expires is
//! logged and recorded in the sequence report but never aborts the
//! sequence. A half-run sequence leaves the hardware in a worse state
//! than a logged anomaly, so the caller judges overall success from the
//! report and from final link activity.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod logger;

pub mod config;
pub mod mmio;
pub mod panel;
pub mod regs;
pub mod sequencer;
pub mod timings;

#[cfg(test)]
mod testbus;

pub use config::{
    DphyTimings, DualLink, LinkConfig, OperationMode, Pipe, PixelFormat, Port, PortSet,
    VideoModeFormat, VideoTiming,
};
pub use mmio::{poll_until, RegisterBus};
pub use panel::{
    BacklightControl, NoopPowerDomains, PanelPhase, PanelSequence, PeripheralChannel,
    PowerDomains,
};
pub use sequencer::{Diag, DiagKind, DsiHost, LinkState, SequenceReport};
pub use timings::TranscoderTimingValues;
