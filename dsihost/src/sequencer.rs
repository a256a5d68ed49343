//! Link bring-up / tear-down sequencer.
//!
//! The ordering below is mandated by the hardware; violating it can
//! corrupt link state in ways only a full power cycle recovers from.
//! Bring-up:
//!
//! ```text
//! 1  IO power          7  D-PHY timing
//! 2  escape clock      8  protocol timeouts
//! 3  lane power        9  transcoder function + enable
//! 4  lane sequencing   10 panel power-up (vendor sequence)
//! 5  voltage swing     11 transcoder pixel timing
//! 6  DDI buffer        12 pipe enable
//!                      13 backlight
//! ```
//!
//! Tear-down mirrors it in reverse and always runs to completion so no
//! powered hardware state leaks, no matter what earlier polls did.
//!
//! Every step fans out over the link's port set in fixed order and runs
//! to completion, polls included, before the next step starts. Anomalies
//! (poll expiry, unsupported configuration, failed DCS commands) are
//! logged and accumulated in the [`SequenceReport`]; nothing aborts the
//! sequence, because a half-programmed link is worse than a logged
//! anomaly and later teardown logic depends on the full sequence having
//! run.

use alloc::vec::Vec;

use crate::config::{
    for_each_port, ConfigError, LinkConfig, OperationMode, Pipe, VideoModeFormat, VideoTiming,
};
use crate::mmio::{poll_until, rmw, RegisterBus};
use crate::panel::{BacklightControl, PanelPhase, PanelSequence, PeripheralChannel, PowerDomains};
use crate::regs;
use crate::timings;
use crate::{log, log_debug, log_error};

// ═══════════════════════════════════════════════════════════════════════════════
// Link state and sequence report
// ═══════════════════════════════════════════════════════════════════════════════

/// Link bring-up state. Transitions are monotonic: forward during
/// bring-up, reverse during tear-down. No intermediate state is
/// resumable: after a partial failure the caller tears the link all
/// the way down before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkState {
    Off,
    IoPowered,
    ClockConfigured,
    PhyPoweredUp,
    PhyCalibrated,
    PortEnabled,
    TranscoderConfigured,
    PanelPoweredUp,
    TranscoderTimed,
    Streaming,
}

impl LinkState {
    pub fn name(self) -> &'static str {
        match self {
            LinkState::Off => "off",
            LinkState::IoPowered => "io-powered",
            LinkState::ClockConfigured => "clock-configured",
            LinkState::PhyPoweredUp => "phy-powered-up",
            LinkState::PhyCalibrated => "phy-calibrated",
            LinkState::PortEnabled => "port-enabled",
            LinkState::TranscoderConfigured => "transcoder-configured",
            LinkState::PanelPoweredUp => "panel-powered-up",
            LinkState::TranscoderTimed => "transcoder-timed",
            LinkState::Streaming => "streaming",
        }
    }
}

/// What went wrong, per the three-way taxonomy: a hardware condition
/// poll expired, the configuration asked for something unsupported, or
/// a DCS command failed. None of these abort the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Timeout { what: &'static str, timeout_us: u32 },
    Config(ConfigError),
    Command { what: &'static str, err: &'static str },
}

/// One logged anomaly, tagged with the step that detected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diag {
    pub step: &'static str,
    pub kind: DiagKind,
}

/// Outcome of one bring-up or tear-down invocation: the steps that ran,
/// every anomaly they logged, and the final link state. Overall success
/// is the caller's judgement, typically `final_state` plus observed
/// link activity, not the absence of diags.
#[derive(Debug)]
pub struct SequenceReport {
    pub completed_steps: Vec<&'static str>,
    pub diags: Vec<Diag>,
    pub final_state: LinkState,
}

impl SequenceReport {
    fn new() -> Self {
        SequenceReport {
            completed_steps: Vec::new(),
            diags: Vec::new(),
            final_state: LinkState::Off,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn timeouts(&self) -> usize {
        self.diags
            .iter()
            .filter(|d| matches!(d.kind, DiagKind::Timeout { .. }))
            .count()
    }

    pub fn config_errors(&self) -> usize {
        self.diags
            .iter()
            .filter(|d| matches!(d.kind, DiagKind::Config(_)))
            .count()
    }

    fn complete(&mut self, step: &'static str) {
        self.completed_steps.push(step);
    }

    fn timeout(&mut self, step: &'static str, what: &'static str, timeout_us: u32) {
        log_error!("[DSI] {}: {} not observed within {} us", step, what, timeout_us);
        self.diags.push(Diag {
            step,
            kind: DiagKind::Timeout { what, timeout_us },
        });
    }

    fn config(&mut self, step: &'static str, err: ConfigError) {
        log_error!("[DSI] {}: {}", step, err);
        self.diags.push(Diag {
            step,
            kind: DiagKind::Config(err),
        });
    }

    fn command(&mut self, step: &'static str, what: &'static str, err: &'static str) {
        log_error!("[DSI] {}: {} failed: {}", step, what, err);
        self.diags.push(Diag {
            step,
            kind: DiagKind::Command { what, err },
        });
    }
}

const STEP_LINK_CONFIG: &str = "link-config";
const STEP_IO_POWER: &str = "io-power";
const STEP_ESCAPE_CLOCK: &str = "escape-clock";
const STEP_LANE_POWER: &str = "lane-power";
const STEP_LANE_SEQUENCING: &str = "lane-sequencing";
const STEP_VOLTAGE_SWING: &str = "voltage-swing";
const STEP_DDI_BUFFER: &str = "ddi-buffer";
const STEP_DPHY_TIMING: &str = "dphy-timing";
const STEP_PROTOCOL_TIMEOUTS: &str = "protocol-timeouts";
const STEP_TRANSCODER_CONFIG: &str = "transcoder-config";
const STEP_PANEL_POWER_UP: &str = "panel-power-up";
const STEP_TRANSCODER_TIMING: &str = "transcoder-timing";
const STEP_PIPE_ENABLE: &str = "pipe-enable";
const STEP_BACKLIGHT_ON: &str = "backlight-on";

const STEP_BACKLIGHT_OFF: &str = "backlight-off";
const STEP_PIPE_DISABLE: &str = "pipe-disable";
const STEP_PANEL_POWER_DOWN: &str = "panel-power-down";
const STEP_TRANSCODER_DECONFIG: &str = "transcoder-deconfig";
const STEP_PORT_DISABLE: &str = "port-disable";
const STEP_IO_POWER_OFF: &str = "io-power-off";
const STEP_COMMAND_DRAIN: &str = "command-drain";

// ═══════════════════════════════════════════════════════════════════════════════
// Sequencer
// ═══════════════════════════════════════════════════════════════════════════════

/// One DSI link instance. Owns the register range for the duration of a
/// sequence; the caller serializes invocations (one bring-up or
/// tear-down in flight per link).
pub struct DsiHost<'a> {
    cfg: LinkConfig,
    bus: &'a mut dyn RegisterBus,
    panel: &'a mut dyn PanelSequence,
    dcs: &'a mut dyn PeripheralChannel,
    backlight: &'a mut dyn BacklightControl,
    power: &'a mut dyn PowerDomains,
    state: LinkState,
}

impl<'a> DsiHost<'a> {
    pub fn new(
        cfg: LinkConfig,
        bus: &'a mut dyn RegisterBus,
        panel: &'a mut dyn PanelSequence,
        dcs: &'a mut dyn PeripheralChannel,
        backlight: &'a mut dyn BacklightControl,
        power: &'a mut dyn PowerDomains,
    ) -> Self {
        DsiHost {
            cfg,
            bus,
            panel,
            dcs,
            backlight,
            power,
            state: LinkState::Off,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Run the full bring-up sequence for the given mode. Blocks until
    /// done, including every condition poll; worst case is the sum of
    /// the poll timeouts. Always runs every step.
    pub fn bring_up(&mut self, mode: &VideoTiming) -> SequenceReport {
        let mut report = SequenceReport::new();

        log!(
            "[DSI] bring-up: {} lane(s) @ {} kHz, {:?}, {} port(s)",
            self.cfg.lane_count,
            self.cfg.bitrate_khz,
            self.cfg.pixel_format,
            self.cfg.port_set().len()
        );

        if let Err(e) = self.cfg.check() {
            report.config(STEP_LINK_CONFIG, e);
        }

        // step 1: enable IO power
        self.enable_io_power();
        report.complete(STEP_IO_POWER);
        self.state = LinkState::IoPowered;

        // step 2: program escape clock dividers
        self.program_esc_clk_div();
        report.complete(STEP_ESCAPE_CLOCK);
        self.state = LinkState::ClockConfigured;

        // step 3: power up the requested lanes
        self.power_up_lanes();
        report.complete(STEP_LANE_POWER);
        self.state = LinkState::PhyPoweredUp;

        // step 4: configure lane sequencing of the combo PHY transmitters
        self.config_phy_lanes();
        report.complete(STEP_LANE_SEQUENCING);

        // step 5: voltage swing and de-emphasis calibration
        self.voltage_swing_sequence();
        report.complete(STEP_VOLTAGE_SWING);
        self.state = LinkState::PhyCalibrated;

        // step 6: enable the DDI buffers
        self.enable_ddi_buffer(&mut report);
        report.complete(STEP_DDI_BUFFER);

        // step 7: D-PHY timing parameters
        self.setup_dphy_timings();
        report.complete(STEP_DPHY_TIMING);

        // step 8: protocol timeouts
        self.setup_timeouts();
        report.complete(STEP_PROTOCOL_TIMEOUTS);
        self.state = LinkState::PortEnabled;

        // step 9: configure and enable the transcoder function
        self.configure_transcoder(&mut report);
        report.complete(STEP_TRANSCODER_CONFIG);
        self.state = LinkState::TranscoderConfigured;

        // step 10: program and power up the panel
        self.powerup_panel(&mut report);
        report.complete(STEP_PANEL_POWER_UP);
        self.state = LinkState::PanelPoweredUp;

        // step 11: transcoder pixel timing
        self.set_transcoder_timings(mode, &mut report);
        report.complete(STEP_TRANSCODER_TIMING);
        self.state = LinkState::TranscoderTimed;

        // step 12: enable the pipe
        self.enable_pipe(&mut report);
        report.complete(STEP_PIPE_ENABLE);
        self.state = LinkState::Streaming;

        // step 13: backlight
        self.backlight.enable(&self.cfg);
        self.panel.run(PanelPhase::BacklightOn);
        report.complete(STEP_BACKLIGHT_ON);

        log!(
            "[DSI] bring-up done: state {}, {} anomaly(ies)",
            self.state.name(),
            report.diags.len()
        );
        report.final_state = self.state;
        report
    }

    /// Run the full tear-down sequence. Every step executes regardless
    /// of earlier timeouts so no powered hardware state is left behind.
    pub fn tear_down(&mut self) -> SequenceReport {
        let mut report = SequenceReport::new();

        log!("[DSI] tear-down from state {}", self.state.name());

        // step 1: backlight off
        self.panel.run(PanelPhase::BacklightOff);
        self.backlight.disable(&self.cfg);
        report.complete(STEP_BACKLIGHT_OFF);

        // step 2: disable the pipe
        self.disable_pipe(&mut report);
        report.complete(STEP_PIPE_DISABLE);
        self.state = LinkState::TranscoderTimed;

        // step 3: power down the panel
        self.powerdown_panel(&mut report);
        report.complete(STEP_PANEL_POWER_DOWN);
        self.state = LinkState::TranscoderConfigured;

        // step 4: deconfigure the transcoder (ULPS entry first)
        self.deconfigure_transcoder(&mut report);
        report.complete(STEP_TRANSCODER_DECONFIG);
        self.state = LinkState::PortEnabled;

        // step 5: disable the DDI buffers
        self.disable_port(&mut report);
        report.complete(STEP_PORT_DISABLE);
        self.state = LinkState::ClockConfigured;

        // step 6: drop IO power
        self.disable_io_power();
        report.complete(STEP_IO_POWER_OFF);
        self.state = LinkState::Off;

        log!(
            "[DSI] tear-down done: {} anomaly(ies)",
            report.diags.len()
        );
        report.final_state = self.state;
        report
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Bring-up steps
    // ───────────────────────────────────────────────────────────────────────────

    fn enable_io_power(&mut self) {
        for_each_port(self.cfg.port_set(), |port| {
            self.power.acquire(port);
            rmw(
                self.bus,
                regs::dsi_base(port) + regs::DSI_IO_MODECTL,
                0,
                regs::COMBO_PHY_MODE_DSI,
            );
        });
    }

    fn program_esc_clk_div(&mut self) {
        let div = timings::escape_clock_divisor(
            self.cfg.bitrate_khz,
            self.cfg.pixel_format.bpp(),
            self.cfg.lane_count,
        );
        log_debug!("[DSI] escape clock divider {}", div);

        for_each_port(self.cfg.port_set(), |port| {
            self.bus
                .write_posted(regs::dsi_base(port) + regs::DSI_ESC_CLK_DIV, div);
        });
        // shadow copy inside the PHY
        for_each_port(self.cfg.port_set(), |port| {
            self.bus
                .write_posted(regs::phy_base(port) + regs::PORT_DPHY_ESC_CLK_DIV, div);
        });
    }

    fn power_up_lanes(&mut self) {
        let mask = regs::lane_power_mask(self.cfg.lane_count) << regs::PWR_DOWN_LN_SHIFT;
        for_each_port(self.cfg.port_set(), |port| {
            rmw(
                self.bus,
                regs::phy_base(port) + regs::PORT_CL_DW10,
                regs::PWR_DOWN_LN_MASK,
                mask,
            );
        });
    }

    fn config_phy_lanes(&mut self) {
        // loadgen select: never on the AUX lane, set on every transmit
        // lane except reference lane 2
        for_each_port(self.cfg.port_set(), |port| {
            rmw(
                self.bus,
                regs::phy_base(port) + regs::PORT_TX_DW4_AUX,
                regs::LOADGEN_SELECT,
                0,
            );
            for lane in 0..4 {
                let reg = regs::tx_lane_reg(port, regs::PORT_TX_DW4_LN0, lane);
                let set = if lane == 2 { 0 } else { regs::LOADGEN_SELECT };
                rmw(self.bus, reg, regs::LOADGEN_SELECT, set);
            }
        });

        // latency optimization for transmit and aux lanes
        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::phy_base(port);
            rmw(
                self.bus,
                base + regs::PORT_TX_DW2_AUX,
                regs::FRC_LATENCY_OPTIM_MASK,
                regs::frc_latency_optim(0x5),
            );
            let v = self.bus.read(base + regs::PORT_TX_DW2_LN0);
            self.bus.write(
                base + regs::PORT_TX_DW2_GRP,
                (v & !regs::FRC_LATENCY_OPTIM_MASK) | regs::frc_latency_optim(0x5),
            );
        });
    }

    fn voltage_swing_sequence(&mut self) {
        // clear common keeper enable
        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::phy_base(port);
            let v = self.bus.read(base + regs::PORT_PCS_DW1_LN0);
            self.bus
                .write(base + regs::PORT_PCS_DW1_GRP, v & !regs::COMMON_KEEPER_EN);
            rmw(
                self.bus,
                base + regs::PORT_PCS_DW1_AUX,
                regs::COMMON_KEEPER_EN,
                0,
            );
        });

        // sub-system clock configuration
        for_each_port(self.cfg.port_set(), |port| {
            rmw(
                self.bus,
                regs::phy_base(port) + regs::PORT_CL_DW5,
                0,
                regs::SUS_CLOCK_CONFIG,
            );
        });

        // training must be off while swing values change
        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::phy_base(port);
            let v = self.bus.read(base + regs::PORT_TX_DW5_LN0);
            self.bus
                .write(base + regs::PORT_TX_DW5_GRP, v & !regs::TX_TRAINING_EN);
            rmw(
                self.bus,
                base + regs::PORT_TX_DW5_AUX,
                regs::TX_TRAINING_EN,
                0,
            );
        });

        self.program_swing_and_deemphasis();

        // re-assert training on the transmit group to trigger the update;
        // the AUX lane stays untrained; the asymmetry is intentional
        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::phy_base(port);
            let v = self.bus.read(base + regs::PORT_TX_DW5_LN0);
            self.bus
                .write(base + regs::PORT_TX_DW5_GRP, v | regs::TX_TRAINING_EN);
            rmw(
                self.bus,
                base + regs::PORT_TX_DW5_AUX,
                regs::TX_TRAINING_EN,
                0,
            );
        });
    }

    /// Fixed calibration table for the combo PHY; not mode dependent.
    fn program_swing_and_deemphasis(&mut self) {
        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::phy_base(port);

            // scaling mode 0x6
            let v = self.bus.read(base + regs::PORT_TX_DW5_LN0);
            self.bus
                .write(base + regs::PORT_TX_DW5_GRP, v | regs::scaling_mode_sel(0x6));
            rmw(
                self.bus,
                base + regs::PORT_TX_DW5_AUX,
                0,
                regs::scaling_mode_sel(0x6),
            );

            // second and third taps unused
            let v = self.bus.read(base + regs::PORT_TX_DW5_LN0);
            self.bus.write(
                base + regs::PORT_TX_DW5_GRP,
                v | regs::TAP2_DISABLE | regs::TAP3_DISABLE,
            );
            rmw(
                self.bus,
                base + regs::PORT_TX_DW5_AUX,
                0,
                regs::TAP2_DISABLE | regs::TAP3_DISABLE,
            );

            // swing values
            let swing =
                regs::swing_sel_upper(0x2) | regs::swing_sel_lower(0x2) | regs::rcomp_scalar(0x98);
            let v = self.bus.read(base + regs::PORT_TX_DW2_LN0);
            self.bus.write(base + regs::PORT_TX_DW2_GRP, v | swing);
            rmw(self.bus, base + regs::PORT_TX_DW2_AUX, 0, swing);

            // cursor coefficients; the per-lane registers must be written
            // individually, not through the group broadcast
            let coeffs =
                regs::post_cursor_1(0x0) | regs::post_cursor_2(0x0) | regs::cursor_coeff(0x18);
            rmw(self.bus, base + regs::PORT_TX_DW4_AUX, 0, coeffs);
            for lane in 0..4 {
                let reg = regs::tx_lane_reg(port, regs::PORT_TX_DW4_LN0, lane);
                rmw(self.bus, reg, 0, coeffs);
            }
        });
    }

    fn enable_ddi_buffer(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::ddi_buf_ctl(port);
            rmw(self.bus, reg, 0, regs::DDI_BUF_CTL_ENABLE);

            if !poll_until(self.bus, 500, |bus| {
                bus.read(reg) & regs::DDI_BUF_IS_IDLE == 0
            }) {
                // vendor guidance: the port is still usable, degraded
                report.timeout(STEP_DDI_BUFFER, "DDI buffer leaving idle", 500);
            }
        });
    }

    fn setup_dphy_timings(&mut self) {
        for_each_port(self.cfg.port_set(), |port| {
            rmw(
                self.bus,
                regs::dsi_base(port) + regs::DSI_T_INIT_MASTER,
                regs::MASTER_INIT_TIMER_MASK,
                u32::from(self.cfg.init_count),
            );
        });

        // clock lane, then data lanes, each with its display-core shadow
        for_each_port(self.cfg.port_set(), |port| {
            self.bus.write(
                regs::phy_base(port) + regs::PORT_DPHY_CLK_TIMING,
                self.cfg.dphy.clock,
            );
            self.bus
                .write(regs::dsi_base(port) + regs::DSI_CLK_TIMING, self.cfg.dphy.clock);
        });
        for_each_port(self.cfg.port_set(), |port| {
            self.bus.write(
                regs::phy_base(port) + regs::PORT_DPHY_DATA_TIMING,
                self.cfg.dphy.data,
            );
            self.bus
                .write(regs::dsi_base(port) + regs::DSI_DATA_TIMING, self.cfg.dphy.data);
        });

        // at or below 800 Mb/s the turnaround sure time must be forced to
        // zero with the override bit; above that the hardware defaults hold
        if self.cfg.bitrate_khz <= 800_000 {
            for_each_port(self.cfg.port_set(), |port| {
                let ta = regs::TA_SURE_OVERRIDE | regs::ta_sure_time(0);
                rmw(
                    self.bus,
                    regs::phy_base(port) + regs::PORT_DPHY_TA_TIMING,
                    regs::TA_SURE_TIME_MASK,
                    ta,
                );
                rmw(
                    self.bus,
                    regs::dsi_base(port) + regs::DSI_TA_TIMING,
                    regs::TA_SURE_TIME_MASK,
                    ta,
                );
            });
        }
    }

    fn setup_timeouts(&mut self) {
        let (hs_tx, lp_rx) = timings::protocol_timeouts(
            self.cfg.hs_tx_timeout_ns,
            self.cfg.lp_rx_timeout_ns,
            self.cfg.escape_clk_ns,
            self.cfg.bitrate_khz,
        );
        log_debug!("[DSI] protocol timeouts: hs-tx {} lp-rx {} esc ticks", hs_tx, lp_rx);

        for_each_port(self.cfg.port_set(), |port| {
            let base = regs::dsi_base(port);
            rmw(
                self.bus,
                base + regs::DSI_HSTX_TO,
                regs::HSTX_TIMEOUT_VALUE_MASK,
                regs::hstx_timeout_value(hs_tx),
            );
            rmw(
                self.bus,
                base + regs::DSI_LPRX_HOST_TO,
                regs::LPRX_TIMEOUT_VALUE_MASK,
                regs::lprx_timeout_value(lp_rx),
            );
        });
    }

    fn configure_transcoder(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_TRANS_FUNC_CONF;
            let mut v = self.bus.read(reg);

            if self.cfg.eotp_enabled {
                v &= !regs::EOTP_DISABLED;
            } else {
                v |= regs::EOTP_DISABLED;
            }

            // link calibration pays off only below 1.5 Gb/s
            if self.cfg.bitrate_khz <= 1_500_000 {
                v = (v & !regs::LINK_CALIBRATION_MASK) | regs::CALIBRATION_ENABLED_INITIAL_ONLY;
            }

            v = (v & !regs::CONTINUOUS_CLK_MASK) | regs::CLK_ENTER_LP_AFTER_DATA;
            v = (v & !regs::PIX_BUF_THRESHOLD_MASK) | regs::PIX_BUF_THRESHOLD_1_4;
            v = (v & !regs::PIX_VIRT_CHAN_MASK) | regs::pix_virt_chan(0);

            if self.cfg.bgr_enabled {
                v |= regs::BGR_TRANSMISSION;
            } else {
                v &= !regs::BGR_TRANSMISSION;
            }

            v = (v & !regs::PIX_FMT_MASK) | regs::pix_fmt(self.cfg.pixel_format.format_code());

            if self.cfg.operation_mode == OperationMode::VideoStream {
                v &= !regs::OP_MODE_MASK;
                match self.cfg.video_mode_format {
                    VideoModeFormat::SyncPulse => {
                        v |= regs::op_mode(regs::OP_MODE_VIDEO_SYNC_PULSE);
                    }
                    VideoModeFormat::SyncEvent => {
                        v |= regs::op_mode(regs::OP_MODE_VIDEO_SYNC_EVENT);
                    }
                    VideoModeFormat::Burst => {
                        report.config(
                            STEP_TRANSCODER_CONFIG,
                            ConfigError::UnsupportedVideoModeFormat,
                        );
                    }
                }
            }

            self.bus.write(reg, v);
        });

        // dual-link ports run in lock step
        if self.cfg.dual_link.is_dual() {
            for_each_port(self.cfg.port_set(), |port| {
                rmw(
                    self.bus,
                    regs::dsi_base(port) + regs::TRANS_DDI_FUNC_CTL2,
                    0,
                    regs::PORT_SYNC_MODE_ENABLE,
                );
            });
        }

        // lane width, input pipe, and the function enable bit
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::TRANS_DDI_FUNC_CTL;
            let mut v = self.bus.read(reg);
            v = (v & !regs::DDI_PORT_WIDTH_MASK) | regs::ddi_port_width(self.cfg.lane_count);
            v &= !regs::TRANS_DDI_EDP_INPUT_MASK;
            v |= match self.cfg.pipe {
                Pipe::A => regs::TRANS_DDI_EDP_INPUT_A_ON,
                Pipe::B => regs::TRANS_DDI_EDP_INPUT_B_ONOFF,
                Pipe::C => regs::TRANS_DDI_EDP_INPUT_C_ONOFF,
            };
            v |= regs::TRANS_DDI_FUNC_ENABLE;
            self.bus.write(reg, v);
        });

        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_TRANS_FUNC_CONF;
            if !poll_until(self.bus, 500, |bus| bus.read(reg) & regs::LINK_READY != 0) {
                report.timeout(STEP_TRANSCODER_CONFIG, "link ready", 500);
            }
        });
    }

    fn powerup_panel(&mut self, report: &mut SequenceReport) {
        // tell the panel how much it may send back in one shot
        for_each_port(self.cfg.port_set(), |port| {
            let dw = self.bus.read(regs::dsi_base(port) + regs::DSI_CMD_RXCTL)
                & regs::RX_PLOAD_DW_MASK;
            let max_size = dw * 4;
            if let Err(e) = self.dcs.set_max_return_packet_size(port, max_size) {
                report.command(STEP_PANEL_POWER_UP, "set max return packet size", e);
            }
        });

        self.panel.run(PanelPhase::PowerOn);
        self.panel.run(PanelPhase::DeassertReset);
        self.panel.run(PanelPhase::Init);

        if self.cfg.operation_mode == OperationMode::VideoStream {
            for_each_port(self.cfg.port_set(), |port| {
                if let Err(e) = self.dcs.turn_on(port) {
                    report.command(STEP_PANEL_POWER_UP, "peripheral TURN_ON", e);
                }
            });
        }

        self.panel.run(PanelPhase::DisplayOn);

        // all panel commands must land before the transcoder starts
        self.wait_for_cmds_dispatched(report);
    }

    /// Best-effort drain of in-flight panel commands. Blocking the
    /// display on one missed poll is worse than a benign race, so every
    /// expiry here is logged and the drain continues.
    fn wait_for_cmds_dispatched(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_CMD_TXCTL;
            if !poll_until(self.bus, 50, |bus| {
                bus.read(reg) & regs::FREE_HEADER_CREDIT_MASK == regs::MAX_HEADER_CREDIT
            }) {
                report.timeout(STEP_COMMAND_DRAIN, "header credit release", 50);
            }
            if !poll_until(self.bus, 50, |bus| {
                bus.read(reg) & regs::FREE_PLOAD_CREDIT_MASK == regs::MAX_PLOAD_CREDIT
            }) {
                report.timeout(STEP_COMMAND_DRAIN, "payload credit release", 50);
            }
        });

        for_each_port(self.cfg.port_set(), |port| {
            if let Err(e) = self.dcs.send_nop(port) {
                report.command(STEP_COMMAND_DRAIN, "DCS NOP", e);
            }
        });

        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_CMD_TXCTL;
            if !poll_until(self.bus, 50, |bus| {
                bus.read(reg) & regs::FREE_HEADER_CREDIT_MASK == regs::MAX_HEADER_CREDIT
            }) {
                report.timeout(STEP_COMMAND_DRAIN, "header credit release after NOP", 50);
            }
        });

        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_LP_MSG;
            if !poll_until(self.bus, 20, |bus| {
                bus.read(reg) & regs::LPTX_IN_PROGRESS == 0
            }) {
                report.timeout(STEP_COMMAND_DRAIN, "LP TX completion", 20);
            }
        });
    }

    fn set_transcoder_timings(&mut self, mode: &VideoTiming, report: &mut SequenceReport) {
        let (values, errors) = timings::transcoder_timings(&self.cfg, mode);
        for err in errors {
            // out-of-range values are still programmed; panel conformance
            // is the caller's problem
            report.config(STEP_TRANSCODER_TIMING, err);
        }

        for_each_port(self.cfg.port_set(), |port| {
            self.bus
                .write(regs::dsi_base(port) + regs::TRANS_HTOTAL, values.htotal);
        });

        if let Some(hsync) = values.hsync {
            for_each_port(self.cfg.port_set(), |port| {
                self.bus.write(regs::dsi_base(port) + regs::TRANS_HSYNC, hsync);
            });
        }

        for_each_port(self.cfg.port_set(), |port| {
            self.bus
                .write(regs::dsi_base(port) + regs::TRANS_VTOTAL, values.vtotal);
        });

        for_each_port(self.cfg.port_set(), |port| {
            self.bus
                .write(regs::dsi_base(port) + regs::TRANS_VSYNC, values.vsync);
        });

        for_each_port(self.cfg.port_set(), |port| {
            self.bus.write(
                regs::dsi_base(port) + regs::TRANS_VSYNCSHIFT,
                values.vsync_shift,
            );
        });
    }

    fn enable_pipe(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::TRANS_PIPECONF;
            rmw(self.bus, reg, 0, regs::PIPECONF_ENABLE);

            if !poll_until(self.bus, 10_000, |bus| {
                bus.read(reg) & regs::PIPECONF_ACTIVE != 0
            }) {
                report.timeout(STEP_PIPE_ENABLE, "pipe active", 10_000);
            }
        });
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Tear-down steps
    // ───────────────────────────────────────────────────────────────────────────

    fn disable_pipe(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::TRANS_PIPECONF;
            rmw(self.bus, reg, regs::PIPECONF_ENABLE, 0);

            if !poll_until(self.bus, 50, |bus| {
                bus.read(reg) & regs::PIPECONF_ACTIVE == 0
            }) {
                report.timeout(STEP_PIPE_DISABLE, "pipe inactive", 50);
            }
        });
    }

    fn powerdown_panel(&mut self, report: &mut SequenceReport) {
        if self.cfg.operation_mode == OperationMode::VideoStream {
            for_each_port(self.cfg.port_set(), |port| {
                if let Err(e) = self.dcs.shutdown(port) {
                    report.command(STEP_PANEL_POWER_DOWN, "peripheral SHUT_DOWN", e);
                }
            });
        }

        self.panel.run(PanelPhase::DisplayOff);
        self.panel.run(PanelPhase::AssertReset);
        self.panel.run(PanelPhase::PowerOff);

        self.wait_for_cmds_dispatched(report);
    }

    fn deconfigure_transcoder(&mut self, report: &mut SequenceReport) {
        // park the link in ultra-low-power state
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::dsi_base(port) + regs::DSI_LP_MSG;
            rmw(self.bus, reg, 0, regs::LINK_ENTER_ULPS);

            if !poll_until(self.bus, 10, |bus| bus.read(reg) & regs::LINK_IN_ULPS != 0) {
                report.timeout(STEP_TRANSCODER_DECONFIG, "ULPS entry", 10);
            }
        });

        for_each_port(self.cfg.port_set(), |port| {
            rmw(
                self.bus,
                regs::dsi_base(port) + regs::TRANS_DDI_FUNC_CTL,
                regs::TRANS_DDI_FUNC_ENABLE,
                0,
            );
        });

        if self.cfg.dual_link.is_dual() {
            for_each_port(self.cfg.port_set(), |port| {
                rmw(
                    self.bus,
                    regs::dsi_base(port) + regs::TRANS_DDI_FUNC_CTL2,
                    regs::PORT_SYNC_MODE_ENABLE,
                    0,
                );
            });
        }
    }

    fn disable_port(&mut self, report: &mut SequenceReport) {
        for_each_port(self.cfg.port_set(), |port| {
            let reg = regs::ddi_buf_ctl(port);
            rmw(self.bus, reg, regs::DDI_BUF_CTL_ENABLE, 0);

            if !poll_until(self.bus, 8, |bus| {
                bus.read(reg) & regs::DDI_BUF_IS_IDLE != 0
            }) {
                report.timeout(STEP_PORT_DISABLE, "DDI buffer idle", 8);
            }
        });
    }

    fn disable_io_power(&mut self) {
        for_each_port(self.cfg.port_set(), |port| {
            self.power.release(port);
            rmw(
                self.bus,
                regs::dsi_base(port) + regs::DSI_IO_MODECTL,
                regs::COMBO_PHY_MODE_DSI,
                0,
            );
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
