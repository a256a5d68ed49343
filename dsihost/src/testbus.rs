//! Simulated register file for driving the sequencers in tests.
//!
//! `TestBus::new()` models well-behaved hardware: status bits follow
//! their enable bits (pipe active, DDI buffer idle, ULPS entry) and the
//! command credit counters always read back fully released, so every
//! poll in a healthy sequence is satisfied. `TestBus::inert()` is a bare
//! register file whose status bits never respond, and `stick()` pins
//! selected bits to fault-inject a single poll.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::config::Port;
use crate::mmio::RegisterBus;
use crate::regs;

pub struct TestBus {
    regs: BTreeMap<u32, u32>,
    /// Every write in issue order
    pub writes: Vec<(u32, u32)>,
    read_counts: BTreeMap<u32, u64>,
    /// addr -> (reads remaining at stored value, value afterwards)
    flips: BTreeMap<u32, (u32, u32)>,
    /// addr -> (mask, forced value) applied after modeling
    stuck: BTreeMap<u32, (u32, u32)>,
    model_hw: bool,
}

impl TestBus {
    /// Register file backed by a well-behaved hardware model.
    pub fn new() -> Self {
        TestBus {
            regs: BTreeMap::new(),
            writes: Vec::new(),
            read_counts: BTreeMap::new(),
            flips: BTreeMap::new(),
            stuck: BTreeMap::new(),
            model_hw: true,
        }
    }

    /// Bare register file: reads return exactly what was written, so
    /// hardware-set status bits never appear and every status poll
    /// times out.
    pub fn inert() -> Self {
        TestBus {
            model_hw: false,
            ..TestBus::new()
        }
    }

    /// Pin `mask` bits of `addr` to `value`, overriding the model.
    pub fn stick(&mut self, addr: u32, mask: u32, value: u32) {
        self.stuck.insert(addr, (mask, value));
    }

    /// Let `addr` read its stored value `n` more times, then `value`.
    pub fn flip_after(&mut self, addr: u32, n: u32, value: u32) {
        self.flips.insert(addr, (n, value));
    }

    pub fn read_count(&self, addr: u32) -> u64 {
        self.read_counts.get(&addr).copied().unwrap_or(0)
    }

    pub fn last_write(&self, addr: u32) -> Option<u32> {
        self.writes
            .iter()
            .rev()
            .find(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
    }

    pub fn first_write_index(&self, addr: u32) -> Option<usize> {
        self.writes.iter().position(|(a, _)| *a == addr)
    }

    /// Status-bit model of healthy hardware.
    fn model(addr: u32, stored: u32) -> u32 {
        let mut v = stored;
        for port in [Port::A, Port::B] {
            if addr == regs::ddi_buf_ctl(port) {
                // buffer leaves idle exactly when enabled
                v = if v & regs::DDI_BUF_CTL_ENABLE != 0 {
                    v & !regs::DDI_BUF_IS_IDLE
                } else {
                    v | regs::DDI_BUF_IS_IDLE
                };
            }
            let base = regs::dsi_base(port);
            if addr == base + regs::DSI_TRANS_FUNC_CONF {
                v |= regs::LINK_READY;
            }
            if addr == base + regs::TRANS_PIPECONF {
                v = if v & regs::PIPECONF_ENABLE != 0 {
                    v | regs::PIPECONF_ACTIVE
                } else {
                    v & !regs::PIPECONF_ACTIVE
                };
            }
            if addr == base + regs::DSI_LP_MSG {
                if v & regs::LINK_ENTER_ULPS != 0 {
                    v |= regs::LINK_IN_ULPS;
                }
                v &= !regs::LPTX_IN_PROGRESS;
            }
            if addr == base + regs::DSI_CMD_TXCTL {
                // all command credit released
                v &= !(regs::FREE_HEADER_CREDIT_MASK | regs::FREE_PLOAD_CREDIT_MASK);
                v |= regs::MAX_HEADER_CREDIT | regs::MAX_PLOAD_CREDIT;
            }
            if addr == base + regs::DSI_CMD_RXCTL {
                // 16 receive payload dwords
                v = (v & !regs::RX_PLOAD_DW_MASK) | 0x10;
            }
        }
        v
    }
}

impl RegisterBus for TestBus {
    fn read(&mut self, addr: u32) -> u32 {
        *self.read_counts.entry(addr).or_insert(0) += 1;

        let stored = self.regs.get(&addr).copied().unwrap_or(0);
        let mut v = if let Some((remaining, value)) = self.flips.get_mut(&addr) {
            if *remaining > 0 {
                *remaining -= 1;
                stored
            } else {
                *value
            }
        } else if self.model_hw {
            Self::model(addr, stored)
        } else {
            stored
        };

        if let Some((mask, value)) = self.stuck.get(&addr) {
            v = (v & !mask) | (value & mask);
        }
        v
    }

    fn write(&mut self, addr: u32, value: u32) {
        self.regs.insert(addr, value);
        self.writes.push((addr, value));
    }
}
