//! Register access seam and the polling primitive.
//!
//! The sequencer never touches MMIO directly; it goes through the
//! [`RegisterBus`] capability supplied by the host stack. That keeps the
//! timing calculator and both sequencers host-independent and lets the
//! tests drive the full state machine against a simulated register file.

/// Register read/write transport for the link's register range.
///
/// The implementation is assumed synchronous and free of side effects
/// beyond the hardware itself. The sequencer assumes exclusive ownership
/// of the range for the duration of a sequence; that exclusivity is a
/// contract with the host stack, not enforced here.
pub trait RegisterBus {
    fn read(&mut self, addr: u32) -> u32;
    fn write(&mut self, addr: u32, value: u32);

    /// Write followed by a read-back of the same register, forcing the
    /// write to retire before the next access.
    fn write_posted(&mut self, addr: u32, value: u32) {
        self.write(addr, value);
        let _ = self.read(addr);
    }
}

/// Read-modify-write: clear `clear`, then set `set`.
pub fn rmw(bus: &mut dyn RegisterBus, addr: u32, clear: u32, set: u32) {
    let v = bus.read(addr);
    bus.write(addr, (v & !clear) | set);
}

const SPINS_PER_US: u32 = 64;

/// Busy-wait roughly `us` microseconds.
pub fn spin_wait_us(us: u32) {
    for _ in 0..us.saturating_mul(SPINS_PER_US) {
        core::hint::spin_loop();
    }
}

/// Poll `cond` until it holds or `timeout_us` expires, re-checking about
/// once a microsecond. Returns whether the condition was observed; the
/// caller decides what an expiry means. Blocks the calling thread for up
/// to the full timeout.
pub fn poll_until(
    bus: &mut dyn RegisterBus,
    timeout_us: u32,
    mut cond: impl FnMut(&mut dyn RegisterBus) -> bool,
) -> bool {
    let mut elapsed_us = 0;
    loop {
        if cond(bus) {
            return true;
        }
        if elapsed_us >= timeout_us {
            return false;
        }
        spin_wait_us(1);
        elapsed_us += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbus::TestBus;

    #[test]
    fn test_rmw() {
        let mut bus = TestBus::inert();
        bus.write(0x100, 0xFF00);
        rmw(&mut bus, 0x100, 0x0F00, 0x0003);
        assert_eq!(bus.read(0x100), 0xF003);
    }

    #[test]
    fn test_write_posted_reads_back() {
        let mut bus = TestBus::inert();
        bus.write_posted(0x40, 7);
        assert_eq!(bus.read_count(0x40), 1); // the posted read-back
        assert_eq!(bus.read(0x40), 7);
    }

    #[test]
    fn test_poll_immediate() {
        let mut bus = TestBus::inert();
        bus.write(0x10, 1);
        assert!(poll_until(&mut bus, 0, |b| b.read(0x10) == 1));
    }

    #[test]
    fn test_poll_expires() {
        let mut bus = TestBus::inert();
        assert!(!poll_until(&mut bus, 20, |b| b.read(0x10) == 1));
        // checked at least once plus once per elapsed microsecond
        assert!(bus.read_count(0x10) >= 21);
    }

    #[test]
    fn test_poll_observes_late_flip() {
        let mut bus = TestBus::inert();
        bus.flip_after(0x10, 5, 1);
        assert!(poll_until(&mut bus, 50, |b| b.read(0x10) == 1));
    }
}
