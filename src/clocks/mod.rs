//! This module contains clock configurations for the MS32F0 family.
//!
//! The clock tree is brought up in three steps, each its own module, and each refusing calls
//! made out of order rather than tracking a hidden sequence:
//! - [`osc`]: start and stop the HSI, HSE, LSI and LSE oscillators.
//! - [`pll`]: configure, lock and stop the PLL.
//! - [`sysclk`]: switch the system clock, set the bus prescalers, and keep the FLASH wait
//!   states safe on both sides of the switch.
//!
//! [`freq`] derives the resulting bus frequencies from register state, and [`Clocks`] strings
//! the steps together for a whole-tree config.

use cfg_if::cfg_if;

mod f0;
pub mod freq;
pub mod osc;
pub mod pll;
pub mod regs;
pub mod sim;
pub mod sysclk;

cfg_if! {
    if #[cfg(hw)] {
        mod hw;
        pub use hw::{PacRegs, RccExt};
    }
}

pub use f0::{Clocks, InputSrc};
pub use freq::{ApbPrescaler, ClockFreqs, HclkPrescaler};
pub use osc::{LseDrive, OscState, Oscillator, OscillatorConfig, RtcClkSrc};
pub use pll::{PllConfig, PllMul, PllSrc, Prediv};
pub use regs::{ClockRegs, Reg};
pub use sysclk::{ClockSource, WaitState};

/// HSI frequency, in Hz.
pub const HSI_FREQ: u32 = 8_000_000;
/// LSI frequency, in Hz. Nominal; the RC oscillator varies between 30 and 50 kHz.
pub const LSI_FREQ: u32 = 40_000;

// Poll budgets, in loop iterations. Sized at the fastest core clock (48Mhz), where an
// iteration is around ten cycles, or 0.2us. At a slower clock they last longer.

/// HSI and LSI start in microseconds.
pub const HSI_TIMEOUT: u32 = 5_000;
pub const LSI_TIMEOUT: u32 = 5_000;
/// A crystal needs its resonance to settle; a few milliseconds.
pub const HSE_TIMEOUT: u32 = 100_000;
/// A 32kHz crystal can take seconds to start; about 5s.
pub const LSE_TIMEOUT: u32 = 25_000_000;
/// PLL lock, or stop.
pub const PLL_TIMEOUT: u32 = 20_000;
/// System clock switch status.
pub const SWITCH_TIMEOUT: u32 = 50_000;
/// FLASH latency read-back.
pub const LATENCY_TIMEOUT: u32 = 1_000;

/// Clock configuration errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RccError {
    /// The request would stop or reconfigure a source the system clock, or the PLL, is
    /// running from. Detected before any register is written.
    SourceInUse,
    /// An oscillator didn't become ready (or didn't stop) within its poll budget.
    OscillatorTimeout(Oscillator),
    /// The PLL didn't lock (or didn't stop) within its poll budget.
    PllTimeout,
    /// The switch status never reflected the requested system clock source.
    ClockSwitchTimeout,
    /// The requested source isn't ready. Nothing was written.
    SourceNotReady,
    /// FLASH didn't report the requested wait states.
    FlashLatency,
    /// A clock speed is outside of what this MCU supports.
    Speed,
}

impl core::fmt::Display for RccError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SourceInUse => f.write_str("clock source in use"),
            Self::OscillatorTimeout(osc) => write!(f, "{osc:?} oscillator timed out"),
            Self::PllTimeout => f.write_str("PLL timed out"),
            Self::ClockSwitchTimeout => f.write_str("system clock switch timed out"),
            Self::SourceNotReady => f.write_str("clock source not ready"),
            Self::FlashLatency => f.write_str("FLASH wait states not applied"),
            Self::Speed => f.write_str("clock speed out of range"),
        }
    }
}

impl core::error::Error for RccError {}

/// The constrained RCC peripheral. Owns the clock tree's registers; every operation that
/// changes the tree takes `&mut self`.
#[derive(Debug)]
pub struct Rcc<R: ClockRegs> {
    regs: R,
}

impl<R: ClockRegs> Rcc<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Give back the register bank.
    pub fn free(self) -> R {
        self.regs
    }

    /// Enable the clock security system: a HSE failure switches the system clock back to
    /// HSI and raises an NMI.
    pub fn enable_css(&mut self) {
        self.regs.set_bits(Reg::Cr, regs::cr::CSSON);
    }

    pub fn disable_css(&mut self) {
        self.regs.clear_bits(Reg::Cr, regs::cr::CSSON);
    }
}
