//! PLL configuration.
//!
//! RM0091, 7.2.3: The PLL configuration (selection of the input clock, pre-divider and
//! multiplication factor) must be done before enabling the PLL. Once the PLL is enabled,
//! these parameters cannot be changed. To modify the PLL configuration:
//! 1. Disable the PLL by setting PLLON to 0.
//! 2. Wait until PLLRDY is cleared. The PLL is now fully stopped.
//! 3. Change the desired parameter.
//! 4. Enable the PLL again by setting PLLON to 1.
//!
//! The PLL output frequency must be set in the range 16-48 MHz. That's checked by
//! [`super::Clocks::validate_speeds`], not here: a PLL configured out of range shows up as a
//! lock timeout.

use super::{
    HSI_FREQ, PLL_TIMEOUT, Rcc, RccError, freq,
    osc::Oscillator,
    regs::{ClockRegs, Reg, cfgr, cfgr2, cr, field, with_field},
    sysclk::ClockSource,
};
use crate::{HSE_FREQ, util::poll_until};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The clock source input used by the PLL.
pub enum PllSrc {
    HsiDiv2,
    Hse,
}

impl PllSrc {
    /// Required instead of u8 repr due to numerical value on non-uniform discrim being
    /// experimental. RCC_CFGR, PLLSRC field.
    pub fn bits(&self) -> u8 {
        match self {
            Self::HsiDiv2 => 0b00,
            Self::Hse => 0b10,
        }
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits {
            0b10 => Self::Hse,
            _ => Self::HsiDiv2,
        }
    }

    /// Frequency going into the pre-divider, in Hz.
    pub fn input_hz(&self) -> u32 {
        match self {
            Self::HsiDiv2 => HSI_FREQ / 2,
            Self::Hse => HSE_FREQ,
        }
    }

    pub fn oscillator(&self) -> Oscillator {
        match self {
            Self::HsiDiv2 => Oscillator::Hsi,
            Self::Hse => Oscillator::Hse,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// PLL input pre-divider. RCC_CFGR2, PREDIV field.
pub enum Prediv {
    Div1 = 0b0000,
    Div2 = 0b0001,
    Div3 = 0b0010,
    Div4 = 0b0011,
    Div5 = 0b0100,
    Div6 = 0b0101,
    Div7 = 0b0110,
    Div8 = 0b0111,
    Div9 = 0b1000,
    Div10 = 0b1001,
    Div11 = 0b1010,
    Div12 = 0b1011,
    Div13 = 0b1100,
    Div14 = 0b1101,
    Div15 = 0b1110,
    Div16 = 0b1111,
}

impl Prediv {
    pub fn value(&self) -> u8 {
        *self as u8 + 1
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 0b1111 {
            0b0000 => Self::Div1,
            0b0001 => Self::Div2,
            0b0010 => Self::Div3,
            0b0011 => Self::Div4,
            0b0100 => Self::Div5,
            0b0101 => Self::Div6,
            0b0110 => Self::Div7,
            0b0111 => Self::Div8,
            0b1000 => Self::Div9,
            0b1001 => Self::Div10,
            0b1010 => Self::Div11,
            0b1011 => Self::Div12,
            0b1100 => Self::Div13,
            0b1101 => Self::Div14,
            0b1110 => Self::Div15,
            _ => Self::Div16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// PLL multiplication factor. RCC_CFGR, PLLMUL field.
pub enum PllMul {
    Mul2 = 0b0000,
    Mul3 = 0b0001,
    Mul4 = 0b0010,
    Mul5 = 0b0011,
    Mul6 = 0b0100,
    Mul7 = 0b0101,
    Mul8 = 0b0110,
    Mul9 = 0b0111,
    Mul10 = 0b1000,
    Mul11 = 0b1001,
    Mul12 = 0b1010,
    Mul13 = 0b1011,
    Mul14 = 0b1100,
    Mul15 = 0b1101,
    Mul16 = 0b1110,
}

impl PllMul {
    pub fn value(&self) -> u8 {
        *self as u8 + 2
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 0b1111 {
            0b0000 => Self::Mul2,
            0b0001 => Self::Mul3,
            0b0010 => Self::Mul4,
            0b0011 => Self::Mul5,
            0b0100 => Self::Mul6,
            0b0101 => Self::Mul7,
            0b0110 => Self::Mul8,
            0b0111 => Self::Mul9,
            0b1000 => Self::Mul10,
            0b1001 => Self::Mul11,
            0b1010 => Self::Mul12,
            0b1011 => Self::Mul13,
            0b1100 => Self::Mul14,
            0b1101 => Self::Mul15,
            // 0b1111 is also x16.
            _ => Self::Mul16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    /// If false, `configure_pll` stops the PLL and ignores the other fields.
    pub enabled: bool,
    pub src: PllSrc,
    pub prediv: Prediv,
    pub mul: PllMul,
}

impl Default for PllConfig {
    /// 48Mhz from HSI/2: 4Mhz x 12.
    fn default() -> Self {
        Self {
            enabled: true,
            src: PllSrc::HsiDiv2,
            prediv: Prediv::Div1,
            mul: PllMul::Mul12,
        }
    }
}

impl PllConfig {
    /// PLL output, in Hz.
    pub fn output_hz(&self) -> u32 {
        freq::pll_output_hz(self.src.input_hz(), self.prediv, self.mul)
    }
}

impl<R: ClockRegs> Rcc<R> {
    /// PLLON or PLLRDY set: the PLL is starting, running, or still stopping.
    pub fn pll_enabled(&self) -> bool {
        !self.regs.bits_clear(Reg::Cr, cr::PLLON | cr::PLLRDY)
    }

    pub fn pll_ready(&self) -> bool {
        self.regs.bits_set(Reg::Cr, cr::PLLRDY)
    }

    pub fn pll_source(&self) -> PllSrc {
        PllSrc::from_bits(field(self.regs.read(Reg::Cfgr), cfgr::PLLSRC_SHIFT, cfgr::PLLSRC_MASK))
    }

    /// The PLL settings currently in the registers.
    pub fn pll_config(&self) -> PllConfig {
        let cfg = self.regs.read(Reg::Cfgr);
        let cfg2 = self.regs.read(Reg::Cfgr2);

        PllConfig {
            enabled: self.pll_enabled(),
            src: PllSrc::from_bits(field(cfg, cfgr::PLLSRC_SHIFT, cfgr::PLLSRC_MASK)),
            prediv: Prediv::from_bits(field(cfg2, cfgr2::PREDIV_SHIFT, cfgr2::PREDIV_MASK)),
            mul: PllMul::from_bits(field(cfg, cfgr::PLLMUL_SHIFT, cfgr::PLLMUL_MASK)),
        }
    }

    /// Configure the PLL and wait for it to lock. A running PLL is stopped first.
    ///
    /// Refuses, without writing anything, to touch a PLL that's the system clock source
    /// (`SourceInUse`), or to start one whose input oscillator isn't ready (`SourceNotReady`).
    pub fn configure_pll(&mut self, cfg: &PllConfig) -> Result<(), RccError> {
        if !cfg.enabled {
            return self.disable_pll();
        }

        if self.active_source() == ClockSource::Pll {
            warn!("refusing to reconfigure the PLL: it's the system clock");
            return Err(RccError::SourceInUse);
        }

        if !self.oscillator_ready(cfg.src.oscillator()) {
            warn!("PLL input {:?} not ready", cfg.src);
            return Err(RccError::SourceNotReady);
        }

        if self.pll_enabled() {
            self.stop_pll()?;
        }

        self.regs.modify(Reg::Cfgr, |v| {
            let v = with_field(v, cfgr::PLLSRC_SHIFT, cfgr::PLLSRC_MASK, cfg.src.bits() as u32);
            with_field(v, cfgr::PLLMUL_SHIFT, cfgr::PLLMUL_MASK, cfg.mul as u32)
        });
        self.regs.modify(Reg::Cfgr2, |v| {
            with_field(v, cfgr2::PREDIV_SHIFT, cfgr2::PREDIV_MASK, cfg.prediv as u32)
        });

        // Now turn PLL back on, once we've configured things that can only be set with it off.
        self.regs.set_bits(Reg::Cr, cr::PLLON);

        let regs = &self.regs;
        poll_until(|| regs.bits_set(Reg::Cr, cr::PLLRDY), PLL_TIMEOUT).map_err(|_| {
            error!("PLL didn't lock");
            RccError::PllTimeout
        })?;

        debug!("PLL locked at {} Hz", cfg.output_hz());
        Ok(())
    }

    /// Stop the PLL and wait for it to report unlocked. Refuses if it's the system clock.
    pub fn disable_pll(&mut self) -> Result<(), RccError> {
        if self.active_source() == ClockSource::Pll {
            warn!("refusing to stop the PLL: it's the system clock");
            return Err(RccError::SourceInUse);
        }

        self.stop_pll()
    }

    fn stop_pll(&mut self) -> Result<(), RccError> {
        self.regs.clear_bits(Reg::Cr, cr::PLLON);

        let regs = &self.regs;
        poll_until(|| regs.bits_clear(Reg::Cr, cr::PLLRDY), PLL_TIMEOUT).map_err(|_| {
            error!("PLL didn't stop");
            RccError::PllTimeout
        })?;

        debug!("PLL stopped");
        Ok(())
    }
}
