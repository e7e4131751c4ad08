//! System clock switching, bus prescalers, and FLASH wait states.
//!
//! RM0091, 3.5.1: FLASH wait states must be increased before raising the HCLK frequency,
//! and may only be decreased after it has been lowered. Otherwise the core can fetch from
//! FLASH faster than the array allows, for as long as the two disagree.

use super::{
    LATENCY_TIMEOUT, Rcc, RccError, SWITCH_TIMEOUT,
    freq::{self, ApbPrescaler, HclkPrescaler},
    regs::{ClockRegs, Reg, cfgr, cr, field, flash_acr, with_field},
};
use crate::util::poll_until;

/// A system clock source. Exactly one is active; HSI out of reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockSource {
    Hsi = 0b00,
    Hse = 0b01,
    Pll = 0b10,
}

impl ClockSource {
    /// From the RCC_CFGR SW or SWS field.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0b00 => Some(Self::Hsi),
            0b01 => Some(Self::Hse),
            0b10 => Some(Self::Pll),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Represents Flash wait states in the FLASH_ACR register.
pub enum WaitState {
    W0 = 0,
    W1 = 1,
}

impl WaitState {
    /// Wait states needed at a given HCLK. RM0091, 3.5.1.
    pub fn for_hclk(hclk: u32) -> Self {
        if hclk <= 24_000_000 {
            Self::W0
        } else {
            Self::W1
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::W0,
            _ => Self::W1,
        }
    }
}

impl<R: ClockRegs> Rcc<R> {
    /// The source currently driving the system clock, per the switch status. An unrecognized
    /// status reads as HSI.
    pub fn active_source(&self) -> ClockSource {
        let sws = field(self.regs.read(Reg::Cfgr), cfgr::SWS_SHIFT, cfgr::SWS_MASK);
        ClockSource::from_bits(sws).unwrap_or(ClockSource::Hsi)
    }

    pub fn source_ready(&self, src: ClockSource) -> bool {
        let rdy = match src {
            ClockSource::Hsi => cr::HSIRDY,
            ClockSource::Hse => cr::HSERDY,
            ClockSource::Pll => cr::PLLRDY,
        };
        self.regs.bits_set(Reg::Cr, rdy)
    }

    pub fn wait_states(&self) -> WaitState {
        let acr = self.regs.read(Reg::FlashAcr);
        WaitState::from_bits(field(acr, flash_acr::LATENCY_SHIFT, flash_acr::LATENCY_MASK))
    }

    /// Write the FLASH latency, with the prefetch buffer on, and wait until it reads back.
    pub fn set_wait_states(&mut self, ws: WaitState) -> Result<(), RccError> {
        self.regs.modify(Reg::FlashAcr, |v| {
            with_field(v, flash_acr::LATENCY_SHIFT, flash_acr::LATENCY_MASK, ws as u32)
                | flash_acr::PRFTBE
        });

        let regs = &self.regs;
        poll_until(
            || {
                let acr = regs.read(Reg::FlashAcr);
                field(acr, flash_acr::LATENCY_SHIFT, flash_acr::LATENCY_MASK) == ws as u32
            },
            LATENCY_TIMEOUT,
        )
        .map_err(|_| {
            error!("FLASH latency stuck; wanted {:?}", ws);
            RccError::FlashLatency
        })?;

        debug!("FLASH wait states: {:?}", ws);
        Ok(())
    }

    /// Switch the system clock to `target`, then set the AHB and APB1 prescalers.
    ///
    /// `target` must already be ready (`SourceNotReady` otherwise, with nothing written).
    /// FLASH wait states are raised before the switch if the core clock can go up at any
    /// point during it, and lowered only once the new clock and prescalers are in place.
    ///
    /// If the switch status never reflects `target`, this returns `ClockSwitchTimeout` and
    /// leaves any wait state increase in place.
    pub fn switch_system_clock(
        &mut self,
        target: ClockSource,
        ahb: HclkPrescaler,
        apb1: ApbPrescaler,
    ) -> Result<(), RccError> {
        if !self.source_ready(target) {
            warn!("can't switch to {:?}: not ready", target);
            return Err(RccError::SourceNotReady);
        }

        let cfg = self.regs.read(Reg::Cfgr);
        let target_hz = freq::source_hz(target, cfg, self.regs.read(Reg::Cfgr2));
        let current_hclk = self.frequencies().hclk;
        let prospective_hclk = freq::hclk_hz(target_hz, ahb);

        // Prescalers are written after the switch, so right after it HCLK is the new source
        // through the old AHB prescaler.
        let transient_hclk = freq::hclk_hz(target_hz, self.hclk_prescaler());
        let peak_hclk = prospective_hclk.max(transient_hclk);

        if peak_hclk > current_hclk {
            let needed = WaitState::for_hclk(peak_hclk);
            if needed > self.wait_states() {
                self.set_wait_states(needed)?;
            }
        }

        self.regs.modify(Reg::Cfgr, |v| {
            with_field(v, cfgr::SW_SHIFT, cfgr::SW_MASK, target as u32)
        });

        let regs = &self.regs;
        poll_until(
            || field(regs.read(Reg::Cfgr), cfgr::SWS_SHIFT, cfgr::SWS_MASK) == target as u32,
            SWITCH_TIMEOUT,
        )
        .map_err(|_| {
            error!("system clock switch to {:?} timed out", target);
            RccError::ClockSwitchTimeout
        })?;

        self.regs.modify(Reg::Cfgr, |v| {
            let v = with_field(v, cfgr::HPRE_SHIFT, cfgr::HPRE_MASK, ahb as u32);
            with_field(v, cfgr::PPRE_SHIFT, cfgr::PPRE_MASK, apb1 as u32)
        });

        let needed = WaitState::for_hclk(prospective_hclk);
        if needed < self.wait_states() {
            self.set_wait_states(needed)?;
        }

        info!(
            "sysclk: {:?}, {} Hz; hclk {} Hz",
            target,
            target_hz,
            prospective_hclk
        );
        Ok(())
    }
}
