//! Register access on the MCU, through the PAC.

use cortex_m::asm;

use super::{
    Rcc,
    regs::{ClockRegs, Reg},
};
use crate::pac::{FLASH, PWR, RCC};

/// The RCC, FLASH and PWR peripherals, as a clock register bank.
pub struct PacRegs {
    rcc: RCC,
    flash: FLASH,
    pwr: PWR,
}

impl PacRegs {
    /// Give back the peripherals.
    pub fn free(self) -> (RCC, FLASH, PWR) {
        (self.rcc, self.flash, self.pwr)
    }
}

impl core::fmt::Debug for PacRegs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PacRegs")
    }
}

impl ClockRegs for PacRegs {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Cr => self.rcc.cr.read().bits(),
            Reg::Cfgr => self.rcc.cfgr.read().bits(),
            Reg::Apb1enr => self.rcc.apb1enr.read().bits(),
            Reg::Bdcr => self.rcc.bdcr.read().bits(),
            Reg::Csr => self.rcc.csr.read().bits(),
            Reg::Cfgr2 => self.rcc.cfgr2.read().bits(),
            Reg::FlashAcr => self.flash.acr.read().bits(),
            Reg::PwrCr => self.pwr.cr.read().bits(),
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Cr => self.rcc.cr.write(|w| unsafe { w.bits(value) }),
            Reg::Cfgr => self.rcc.cfgr.write(|w| unsafe { w.bits(value) }),
            Reg::Apb1enr => self.rcc.apb1enr.write(|w| unsafe { w.bits(value) }),
            Reg::Bdcr => self.rcc.bdcr.write(|w| unsafe { w.bits(value) }),
            Reg::Csr => self.rcc.csr.write(|w| unsafe { w.bits(value) }),
            Reg::Cfgr2 => self.rcc.cfgr2.write(|w| unsafe { w.bits(value) }),
            Reg::FlashAcr => {
                self.flash.acr.write(|w| unsafe { w.bits(value) });
                // Let the latency write land before the next instruction fetch.
                asm::dsb();
            }
            Reg::PwrCr => self.pwr.cr.write(|w| unsafe { w.bits(value) }),
        }
    }
}

/// Extension trait for RCC
pub trait RccExt {
    /// Constrain the peripheral, along with the FLASH and PWR blocks the clock tree needs.
    /// Registers are left as they are.
    fn constrain(self, flash: FLASH, pwr: PWR) -> Rcc<PacRegs>;
}

impl RccExt for RCC {
    fn constrain(self, flash: FLASH, pwr: PWR) -> Rcc<PacRegs> {
        Rcc::new(PacRegs {
            rcc: self,
            flash,
            pwr,
        })
    }
}
