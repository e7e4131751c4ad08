//! A simulated clock register bank, for exercising the clock tree off-target.
//!
//! Status fields behave the way the silicon's do, evaluated after every write:
//! - Each oscillator's ready flag follows its enable bit.
//! - The PLL locks only while enabled and while its input oscillator is ready.
//! - The switch status field mirrors the source select field, once that source is ready.
//! - FLASH latency reads back what was written; PRFTBS mirrors PRFTBE.
//! - RCC_BDCR ignores writes while PWR_CR.DBP is clear, and PWR_CR ignores writes while the
//!   PWR peripheral clock is off.
//!
//! Any status flag can be frozen to model a part that never becomes ready (or never stops).
//! Every write is logged, and reads are counted, so tests can check ordering and poll budgets.

use core::cell::Cell;

use heapless::Vec;

use super::regs::{
    ClockRegs, Reg, apb1enr, bdcr, cfgr, cr, csr, field, flash_acr, pwr_cr, with_field,
};

/// Writes kept in the log. Later writes are dropped once it's full.
pub const LOG_LEN: usize = 128;

/// A register write, as recorded by [`SimRegs`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegWrite {
    pub reg: Reg,
    pub value: u32,
}

/// A hardware-driven status field that can be frozen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Flag {
    HsiRdy,
    HseRdy,
    LsiRdy,
    LseRdy,
    PllRdy,
    /// System clock switch status.
    Sws,
    /// FLASH latency read-back.
    Latency,
}

impl Flag {
    fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Debug)]
pub struct SimRegs {
    vals: [u32; Reg::COUNT],
    frozen: u8,
    writes: Vec<RegWrite, LOG_LEN>,
    reads: Cell<u32>,
}

impl Default for SimRegs {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRegs {
    /// A register bank in its power-on reset state: HSI on and ready, and selected as the
    /// system clock. Zero wait states, prefetch enabled.
    pub fn new() -> Self {
        let mut vals = [0; Reg::COUNT];
        // HSITRIM resets to 16 (0x80), on top of HSION and HSIRDY.
        vals[Reg::Cr.index()] = 0x80 | cr::HSION | cr::HSIRDY;
        vals[Reg::FlashAcr.index()] = flash_acr::PRFTBE | flash_acr::PRFTBS;

        Self {
            vals,
            frozen: 0,
            writes: Vec::new(),
            reads: Cell::new(0),
        }
    }

    /// Stop `flag` from following the hardware; it keeps its current value.
    pub fn freeze(&mut self, flag: Flag) {
        self.frozen |= flag.mask();
    }

    pub fn thaw(&mut self, flag: Flag) {
        self.frozen &= !flag.mask();
        self.settle();
    }

    fn is_frozen(&self, flag: Flag) -> bool {
        self.frozen & flag.mask() != 0
    }

    /// Every write made through [`ClockRegs::write`] since the last [`Self::clear_log`].
    pub fn writes(&self) -> &[RegWrite] {
        &self.writes
    }

    /// Writes to one register, in order.
    pub fn writes_to(&self, reg: Reg) -> impl Iterator<Item = u32> + '_ {
        self.writes.iter().filter(move |w| w.reg == reg).map(|w| w.value)
    }

    /// Position in the log of the first write for which `pred` holds.
    pub fn position(&self, pred: impl Fn(&RegWrite) -> bool) -> Option<usize> {
        self.writes.iter().position(pred)
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
    }

    /// Reads made through [`ClockRegs::read`] since the last [`Self::reset_read_count`].
    pub fn read_count(&self) -> u32 {
        self.reads.get()
    }

    pub fn reset_read_count(&self) {
        self.reads.set(0);
    }

    /// Read without counting.
    pub fn peek(&self, reg: Reg) -> u32 {
        self.vals[reg.index()]
    }

    /// Set a register directly, bypassing the log and write protection. Status fields are
    /// re-evaluated afterwards. Use this to put the bank in a starting state.
    pub fn poke(&mut self, reg: Reg, value: u32) {
        self.vals[reg.index()] = value;
        self.settle();
    }

    fn reg(&self, reg: Reg) -> u32 {
        self.vals[reg.index()]
    }

    fn update(&mut self, reg: Reg, f: impl FnOnce(u32) -> u32) {
        let i = reg.index();
        self.vals[i] = f(self.vals[i]);
    }

    /// Apply the written value the way the peripheral would.
    fn store(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Bdcr => {
                if self.reg(Reg::PwrCr) & pwr_cr::DBP == 0 {
                    return;
                }
                // While held in reset, the backup domain reads as zero.
                let value = if value & bdcr::BDRST != 0 {
                    bdcr::BDRST
                } else {
                    value
                };
                self.vals[reg.index()] = value;
            }
            Reg::PwrCr => {
                if self.reg(Reg::Apb1enr) & apb1enr::PWREN == 0 {
                    return;
                }
                self.vals[reg.index()] = value;
            }
            Reg::FlashAcr if self.is_frozen(Flag::Latency) => {
                let latency = field(self.reg(reg), flash_acr::LATENCY_SHIFT, flash_acr::LATENCY_MASK);
                self.vals[reg.index()] =
                    with_field(value, flash_acr::LATENCY_SHIFT, flash_acr::LATENCY_MASK, latency);
            }
            _ => self.vals[reg.index()] = value,
        }
    }

    /// Re-evaluate every hardware-driven status field.
    fn settle(&mut self) {
        let rcc_cr = self.reg(Reg::Cr);

        if !self.is_frozen(Flag::HsiRdy) {
            let on = rcc_cr & cr::HSION != 0;
            self.update(Reg::Cr, |v| if on { v | cr::HSIRDY } else { v & !cr::HSIRDY });
        }
        if !self.is_frozen(Flag::HseRdy) {
            let on = rcc_cr & cr::HSEON != 0;
            self.update(Reg::Cr, |v| if on { v | cr::HSERDY } else { v & !cr::HSERDY });
        }
        if !self.is_frozen(Flag::LsiRdy) {
            let on = self.reg(Reg::Csr) & csr::LSION != 0;
            self.update(Reg::Csr, |v| if on { v | csr::LSIRDY } else { v & !csr::LSIRDY });
        }
        if !self.is_frozen(Flag::LseRdy) {
            let on = self.reg(Reg::Bdcr) & bdcr::LSEON != 0;
            self.update(Reg::Bdcr, |v| if on { v | bdcr::LSERDY } else { v & !bdcr::LSERDY });
        }

        let cfg = self.reg(Reg::Cfgr);
        let rcc_cr = self.reg(Reg::Cr);

        if !self.is_frozen(Flag::PllRdy) {
            let input_ready = match field(cfg, cfgr::PLLSRC_SHIFT, cfgr::PLLSRC_MASK) {
                0b10 => rcc_cr & cr::HSERDY != 0,
                _ => rcc_cr & cr::HSIRDY != 0,
            };
            let locked = rcc_cr & cr::PLLON != 0 && input_ready;
            self.update(Reg::Cr, |v| if locked { v | cr::PLLRDY } else { v & !cr::PLLRDY });
        }

        if !self.is_frozen(Flag::Sws) {
            let rcc_cr = self.reg(Reg::Cr);
            let sw = field(cfg, cfgr::SW_SHIFT, cfgr::SW_MASK);
            let ready = match sw {
                0b00 => rcc_cr & cr::HSIRDY != 0,
                0b01 => rcc_cr & cr::HSERDY != 0,
                0b10 => rcc_cr & cr::PLLRDY != 0,
                _ => false,
            };
            if ready {
                self.update(Reg::Cfgr, |v| with_field(v, cfgr::SWS_SHIFT, cfgr::SWS_MASK, sw));
            }
        }

        self.update(Reg::FlashAcr, |v| {
            if v & flash_acr::PRFTBE != 0 {
                v | flash_acr::PRFTBS
            } else {
                v & !flash_acr::PRFTBS
            }
        });
    }
}

impl ClockRegs for SimRegs {
    fn read(&self, reg: Reg) -> u32 {
        self.reads.set(self.reads.get().saturating_add(1));
        self.reg(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        let _ = self.writes.push(RegWrite { reg, value });
        self.store(reg, value);
        self.settle();
    }
}
