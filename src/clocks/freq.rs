//! Clock frequency calculation. Pure functions over register values; nothing is cached, so a
//! query always reflects the registers as they are now.

use super::{
    HSI_FREQ, Rcc,
    pll::{PllMul, PllSrc, Prediv},
    regs::{ClockRegs, Reg, cfgr, cfgr2, field},
    sysclk::ClockSource,
};
use crate::{HSE_FREQ, traits::ClockCfg};

/// Right shift for each RCC_CFGR HPRE code. Codes below 0b1000 don't divide.
pub const AHB_SHIFT: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 6, 7, 8, 9];
/// Right shift for each RCC_CFGR PPRE code. Codes below 0b100 don't divide.
pub const APB_SHIFT: [u8; 8] = [0, 0, 0, 0, 1, 2, 3, 4];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Division factor for the AHB clock. Also known as AHB Prescaler.
pub enum HclkPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl HclkPrescaler {
    pub fn value(&self) -> u16 {
        1 << self.shift()
    }

    pub fn shift(&self) -> u8 {
        AHB_SHIFT[*self as usize]
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 0b1111 {
            0b1000 => Self::Div2,
            0b1001 => Self::Div4,
            0b1010 => Self::Div8,
            0b1011 => Self::Div16,
            0b1100 => Self::Div64,
            0b1101 => Self::Div128,
            0b1110 => Self::Div256,
            0b1111 => Self::Div512,
            _ => Self::Div1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// For use with `RCC_CFGR`, `PPRE` field: the APB1 prescaler.
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    pub fn value(&self) -> u8 {
        1 << self.shift()
    }

    pub fn shift(&self) -> u8 {
        APB_SHIFT[*self as usize]
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0b100 => Self::Div2,
            0b101 => Self::Div4,
            0b110 => Self::Div8,
            0b111 => Self::Div16,
            _ => Self::Div1,
        }
    }
}

/// PLL output for a given input, in Hz. The pre-divider truncates, the way the hardware does.
pub fn pll_output_hz(input_hz: u32, prediv: Prediv, mul: PllMul) -> u32 {
    input_hz / prediv.value() as u32 * mul.value() as u32
}

pub fn hclk_hz(sysclk_hz: u32, prescaler: HclkPrescaler) -> u32 {
    sysclk_hz >> prescaler.shift()
}

pub fn pclk_hz(hclk_hz: u32, prescaler: ApbPrescaler) -> u32 {
    hclk_hz >> prescaler.shift()
}

/// Frequency of a system clock source, given the PLL settings in `cfgr`/`cfgr2`.
pub(crate) fn source_hz(src: ClockSource, cfgr_val: u32, cfgr2_val: u32) -> u32 {
    match src {
        ClockSource::Hsi => HSI_FREQ,
        ClockSource::Hse => HSE_FREQ,
        ClockSource::Pll => {
            let pll_src = PllSrc::from_bits(field(cfgr_val, cfgr::PLLSRC_SHIFT, cfgr::PLLSRC_MASK));
            let prediv = Prediv::from_bits(field(cfgr2_val, cfgr2::PREDIV_SHIFT, cfgr2::PREDIV_MASK));
            let mul = PllMul::from_bits(field(cfgr_val, cfgr::PLLMUL_SHIFT, cfgr::PLLMUL_MASK));
            pll_output_hz(pll_src.input_hz(), prediv, mul)
        }
    }
}

/// System and bus clock speeds, in Hz, as configured in the registers at the time of reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockFreqs {
    pub sysclk: u32,
    pub hclk: u32,
    pub pclk1: u32,
}

impl ClockFreqs {
    /// Compute the clock speeds from the current register contents. An unrecognized switch
    /// status reads as HSI.
    pub fn read<R: ClockRegs>(regs: &R) -> Self {
        let cfg = regs.read(Reg::Cfgr);
        let cfg2 = regs.read(Reg::Cfgr2);

        let src = ClockSource::from_bits(field(cfg, cfgr::SWS_SHIFT, cfgr::SWS_MASK))
            .unwrap_or(ClockSource::Hsi);
        let sysclk = source_hz(src, cfg, cfg2);
        let hclk = sysclk >> AHB_SHIFT[field(cfg, cfgr::HPRE_SHIFT, cfgr::HPRE_MASK) as usize];
        let pclk1 = hclk >> APB_SHIFT[field(cfg, cfgr::PPRE_SHIFT, cfgr::PPRE_MASK) as usize];

        Self { sysclk, hclk, pclk1 }
    }
}

impl ClockCfg for ClockFreqs {
    fn sysclk(&self) -> u32 {
        self.sysclk
    }

    fn hclk(&self) -> u32 {
        self.hclk
    }

    fn apb1(&self) -> u32 {
        self.pclk1
    }
}

impl<R: ClockRegs> Rcc<R> {
    /// Current system, AHB and APB1 clock speeds, read from the registers.
    pub fn frequencies(&self) -> ClockFreqs {
        ClockFreqs::read(&self.regs)
    }

    pub fn hclk_prescaler(&self) -> HclkPrescaler {
        HclkPrescaler::from_bits(field(self.regs.read(Reg::Cfgr), cfgr::HPRE_SHIFT, cfgr::HPRE_MASK))
    }

    pub fn apb1_prescaler(&self) -> ApbPrescaler {
        ApbPrescaler::from_bits(field(self.regs.read(Reg::Cfgr), cfgr::PPRE_SHIFT, cfgr::PPRE_MASK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HCLK_PRESCALERS: [HclkPrescaler; 9] = [
        HclkPrescaler::Div1,
        HclkPrescaler::Div2,
        HclkPrescaler::Div4,
        HclkPrescaler::Div8,
        HclkPrescaler::Div16,
        HclkPrescaler::Div64,
        HclkPrescaler::Div128,
        HclkPrescaler::Div256,
        HclkPrescaler::Div512,
    ];

    #[test]
    fn divider_values() {
        let values: std::vec::Vec<u16> = HCLK_PRESCALERS.iter().map(|p| p.value()).collect();
        assert_eq!(values, [1, 2, 4, 8, 16, 64, 128, 256, 512]);
        assert_eq!(ApbPrescaler::Div16.value(), 16);
    }

    #[test]
    fn shift_matches_literal_division() {
        assert_eq!(hclk_hz(48_000_000, HclkPrescaler::Div2), 24_000_000);
        assert_eq!(hclk_hz(48_000_000, HclkPrescaler::Div16), 3_000_000);
        assert_eq!(pclk_hz(24_000_000, ApbPrescaler::Div4), 6_000_000);
        // Truncates rather than rounds.
        assert_eq!(hclk_hz(1_000_001, HclkPrescaler::Div2), 500_000);
    }

    #[test]
    fn pll_formula() {
        assert_eq!(pll_output_hz(8_000_000, Prediv::Div2, PllMul::Mul12), 48_000_000);
        assert_eq!(pll_output_hz(HSI_FREQ / 2, Prediv::Div1, PllMul::Mul12), 48_000_000);
        assert_eq!(pll_output_hz(8_000_000, Prediv::Div1, PllMul::Mul6), 48_000_000);
        // Pre-divider output truncates before the multiply.
        assert_eq!(pll_output_hz(8_000_000, Prediv::Div3, PllMul::Mul3), 7_999_998);
    }

    #[test]
    fn prescaler_codes_round_trip() {
        for p in HCLK_PRESCALERS {
            assert_eq!(HclkPrescaler::from_bits(p as u32), p);
        }
        // Undivided codes all read as Div1.
        assert_eq!(HclkPrescaler::from_bits(0b0111), HclkPrescaler::Div1);
        assert_eq!(ApbPrescaler::from_bits(0b011), ApbPrescaler::Div1);
    }
}
