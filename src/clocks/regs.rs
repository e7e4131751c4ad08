//! The register bank the clock tree is driven through.
//!
//! Driver code never touches addresses: it reads and writes whole registers by [`Reg`], and the
//! backend maps those to hardware ([`super::hw::PacRegs`]) or to a simulation
//! ([`super::sim::SimRegs`]).

/// Registers used by the clock tree. RCC, plus the FLASH access control register (wait
/// states) and the PWR control register (backup domain write protection).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Reg {
    /// RCC_CR
    Cr,
    /// RCC_CFGR
    Cfgr,
    /// RCC_APB1ENR
    Apb1enr,
    /// RCC_BDCR
    Bdcr,
    /// RCC_CSR
    Csr,
    /// RCC_CFGR2
    Cfgr2,
    /// FLASH_ACR
    FlashAcr,
    /// PWR_CR
    PwrCr,
}

impl Reg {
    pub const COUNT: usize = 8;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Cr,
        Self::Cfgr,
        Self::Apb1enr,
        Self::Bdcr,
        Self::Csr,
        Self::Cfgr2,
        Self::FlashAcr,
        Self::PwrCr,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Whole-register access to the clock tree's registers.
pub trait ClockRegs {
    fn read(&self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);

    /// Read, apply `f`, write back.
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let val = self.read(reg);
        self.write(reg, f(val));
    }

    fn set_bits(&mut self, reg: Reg, mask: u32) {
        self.modify(reg, |v| v | mask);
    }

    fn clear_bits(&mut self, reg: Reg, mask: u32) {
        self.modify(reg, |v| v & !mask);
    }

    fn bits_set(&self, reg: Reg, mask: u32) -> bool {
        self.read(reg) & mask == mask
    }

    fn bits_clear(&self, reg: Reg, mask: u32) -> bool {
        self.read(reg) & mask == 0
    }
}

impl<R: ClockRegs> ClockRegs for &mut R {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// Extract a field. `mask` is the unshifted field mask.
pub(crate) fn field(val: u32, shift: u32, mask: u32) -> u32 {
    (val >> shift) & mask
}

/// Replace a field. `mask` is the unshifted field mask.
pub(crate) fn with_field(val: u32, shift: u32, mask: u32, field: u32) -> u32 {
    (val & !(mask << shift)) | ((field & mask) << shift)
}

// Field positions. RM0091 (STM32F0), which the MS32F0 RCC matches.

pub mod cr {
    pub const HSION: u32 = 1 << 0;
    pub const HSIRDY: u32 = 1 << 1;
    pub const HSEON: u32 = 1 << 16;
    pub const HSERDY: u32 = 1 << 17;
    pub const HSEBYP: u32 = 1 << 18;
    pub const CSSON: u32 = 1 << 19;
    pub const PLLON: u32 = 1 << 24;
    pub const PLLRDY: u32 = 1 << 25;
}

pub mod cfgr {
    pub const SW_SHIFT: u32 = 0;
    pub const SW_MASK: u32 = 0b11;
    pub const SWS_SHIFT: u32 = 2;
    pub const SWS_MASK: u32 = 0b11;
    pub const HPRE_SHIFT: u32 = 4;
    pub const HPRE_MASK: u32 = 0b1111;
    pub const PPRE_SHIFT: u32 = 8;
    pub const PPRE_MASK: u32 = 0b111;
    pub const PLLSRC_SHIFT: u32 = 15;
    pub const PLLSRC_MASK: u32 = 0b11;
    pub const PLLMUL_SHIFT: u32 = 18;
    pub const PLLMUL_MASK: u32 = 0b1111;
}

pub mod cfgr2 {
    pub const PREDIV_SHIFT: u32 = 0;
    pub const PREDIV_MASK: u32 = 0b1111;
}

pub mod apb1enr {
    pub const PWREN: u32 = 1 << 28;
}

pub mod bdcr {
    pub const LSEON: u32 = 1 << 0;
    pub const LSERDY: u32 = 1 << 1;
    pub const LSEBYP: u32 = 1 << 2;
    pub const LSEDRV_SHIFT: u32 = 3;
    pub const LSEDRV_MASK: u32 = 0b11;
    pub const RTCSEL_SHIFT: u32 = 8;
    pub const RTCSEL_MASK: u32 = 0b11;
    pub const RTCEN: u32 = 1 << 15;
    pub const BDRST: u32 = 1 << 16;
}

pub mod csr {
    pub const LSION: u32 = 1 << 0;
    pub const LSIRDY: u32 = 1 << 1;
}

pub mod flash_acr {
    pub const LATENCY_SHIFT: u32 = 0;
    pub const LATENCY_MASK: u32 = 0b111;
    pub const PRFTBE: u32 = 1 << 4;
    pub const PRFTBS: u32 = 1 << 5;
}

pub mod pwr_cr {
    pub const DBP: u32 = 1 << 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_helpers() {
        let v = with_field(0xFFFF_FFFF, cfgr::PLLMUL_SHIFT, cfgr::PLLMUL_MASK, 0b0100);
        assert_eq!(field(v, cfgr::PLLMUL_SHIFT, cfgr::PLLMUL_MASK), 0b0100);
        // Bits outside the field are untouched.
        assert_eq!(v | (0b1111 << 18), 0xFFFF_FFFF);
        assert_eq!(with_field(0, cfgr::SW_SHIFT, cfgr::SW_MASK, 0b110), 0b10);
    }

    #[test]
    fn reg_indices_are_dense() {
        for (i, reg) in Reg::ALL.iter().enumerate() {
            assert_eq!(reg.index(), i);
        }
    }
}
