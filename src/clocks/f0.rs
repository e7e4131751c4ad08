//! Whole clock tree configuration, built from the oscillator, PLL and switch steps.

use super::{
    HSI_FREQ, Rcc, RccError,
    freq::{self, ApbPrescaler, HclkPrescaler},
    osc::{OscState, Oscillator},
    pll::{PllConfig, PllMul, PllSrc, Prediv},
    regs::{ClockRegs, Reg, cr},
    sysclk::ClockSource,
};
use crate::{HSE_FREQ, traits::ClockCfg};

/// Highest SYSCLK, HCLK and PCLK this family supports.
pub const MAX_SYSCLK: u32 = 48_000_000;
/// RM0091, 6.2.3: PLL output range.
pub const PLL_OUT_MIN: u32 = 16_000_000;
pub const PLL_OUT_MAX: u32 = 48_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The system clock's input: an oscillator directly, or the PLL from one.
pub enum InputSrc {
    Hsi,
    Hse,
    Pll(PllSrc),
}

impl InputSrc {
    pub fn source(&self) -> ClockSource {
        match self {
            Self::Hsi => ClockSource::Hsi,
            Self::Hse => ClockSource::Hse,
            Self::Pll(_) => ClockSource::Pll,
        }
    }

    /// The oscillator that has to run for this input.
    pub fn oscillator(&self) -> Oscillator {
        match self {
            Self::Hsi => Oscillator::Hsi,
            Self::Hse => Oscillator::Hse,
            Self::Pll(src) => src.oscillator(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Settings used to configure clocks.
pub struct Clocks {
    pub input_src: InputSrc,
    /// Input source predivision, for PLL.
    pub prediv: Prediv,
    /// PLL multiplier: SYSCLK speed is input source / prediv × this value.
    pub pll_mul: PllMul,
    /// The AHB clock divider.
    pub hclk_prescaler: HclkPrescaler,
    /// APB1 divider, for the peripheral bus.
    pub apb1_prescaler: ApbPrescaler,
    // Bypass the HSE output, for use with oscillators that don't need it. Saves power, and
    // frees up the pin for use as GPIO.
    pub hse_bypass: bool,
    pub security_system: bool,
}

impl Clocks {
    /// Apply this configuration: start the input oscillator, lock the PLL if used, and switch
    /// the system clock, with FLASH wait states kept safe throughout. Returns `Speed`, and
    /// changes nothing, if the config is out of range.
    ///
    /// If the PLL currently drives the system clock, the system clock moves to HSI while
    /// the PLL is reconfigured. The same goes for a HSE whose bypass setting changes while
    /// it drives the system clock or feeds the PLL.
    pub fn setup<R: ClockRegs>(&self, rcc: &mut Rcc<R>) -> Result<(), RccError> {
        self.validate_speeds()?;

        if self.hse_bypass_changes(rcc) && rcc.oscillator_in_use(Oscillator::Hse) {
            self.release_hse(rcc)?;
        }

        self.start_input(rcc)?;

        if let InputSrc::Pll(src) = self.input_src {
            if rcc.active_source() == ClockSource::Pll {
                rcc.set_oscillator_state(Oscillator::Hsi, OscState::On)?;
                rcc.switch_system_clock(
                    ClockSource::Hsi,
                    rcc.hclk_prescaler(),
                    rcc.apb1_prescaler(),
                )?;
            }

            rcc.configure_pll(&PllConfig {
                enabled: true,
                src,
                prediv: self.prediv,
                mul: self.pll_mul,
            })?;
        }

        rcc.switch_system_clock(
            self.input_src.source(),
            self.hclk_prescaler,
            self.apb1_prescaler,
        )?;

        if !matches!(self.input_src, InputSrc::Pll(_)) && rcc.pll_enabled() {
            rcc.disable_pll()?;
        }

        if self.security_system {
            rcc.enable_css();
        } else {
            rcc.disable_css();
        }

        info!("clocks set up. sysclk: {} Hz", self.sysclk());
        Ok(())
    }

    /// Re-select the input source; used after Stop mode, where the system reverts to HSI
    /// with the HSE and PLL off. PLL settings survive Stop, so they aren't rewritten.
    pub fn reselect_input<R: ClockRegs>(&self, rcc: &mut Rcc<R>) -> Result<(), RccError> {
        self.start_input(rcc)?;

        if let InputSrc::Pll(src) = self.input_src {
            if !rcc.pll_ready() {
                rcc.configure_pll(&PllConfig {
                    enabled: true,
                    src,
                    prediv: self.prediv,
                    mul: self.pll_mul,
                })?;
            }
        }

        rcc.switch_system_clock(
            self.input_src.source(),
            self.hclk_prescaler,
            self.apb1_prescaler,
        )
    }

    /// The HSE is the input, running, with the other bypass setting. Bypass can only change
    /// while it's stopped.
    fn hse_bypass_changes<R: ClockRegs>(&self, rcc: &Rcc<R>) -> bool {
        self.input_src.oscillator() == Oscillator::Hse
            && !rcc.regs.bits_clear(Reg::Cr, cr::HSEON | cr::HSERDY)
            && rcc.regs.bits_set(Reg::Cr, cr::HSEBYP) != self.hse_bypass
    }

    /// Move the system clock to HSI, and stop the PLL if it runs from the HSE, so the HSE
    /// can be stopped.
    fn release_hse<R: ClockRegs>(&self, rcc: &mut Rcc<R>) -> Result<(), RccError> {
        if rcc.active_source() != ClockSource::Hsi {
            rcc.set_oscillator_state(Oscillator::Hsi, OscState::On)?;
            rcc.switch_system_clock(
                ClockSource::Hsi,
                rcc.hclk_prescaler(),
                rcc.apb1_prescaler(),
            )?;
        }

        if rcc.pll_enabled() && rcc.pll_source() == PllSrc::Hse {
            rcc.disable_pll()?;
        }

        debug!("HSE released for a bypass change");
        Ok(())
    }

    fn start_input<R: ClockRegs>(&self, rcc: &mut Rcc<R>) -> Result<(), RccError> {
        let osc = self.input_src.oscillator();
        let state = if osc == Oscillator::Hse && self.hse_bypass {
            OscState::Bypass
        } else {
            OscState::On
        };
        rcc.set_oscillator_state(osc, state)
    }

    /// Check the config against this family's limits: SYSCLK at most 48Mhz, and the PLL
    /// output, if used, within 16 to 48Mhz.
    pub fn validate_speeds(&self) -> Result<(), RccError> {
        if self.sysclk() > MAX_SYSCLK {
            return Err(RccError::Speed);
        }

        if let InputSrc::Pll(_) = self.input_src {
            if !(PLL_OUT_MIN..=PLL_OUT_MAX).contains(&self.sysclk()) {
                return Err(RccError::Speed);
            }
        }

        Ok(())
    }

    /// This preset configures clocks with the HSI through the PLL: a 48Mhz sysclk. All
    /// peripheral clocks are at 48Mhz.
    pub fn hsi_preset() -> Self {
        Self {
            input_src: InputSrc::Pll(PllSrc::HsiDiv2),
            prediv: Prediv::Div1,
            pll_mul: PllMul::Mul12,
            hclk_prescaler: HclkPrescaler::Div1,
            apb1_prescaler: ApbPrescaler::Div1,
            hse_bypass: false,
            security_system: false,
        }
    }

    /// HSI directly, at 8Mhz, with no PLL. The state out of reset.
    pub fn hsi_8mhz() -> Self {
        Self {
            input_src: InputSrc::Hsi,
            ..Self::hsi_preset()
        }
    }
}

impl ClockCfg for Clocks {
    fn sysclk(&self) -> u32 {
        match self.input_src {
            InputSrc::Hsi => HSI_FREQ,
            InputSrc::Hse => HSE_FREQ,
            InputSrc::Pll(src) => freq::pll_output_hz(src.input_hz(), self.prediv, self.pll_mul),
        }
    }

    fn hclk(&self) -> u32 {
        freq::hclk_hz(self.sysclk(), self.hclk_prescaler)
    }

    fn apb1(&self) -> u32 {
        freq::pclk_hz(self.hclk(), self.apb1_prescaler)
    }
}

impl Default for Clocks {
    /// This default configures clocks with a HSE and the PLL: a 48Mhz sysclk. All
    /// peripheral clocks are at 48Mhz. HSE output is not bypassed.
    fn default() -> Self {
        Self {
            input_src: InputSrc::Pll(PllSrc::Hse),
            prediv: Prediv::Div1,
            pll_mul: PllMul::Mul6,
            hclk_prescaler: HclkPrescaler::Div1,
            apb1_prescaler: ApbPrescaler::Div1,
            hse_bypass: false,
            security_system: false,
        }
    }
}

impl<R: ClockRegs> Rcc<R> {
    /// Return the clock tree to its reset configuration: system clock on HSI, undivided
    /// buses, zero wait states, PLL and HSE off, and the clock security system disabled.
    pub fn reset_clocks(&mut self) -> Result<(), RccError> {
        self.set_oscillator_state(Oscillator::Hsi, OscState::On)?;
        self.switch_system_clock(ClockSource::Hsi, HclkPrescaler::Div1, ApbPrescaler::Div1)?;
        self.disable_css();
        self.disable_pll()?;
        self.set_oscillator_state(Oscillator::Hse, OscState::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clocks::{
        WaitState,
        sim::{Flag, SimRegs},
    };

    #[test]
    fn preset_speeds() {
        let cfg = Clocks::default();
        assert_eq!(cfg.sysclk(), 48_000_000);
        assert_eq!(cfg.apb1_timer(), 48_000_000);

        let cfg = Clocks::hsi_preset();
        assert_eq!(cfg.sysclk(), 48_000_000);
        assert!(cfg.validate_speeds().is_ok());

        let cfg = Clocks {
            apb1_prescaler: ApbPrescaler::Div2,
            ..Clocks::hsi_preset()
        };
        assert_eq!(cfg.apb1(), 24_000_000);
        assert_eq!(cfg.apb1_timer(), 48_000_000);
    }

    #[test]
    fn out_of_range_is_rejected_before_any_write() {
        let mut rcc = Rcc::new(SimRegs::new());

        let too_fast = Clocks {
            pll_mul: PllMul::Mul16,
            ..Clocks::hsi_preset()
        };
        assert_eq!(too_fast.setup(&mut rcc), Err(RccError::Speed));

        let too_slow = Clocks {
            pll_mul: PllMul::Mul2,
            ..Clocks::hsi_preset()
        };
        assert_eq!(too_slow.validate_speeds(), Err(RccError::Speed));

        assert!(rcc.regs().writes().is_empty());
    }

    #[test]
    fn setup_hsi_preset() {
        let mut rcc = Rcc::new(SimRegs::new());
        Clocks::hsi_preset().setup(&mut rcc).unwrap();

        assert_eq!(rcc.active_source(), ClockSource::Pll);
        assert_eq!(rcc.frequencies().sysclk, 48_000_000);
        assert_eq!(rcc.wait_states(), WaitState::W1);
        assert!(!rcc.oscillator_ready(Oscillator::Hse));
    }

    #[test]
    fn setup_from_running_pll() {
        let mut rcc = Rcc::new(SimRegs::new());
        Clocks::hsi_preset().setup(&mut rcc).unwrap();

        let cfg = Clocks {
            pll_mul: PllMul::Mul8,
            ..Clocks::hsi_preset()
        };
        cfg.setup(&mut rcc).unwrap();

        assert_eq!(rcc.active_source(), ClockSource::Pll);
        assert_eq!(rcc.frequencies().sysclk, 32_000_000);
    }

    #[test]
    fn setup_hse_direct_stops_pll() {
        let mut rcc = Rcc::new(SimRegs::new());
        Clocks::hsi_preset().setup(&mut rcc).unwrap();

        let cfg = Clocks {
            input_src: InputSrc::Hse,
            hse_bypass: true,
            security_system: true,
            ..Clocks::default()
        };
        cfg.setup(&mut rcc).unwrap();

        assert_eq!(rcc.active_source(), ClockSource::Hse);
        assert!(!rcc.pll_enabled());
        assert!(rcc.regs().bits_set(Reg::Cr, cr::HSEBYP | cr::CSSON));
        assert_eq!(rcc.wait_states(), WaitState::W0);
    }

    #[test]
    fn hse_bypass_change_while_pll_runs_from_it() {
        let mut rcc = Rcc::new(SimRegs::new());
        Clocks::default().setup(&mut rcc).unwrap();

        let cfg = Clocks {
            hse_bypass: true,
            ..Clocks::default()
        };
        cfg.setup(&mut rcc).unwrap();

        assert_eq!(rcc.active_source(), ClockSource::Pll);
        assert_eq!(rcc.pll_source(), PllSrc::Hse);
        assert!(rcc.regs().bits_set(Reg::Cr, cr::HSEBYP | cr::HSERDY));
        assert_eq!(rcc.frequencies().sysclk, 48_000_000);

        // HSEBYP was only written while the HSE was stopped.
        let sim = rcc.regs();
        let stop = sim.position(|w| w.reg == Reg::Cr && w.value & cr::HSEON == 0).unwrap();
        let byp = sim
            .position(|w| w.reg == Reg::Cr && w.value & cr::HSEBYP != 0)
            .unwrap();
        assert!(stop < byp);
        assert_eq!(sim.writes()[byp].value & (cr::HSEON | cr::HSERDY), 0);
    }

    #[test]
    fn hse_bypass_change_while_hse_is_sysclk() {
        let mut rcc = Rcc::new(SimRegs::new());
        let direct = Clocks {
            input_src: InputSrc::Hse,
            ..Clocks::default()
        };
        direct.setup(&mut rcc).unwrap();

        let cfg = Clocks {
            hse_bypass: true,
            ..direct
        };
        cfg.setup(&mut rcc).unwrap();
        assert_eq!(rcc.active_source(), ClockSource::Hse);
        assert!(rcc.regs().bits_set(Reg::Cr, cr::HSEBYP));

        // And back.
        direct.setup(&mut rcc).unwrap();
        assert_eq!(rcc.active_source(), ClockSource::Hse);
        assert!(rcc.regs().bits_clear(Reg::Cr, cr::HSEBYP));
    }

    #[test]
    fn reselect_after_stop() {
        let mut rcc = Rcc::new(SimRegs::new());
        let cfg = Clocks::default();
        cfg.setup(&mut rcc).unwrap();

        // Waking from Stop: back on HSI, HSE and PLL off, PLL settings kept.
        let sim = rcc.regs();
        let cfgr = sim.peek(Reg::Cfgr) & !0b1111;
        let cr = sim.peek(Reg::Cr) & !(cr::HSEON | cr::PLLON);
        let mut sim = Rcc::free(rcc);
        sim.poke(Reg::Cfgr, cfgr);
        sim.poke(Reg::Cr, cr);
        let mut rcc = Rcc::new(sim);
        assert_eq!(rcc.active_source(), ClockSource::Hsi);

        cfg.reselect_input(&mut rcc).unwrap();
        assert_eq!(rcc.active_source(), ClockSource::Pll);
        assert_eq!(rcc.frequencies().hclk, 48_000_000);
    }

    #[test]
    fn reset_to_defaults() {
        let mut rcc = Rcc::new(SimRegs::new());
        Clocks {
            security_system: true,
            ..Clocks::default()
        }
        .setup(&mut rcc)
        .unwrap();

        rcc.reset_clocks().unwrap();

        assert_eq!(rcc.active_source(), ClockSource::Hsi);
        assert_eq!(rcc.frequencies().sysclk, HSI_FREQ);
        assert_eq!(rcc.wait_states(), WaitState::W0);
        assert!(rcc.regs().bits_clear(Reg::Cr, cr::PLLON | cr::HSEON | cr::CSSON));
    }

    #[test]
    fn hse_failure_aborts_setup() {
        let mut rcc = Rcc::new(SimRegs::new());
        rcc.regs.freeze(Flag::HseRdy);

        assert_eq!(
            Clocks::default().setup(&mut rcc),
            Err(RccError::OscillatorTimeout(Oscillator::Hse))
        );
        assert_eq!(rcc.active_source(), ClockSource::Hsi);
        assert!(!rcc.pll_enabled());
    }
}
