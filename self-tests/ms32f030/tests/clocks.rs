// On-target tests for the clock tree. They run from the HSI, so no crystal is required, except
// for `hse_pll_48mhz`, which expects an 8Mhz crystal on OSC_IN/OSC_OUT.

#![deny(warnings)]
#![no_std]
#![no_main]

#[cfg(test)]
#[embedded_test::tests(setup = rtt_target::rtt_init_defmt!())]
mod tests {
    use hal::{
        clocks::{
            ApbPrescaler, ClockSource, Clocks, HclkPrescaler, OscState, Oscillator, PacRegs,
            Rcc, RccError, RccExt, WaitState, HSI_FREQ,
        },
        pac,
    };

    struct State {
        rcc: Rcc<PacRegs>,
    }

    #[init]
    fn init() -> State {
        let dp = unsafe { pac::Peripherals::steal() };
        let mut rcc = dp.RCC.constrain(dp.FLASH, dp.PWR);
        // Each test starts from the reset clock tree.
        rcc.reset_clocks().unwrap();
        State { rcc }
    }

    #[test]
    fn reset_state(state: State) {
        let freqs = state.rcc.frequencies();
        defmt::assert_eq!(state.rcc.active_source(), ClockSource::Hsi);
        defmt::assert_eq!(freqs.sysclk, HSI_FREQ);
        defmt::assert_eq!(freqs.pclk1, HSI_FREQ);
        defmt::assert_eq!(state.rcc.wait_states(), WaitState::W0);
    }

    #[test]
    fn hsi_pll_48mhz(mut state: State) {
        Clocks::hsi_preset().setup(&mut state.rcc).unwrap();

        let freqs = state.rcc.frequencies();
        defmt::assert_eq!(state.rcc.active_source(), ClockSource::Pll);
        defmt::assert_eq!(freqs.hclk, 48_000_000);
        defmt::assert_eq!(state.rcc.wait_states(), WaitState::W1);
    }

    #[test]
    fn hse_pll_48mhz(mut state: State) {
        Clocks::default().setup(&mut state.rcc).unwrap();

        defmt::assert!(state.rcc.oscillator_ready(Oscillator::Hse));
        defmt::assert_eq!(state.rcc.frequencies().sysclk, 48_000_000);
    }

    #[test]
    fn bus_prescalers(mut state: State) {
        state
            .rcc
            .switch_system_clock(ClockSource::Hsi, HclkPrescaler::Div2, ApbPrescaler::Div4)
            .unwrap();

        let freqs = state.rcc.frequencies();
        defmt::assert_eq!(freqs.hclk, HSI_FREQ / 2);
        defmt::assert_eq!(freqs.pclk1, HSI_FREQ / 8);
    }

    #[test]
    fn active_source_cant_stop(mut state: State) {
        defmt::assert_eq!(
            state.rcc.set_oscillator_state(Oscillator::Hsi, OscState::Off),
            Err(RccError::SourceInUse)
        );
        defmt::assert!(state.rcc.oscillator_ready(Oscillator::Hsi));
    }

    #[test]
    fn lsi_on_off(mut state: State) {
        state.rcc.set_oscillator_state(Oscillator::Lsi, OscState::On).unwrap();
        defmt::assert!(state.rcc.oscillator_ready(Oscillator::Lsi));

        state.rcc.set_oscillator_state(Oscillator::Lsi, OscState::Off).unwrap();
        defmt::assert!(!state.rcc.oscillator_ready(Oscillator::Lsi));
    }
}
