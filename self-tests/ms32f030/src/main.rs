//! Brings the clock tree up to 48Mhz from the HSI, and reports the resulting bus speeds once a
//! second over RTT, timed by a SysTick delay running from the configured HCLK.

#![deny(warnings)]
#![no_std]
#![no_main]

use cortex_m::delay::Delay;
use cortex_m_rt::entry; // The runtime

use hal::{
    clocks::{Clocks, RccExt},
    pac,
    traits::ClockCfg,
};

// Import the panic handler
use panic_probe as _;

#[entry]
fn main() -> ! {
    rtt_target::rtt_init_defmt!();
    // Set up CPU peripherals
    let cp = cortex_m::Peripherals::take().unwrap();
    // Set up microcontroller peripherals
    let dp = pac::Peripherals::take().unwrap();

    let mut rcc = dp.RCC.constrain(dp.FLASH, dp.PWR);

    // No crystal needed for this one.
    let clock_cfg = Clocks::hsi_preset();
    clock_cfg.setup(&mut rcc).unwrap();

    let freqs = rcc.frequencies();
    let mut delay = Delay::new(cp.SYST, freqs.systick());

    loop {
        defmt::println!(
            "sysclk: {} Hz, hclk: {} Hz, pclk1: {} Hz",
            freqs.sysclk,
            freqs.hclk,
            freqs.pclk1
        );
        delay.delay_ms(1_000);
    }
}
