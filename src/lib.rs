//! Clock tree HAL for the MS32F0xx family of Cortex-M0 MCUs.
//!
//! The RCC, FLASH and PWR blocks on these parts are register compatible with the STM32F0, so
//! the hardware backend builds on the `stm32f0` PAC. Select a chip with one of the `ms32f0xx`
//! features. Without one, the crate still builds (eg for host tests), and the clock tree can be
//! driven against [`clocks::sim::SimRegs`].
//!
//! Typical startup code:
//! ```ignore
//! let dp = pac::Peripherals::take().unwrap();
//! let mut rcc = dp.RCC.constrain(dp.FLASH, dp.PWR);
//!
//! let clock_cfg = Clocks::default(); // 48Mhz from an 8Mhz HSE.
//! clock_cfg.setup(&mut rcc)?;
//!
//! let pclk = rcc.frequencies().pclk1;
//! ```

#![cfg_attr(not(test), no_std)]

// This mod must go first, so that the others see its macros.
pub(crate) mod fmt;

// MS32F0 PAC
#[cfg(feature = "ms32f030")]
pub use stm32f0::stm32f0x0 as pac;

#[cfg(any(feature = "ms32f031", feature = "ms32f051"))]
pub use stm32f0::stm32f0x1 as pac;

#[cfg(feature = "ms32f072")]
pub use stm32f0::stm32f0x2 as pac;

pub mod clocks;
pub mod error;
pub mod traits;
pub mod util;

mod board {
    include!(concat!(env!("OUT_DIR"), "/board.rs"));
}

pub use board::{HSE_FREQ, LSE_FREQ};
