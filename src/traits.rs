// Traits used across the library. Could be used more generally than in this lib.

/// This trait allows you to return information about a clock tree's speeds.
/// It's used for configuring peripherals, eg a USART baud rate or the SysTick reload.
pub trait ClockCfg {
    /// System clock speed, in Hz.
    fn sysclk(&self) -> u32;

    /// HCLK speed, in Hz. Ie AHB bus, core, memory, and DMA.
    fn hclk(&self) -> u32;

    /// Cortex System timer speed, in Hz.
    fn systick(&self) -> u32 {
        self.hclk()
    }

    /// APB1 peripheral clocks speed, in Hz.
    fn apb1(&self) -> u32;

    /// APB1 timer clocks speed, in Hz. Timers run at twice PCLK when the APB prescaler
    /// divides.
    fn apb1_timer(&self) -> u32 {
        if self.apb1() == self.hclk() {
            self.apb1()
        } else {
            self.apb1() * 2
        }
    }
}
