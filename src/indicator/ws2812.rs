//! WS2812 LED strip on the RMT peripheral.

use super::pattern::Rgb;
use super::task::{LedError, LedStrip};
use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::rmt::{PinState, Pulse, RmtChannel, TxRmtDriver, VariableLengthSignal};
use esp_idf_sys::EspError;
use std::time::Duration;

/// Pixels on the strip.
pub const PIXEL_COUNT: usize = 8;

/// WS2812 strip driven by one RMT channel.
pub struct Ws2812Strip {
    tx: TxRmtDriver<'static>,
    /// (high, low) pulses for bit 0 and bit 1.
    zero: (Pulse, Pulse),
    one: (Pulse, Pulse),
}

impl Ws2812Strip {
    /// Create the strip on `pin` (GPIO 4 on the reference board).
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> Result<Self, EspError> {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config)?;

        let ticks_hz = tx.counter_clock()?;
        let pulse = |state, ns| Pulse::new_with_duration(ticks_hz, state, &Duration::from_nanos(ns));
        let zero = (pulse(PinState::High, 350)?, pulse(PinState::Low, 800)?);
        let one = (pulse(PinState::High, 700)?, pulse(PinState::Low, 600)?);

        Ok(Self { tx, zero, one })
    }

    fn encode(&self, color: Rgb) -> Result<VariableLengthSignal, EspError> {
        // WS2812 expects GRB, most significant bit first
        let grb = ((color.g as u32) << 16) | ((color.r as u32) << 8) | color.b as u32;
        let mut signal = VariableLengthSignal::with_capacity(PIXEL_COUNT * 24 * 2);
        for _ in 0..PIXEL_COUNT {
            for bit in (0..24).rev() {
                let (high, low) = if grb & (1 << bit) != 0 {
                    &self.one
                } else {
                    &self.zero
                };
                signal.push([high, low])?;
            }
        }
        Ok(signal)
    }
}

impl LedStrip for Ws2812Strip {
    fn show(&mut self, color: Rgb) -> Result<(), LedError> {
        let signal = self.encode(color).map_err(|e| LedError(format!("{:?}", e)))?;
        self.tx
            .start_blocking(&signal)
            .map_err(|e| LedError(format!("{:?}", e)))
    }
}
