//! GPIO push button (active low, internal pull-up).

use super::button::{EdgeInput, InputError};
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use esp_idf_sys::EspError;
use std::future::Future;

/// Button on a GPIO pin, pressed when the pin reads low.
pub struct GpioButton {
    pin: PinDriver<'static, AnyIOPin, Input>,
}

impl GpioButton {
    pub fn new(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::input(pin)?;
        pin.set_pull(Pull::Up)?;
        Ok(Self { pin })
    }
}

impl EdgeInput for GpioButton {
    fn wait_for_edge(&mut self) -> impl Future<Output = Result<(), InputError>> + Send {
        async move {
            self.pin
                .wait_for_any_edge()
                .await
                .map_err(|e| InputError(format!("{:?}", e)))
        }
    }

    fn is_pressed(&self) -> bool {
        self.pin.is_low()
    }
}
