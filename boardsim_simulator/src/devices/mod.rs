pub mod adc_buttons;
pub mod tmc2130;

use crate::settings::{DeviceKind, DeviceSettings};
use adc_buttons::AdcButtons;
use boardsim_shared::{ConfigError, Peripheral};
use tmc2130::Tmc2130;

/// Instantiates the peripheral described by one `[[devices]]` entry.
pub fn build(settings: &DeviceSettings) -> Result<Box<dyn Peripheral>, ConfigError> {
    let device: Box<dyn Peripheral> = match settings.kind {
        DeviceKind::Tmc2130 => {
            let axis = axis_letter(settings)?;
            let cfg = settings.driver.clone().unwrap_or_default();
            Box::new(Tmc2130::with_config(&settings.name, axis, cfg)?)
        }
        DeviceKind::AdcButtons => {
            let cfg = settings.buttons.clone().unwrap_or_default();
            Box::new(AdcButtons::new(&settings.name, cfg)?)
        }
    };
    tracing::debug!(device = %settings.name, kind = device.kind(), "built device");
    Ok(device)
}

fn axis_letter(settings: &DeviceSettings) -> Result<char, ConfigError> {
    let source = settings.axis.as_deref().unwrap_or(&settings.name);
    let mut chars = source.chars();
    match (chars.next(), chars.next(), settings.axis.is_some()) {
        (Some(c), None, _) | (Some(c), _, false) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(ConfigError::invalid(
            format!("devices.{}.axis", settings.name),
            format!("'{source}' is not a single axis letter"),
        )),
    }
}
