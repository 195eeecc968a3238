//! `gpio_set` built-in (spec §4.D).

use super::{require_i64, ToolError, ToolHandler};
use async_trait::async_trait;
use serde_json::Value;

/// Which pins a caller may address: a contiguous range or an explicit list.
#[derive(Debug, Clone)]
pub enum PinAllowList {
    Range { min: u32, max: u32 },
    Csv(Vec<u32>),
}

impl PinAllowList {
    pub(crate) fn contains(&self, pin: u32) -> bool {
        match self {
            PinAllowList::Range { min, max } => pin >= *min && pin <= *max,
            PinAllowList::Csv(pins) => pins.contains(&pin),
        }
    }

    fn describe(&self) -> String {
        match self {
            PinAllowList::Range { min, max } => format!("{min}-{max}"),
            PinAllowList::Csv(pins) => pins
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Sets a GPIO pin's logic level, subject to the configured allow-list.
///
/// The actual pin electrical control is an out-of-scope external
/// collaborator (spec §1); `driver` stands in for it.
pub struct GpioSetTool {
    allow_list: PinAllowList,
    driver: Box<dyn Fn(u32, bool) + Send + Sync>,
}

impl GpioSetTool {
    pub fn new(allow_list: PinAllowList, driver: impl Fn(u32, bool) + Send + Sync + 'static) -> Self {
        Self {
            allow_list,
            driver: Box::new(driver),
        }
    }
}

#[async_trait]
impl ToolHandler for GpioSetTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let pin = require_i64(input, "pin")?;
        let level = require_i64(input, "level")?;

        let pin_u32 = u32::try_from(pin).map_err(|_| ToolError::InvalidArgument {
            field: "pin".to_string(),
            reason: "must be a non-negative integer".to_string(),
        })?;
        if !self.allow_list.contains(pin_u32) {
            return Err(ToolError::InvalidArgument {
                field: "pin".to_string(),
                reason: format!("allowed pins: {}", self.allow_list.describe()),
            });
        }
        let level_bool = match level {
            0 => false,
            1 => true,
            _ => {
                return Err(ToolError::InvalidArgument {
                    field: "level".to_string(),
                    reason: "must be 0 or 1".to_string(),
                })
            }
        };

        (self.driver)(pin_u32, level_bool);
        Ok(format!(
            "GPIO {pin_u32} = {}",
            if level_bool { "HIGH" } else { "LOW" }
        ))
    }
}
