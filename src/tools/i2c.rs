//! `i2c_scan` built-in (spec §4.D).

use super::gpio::PinAllowList;
use super::{require_i64, ToolError, ToolHandler};
use async_trait::async_trait;
use serde_json::Value;

const MIN_FREQUENCY_HZ: i64 = 10_000;
const MAX_FREQUENCY_HZ: i64 = 1_000_000;

/// The I2C bus electrical interface is an out-of-scope external
/// collaborator (spec §1); this trait stands in for its driver.
pub trait I2cBus: Send + Sync {
    /// Open a handle on the given pins/frequency. Returns an opaque handle
    /// id the driver uses to address subsequent calls.
    fn open(&self, sda_pin: u32, scl_pin: u32, frequency_hz: u32) -> Result<u32, String>;
    fn scan(&self, handle: u32) -> Result<Vec<u8>, String>;
    fn close(&self, handle: u32);
}

pub struct I2cScanTool {
    allow_list: PinAllowList,
    bus: Box<dyn I2cBus>,
}

impl I2cScanTool {
    pub fn new(allow_list: PinAllowList, bus: impl I2cBus + 'static) -> Self {
        Self {
            allow_list,
            bus: Box::new(bus),
        }
    }
}

/// Guarantees `close` runs on every exit path: success, a per-address scan
/// failure, or an early return.
struct HandleGuard<'a> {
    bus: &'a dyn I2cBus,
    handle: u32,
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.bus.close(self.handle);
    }
}

#[async_trait]
impl ToolHandler for I2cScanTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let sda = require_i64(input, "sda_pin")?;
        let scl = require_i64(input, "scl_pin")?;
        let frequency = require_i64(input, "frequency_hz")?;

        if sda == scl {
            return Err(ToolError::InvalidArgument {
                field: "scl_pin".to_string(),
                reason: "sda_pin and scl_pin must differ".to_string(),
            });
        }
        let sda_u32 = to_pin(sda, "sda_pin")?;
        let scl_u32 = to_pin(scl, "scl_pin")?;
        if !self.allow_list.contains(sda_u32) || !self.allow_list.contains(scl_u32) {
            return Err(ToolError::InvalidArgument {
                field: "sda_pin".to_string(),
                reason: "both pins must be in the configured allow-list".to_string(),
            });
        }
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency) {
            return Err(ToolError::InvalidArgument {
                field: "frequency_hz".to_string(),
                reason: format!("must be between {MIN_FREQUENCY_HZ} and {MAX_FREQUENCY_HZ}"),
            });
        }

        let handle = self
            .bus
            .open(sda_u32, scl_u32, frequency as u32)
            .map_err(ToolError::Handler)?;
        let guard = HandleGuard {
            bus: self.bus.as_ref(),
            handle,
        };

        let addresses = self.bus.scan(guard.handle).map_err(ToolError::Handler)?;
        drop(guard);

        let formatted = addresses
            .iter()
            .map(|a| format!("0x{a:02x}"))
            .collect::<Vec<_>>()
            .join(",");
        Ok(formatted)
    }
}

fn to_pin(value: i64, field: &str) -> Result<u32, ToolError> {
    u32::try_from(value).map_err(|_| ToolError::InvalidArgument {
        field: field.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct StubBus {
        closed: Arc<Mutex<Vec<u32>>>,
        scan_result: Result<Vec<u8>, String>,
    }

    impl I2cBus for StubBus {
        fn open(&self, _sda: u32, _scl: u32, _freq: u32) -> Result<u32, String> {
            Ok(1)
        }
        fn scan(&self, _handle: u32) -> Result<Vec<u8>, String> {
            self.scan_result.clone()
        }
        fn close(&self, handle: u32) {
            self.closed.lock().unwrap().push(handle);
        }
    }

    #[tokio::test]
    async fn scans_and_formats_addresses() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let bus = StubBus {
            closed: closed.clone(),
            scan_result: Ok(vec![0x3c, 0x68]),
        };
        let tool = I2cScanTool::new(PinAllowList::Range { min: 0, max: 10 }, bus);
        let result = tool
            .handle(&json!({"sda_pin": 4, "scl_pin": 5, "frequency_hz": 100_000}))
            .await
            .unwrap();
        assert_eq!(result, "0x3c,0x68");
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn closes_handle_even_on_scan_failure() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let bus = StubBus {
            closed: closed.clone(),
            scan_result: Err("bus error".to_string()),
        };
        let tool = I2cScanTool::new(PinAllowList::Range { min: 0, max: 10 }, bus);
        let err = tool
            .handle(&json!({"sda_pin": 4, "scl_pin": 5, "frequency_hz": 100_000}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Handler(_)));
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn rejects_identical_pins() {
        let bus = StubBus {
            closed: Arc::new(Mutex::new(Vec::new())),
            scan_result: Ok(vec![]),
        };
        let tool = I2cScanTool::new(PinAllowList::Range { min: 0, max: 10 }, bus);
        let err = tool
            .handle(&json!({"sda_pin": 4, "scl_pin": 4, "frequency_hz": 100_000}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { field, .. } if field == "scl_pin"));
    }

    #[tokio::test]
    async fn rejects_out_of_bounds_frequency() {
        let bus = StubBus {
            closed: Arc::new(Mutex::new(Vec::new())),
            scan_result: Ok(vec![]),
        };
        let tool = I2cScanTool::new(PinAllowList::Range { min: 0, max: 10 }, bus);
        let err = tool
            .handle(&json!({"sda_pin": 4, "scl_pin": 5, "frequency_hz": 2_000_000}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { field, .. } if field == "frequency_hz"));
    }
}
