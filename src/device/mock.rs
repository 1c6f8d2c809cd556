//! Scripted mock gateway for tests
//!
//! Records every call in order so tests can assert exact transaction
//! sequences, and fails if two transactions ever overlap in time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DeviceError, DeviceId, DevicePropDesc, DeviceResult, MtpDevice};

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NoData(u16),
    DataIn(u16),
    GetValue(u16),
    GetDesc(u16),
    SetValue(u16, Vec<u8>),
}

#[derive(Default)]
struct Script {
    no_data_results: HashMap<u16, Result<(), DeviceError>>,
    data_in_results: HashMap<u16, Result<Vec<u8>, DeviceError>>,
    prop_values: HashMap<u16, Result<Vec<u8>, DeviceError>>,
    prop_descs: HashMap<u16, DevicePropDesc>,
}

/// Scripted in-memory device
pub struct MockDevice {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
    in_flight: AtomicBool,
    overlap_seen: AtomicBool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
            in_flight: AtomicBool::new(false),
            overlap_seen: AtomicBool::new(false),
        }
    }

    pub fn with_no_data_result(self, opcode: u16, result: Result<(), DeviceError>) -> Self {
        self.script
            .lock()
            .unwrap()
            .no_data_results
            .insert(opcode, result);
        self
    }

    pub fn with_data_in(self, opcode: u16, result: Result<Vec<u8>, DeviceError>) -> Self {
        self.script
            .lock()
            .unwrap()
            .data_in_results
            .insert(opcode, result);
        self
    }

    pub fn with_prop_value(self, code: u16, result: Result<Vec<u8>, DeviceError>) -> Self {
        self.script.lock().unwrap().prop_values.insert(code, result);
        self
    }

    pub fn with_prop_desc(self, code: u16, desc: DevicePropDesc) -> Self {
        self.script.lock().unwrap().prop_descs.insert(code, desc);
        self
    }

    /// Calls recorded so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Count of recorded calls matching `opcode` no-data transactions
    pub fn no_data_count(&self, opcode: u16) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::NoData(op) if *op == opcode))
            .count()
    }

    /// True if two gateway calls ever ran concurrently
    pub fn saw_overlap(&self) -> bool {
        self.overlap_seen.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(call);
        // Yield long enough that an unserialized concurrent call would be seen.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    fn leave(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl MtpDevice for MockDevice {
    async fn id(&self) -> DeviceResult<DeviceId> {
        Ok(DeviceId {
            manufacturer: "Nikon Corporation".to_string(),
            product: "D5000".to_string(),
            serial_number: "0000000000000001".to_string(),
        })
    }

    async fn run_transaction_no_data(&self, opcode: u16) -> DeviceResult<()> {
        self.enter(Call::NoData(opcode)).await;
        let result = self
            .script
            .lock()
            .unwrap()
            .no_data_results
            .get(&opcode)
            .cloned()
            .unwrap_or(Ok(()));
        self.leave();
        result
    }

    async fn run_transaction_data_in(&self, opcode: u16, _params: &[u32]) -> DeviceResult<Vec<u8>> {
        self.enter(Call::DataIn(opcode)).await;
        let result = self
            .script
            .lock()
            .unwrap()
            .data_in_results
            .get(&opcode)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        self.leave();
        result
    }

    async fn get_prop_value(&self, code: u16) -> DeviceResult<Vec<u8>> {
        self.enter(Call::GetValue(code)).await;
        let result = self
            .script
            .lock()
            .unwrap()
            .prop_values
            .get(&code)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        self.leave();
        result
    }

    async fn get_prop_desc(&self, code: u16) -> DeviceResult<DevicePropDesc> {
        self.enter(Call::GetDesc(code)).await;
        let result = self
            .script
            .lock()
            .unwrap()
            .prop_descs
            .get(&code)
            .cloned()
            .ok_or_else(|| DeviceError::Transport(format!("no desc scripted for {code:#06x}")));
        self.leave();
        result
    }

    async fn set_prop_value(&self, code: u16, payload: &[u8]) -> DeviceResult<()> {
        self.enter(Call::SetValue(code, payload.to_vec())).await;
        self.leave();
        Ok(())
    }
}
