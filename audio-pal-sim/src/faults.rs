use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use audio_pal_core::models::device::DeviceId;
use audio_pal_core::models::error::SessionError;

/// Status code reported by injected failures (`EIO`).
pub const INJECTED_FAULT: i32 = -5;

/// Session operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionOp {
    Create,
    Open,
    Prepare,
    Start,
    Stop,
    Close,
    Read,
    Write,
    SetConfig,
    SetParameters,
}

#[derive(Debug, Default)]
struct Plan {
    ops: BTreeSet<SessionOp>,
    once: BTreeSet<SessionOp>,
    devices: BTreeSet<DeviceId>,
}

/// Failure plan shared by a factory and every session it creates.
///
/// Cloning yields a handle to the same plan.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan(Arc<Mutex<Plan>>);

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call to `op` until [`FaultPlan::heal`].
    pub fn fail(&self, op: SessionOp) {
        self.0.lock().ops.insert(op);
    }

    /// Fail only the next call to `op`.
    pub fn fail_once(&self, op: SessionOp) {
        self.0.lock().once.insert(op);
    }

    /// Refuse connections that include `device`.
    pub fn refuse_device(&self, device: DeviceId) {
        self.0.lock().devices.insert(device);
    }

    pub fn heal(&self) {
        let mut plan = self.0.lock();
        plan.ops.clear();
        plan.once.clear();
        plan.devices.clear();
    }

    pub(crate) fn check(&self, op: SessionOp) -> Result<(), SessionError> {
        let mut plan = self.0.lock();
        if plan.ops.contains(&op) || plan.once.remove(&op) {
            return Err(SessionError::new(
                INJECTED_FAULT,
                format!("injected {:?} failure", op),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_device(&self, device: DeviceId) -> Result<(), SessionError> {
        if self.0.lock().devices.contains(&device) {
            return Err(SessionError::new(
                INJECTED_FAULT,
                format!("{:?} refused the connection", device),
            ));
        }
        Ok(())
    }
}
