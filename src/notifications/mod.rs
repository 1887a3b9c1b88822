//! Periodic status change detection and report fan-out.

mod changes;
mod controller;
mod loop_worker;

pub use changes::{detect_change, ChangeDetector, ChangeReport, StatusChangeEvent};
pub use controller::NotificationController;
