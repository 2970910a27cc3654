pub mod aggregator;
pub mod dispatcher;
pub mod events;
pub mod health;
pub mod workflow;

pub use aggregator::aggregate;
pub use dispatcher::{Dispatcher, DispatcherConfig, PendingDispatch};
pub use events::EventBus;
pub use health::{HealthMonitor, HealthMonitorConfig, HealthMonitorHandle, ProbeOutcome};
pub use workflow::{ReportWorkflow, WorkSource, WorkflowState};
