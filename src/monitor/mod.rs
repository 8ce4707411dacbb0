//! Config monitors
//!
//! Keep the running destinations in sync with external configuration:
//! - `FileScanSource`: one JSON file per destination under the conf dir
//! - `RemotePollSource`: destinations assigned by a remote manager
//!
//! Both variants share `ScanMonitor`, which diffs each tick's observation
//! against the previous one and fires lifecycle actions for the deltas.
//! A failure of one destination's action never affects the others.

mod errors;
mod reconcile;
mod scan;
mod source;

pub use errors::{MonitorError, MonitorResult};
pub use reconcile::{Fingerprint, Observation, ReconcilePlan};
pub use scan::{ConfigMonitor, MonitorView, ScanMonitor, TickReport};
pub use source::{ConfigSource, FileScanSource, RemotePollSource};
