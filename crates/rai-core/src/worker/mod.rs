//! Background worker: receives pushes independent of any open window,
//! shows notifications and reacts to clicks.

mod host;
mod runtime;
mod simulated;

pub use host::{
    DisplayedNotification, NotificationData, NotificationOptions, NotificationSurface,
    WindowClient, WindowClients,
};
pub use runtime::{BackgroundWorkerRuntime, WorkerEvent, WorkerHandle, WorkerState};
pub use simulated::SimulatedHost;
