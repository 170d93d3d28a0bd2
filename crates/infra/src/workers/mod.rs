//! Background workers fed by the event bus.

pub mod lifecycle_worker;

pub use lifecycle_worker::{LifecycleWorker, WorkerHandle};
