//! Match lifecycle notifications and the in-process bus that carries them.

pub mod bus;
pub mod in_memory_bus;
pub mod lifecycle;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use lifecycle::{LeagueScoped, MatchLifecycleEvent};
