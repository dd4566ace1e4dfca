//! In-process event plumbing between world producers and the batch
//! controller.

mod aggregator;
mod bus;
mod clock;

pub use aggregator::{AggregatorConfig, BufferedProducer, BuildEventAggregator};
pub use bus::{EventBus, SubscriptionId};
pub use clock::SessionClock;
