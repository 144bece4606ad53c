// Market data module entrypoint
pub mod oscillator;   // periodic random price perturbation
pub mod broadcaster;  // per-subscriber snapshot fan-out

pub use broadcaster::{Broadcaster, Subscription, SubscriptionId};
pub use oscillator::{FixedShocks, PriceOscillator, ShockSource};
