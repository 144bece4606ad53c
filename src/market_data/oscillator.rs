use std::ops::ControlFlow;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, trace};

use crate::engine::{Exchange, PriceChange};
use crate::tasks::{spawn_periodic, TaskHandle};

pub const DEFAULT_MAX_SHOCK: f64 = 0.02;

/// Source of the relative price moves applied on each tick.
pub trait ShockSource: Send {
    /// Next relative move, within `[-max_shock, max_shock]`.
    fn next_shock(&mut self, max_shock: f64) -> f64;
}

impl ShockSource for StdRng {
    fn next_shock(&mut self, max_shock: f64) -> f64 {
        (self.gen::<f64>() - 0.5) * 2.0 * max_shock
    }
}

/// Replays a fixed list of moves, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct FixedShocks {
    shocks: Vec<f64>,
    pos: usize,
}

impl FixedShocks {
    pub fn new(shocks: Vec<f64>) -> Self {
        FixedShocks { shocks, pos: 0 }
    }
}

impl ShockSource for FixedShocks {
    fn next_shock(&mut self, max_shock: f64) -> f64 {
        if self.shocks.is_empty() {
            return 0.0;
        }
        let shock = self.shocks[self.pos % self.shocks.len()];
        self.pos += 1;
        shock.clamp(-max_shock, max_shock)
    }
}

/// Nudges every instrument's price by a small random factor on each tick.
pub struct PriceOscillator<S> {
    exchange: Exchange,
    source: S,
    max_shock: f64,
}

impl<S: ShockSource + 'static> PriceOscillator<S> {
    pub fn new(exchange: Exchange, source: S, max_shock: f64) -> Self {
        PriceOscillator { exchange, source, max_shock: max_shock.abs() }
    }

    /// One perturbation step over all instruments, applied atomically.
    pub fn tick(&mut self) -> Vec<PriceChange> {
        let source = &mut self.source;
        let max_shock = self.max_shock;

        let changes = self.exchange.perturb_prices(|instrument| {
            let shock = Decimal::from_f64(source.next_shock(max_shock))?;
            let moved = instrument.price.checked_mul(Decimal::ONE + shock)?;
            trace!(id = %instrument.id, shock = %shock, "Shock drawn");
            Some(moved.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        });

        for change in &changes {
            debug!(id = %change.instrument_id, old = %change.old, new = %change.new, "Price updated");
        }
        metrics::counter!("exsim_price_updates_total").increment(changes.len() as u64);
        changes
    }

    pub fn spawn(mut self, period: Duration) -> TaskHandle {
        spawn_periodic("price-oscillator", period, move || {
            self.tick();
            ControlFlow::Continue(())
        })
    }
}
