use crate::common::GeoPoint;
use crate::domains::mission::TargetSource;
use crate::domains::survey::{BoundingBox, Polygon};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_SAMPLES: usize = 10_000;

/// Emits uniformly random points inside a polygon after a random delay,
/// standing in for a live detection feed.
pub struct RandomTargetGenerator {
    polygon: Polygon,
    bounds: Option<BoundingBox>,
    min_delay: Duration,
    max_delay: Duration,
    rng: Mutex<StdRng>,
}

impl RandomTargetGenerator {
    pub fn new(polygon: Polygon, min_delay: Duration, max_delay: Duration) -> Self {
        Self::with_rng(polygon, min_delay, max_delay, StdRng::from_entropy())
    }

    /// Reproducible sequence for tests and replays.
    pub fn seeded(polygon: Polygon, min_delay: Duration, max_delay: Duration, seed: u64) -> Self {
        Self::with_rng(polygon, min_delay, max_delay, StdRng::seed_from_u64(seed))
    }

    fn with_rng(polygon: Polygon, min_delay: Duration, max_delay: Duration, rng: StdRng) -> Self {
        let bounds = polygon.bounds();
        Self {
            polygon,
            bounds,
            min_delay,
            max_delay: max_delay.max(min_delay),
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> Option<(Duration, GeoPoint)> {
        let bounds = self.bounds?;
        let mut rng = self.rng.lock().ok()?;
        let delay_ms = rng.gen_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        for _ in 0..MAX_SAMPLES {
            let candidate = GeoPoint::new(
                rng.gen_range(bounds.min_lat..=bounds.max_lat),
                rng.gen_range(bounds.min_lon..=bounds.max_lon),
            );
            if self.polygon.contains(&candidate) {
                return Some((Duration::from_millis(delay_ms), candidate));
            }
        }
        None
    }
}

#[async_trait]
impl TargetSource for RandomTargetGenerator {
    async fn next_target(&self) -> Option<GeoPoint> {
        let Some((delay, target)) = self.draw() else {
            warn!("no target could be drawn inside the polygon");
            return None;
        };
        tokio::time::sleep(delay).await;
        debug!(lat = target.lat, lon = target.lon, "random target generated");
        Some(target)
    }
}
