use super::executor::{
    abort_flight, close_vehicle, request_mode, wait_for_landing, wait_until, MissionPhase, MissionRun,
    MissionTimings,
};
use super::vehicle::{FlightMode, VehicleControl};
use crate::common::{GeoPoint, MissionError, MissionResult};
use crate::domains::survey::SubRegion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Fraction of the cruise altitude that counts as takeoff complete.
const TAKEOFF_ALT_FRACTION: f64 = 0.95;

/// Produces ground targets to visit, e.g. detections or operator picks.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// `None` once the source is exhausted.
    async fn next_target(&self) -> Option<GeoPoint>;
}

/// Pending targets inside one drone's sub-region.
pub struct TargetQueue {
    region: SubRegion,
    pending: Mutex<Vec<GeoPoint>>,
    arrived: Notify,
}

impl TargetQueue {
    pub fn new(region: SubRegion) -> Self {
        Self {
            region,
            pending: Mutex::new(Vec::new()),
            arrived: Notify::new(),
        }
    }

    pub fn region(&self) -> &SubRegion {
        &self.region
    }

    /// Queue `target` if it lies inside the region. Returns whether it was kept.
    pub async fn offer(&self, target: GeoPoint) -> bool {
        if !self.region.contains(&target) {
            debug!(lat = target.lat, lon = target.lon, "target outside assigned region ignored");
            return false;
        }
        let queued = {
            let mut pending = self.pending.lock().await;
            pending.push(target);
            pending.len()
        };
        info!(lat = target.lat, lon = target.lon, queued, "target queued");
        self.arrived.notify_one();
        true
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Remove and return the pending target closest to `from`.
    pub async fn take_nearest(&self, from: GeoPoint) -> Option<GeoPoint> {
        let mut pending = self.pending.lock().await;
        let nearest = pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| from.distance_to(a).total_cmp(&from.distance_to(b)))
            .map(|(i, _)| i)?;
        Some(pending.swap_remove(nearest))
    }

    /// Like [`take_nearest`](Self::take_nearest) but waits for a target to arrive.
    /// Cancel safe.
    pub async fn next_nearest(&self, from: GeoPoint) -> GeoPoint {
        loop {
            if let Some(target) = self.take_nearest(from).await {
                return target;
            }
            self.arrived.notified().await;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PursuitSettings {
    /// Relative altitude for takeoff and every leg.
    pub altitude_m: f64,
    pub arrival_radius_m: f64,
    pub hover: Duration,
    /// Bound on the takeoff climb and on each leg.
    pub leg_timeout: Duration,
    /// Return home after this many visits; `None` runs until stopped.
    pub max_targets: Option<usize>,
    pub timings: MissionTimings,
}

impl Default for PursuitSettings {
    fn default() -> Self {
        Self {
            altitude_m: 10.0,
            arrival_radius_m: 2.0,
            hover: Duration::from_secs(5),
            leg_timeout: Duration::from_secs(600),
            max_targets: None,
            timings: MissionTimings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PursuitReport {
    pub run_id: Uuid,
    pub targets_visited: usize,
    pub elapsed: Duration,
}

/// Visits queued targets nearest-first in GUIDED mode, hovering at each,
/// until stopped or the target budget is spent, then returns to launch.
pub struct TargetPursuit {
    settings: PursuitSettings,
}

impl TargetPursuit {
    pub fn new(settings: PursuitSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PursuitSettings {
        &self.settings
    }

    /// Same guarantees as the survey executor: the vehicle is closed once,
    /// and any failure after arming runs the abort sequence first.
    pub async fn run(
        &self,
        vehicle: &dyn VehicleControl,
        queue: &TargetQueue,
        stop: broadcast::Receiver<()>,
    ) -> MissionResult<PursuitReport> {
        let mut run = MissionRun::new();
        let started = Instant::now();
        info!(run_id = %run.id, region = queue.region().index, "target pursuit started");

        let outcome = self.fly(vehicle, queue, stop, &mut run).await;
        match outcome {
            Ok(targets_visited) => {
                run.enter(MissionPhase::Done);
                close_vehicle(vehicle, run.id).await;
                info!(run_id = %run.id, targets_visited, "target pursuit complete");
                Ok(PursuitReport {
                    run_id: run.id,
                    targets_visited,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                let failed_in = run.phase;
                error!(run_id = %run.id, phase = %failed_in, error = %err, "target pursuit failed");
                run.enter(MissionPhase::Aborted);
                if run.armed {
                    abort_flight(vehicle, run.id, &self.settings.timings).await;
                } else if failed_in == MissionPhase::Arming {
                    if let Err(e) = vehicle.set_armed(false).await {
                        warn!(run_id = %run.id, error = %e, "disarm request failed");
                    }
                }
                close_vehicle(vehicle, run.id).await;
                Err(err)
            }
        }
    }

    async fn fly(
        &self,
        vehicle: &dyn VehicleControl,
        queue: &TargetQueue,
        mut stop: broadcast::Receiver<()>,
        run: &mut MissionRun,
    ) -> MissionResult<usize> {
        let timings = &self.settings.timings;
        let altitude = self.settings.altitude_m;

        run.enter(MissionPhase::Arming);
        request_mode(vehicle, FlightMode::Guided, MissionPhase::Arming, timings).await?;
        vehicle
            .set_armed(true)
            .await
            .map_err(MissionError::vehicle(MissionPhase::Arming))?;
        wait_until(
            MissionPhase::Arming,
            "armed",
            timings.arm_timeout,
            timings.confirm_poll,
            || vehicle.armed(),
        )
        .await?;
        run.armed = true;
        run.enter(MissionPhase::Armed);

        run.enter(MissionPhase::TakingOff);
        vehicle
            .takeoff(altitude)
            .await
            .map_err(MissionError::vehicle(MissionPhase::TakingOff))?;
        wait_until(
            MissionPhase::TakingOff,
            "takeoff altitude",
            self.settings.leg_timeout,
            timings.monitor_poll,
            || async move { Ok(vehicle.position().await?.relative_alt >= altitude * TAKEOFF_ALT_FRACTION) },
        )
        .await?;
        info!(run_id = %run.id, altitude, "reached pursuit altitude");

        run.enter(MissionPhase::Transit);
        let mut visited = 0;
        while self.settings.max_targets.map_or(true, |max| visited < max) {
            let here = vehicle
                .position()
                .await
                .map_err(MissionError::vehicle(MissionPhase::Transit))?;
            let target = tokio::select! {
                _ = stop.recv() => None,
                target = queue.next_nearest(GeoPoint::new(here.lat, here.lon)) => Some(target),
            };
            let Some(target) = target else {
                info!(run_id = %run.id, "pursuit stopped");
                break;
            };

            let remaining = queue.len().await;
            info!(
                run_id = %run.id,
                lat = target.lat,
                lon = target.lon,
                remaining = remaining,
                "flying to target"
            );
            self.visit(vehicle, target).await?;
            visited += 1;

            tokio::select! {
                _ = stop.recv() => {
                    info!(run_id = %run.id, "pursuit stopped while hovering");
                    break;
                }
                _ = sleep(self.settings.hover) => {}
            }
        }

        run.enter(MissionPhase::ReturnToLaunch);
        vehicle
            .set_mode(FlightMode::Rtl)
            .await
            .map_err(MissionError::vehicle(MissionPhase::ReturnToLaunch))?;
        run.enter(MissionPhase::Landing);
        wait_for_landing(vehicle, timings).await?;
        Ok(visited)
    }

    async fn visit(&self, vehicle: &dyn VehicleControl, target: GeoPoint) -> MissionResult<()> {
        let phase = MissionPhase::Transit;
        vehicle
            .goto(target, self.settings.altitude_m)
            .await
            .map_err(MissionError::vehicle(phase))?;
        let radius = self.settings.arrival_radius_m;
        wait_until(
            phase,
            "target reached",
            self.settings.leg_timeout,
            self.settings.timings.monitor_poll,
            || async move {
                let p = vehicle.position().await?;
                let distance = GeoPoint::new(p.lat, p.lon).distance_to(&target);
                debug!(distance_m = distance, "distance to target");
                Ok(distance < radius)
            },
        )
        .await?;
        info!(lat = target.lat, lon = target.lon, "target reached, hovering");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::survey::Polygon;

    fn region() -> SubRegion {
        SubRegion {
            index: 0,
            total_parts: 1,
            polygon: Polygon::new(vec![
                GeoPoint::new(47.0, 8.0),
                GeoPoint::new(47.0, 8.01),
                GeoPoint::new(47.01, 8.01),
                GeoPoint::new(47.01, 8.0),
            ]),
        }
    }

    #[tokio::test]
    async fn test_outside_targets_are_dropped() {
        let queue = TargetQueue::new(region());
        assert!(queue.offer(GeoPoint::new(47.005, 8.005)).await);
        assert!(!queue.offer(GeoPoint::new(47.02, 8.005)).await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_nearest_first() {
        let queue = TargetQueue::new(region());
        let far = GeoPoint::new(47.009, 8.009);
        let near = GeoPoint::new(47.001, 8.001);
        let mid = GeoPoint::new(47.005, 8.005);
        for t in [far, near, mid] {
            queue.offer(t).await;
        }

        let home = GeoPoint::new(47.0, 8.0);
        assert_eq!(queue.take_nearest(home).await, Some(near));
        assert_eq!(queue.take_nearest(near).await, Some(mid));
        assert_eq!(queue.take_nearest(mid).await, Some(far));
        assert_eq!(queue.take_nearest(far).await, None);
    }

    #[tokio::test]
    async fn test_next_nearest_waits_for_arrival() {
        let queue = std::sync::Arc::new(TargetQueue::new(region()));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_nearest(GeoPoint::new(47.0, 8.0)).await })
        };
        tokio::task::yield_now().await;
        queue.offer(GeoPoint::new(47.002, 8.002)).await;
        assert_eq!(waiter.await.unwrap(), GeoPoint::new(47.002, 8.002));
    }
}
