use crate::common::{MissionError, MissionResult};
use crate::domains::mission::{
    MissionPhase, MissionRunGuard, PursuitReport, TargetPursuit, TargetQueue, TargetSource,
    VehicleLink,
};
use crate::domains::survey::{AreaPartitioner, BoundarySource};
use crate::domains::swarm::{DroneId, MissionTrigger};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Alternative mission trigger: instead of a lawnmower survey, the drone
/// takes off and chases targets from a live feed that fall inside its own
/// sub-region.
pub struct TargetPursuitService {
    drone_id: DroneId,
    boundary: Arc<dyn BoundarySource>,
    partitioner: AreaPartitioner,
    pursuit: Arc<TargetPursuit>,
    link: Arc<dyn VehicleLink>,
    targets: Arc<dyn TargetSource>,
    guard: MissionRunGuard,
    stop: broadcast::Sender<()>,
    current_run: Mutex<Option<JoinHandle<MissionResult<PursuitReport>>>>,
}

impl TargetPursuitService {
    pub fn new(
        drone_id: DroneId,
        boundary: Arc<dyn BoundarySource>,
        pursuit: TargetPursuit,
        link: Arc<dyn VehicleLink>,
        targets: Arc<dyn TargetSource>,
    ) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            drone_id,
            boundary,
            partitioner: AreaPartitioner,
            pursuit: Arc::new(pursuit),
            link,
            targets,
            guard: MissionRunGuard::new(),
            stop,
            current_run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_active()
    }

    /// Ask the current run to stop chasing targets and return to launch.
    pub fn stop(&self) {
        // no receivers means nothing is flying
        let _ = self.stop.send(());
    }

    pub async fn wait_for_run(&self) -> Option<MissionResult<PursuitReport>> {
        let handle = self.current_run.lock().await.take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(drone_id = self.drone_id, error = %e, "pursuit task failed");
                None
            }
        }
    }

    async fn prepare_queue(&self, total_drones: usize) -> MissionResult<Arc<TargetQueue>> {
        let area = self.boundary.load_boundary().await?;
        let region = self
            .partitioner
            .partition(&area, total_drones, self.drone_id as usize)?;
        info!(
            drone_id = self.drone_id,
            total_drones,
            region_area = region.area(),
            "pursuit region assigned"
        );
        Ok(Arc::new(TargetQueue::new(region)))
    }
}

#[async_trait]
impl MissionTrigger for TargetPursuitService {
    async fn start_mission(&self, total_drones: usize) -> MissionResult<()> {
        let permit = self.guard.try_acquire().ok_or(MissionError::AlreadyRunning)?;
        let queue = self.prepare_queue(total_drones).await?;

        let drone_id = self.drone_id;
        let feeder = {
            let queue = queue.clone();
            let targets = self.targets.clone();
            let mut stop = self.stop.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.recv() => break,
                        target = targets.next_target() => match target {
                            Some(target) => {
                                queue.offer(target).await;
                            }
                            None => {
                                debug!(drone_id, "target feed exhausted");
                                break;
                            }
                        },
                    }
                }
            })
        };

        let link = self.link.clone();
        let pursuit = self.pursuit.clone();
        let stop = self.stop.subscribe();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let outcome = match link.connect().await {
                Ok(vehicle) => pursuit.run(vehicle.as_ref(), &queue, stop).await,
                Err(e) => {
                    error!(drone_id, error = %e, "vehicle connection failed");
                    Err(MissionError::vehicle(MissionPhase::Configuring)(e))
                }
            };
            feeder.abort();
            match &outcome {
                Ok(report) => info!(
                    drone_id,
                    run_id = %report.run_id,
                    targets_visited = report.targets_visited,
                    "target pursuit finished"
                ),
                Err(e) => error!(drone_id, error = %e, "target pursuit aborted"),
            }
            outcome
        });

        *self.current_run.lock().await = Some(handle);
        info!(drone_id, total_drones, "target pursuit launched");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.guard.is_active()
    }
}
