use crate::common::{MissionError, MissionResult};
use crate::domains::mission::{
    MissionExecutor, MissionPhase, MissionPlan, MissionReport, MissionRunGuard, VehicleLink,
};
use crate::domains::survey::{AreaPartitioner, BoundarySource, CoveragePlanner};
use crate::domains::swarm::{DroneId, MissionTrigger};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Turns a mission start into a flight: partition the survey area for this
/// drone, plan coverage, and run the executor on its own task.
pub struct SurveyMissionService {
    drone_id: DroneId,
    boundary: Arc<dyn BoundarySource>,
    partitioner: AreaPartitioner,
    planner: CoveragePlanner,
    executor: Arc<MissionExecutor>,
    link: Arc<dyn VehicleLink>,
    guard: MissionRunGuard,
    current_run: Mutex<Option<JoinHandle<MissionResult<MissionReport>>>>,
}

impl SurveyMissionService {
    pub fn new(
        drone_id: DroneId,
        boundary: Arc<dyn BoundarySource>,
        planner: CoveragePlanner,
        executor: MissionExecutor,
        link: Arc<dyn VehicleLink>,
    ) -> Self {
        Self {
            drone_id,
            boundary,
            partitioner: AreaPartitioner,
            planner,
            executor: Arc::new(executor),
            link,
            guard: MissionRunGuard::new(),
            current_run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_active()
    }

    /// This drone's coverage plan for a fleet of `total_drones`.
    pub async fn prepare_plan(&self, total_drones: usize) -> MissionResult<MissionPlan> {
        let area = self.boundary.load_boundary().await?;
        let region = self
            .partitioner
            .partition(&area, total_drones, self.drone_id as usize)?;
        info!(
            drone_id = self.drone_id,
            total_drones,
            region_area = region.area(),
            "sub-region assigned"
        );
        let plan = self.planner.plan(&region)?;
        Ok(plan)
    }

    /// Wait for the most recently started run to finish.
    pub async fn wait_for_run(&self) -> Option<MissionResult<MissionReport>> {
        let handle = self.current_run.lock().await.take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(drone_id = self.drone_id, error = %e, "mission task failed");
                None
            }
        }
    }
}

#[async_trait]
impl MissionTrigger for SurveyMissionService {
    async fn start_mission(&self, total_drones: usize) -> MissionResult<()> {
        let permit = self.guard.try_acquire().ok_or(MissionError::AlreadyRunning)?;
        let plan = self.prepare_plan(total_drones).await?;

        let drone_id = self.drone_id;
        let link = self.link.clone();
        let executor = self.executor.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let vehicle = match link.connect().await {
                Ok(vehicle) => vehicle,
                Err(e) => {
                    error!(drone_id, error = %e, "vehicle connection failed");
                    return Err(MissionError::vehicle(MissionPhase::Configuring)(e));
                }
            };
            let outcome = executor.execute(vehicle.as_ref(), &plan).await;
            match &outcome {
                Ok(report) => info!(
                    drone_id,
                    run_id = %report.run_id,
                    distance_m = report.planned_distance_m,
                    "survey mission finished"
                ),
                Err(e) => error!(drone_id, error = %e, "survey mission aborted"),
            }
            outcome
        });

        *self.current_run.lock().await = Some(handle);
        info!(drone_id, total_drones, "survey mission launched");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.guard.is_active()
    }
}
