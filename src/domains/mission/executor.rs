use super::params::VehicleParameter;
use super::plan::MissionPlan;
use super::vehicle::{FlightMode, VehicleControl};
use crate::common::{MissionError, MissionResult, VehicleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Relative altitude at or below which the vehicle counts as on the ground.
pub const GROUND_ALTITUDE_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionPhase {
    Configuring,
    Arming,
    Armed,
    TakingOff,
    Transit,
    ReturnToLaunch,
    Landing,
    Done,
    Aborted,
}

impl MissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionPhase::Done | MissionPhase::Aborted)
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissionPhase::Configuring => "configuring",
            MissionPhase::Arming => "arming",
            MissionPhase::Armed => "armed",
            MissionPhase::TakingOff => "taking-off",
            MissionPhase::Transit => "transit",
            MissionPhase::ReturnToLaunch => "return-to-launch",
            MissionPhase::Landing => "landing",
            MissionPhase::Done => "done",
            MissionPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionTimings {
    pub mode_timeout: Duration,
    pub arm_timeout: Duration,
    /// Poll period while waiting for mode/arm confirmation.
    pub confirm_poll: Duration,
    /// Poll period for the transit, landing and abort loops.
    pub monitor_poll: Duration,
    pub transit_timeout: Duration,
    pub landing_timeout: Duration,
}

impl Default for MissionTimings {
    fn default() -> Self {
        Self {
            mode_timeout: Duration::from_secs(10),
            arm_timeout: Duration::from_secs(10),
            confirm_poll: Duration::from_millis(200),
            monitor_poll: Duration::from_secs(1),
            transit_timeout: Duration::from_secs(3600),
            landing_timeout: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub cruise_speed_ms: f64,
    pub bank_warning_deg: f64,
    pub parameter_tolerance: f64,
    pub parameters: Vec<VehicleParameter>,
    pub timings: MissionTimings,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            cruise_speed_ms: 18.0,
            bank_warning_deg: 50.0,
            parameter_tolerance: 1e-3,
            parameters: super::params::survey_parameters(18.0),
            timings: MissionTimings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionReport {
    pub run_id: Uuid,
    pub commands_uploaded: usize,
    pub planned_distance_m: f64,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

/// Phase bookkeeping for one run.
pub(super) struct MissionRun {
    pub(super) id: Uuid,
    pub(super) phase: MissionPhase,
    pub(super) armed: bool,
}

impl MissionRun {
    pub(super) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: MissionPhase::Configuring,
            armed: false,
        }
    }

    pub(super) fn enter(&mut self, phase: MissionPhase) {
        debug!(run_id = %self.id, from = %self.phase, to = %phase, "mission phase transition");
        self.phase = phase;
    }
}

/// Drives a vehicle through configure, arm, takeoff, survey and landing.
pub struct MissionExecutor {
    settings: ExecutorSettings,
}

impl MissionExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run the mission to completion. The vehicle is closed exactly once on
    /// every path, and once arming has been confirmed any failure triggers the
    /// abort sequence before the error is returned.
    pub async fn execute(
        &self,
        vehicle: &dyn VehicleControl,
        plan: &MissionPlan,
    ) -> MissionResult<MissionReport> {
        let mut run = MissionRun::new();
        let started = Instant::now();
        info!(run_id = %run.id, waypoints = plan.len(), "mission run started");

        let outcome = self.fly(vehicle, plan, &mut run).await;

        match outcome {
            Ok(commands_uploaded) => {
                run.enter(MissionPhase::Done);
                close_vehicle(vehicle, run.id).await;
                let report = MissionReport {
                    run_id: run.id,
                    commands_uploaded,
                    planned_distance_m: plan.total_distance_m(),
                    elapsed: started.elapsed(),
                    completed_at: Utc::now(),
                };
                info!(run_id = %run.id, elapsed = ?report.elapsed, "mission complete");
                Ok(report)
            }
            Err(err) => {
                let failed_in = run.phase;
                error!(run_id = %run.id, phase = %failed_in, error = %err, "mission failed");
                run.enter(MissionPhase::Aborted);
                if run.armed {
                    abort_flight(vehicle, run.id, &self.settings.timings).await;
                } else if failed_in == MissionPhase::Arming {
                    // the arm request may still land after the timeout
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
        plan: &MissionPlan,
        run: &mut MissionRun,
    ) -> MissionResult<usize> {
        let timings = &self.settings.timings;

        self.configure(vehicle).await?;
        let items = plan.to_mission_items();
        vehicle
            .upload_mission(&items)
            .await
            .map_err(MissionError::vehicle(MissionPhase::Configuring))?;
        info!(run_id = %run.id, commands = items.len(), "mission uploaded");

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
        info!(run_id = %run.id, "vehicle armed");

        // takeoff is the second uploaded item; AUTO flies it
        run.enter(MissionPhase::TakingOff);
        info!(run_id = %run.id, target_alt = plan.home().alt, "taking off");

        run.enter(MissionPhase::Transit);
        request_mode(vehicle, FlightMode::Auto, MissionPhase::Transit, timings).await?;
        vehicle
            .send_speed_command(self.settings.cruise_speed_ms)
            .await
            .map_err(MissionError::vehicle(MissionPhase::Transit))?;
        info!(run_id = %run.id, speed_ms = self.settings.cruise_speed_ms, "cruise speed commanded");
        self.monitor_transit(vehicle, items.len()).await?;

        run.enter(MissionPhase::ReturnToLaunch);
        vehicle
            .set_mode(FlightMode::Rtl)
            .await
            .map_err(MissionError::vehicle(MissionPhase::ReturnToLaunch))?;
        info!(run_id = %run.id, "all waypoints done, returning to launch");

        run.enter(MissionPhase::Landing);
        wait_for_landing(vehicle, timings).await?;
        info!(run_id = %run.id, "landed and disarmed");

        Ok(items.len())
    }

    async fn configure(&self, vehicle: &dyn VehicleControl) -> MissionResult<()> {
        let phase = MissionPhase::Configuring;
        for param in &self.settings.parameters {
            match vehicle
                .parameter(&param.name)
                .await
                .map_err(MissionError::vehicle(phase))?
            {
                None => warn!(param = %param.name, "parameter not supported, skipping"),
                Some(_) => match vehicle.set_parameter(&param.name, param.value).await {
                    Ok(()) => info!(param = %param.name, value = param.value, "parameter set"),
                    Err(e) => warn!(param = %param.name, error = %e, "could not set parameter"),
                },
            }
        }

        let mut failed = Vec::new();
        for param in &self.settings.parameters {
            let actual = vehicle
                .parameter(&param.name)
                .await
                .map_err(MissionError::vehicle(phase))?;
            match actual {
                None if param.critical => {
                    error!(param = %param.name, "critical parameter not supported");
                    failed.push(param.name.clone());
                }
                None => {}
                Some(got) if param.matches(got, self.settings.parameter_tolerance) => {
                    debug!(param = %param.name, value = got, "parameter verified");
                }
                Some(got) if param.critical => {
                    error!(param = %param.name, got, want = param.value, "critical parameter mismatch");
                    failed.push(param.name.clone());
                }
                Some(got) => {
                    warn!(param = %param.name, got, want = param.value, "parameter mismatch");
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MissionError::CriticalParameters(failed))
        }
    }

    async fn monitor_transit(&self, vehicle: &dyn VehicleControl, total: usize) -> MissionResult<()> {
        let phase = MissionPhase::Transit;
        let deadline = Instant::now() + self.settings.timings.transit_timeout;
        let mut last_item = None;

        loop {
            let current = vehicle
                .mission_progress()
                .await
                .map_err(MissionError::vehicle(phase))?;
            if last_item != Some(current) {
                info!(item = current, total, "mission progress");
                last_item = Some(current);
            }

            let bank = vehicle
                .attitude()
                .await
                .map_err(MissionError::vehicle(phase))?
                .bank_angle_deg();
            if bank > self.settings.bank_warning_deg {
                warn!(bank_deg = bank, limit_deg = self.settings.bank_warning_deg, "bank angle above limit");
            }

            if current >= total {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MissionError::Timeout {
                    phase,
                    condition: "mission completion".to_string(),
                    timeout: self.settings.timings.transit_timeout,
                });
            }
            sleep(self.settings.timings.monitor_poll).await;
        }
    }
}

/// Request `mode` and wait for the vehicle to report it.
pub(super) async fn request_mode(
    vehicle: &dyn VehicleControl,
    mode: FlightMode,
    phase: MissionPhase,
    timings: &MissionTimings,
) -> MissionResult<()> {
    info!(mode = %mode, "requesting mode change");
    vehicle
        .set_mode(mode.clone())
        .await
        .map_err(MissionError::vehicle(phase))?;
    let target = &mode;
    wait_until(
        phase,
        &format!("mode {}", mode),
        timings.mode_timeout,
        timings.confirm_poll,
        || async move { Ok(vehicle.mode().await? == *target) },
    )
    .await
}

/// Wait for touchdown with the vehicle disarmed, bounded by the landing timeout.
pub(super) async fn wait_for_landing(
    vehicle: &dyn VehicleControl,
    timings: &MissionTimings,
) -> MissionResult<()> {
    wait_until(
        MissionPhase::Landing,
        "landed and disarmed",
        timings.landing_timeout,
        timings.monitor_poll,
        || async move {
            let on_ground = vehicle.position().await?.relative_alt <= GROUND_ALTITUDE_M;
            Ok(on_ground && !vehicle.armed().await?)
        },
    )
    .await
}

/// Emergency recovery: QRTL, wait for the ground, force disarm.
pub(super) async fn abort_flight(vehicle: &dyn VehicleControl, run_id: Uuid, timings: &MissionTimings) {
    warn!(run_id = %run_id, "aborting mission, commanding QRTL");
    if let Err(e) = vehicle.set_mode(FlightMode::Qrtl).await {
        error!(run_id = %run_id, error = %e, "QRTL request failed");
    }

    let grounded = wait_until(
        MissionPhase::Aborted,
        "ground contact",
        timings.landing_timeout,
        timings.monitor_poll,
        || async move {
            // keep polling through transient read failures
            Ok(matches!(vehicle.position().await, Ok(p) if p.relative_alt <= GROUND_ALTITUDE_M))
        },
    )
    .await;
    match grounded {
        Ok(()) => info!(run_id = %run_id, "on ground, disarming"),
        Err(e) => error!(run_id = %run_id, error = %e, "vehicle not confirmed on ground, disarming anyway"),
    }

    if let Err(e) = vehicle.set_armed(false).await {
        error!(run_id = %run_id, error = %e, "force disarm failed");
    }
}

pub(super) async fn close_vehicle(vehicle: &dyn VehicleControl, run_id: Uuid) {
    if let Err(e) = vehicle.close().await {
        warn!(run_id = %run_id, error = %e, "failed to close vehicle connection");
    }
}

/// Poll `check` until it reports true or `timeout` elapses.
pub(super) async fn wait_until<F, Fut>(
    phase: MissionPhase,
    condition: &str,
    timeout: Duration,
    poll: Duration,
    mut check: F,
) -> MissionResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VehicleResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await.map_err(MissionError::vehicle(phase))? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MissionError::Timeout {
                phase,
                condition: condition.to_string(),
                timeout,
            });
        }
        sleep(poll).await;
    }
}
