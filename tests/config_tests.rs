use std::fs;
use std::time::Duration;
use swarm_survey::config::MissionMode;
use swarm_survey::domains::survey::BoundarySource;
use swarm_survey::Config;
use tempfile::tempdir;

#[test]
fn test_defaults_match_survey_profile() {
    let config = Config::default();
    assert_eq!(config.controller.port, 5000);
    assert_eq!(config.drone.listen_port, 5001);
    assert_eq!(config.survey.altitude_m, 50.0);
    assert_eq!(config.mission.cruise_speed_ms, 18.0);
    assert_eq!(config.controller_endpoint(), "127.0.0.1:5000");

    let executor = config.executor_settings();
    assert_eq!(executor.timings.mode_timeout, Duration::from_secs(10));
    assert_eq!(executor.timings.transit_timeout, Duration::from_secs(3600));
}

#[tokio::test]
async fn test_partial_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("swarm.toml");
    fs::write(
        &path,
        r#"
[drone]
id = 2
register_with_controller = false

[survey]
altitude_m = 80.0
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).await.unwrap();
    assert_eq!(config.drone.id, 2);
    assert_eq!(config.survey.altitude_m, 80.0);
    assert_eq!(config.survey.overlap_pct, 15.0);
    assert_eq!(config.drone.status_interval_ms, 1000);

    let telemetry = config.telemetry_settings();
    assert_eq!(telemetry.drone_id, 2);
    assert!(telemetry.controller.is_none());
}

#[test]
fn test_load_without_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.drone.listen_port, 5001);
    assert_eq!(config.logging.filter, "info");
}

#[test]
fn test_load_layers_file_then_environment() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("swarm.toml");
    fs::write(&path, "[controller]\nport = 6000\n\n[mission]\ncruise_speed_ms = 20.0\n").unwrap();

    std::env::set_var("SWARM__CONTROLLER__PORT", "7000");
    let config = Config::load(&path);
    std::env::remove_var("SWARM__CONTROLLER__PORT");
    let config = config.unwrap();

    assert_eq!(config.controller.port, 7000);
    assert_eq!(config.mission.cruise_speed_ms, 20.0);
    assert_eq!(config.coordinator_settings().default_drone_port, 5001);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("swarm.toml");
    fs::write(&path, "[drone\nid = ").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn test_pursuit_mode_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("swarm.toml");
    fs::write(
        &path,
        "[mission]\nmode = \"pursuit\"\n\n[pursuit]\nmax_targets = 4\nhover_s = 2\n",
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.mission.mode, MissionMode::Pursuit);

    let pursuit = config.pursuit_settings();
    assert_eq!(pursuit.max_targets, Some(4));
    assert_eq!(pursuit.hover, Duration::from_secs(2));
    assert_eq!(pursuit.altitude_m, 10.0);
    assert_eq!(pursuit.arrival_radius_m, 2.0);
    assert_eq!(pursuit.timings.arm_timeout, Duration::from_secs(10));
    assert_eq!(
        config.target_delay_range(),
        (Duration::from_secs(1), Duration::from_secs(7))
    );
    assert_eq!(Config::default().mission.mode, MissionMode::Survey);
}

#[tokio::test]
async fn test_boundary_source_follows_file_extension() {
    let dir = tempdir().unwrap();
    let kml = dir.path().join("30ha.KML");
    fs::write(
        &kml,
        "<kml><Placemark><Polygon><outerBoundaryIs><LinearRing><coordinates>\
         8.0,47.0 8.01,47.0 8.01,47.005 8.0,47.0\
         </coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark></kml>",
    )
    .unwrap();

    let mut config = Config::default();
    config.survey.boundary_file = kml;
    let area = config.boundary_source().load_boundary().await.unwrap();
    assert_eq!(area.polygon().vertices().len(), 3);

    // the same markup is not GeoJSON
    let geojson = dir.path().join("field.geojson");
    fs::copy(&config.survey.boundary_file, &geojson).unwrap();
    config.survey.boundary_file = geojson;
    assert!(config.boundary_source().load_boundary().await.is_err());
}
