//! The scenario files shipped in `scenarios/` load and describe runnable
//! deployments.

use std::path::PathBuf;

use cosim::bus::{Endpoint, SocketRole};
use cosim::engine::{Pacing, Route, ScenarioConfig};
use cosim::{setup, ControllerScenario, OfflineRun};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

#[test]
fn mass_spring_damper_scenario_loads() {
    let path = scenario_path("mass_spring_damper.toml");
    let config = ScenarioConfig::load(&path).unwrap();
    assert_eq!(config.model.source, "mass-spring-damper");
    assert_eq!(config.clock.step_size, 0.1);
    assert_eq!(config.clock.stop_time, Some(100.0));
    assert_eq!(config.clock.pacing, Pacing::Realtime);
    assert_eq!(config.transport.outbound, Endpoint::bind("tcp://*:7000"));
    assert_eq!(config.transport.inbound.role, SocketRole::Connect);

    let controller = ControllerScenario::load(&path).unwrap().controller;
    assert_eq!(controller.target, 10.0);
    assert_eq!(controller.publish, Endpoint::bind("tcp://*:7001"));
}

#[test]
fn bridge_and_controller_endpoints_pair_up() {
    let path = scenario_path("mass_spring_damper.toml");
    let bridge = ScenarioConfig::load(&path).unwrap().transport;
    let controller = ControllerScenario::load(&path).unwrap().controller;

    let port = |e: &Endpoint| e.address.rsplit(':').next().map(str::to_string);
    assert_eq!(port(&bridge.outbound), port(&controller.subscribe));
    assert_eq!(port(&bridge.inbound), port(&controller.publish));
    assert_ne!(bridge.outbound.role, controller.subscribe.role);
    assert_ne!(bridge.inbound.role, controller.publish.role);
}

#[test]
fn shipped_scenarios_build_topic_tables() {
    for name in ["mass_spring_damper.toml", "integrator.toml"] {
        let config = ScenarioConfig::load(scenario_path(name)).unwrap();
        let (_, router) = setup::prepare(&config).unwrap();
        let table = router.table();
        assert!(
            table
                .iter()
                .any(|(topic, route)| topic == "input/u" && matches!(route, Route::Input(_))),
            "{name}: no input/u in {table:?}"
        );
        assert!(table.iter().any(|(topic, _)| topic == "output/x"));
    }
}

#[test]
fn offline_run_from_scenario_settles() {
    let path = scenario_path("mass_spring_damper.toml");
    let config = ScenarioConfig::load(&path).unwrap();
    let controller = ControllerScenario::load(&path).unwrap().controller;
    let (mut stepper, _) = setup::prepare(&config).unwrap();

    let run = OfflineRun {
        measurement: controller.measurement.clone(),
        actuation: controller.actuation.clone(),
        step_size: config.clock.step_size,
        stop_time: config.clock.stop_time.unwrap(),
    };
    let rows = run.execute(&mut stepper, &controller.pid()).unwrap();
    let last = rows.last().unwrap();
    assert!((last.measured - controller.target).abs() < 0.05);

    let mut csv = Vec::new();
    run.write_csv(&mut csv, &rows).unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert!(text.starts_with("time,x,error,u\n"));
    assert_eq!(text.lines().count(), rows.len() + 1);
}
