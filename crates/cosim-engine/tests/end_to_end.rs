//! Integration test: a full bridge over in-memory transports.
//!
//! A recording model with input `u` and output `x` runs at `dt = 0.1`
//! for ten steps in real time while the publisher samples every 0.5 s.
//! Inbound traffic (inputs, garbage, resets) goes through the same
//! transport a remote controller would use.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cosim_bus::{MemoryBus, MemorySubscriber, Message, Publisher};
use cosim_core::ValueRef;
use cosim_engine::{
    Bridge, BridgeOptions, ClockConfig, ClockOutcome, GatewayExit, ModelStepper, Pacing,
    TopicRouter, TopicScheme,
};
use cosim_test_utils::{Call, CallLog, RecordingEngine};
use indexmap::IndexMap;
use serde_json::Value;

struct Harness {
    bridge: Bridge,
    log: CallLog,
    outbound: MemoryBus,
    inbound: MemoryBus,
}

fn start(clock: ClockConfig, publish_period: Duration) -> Harness {
    let (engine, log) = RecordingEngine::new();
    let stepper = ModelStepper::new(Box::new(engine), 0.0, &IndexMap::new()).unwrap();
    let router = Arc::new(
        TopicRouter::new(Arc::clone(stepper.registry()), TopicScheme::default()).unwrap(),
    );
    let outbound = MemoryBus::new();
    let inbound = MemoryBus::new();
    let sub = inbound.subscribe(router.subscriptions().to_vec());
    let options = BridgeOptions {
        clock,
        publish_period,
        poll_interval: Duration::from_millis(5),
    };
    let bridge = Bridge::start(stepper, router, options, outbound.publisher(), sub).unwrap();
    Harness {
        bridge,
        log,
        outbound,
        inbound,
    }
}

fn free_running() -> ClockConfig {
    ClockConfig {
        step_size: 0.01,
        stop_time: None,
        pacing: Pacing::Realtime,
        hold_at_stop: true,
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn combined(sub: &mut MemorySubscriber) -> Vec<serde_json::Map<String, Value>> {
    sub.drain()
        .into_iter()
        .filter(|m| m.topic == b"output")
        .map(|m| match serde_json::from_slice(&m.payload).unwrap() {
            Value::Object(map) => map,
            other => panic!("combined payload is not an object: {other}"),
        })
        .collect()
}

#[test]
fn ten_steps_published_at_half_second_period() {
    let mut h = start(
        ClockConfig {
            step_size: 0.1,
            stop_time: Some(1.0),
            pacing: Pacing::Realtime,
            hold_at_stop: true,
        },
        Duration::from_millis(500),
    );
    let mut sub = h.outbound.subscribe(["output"]);

    let mut seen = Vec::new();
    wait_until("a combined sample at t = 1.0", || {
        seen.extend(combined(&mut sub));
        seen.iter()
            .any(|m| (m["t"].as_f64().unwrap() - 1.0).abs() < 1e-9)
    });
    let report = h.bridge.shutdown();

    // The model was stepped exactly ten times, at t = 0.0 .. 0.9.
    let steps: Vec<f64> = h
        .log
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::DoStep { current_time, dt } => {
                assert!((dt - 0.1).abs() < 1e-12);
                Some(current_time)
            }
            _ => None,
        })
        .collect();
    assert_eq!(steps.len(), 10);
    for (i, t) in steps.iter().enumerate() {
        assert!((t - 0.1 * i as f64).abs() < 1e-9, "step {i} started at {t}");
    }

    let clock = report.clock.unwrap();
    assert_eq!(clock.outcome, ClockOutcome::Completed);
    assert_eq!(clock.steps, 10);
    assert!((clock.final_time - 1.0).abs() < 1e-9);

    // The first sample lands about half a second in; keys are t then x.
    let first = &seen[0];
    let t0 = first["t"].as_f64().unwrap();
    assert!((0.2..=0.8).contains(&t0), "first sample at t = {t0}");
    let keys: Vec<&str> = first.keys().map(String::as_str).collect();
    assert_eq!(keys, ["t", "x"]);

    // Samples never move backwards in time.
    let times: Vec<f64> = seen.iter().map(|m| m["t"].as_f64().unwrap()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "{times:?}");
}

#[test]
fn per_variable_topics_follow_combined() {
    let mut h = start(free_running(), Duration::from_millis(5));
    let mut sub = h.outbound.subscribe(["output"]);

    let mut msgs: Vec<Message> = Vec::new();
    wait_until("two publish rounds", || {
        msgs.extend(sub.drain());
        msgs.len() >= 4
    });
    h.bridge.shutdown();

    // Each round is [output, output/x]; start at the first combined message.
    let start = msgs.iter().position(|m| m.topic == b"output").unwrap();
    let round = &msgs[start..start + 2];
    assert_eq!(round[1].topic, b"output/x");
    let combined: Value = serde_json::from_slice(&round[0].payload).unwrap();
    let scalar: Value = serde_json::from_slice(&round[1].payload).unwrap();
    assert_eq!(combined["x"], scalar);
}

#[test]
fn malformed_payload_keeps_previous_value_and_gateway_alive() {
    let mut h = start(free_running(), Duration::from_millis(50));
    let mut remote = h.inbound.publisher();

    remote.publish(b"input/u", b"1.5").unwrap();
    wait_until("u = 1.5 to reach the model", || {
        h.log.writes().iter().flatten().any(|&w| w == (ValueRef(0), 1.5))
    });

    remote.publish(b"input/u", b"one point five").unwrap();
    remote.publish(b"input/u", b"").unwrap();
    remote.publish(b"input/w", b"2.0").unwrap();
    wait_until("w = 2.0 to reach the model", || {
        h.log.writes().iter().flatten().any(|&w| w == (ValueRef(1), 2.0))
    });

    let report = h.bridge.shutdown();

    // No value other than 1.5 was ever written to u.
    let u_writes: Vec<f64> = h
        .log
        .writes()
        .into_iter()
        .flatten()
        .filter(|&(vr, _)| vr == ValueRef(0))
        .map(|(_, v)| v)
        .collect();
    assert_eq!(u_writes, vec![1.5]);

    let gateway = report.gateway.unwrap();
    assert_eq!(gateway.exit, GatewayExit::Shutdown);
    assert_eq!(gateway.applied, 2);
    assert_eq!(gateway.malformed, 2);
}

#[test]
fn remote_reset_discards_earlier_input_and_keeps_later_input() {
    // Held at the stop time the clock drains the mailbox but never
    // advances, so nothing written before the reset can reach the model.
    let held = ClockConfig {
        step_size: 0.01,
        stop_time: Some(0.05),
        pacing: Pacing::Unpaced,
        hold_at_stop: true,
    };
    let mut h = start(held, Duration::from_millis(50));
    let mut remote = h.inbound.publisher();
    let u = ValueRef(0);

    wait_until("the stop time", || {
        h.bridge
            .latest_snapshot()
            .is_some_and(|s| s.generation == 0 && s.step == 5)
    });
    remote.publish(b"input/u", b"5").unwrap();
    remote.publish(b"reset", b"").unwrap();
    remote.publish(b"input/u", b"2").unwrap();
    wait_until("the rerun after the reset", || {
        h.bridge
            .latest_snapshot()
            .is_some_and(|s| s.generation == 1 && s.step == 5)
    });

    let report = h.bridge.shutdown();
    assert_eq!(h.log.instantiations(), 2);
    assert_eq!(report.clock.unwrap().resets, 1);
    let gateway = report.gateway.unwrap();
    assert_eq!(gateway.resets, 1);
    assert_eq!(gateway.applied, 2);

    let calls = h.log.calls();
    assert!(
        calls
            .iter()
            .all(|c| !matches!(c, Call::SetReal(w) if w.contains(&(u, 5.0)))),
        "input written before the reset reached the model: {calls:?}"
    );
    let reset_at = calls
        .iter()
        .rposition(|c| matches!(c, Call::Instantiate { .. }))
        .unwrap();
    let first_write = calls[reset_at..].iter().find_map(|c| match c {
        Call::SetReal(w) => Some(w.clone()),
        _ => None,
    });
    assert_eq!(first_write, Some(vec![(u, 2.0)]));
}

#[test]
fn nothing_is_queued_without_subscribers() {
    let mut h = start(free_running(), Duration::from_millis(2));
    wait_until("several publish rounds", || {
        h.bridge.latest_snapshot().is_some_and(|s| s.step >= 10)
    });
    h.bridge.shutdown();
    assert_eq!(h.outbound.delivered(), 0);
    assert_eq!(h.outbound.dropped(), 0);
}
