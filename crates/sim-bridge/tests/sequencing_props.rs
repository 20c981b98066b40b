use proptest::prelude::*;
use sim_bridge::testing::RecordingEngine;
use sim_bridge::{BridgeConfig, Input, SimulationBridge, StepBounds, StepDelta};
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(bridge: &SimulationBridge<RecordingEngine>, seq: u64) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if bridge.latest_output().map(|o| o.sequence_id).unwrap_or(0) >= seq {
            return true;
        }
        thread::sleep(Duration::from_micros(200));
    }
    false
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Paced submits: every input is consumed exactly once and simulated
    /// time is the sum of the clamped steps.
    #[test]
    fn paced_submits_advance_by_clamped_steps(dts in prop::collection::vec(-0.1f64..0.2, 1..20)) {
        let (engine, probe) = RecordingEngine::probed();
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(engine).unwrap();
        let bounds = StepBounds::default();

        let mut expected = 0.0;
        for (i, dt) in dts.iter().enumerate() {
            let seq = bridge.submit_input(Input::new(*dt, 0.0, false)).unwrap();
            prop_assert_eq!(seq, i as u64 + 1);
            prop_assert!(wait_for(&bridge, seq));
            expected += StepDelta::new(*dt).clamp(&bounds).seconds();
        }

        let total = probe.lock().unwrap().total_time.as_secs_f64();
        prop_assert!((total - expected).abs() < 1e-6);
        prop_assert_eq!(bridge.stop().stats.cycles_executed, dts.len() as u64);
    }

    /// Unpaced bursts: output never runs ahead of the producer and the last
    /// input is always consumed.
    #[test]
    fn bursts_converge_on_last_input(count in 1u64..200) {
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(RecordingEngine::new()).unwrap();

        let mut last_seen = 0;
        for _ in 0..count {
            bridge.submit_input(Input::default()).unwrap();
            let seq = bridge.latest_output().unwrap().sequence_id;
            prop_assert!(seq >= last_seen);
            prop_assert!(seq <= bridge.last_submitted());
            last_seen = seq;
        }
        prop_assert!(wait_for(&bridge, count));
        prop_assert!(bridge.heartbeat() <= count);
    }
}
