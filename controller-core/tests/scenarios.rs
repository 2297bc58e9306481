mod support;

use holdup_core::controller::PowerState;
use holdup_core::countdown::CountdownPhase;
use holdup_core::handlers::EdgeOutcome;
use support::Bench;

#[test]
fn utility_power_present_keeps_device_on() {
    let mut bench = Bench::new();
    bench.set_threshold(3);

    for cycle in 0..50 {
        let running = cycle % 2 == 0;
        if let Some(outcome) = bench.set_device_running(running) {
            assert_eq!(outcome, EdgeOutcome::PowerPresent);
        }
        let outcome = bench.tick();
        assert_eq!(outcome.state, PowerState::PoweredNormal);
        assert!(bench.output_on());
        assert_eq!(bench.elapsed(), 0);
    }
}

#[test]
fn short_outage_within_grace_period_keeps_device_on() {
    let mut bench = Bench::new();
    bench.set_threshold(5);
    bench.set_power_lost(true);
    assert_eq!(bench.poll().state, PowerState::PoweredOnBackup);

    assert_eq!(
        bench.set_device_running(false),
        Some(EdgeOutcome::CountdownStarted)
    );

    for expected in 1..=4 {
        let outcome = bench.tick();
        assert_eq!(outcome.threshold, 5);
        assert_eq!(outcome.elapsed, expected);
        assert_eq!(outcome.state, PowerState::PoweredOnBackup);
    }
    assert!(bench.output_on());
    assert_eq!(bench.elapsed(), 4);
}

#[test]
fn outage_past_grace_period_cuts_power_on_sixth_tick() {
    let mut bench = Bench::new();
    bench.set_threshold(5);
    bench.set_power_lost(true);
    bench.poll();
    bench.set_device_running(false);

    for _ in 1..=5 {
        bench.tick();
        assert!(bench.output_on());
    }

    let outcome = bench.tick();
    assert!(outcome.cut_power());
    assert_eq!(outcome.elapsed, 6);
    assert_eq!(outcome.state, PowerState::PoweringDown);
    assert!(!bench.output_on());
    assert_eq!(bench.elapsed(), 0);
    assert_eq!(bench.countdown.phase(), CountdownPhase::Stopped);

    // Further overflows are ignored and the device stays off.
    for _ in 0..10 {
        let outcome = bench.tick();
        assert_eq!(outcome.state, PowerState::PoweringDown);
        assert_eq!(outcome.elapsed, 0);
    }
    assert!(!bench.output_on());
}

#[test]
fn device_that_keeps_running_is_never_cut() {
    let mut bench = Bench::new();
    bench.set_threshold(1);
    bench.set_power_lost(true);

    for _ in 0..100 {
        let outcome = bench.tick();
        assert_eq!(outcome.state, PowerState::PoweredOnBackup);
        assert_eq!(outcome.elapsed, 0);
    }
    assert!(bench.output_on());
    assert_eq!(bench.countdown.phase(), CountdownPhase::Stopped);
}

#[test]
fn device_that_keeps_running_then_stops_is_cut_after_grace() {
    let mut bench = Bench::new();
    bench.set_threshold(2);
    bench.set_power_lost(true);

    for _ in 0..5 {
        bench.tick();
    }
    assert_eq!(
        bench.set_device_running(false),
        Some(EdgeOutcome::CountdownStarted)
    );

    bench.tick();
    bench.tick();
    assert!(bench.output_on());
    assert!(bench.tick().cut_power());
}

#[test]
fn power_returning_mid_countdown_restores_normal_operation() {
    let mut bench = Bench::new();
    bench.set_threshold(8);
    bench.set_power_lost(true);
    bench.set_device_running(false);
    bench.tick();
    bench.tick();
    assert_eq!(bench.elapsed(), 2);

    bench.set_power_lost(false);
    let outcome = bench.poll();
    assert_eq!(outcome.state, PowerState::PoweredNormal);
    assert_eq!(bench.elapsed(), 0);
    assert_eq!(bench.countdown.phase(), CountdownPhase::Stopped);
    assert!(
        !bench
            .countdown
            .with(|timer| timer.diagnostic_pin().high)
            .unwrap()
    );
}
