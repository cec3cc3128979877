use desk_core::mocks::ManualTelemetry;
use desk_core::{Direction, HeightSample, MovementGuard, StoppingPredictor};
use rstest::rstest;
use std::time::Duration;

fn guard() -> MovementGuard {
    MovementGuard::new(StoppingPredictor::default())
}

#[rstest]
#[case(Direction::Up, 8000, 8000)]
#[case(Direction::Up, 8000, 8100)]
#[case(Direction::Down, 7000, 6900)]
fn already_past_target_fires_immediately(
    #[case] direction: Direction,
    #[case] target: u32,
    #[case] current: u32,
) {
    let g = guard();
    assert_eq!(g.guard(direction, target, current), Some(current));
    assert!(!g.is_guarding());
    assert_eq!(g.reached().try_recv().unwrap(), current);
}

#[test]
fn predicted_crossing_fires_once() {
    let g = guard();
    assert_eq!(g.guard(Direction::Up, 8000, 7000), None);
    assert_eq!(g.observe(&HeightSample::new(7900, 6200)), None);
    // 7975 + 28 of lookahead passes 8000
    assert_eq!(g.observe(&HeightSample::new(7975, 6200)), Some(8003));
    assert_eq!(g.observe(&HeightSample::new(7990, 6200)), None);
    assert_eq!(g.reached().try_iter().collect::<Vec<_>>(), vec![8003]);
}

#[test]
fn actual_crossing_fires_when_descending() {
    let g = guard();
    g.guard(Direction::Down, 7000, 7500);
    assert_eq!(g.observe(&HeightSample::new(7100, -3100)), None);
    // Slow reading: no lookahead, but the height itself is past.
    assert_eq!(g.observe(&HeightSample::new(6995, 0)), Some(6995));
}

#[test]
fn stop_guarding_silences_samples() {
    let g = guard();
    g.guard(Direction::Up, 8000, 7000);
    g.stop_guarding();
    assert_eq!(g.observe(&HeightSample::new(8100, 6200)), None);
    assert!(g.reached().try_recv().is_err());
}

#[test]
fn worker_reports_from_telemetry() {
    let telemetry = ManualTelemetry::new();
    let g = guard();
    g.initialize(&telemetry);
    g.guard(Direction::Up, 8000, 7000);
    telemetry.push_raw(&[1, 2]);
    telemetry.push(7500, 6200);
    telemetry.push(8010, 6200);
    assert_eq!(
        g.reached().recv_timeout(Duration::from_secs(2)).unwrap(),
        8038
    );
    g.dispose();
}
