//! End-to-end scheduler scenarios: both loops running on real threads
//! against a counting body.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rover_hal::Body;
use rover_runtime::{
    LoopKind, LoopState, Phase, PlanningResult, RecordingErrorSink, RoverError, Scheduler,
    SchedulerConfig, StrategySet,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingBody {
    stops: AtomicUsize,
    releases: AtomicUsize,
}

impl CountingBody {
    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Body for CountingBody {
    fn stop_all_motion(&self) -> Result<(), RoverError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), RoverError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn config(timeout: Duration) -> SchedulerConfig {
    SchedulerConfig {
        shutdown_timeout: timeout,
        ..SchedulerConfig::default()
    }
}

/// Spin until `cond` holds or `limit` elapses.
fn wait_for(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn perceive_faults_never_terminate_the_loop() {
    let body = Arc::new(CountingBody::default());
    let sink = Arc::new(RecordingErrorSink::new());
    let plans = counter();
    let p = plans.clone();
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_perceive(|_, _, _| Err(RoverError::strategy("lidar dropout")))
            .with_plan(move |_, _, _| {
                p.fetch_add(1, Ordering::SeqCst);
                Ok(PlanningResult::NoPlan)
            }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .with_error_sink(sink.clone())
        .start(brain, Arc::clone(&body))
        .unwrap();

    assert!(wait_for(Duration::from_secs(5), || plans.load(Ordering::SeqCst) >= 200));
    assert_eq!(handle.state(LoopKind::Deliberative), LoopState::Running);
    let report = handle.stop();

    assert!(report.is_clean());
    assert!(sink.count(Phase::Perceive) >= 200);
    assert_eq!(sink.count(Phase::Plan), 0);
}

#[test]
fn plan_always_faulting_never_acts() {
    let body = Arc::new(CountingBody::default());
    let sink = Arc::new(RecordingErrorSink::new());
    let acts = counter();
    let a = acts.clone();
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_plan(|_, _, _| Err(RoverError::strategy("planner offline")))
            .with_act(move |_, _, _| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .with_error_sink(sink.clone())
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        handle.iterations(LoopKind::Deliberative) >= 500
    }));
    handle.stop();

    assert_eq!(acts.load(Ordering::SeqCst), 0);
    assert!(sink.count(Phase::Plan) >= 499);
    assert_eq!(sink.count(Phase::Act), 0);
}

#[test]
fn affirmative_plan_acts_once_per_iteration() {
    let body = Arc::new(CountingBody::default());
    let plans = counter();
    let acts = counter();
    let (p, a) = (plans.clone(), acts.clone());
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_plan(move |_, _, _| {
                p.fetch_add(1, Ordering::SeqCst);
                Ok(PlanningResult::Plan)
            })
            .with_act(move |_, _, _| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || acts.load(Ordering::SeqCst) >= 100));
    handle.stop();

    let plans = plans.load(Ordering::SeqCst);
    let acts = acts.load(Ordering::SeqCst);
    // Cancellation may land between the last Plan and its Act.
    assert!(
        acts == plans || acts + 1 == plans,
        "plans={plans} acts={acts}"
    );
}

#[test]
fn shutdown_stops_each_loop_once_then_releases() {
    let body = Arc::new(CountingBody::default());
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_plan(|_, _, _| Ok(PlanningResult::Plan))
            .with_act(|_, _, _| Ok(()))
            .with_react(|_, _, _| Ok(())),
    );

    let handle = Scheduler::new(config(Duration::from_secs(10)))
        .start(brain, Arc::clone(&body))
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = handle.stop();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.finished, vec![LoopKind::Deliberative, LoopKind::Reactive]);
    assert!(report.timed_out.is_empty());
    assert!(report.body_released);
    assert_eq!(body.stops(), 2, "one stop_all_motion per loop");
    assert_eq!(body.releases(), 1);
}

#[test]
fn reactive_keeps_running_while_deliberative_is_mid_plan() {
    let body = Arc::new(CountingBody::default());
    let reacts = counter();
    let in_plan = Arc::new(AtomicBool::new(false));
    let release_plan = Arc::new(AtomicBool::new(false));

    let r = reacts.clone();
    let (entered, gate) = (in_plan.clone(), release_plan.clone());
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_plan(move |_, _, _| {
                entered.store(true, Ordering::SeqCst);
                while !gate.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(PlanningResult::NoPlan)
            })
            .with_react(move |_, _, _| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || in_plan.load(Ordering::SeqCst)));

    let before = reacts.load(Ordering::SeqCst);
    let deliberative_before = handle.iterations(LoopKind::Deliberative);
    thread::sleep(Duration::from_millis(50));
    let after = reacts.load(Ordering::SeqCst);

    assert!(after > before + 10, "react only advanced from {before} to {after}");
    assert_eq!(
        handle.iterations(LoopKind::Deliberative),
        deliberative_before,
        "deliberative loop is parked inside Plan"
    );

    release_plan.store(true, Ordering::SeqCst);
    assert!(handle.stop().is_clean());
}

#[test]
fn react_only_set_keeps_both_loops_alive() {
    let body = Arc::new(CountingBody::default());
    let sink = Arc::new(RecordingErrorSink::new());
    let reacts = counter();
    let r = reacts.clone();
    let brain = Arc::new(StrategySet::<CountingBody>::new().with_react(move |_, _, _| {
        r.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .with_error_sink(sink.clone())
        .start(Arc::clone(&brain), Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        handle.iterations(LoopKind::Deliberative) >= 1_000 && reacts.load(Ordering::SeqCst) >= 1_000
    }));
    assert!(!brain.has_act());
    handle.stop();

    assert!(sink.is_empty(), "empty slots never fault");
}

#[test]
fn shutdown_returns_after_timeout_when_a_strategy_hangs() {
    let body = Arc::new(CountingBody::default());
    let hanging = Arc::new(AtomicBool::new(false));
    let h = hanging.clone();
    let brain = Arc::new(StrategySet::<CountingBody>::new().with_react(move |_, _, _| {
        h.store(true, Ordering::SeqCst);
        // Ignores its cancellation token on purpose.
        thread::sleep(Duration::from_secs(3));
        Ok(())
    }));

    let handle = Scheduler::new(config(Duration::from_millis(200)))
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || hanging.load(Ordering::SeqCst)));

    let started = Instant::now();
    let report = handle.stop();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2), "shutdown took {elapsed:?}");
    assert_eq!(report.finished, vec![LoopKind::Deliberative]);
    assert_eq!(report.timed_out, vec![LoopKind::Reactive]);
    assert!(report.body_released);
    assert!(!report.is_clean());
    assert_eq!(body.releases(), 1);
    assert!(body.stops() >= 1, "deliberative loop stopped the body");
}

#[test]
fn cooperative_strategy_exits_through_its_iteration_token() {
    let body = Arc::new(CountingBody::default());
    let entered = Arc::new(AtomicBool::new(false));
    let e = entered.clone();
    let brain = Arc::new(StrategySet::<CountingBody>::new().with_act(|_, _, _| Ok(())).with_react(
        move |_, _, local| {
            e.store(true, Ordering::SeqCst);
            // Long-running behavior that honours cancellation.
            while !local.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        },
    ));

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || entered.load(Ordering::SeqCst)));

    let report = handle.stop();
    assert!(report.is_clean());
    assert!(report.elapsed_ms < 5_000);
}

#[test]
fn strategies_can_be_swapped_mid_run() {
    let body = Arc::new(CountingBody::default());
    let old_acts = counter();
    let new_acts = counter();
    let old = old_acts.clone();
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_plan(|_, _, _| Ok(PlanningResult::Plan))
            .with_act(move |_, _, _| {
                old.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .start(Arc::clone(&brain), Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || old_acts.load(Ordering::SeqCst) >= 10));

    let new = new_acts.clone();
    brain.set_act(move |_, _, _| {
        new.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(wait_for(Duration::from_secs(5), || new_acts.load(Ordering::SeqCst) >= 10));
    let old_after_swap = old_acts.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    // At most one in-flight call of the old strategy can land after the swap.
    assert!(old_acts.load(Ordering::SeqCst) <= old_after_swap + 1);

    brain.clear_plan();
    let frozen = new_acts.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert!(new_acts.load(Ordering::SeqCst) <= frozen + 1, "no plan, no act");

    handle.stop();
}

#[test]
fn panicking_strategies_are_contained() {
    let body = Arc::new(CountingBody::default());
    let sink = Arc::new(RecordingErrorSink::new());
    let brain = Arc::new(
        StrategySet::<CountingBody>::new()
            .with_act(|_, _, _| Ok(()))
            .with_plan(|_, _, _| Ok(PlanningResult::Plan))
            .with_react(|_, _, _| -> Result<(), RoverError> { panic!("reflex crashed") }),
    );

    let handle = Scheduler::new(config(Duration::from_secs(5)))
        .with_error_sink(sink.clone())
        .start(brain, Arc::clone(&body))
        .unwrap();
    assert!(wait_for(Duration::from_secs(5), || sink.count(Phase::React) >= 20));
    assert_eq!(handle.state(LoopKind::Reactive), LoopState::Running);

    let report = handle.stop();
    assert!(report.is_clean());
    assert!(sink.faults().iter().all(|f| f.loop_kind == LoopKind::Reactive));
}

#[test]
fn hanging_strategy_shows_up_as_stalled() {
    let body = Arc::new(CountingBody::default());
    let hanging = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let (h, gate) = (hanging.clone(), release.clone());
    let brain = Arc::new(StrategySet::<CountingBody>::new().with_react(move |_, _, _| {
        h.store(true, Ordering::SeqCst);
        while !gate.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }));

    let handle = Scheduler::new(SchedulerConfig {
        shutdown_timeout: Duration::from_secs(5),
        stall_threshold: Duration::from_millis(50),
        ..SchedulerConfig::default()
    })
    .start(brain, Arc::clone(&body))
    .unwrap();
    assert!(wait_for(Duration::from_secs(5), || hanging.load(Ordering::SeqCst)));
    assert!(wait_for(Duration::from_secs(5), || {
        handle.stalled_loops() == vec![LoopKind::Reactive]
    }));

    release.store(true, Ordering::SeqCst);
    assert!(handle.stop().is_clean());
}
