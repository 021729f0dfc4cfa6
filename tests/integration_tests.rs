//! Integration tests for stepper-pulse.
//!
//! These tests run the stepper engine against recording drivers and a simulated
//! step timer, checking what reaches the pins.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal_mock::eh1::delay::NoopDelay;
use proptest::prelude::*;

use stepper_pulse::config::{
    AxisConfig, EngineConfig, EngineSettings, IntervalMode, ShapingConfig,
};
use stepper_pulse::error::{ConfigError, Error, MotionError, MotorError};
use stepper_pulse::motion::{
    BlockBuilder, BlockConsumer, BlockQueue, Bresenham, IntervalCalculator, MotionBlock,
    PageStore, SyncKind, MAX_AXES, PAGE_SIZE,
};
use stepper_pulse::motor::{AxisDriver, Position, StepperTimer};
use stepper_pulse::stepper::{EngineBuilder, EngineSignals, SharedEngine, StepperEngine};
use stepper_pulse::BlockId;

const TIMER: u32 = 2_000_000;
const ISR_LIMIT: usize = 100_000;

// =============================================================================
// Test rig
// =============================================================================

#[derive(Debug, Default)]
struct PinLog {
    level: bool,
    forward: bool,
    enabled: bool,
    pulses: u32,
    net: i32,
}

/// Driver that records pin activity; clones share the log.
#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<PinLog>>);

impl Recorder {
    fn pulses(&self) -> u32 {
        self.0.borrow().pulses
    }

    fn net(&self) -> i32 {
        self.0.borrow().net
    }

    fn forward(&self) -> bool {
        self.0.borrow().forward
    }

    fn enabled(&self) -> bool {
        self.0.borrow().enabled
    }
}

impl AxisDriver for Recorder {
    fn set_step(&mut self, active: bool) -> Result<(), MotorError> {
        let mut log = self.0.borrow_mut();
        if active && !log.level {
            log.pulses += 1;
            log.net += if log.forward { 1 } else { -1 };
        }
        log.level = active;
        Ok(())
    }

    fn set_direction(&mut self, forward: bool) -> Result<(), MotorError> {
        self.0.borrow_mut().forward = forward;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), MotorError> {
        self.0.borrow_mut().enabled = enabled;
        Ok(())
    }
}

/// Step timer whose count advances by `cost` ticks per read.
#[derive(Clone, Default)]
struct SimTimer {
    elapsed: Rc<Cell<u32>>,
    cost: Rc<Cell<u32>>,
    compares: Rc<RefCell<Vec<u32>>>,
    pulse: u32,
}

impl StepperTimer for SimTimer {
    fn count(&mut self) -> u32 {
        let now = self.elapsed.get().wrapping_add(self.cost.get());
        self.elapsed.set(now);
        now
    }

    fn set_compare(&mut self, ticks: u32) {
        if ticks != u32::MAX {
            self.compares.borrow_mut().push(ticks);
        }
    }

    fn pulse_count(&mut self) -> u32 {
        self.pulse = self.pulse.wrapping_add(1);
        self.pulse
    }
}

type Engine<'a> = StepperEngine<'a, BlockConsumer<'a, 16>, Recorder, SimTimer, NoopDelay>;

struct Rig {
    motors: Vec<Vec<Recorder>>,
    timer: SimTimer,
}

impl Rig {
    fn motor(&self, axis: usize) -> &Recorder {
        &self.motors[axis][0]
    }

    /// Run ISRs until the engine is idle.
    fn run(&self, engine: &mut Engine<'_>) -> usize {
        let mut isrs = 0;
        while engine.is_busy() {
            assert!(isrs < ISR_LIMIT, "engine never went idle");
            self.isr(engine);
            isrs += 1;
        }
        isrs
    }

    fn isr(&self, engine: &mut Engine<'_>) {
        self.timer.elapsed.set(0);
        engine.isr();
    }

    fn intervals(&self) -> Vec<u32> {
        self.timer.compares.borrow().clone()
    }
}

fn build<'a>(
    config: &EngineConfig,
    consumer: BlockConsumer<'a, 16>,
    signals: &'a EngineSignals,
) -> (Engine<'a>, Rig) {
    let settings = EngineSettings::from_config(config).unwrap();
    build_with(config, settings, consumer, signals)
}

/// Like [`build`], with settings tuned past what a config would allow.
fn build_with<'a>(
    config: &EngineConfig,
    settings: EngineSettings,
    consumer: BlockConsumer<'a, 16>,
    signals: &'a EngineSignals,
) -> (Engine<'a>, Rig) {
    let timer = SimTimer::default();
    let mut rig = Rig {
        motors: Vec::new(),
        timer: timer.clone(),
    };
    let mut builder = EngineBuilder::new()
        .settings(settings)
        .planner(consumer)
        .timer(timer)
        .delay(NoopDelay::new())
        .signals(signals);
    for (axis, axis_config) in config.axes.values().enumerate() {
        let mut motors = Vec::new();
        for _ in 0..axis_config.motors {
            let recorder = Recorder::default();
            builder = builder.attach(axis, recorder.clone()).unwrap();
            motors.push(recorder);
        }
        rig.motors.push(motors);
    }
    (builder.build().unwrap(), rig)
}

fn axes(names: &[&str]) -> EngineConfig {
    let mut config = EngineConfig::default();
    for name in names {
        let axis = if name.starts_with('e') {
            AxisConfig::extruder()
        } else {
            AxisConfig::linear()
        };
        config = config.with_axis(name, axis).unwrap();
    }
    config
}

fn line(steps: &[(usize, i32)], rate: u32) -> MotionBlock {
    let mut builder = BlockBuilder::new(TIMER).rates(rate, rate, rate);
    for &(axis, count) in steps {
        builder = builder.steps(axis, count);
    }
    builder.build().unwrap()
}

fn ramp(axis: usize, steps: i32) -> MotionBlock {
    BlockBuilder::new(TIMER)
        .steps(axis, steps)
        .rates(500, 4000, 500)
        .acceleration(20_000)
        .build()
        .unwrap()
}

// =============================================================================
// Step distribution
// =============================================================================

#[test]
fn test_two_axis_line_steps_exactly() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    let id = producer.push(line(&[(0, 100), (1, 50)], 1000)).unwrap();
    rig.isr(&mut engine);
    assert_eq!(engine.current_block_id(), id);
    assert!(signals.is_block_busy(id));

    while engine.is_busy() {
        rig.isr(&mut engine);
        // Y steps on every other X step
        let (x, y) = (engine.position(0), engine.position(1));
        assert!((2 * y - x).abs() <= 1, "x {} y {}", x, y);
    }

    assert_eq!(engine.position(0), 100);
    assert_eq!(engine.position(1), 50);
    assert_eq!(rig.motor(0).pulses(), 100);
    assert_eq!(rig.motor(1).pulses(), 50);
    assert_eq!(engine.planner().completed_blocks(), 1);
    assert_eq!(engine.current_block_id(), BlockId::NONE);
    assert!(!signals.is_block_busy(id));
}

#[test]
fn test_backward_motion_counts_down() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, -40), (1, 25)], 2000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.positions(), Position::from_slice(&[-40, 25]));
    assert_eq!(rig.motor(0).net(), -40);
    assert_eq!(rig.motor(1).net(), 25);
    assert!(!rig.motor(0).forward());
    // Moving axes are energized on block load
    assert!(rig.motor(0).enabled());
    assert!(engine.axis_is_enabled(1));
}

#[test]
fn test_each_block_completes_once() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 30)], 3000)).unwrap();
    producer.push(line(&[(0, -10)], 3000)).unwrap();
    producer.push(ramp(0, 200)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.planner().completed_blocks(), 3);
    assert_eq!(engine.position(0), 220);
    assert_eq!(rig.motor(0).net(), 220);
    assert_eq!(rig.motor(0).pulses(), 240);
}

proptest! {
    #[test]
    fn prop_bresenham_distributes_evenly(
        steps in proptest::array::uniform3(0u32..10_000),
    ) {
        let events = steps.iter().copied().max().unwrap_or(0);
        prop_assume!(events > 0);

        let mut all = [0u32; MAX_AXES];
        all[..3].copy_from_slice(&steps);
        let mut bresenham = Bresenham::new();
        bresenham.start(&all, events);

        let mut counts = [0u32; 3];
        for event in 1..=events {
            for (axis, count) in counts.iter_mut().enumerate() {
                if bresenham.step_axis(axis) {
                    *count += 1;
                }
                let ideal = u64::from(steps[axis]) * u64::from(event);
                let actual = u64::from(*count) * u64::from(events);
                prop_assert!(ideal.abs_diff(actual) <= u64::from(events));
            }
        }
        prop_assert_eq!(counts, steps);
    }

    #[test]
    fn prop_interval_and_rate_are_inverse(rate in 2u32..1_000_000) {
        let calc = IntervalCalculator::new(IntervalMode::Direct, TIMER);
        let interval = calc.interval(rate);
        let back = calc.rate(interval);

        prop_assert!(back >= rate);
        prop_assert_eq!(calc.interval(back), interval);
    }
}

// =============================================================================
// Velocity profiles
// =============================================================================

#[test]
fn test_trapezoid_intervals_shrink_then_grow() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(ramp(0, 400)).unwrap();
    rig.run(&mut engine);
    assert_eq!(engine.position(0), 400);

    let mut intervals = rig.intervals();
    // The last deadline is the idle interval after completion
    intervals.pop();
    assert_eq!(intervals[0], TIMER / 500);

    let fastest = intervals
        .iter()
        .enumerate()
        .min_by_key(|&(_, ticks)| *ticks)
        .map(|(index, _)| index)
        .unwrap();
    assert!(intervals[..=fastest].windows(2).all(|w| w[0] >= w[1]));
    assert!(intervals[fastest..].windows(2).all(|w| w[0] <= w[1]));
    // Peak rate of a 200-step ramp at 20000 steps/s² from 500 steps/s
    assert!(intervals[fastest] < TIMER / 2500);
}

#[test]
fn test_trapezoid_phases_follow_block_boundaries() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    let block = BlockBuilder::new(TIMER)
        .steps(0, 1000)
        .rates(100, 1000, 100)
        .acceleration(2476)
        .build()
        .unwrap();
    assert_eq!(block.accelerate_before, 200);
    assert_eq!(block.decelerate_start, 800);
    producer.push(block).unwrap();
    rig.run(&mut engine);
    assert_eq!(engine.position(0), 1000);

    // Entry k is the deadline computed after k step events
    let mut intervals = rig.intervals();
    intervals.pop();
    assert_eq!(intervals.len(), 1000);

    assert!(intervals[..200].windows(2).all(|w| w[0] >= w[1]));
    assert!(intervals[200..800].iter().all(|&ticks| ticks == TIMER / 1000));
    assert!(intervals[800..].windows(2).all(|w| w[0] <= w[1]));
    assert!(intervals[800] >= TIMER / 1000);
    assert!(intervals[999] <= TIMER / 100);
}

#[test]
fn test_s_curve_block_completes() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut config = axes(&["x"]);
    config.motion.s_curve = true;
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(ramp(0, 400)).unwrap();
    producer.push(ramp(0, -120)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 280);
    assert_eq!(rig.motor(0).net(), 280);
    // Never slower than the entry rate, give or take curve rounding
    let intervals = rig.intervals();
    assert!(intervals.iter().all(|&ticks| ticks <= TIMER / 450));
}

#[test]
fn test_table_intervals_complete_block() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut config = axes(&["x"]);
    config.timing.interval_mode = IntervalMode::Table;
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(ramp(0, 300)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 300);
    assert!(rig.intervals().iter().all(|&ticks| ticks <= u32::from(u16::MAX)));
}

#[test]
fn test_adaptive_smoothing_oversamples_slow_blocks() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut config = axes(&["x"]);
    config.multistep.adaptive_smoothing = true;
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 50)], 1000)).unwrap();
    let isrs = rig.run(&mut engine);

    // 1000 steps/s raised to 16000 events/s
    assert_eq!(engine.diagnostics().oversampling, 4);
    assert!(isrs > 50 * 16);
    assert_eq!(engine.position(0), 50);
    assert_eq!(rig.motor(0).pulses(), 50);
}

#[test]
fn test_oversampling_keeps_shifted_counts_in_range() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut config = axes(&["x"]);
    config.multistep.adaptive_smoothing = true;
    let mut settings = EngineSettings::from_config(&config).unwrap();
    settings.min_isr_frequency = 3_000_000_000;
    let (mut engine, rig) = build_with(&config, settings, consumer, &signals);

    // Smoothing alone would ask for a shift of 7
    producer.push(line(&[(0, 2)], 1 << 24)).unwrap();
    rig.isr(&mut engine);
    assert_eq!(engine.diagnostics().oversampling, 5);

    rig.run(&mut engine);
    assert_eq!(engine.position(0), 2);
    assert_eq!(rig.motor(0).pulses(), 2);
}

// =============================================================================
// Multistepping
// =============================================================================

#[test]
fn test_overruns_escalate_then_recover() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    // Every timer read costs more than a whole step interval
    rig.timer.cost.set(100_000);
    producer.push(line(&[(0, 1000)], 1000)).unwrap();
    rig.run(&mut engine);

    let diagnostics = engine.diagnostics();
    assert_eq!(engine.position(0), 1000);
    assert_eq!(rig.motor(0).pulses(), 1000);
    assert_eq!(engine.steps_per_isr(), 16);
    assert_eq!(diagnostics.multistep_escalations, 4);
    assert!(diagnostics.lost_step_risk > 0);
    assert_eq!(
        diagnostics.overruns,
        diagnostics.multistep_escalations + diagnostics.lost_step_risk
    );
    assert!(diagnostics.has_faults());

    rig.timer.cost.set(0);
    producer.push(line(&[(0, -1000)], 1000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 0);
    assert_eq!(engine.steps_per_isr(), 1);
    assert_eq!(engine.diagnostics().multistep_deescalations, 4);

    engine.clear_diagnostics();
    assert!(!engine.diagnostics().has_faults());
}

// =============================================================================
// Abort and endstops
// =============================================================================

#[test]
fn test_abort_drops_block_once() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 10_000)], 5000)).unwrap();
    for _ in 0..50 {
        rig.isr(&mut engine);
    }
    signals.abort_current_block();
    signals.abort_current_block();
    rig.run(&mut engine);

    let stopped = engine.position(0);
    assert!(stopped > 0 && stopped < 10_000);
    assert_eq!(rig.motor(0).net(), stopped);
    assert_eq!(engine.planner().completed_blocks(), 0);
    assert_eq!(engine.diagnostics().aborted_blocks, 1);

    // The abort does not leak into the next block
    producer.push(line(&[(0, 20)], 5000)).unwrap();
    rig.run(&mut engine);
    assert_eq!(engine.position(0), stopped + 20);
    assert_eq!(engine.planner().completed_blocks(), 1);
}

#[test]
fn test_abort_while_idle_is_ignored() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    engine.quick_stop();
    producer.push(line(&[(0, 15)], 5000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 15);
    assert_eq!(engine.diagnostics().aborted_blocks, 0);
}

#[test]
fn test_endstop_records_position_and_aborts() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, -5000), (1, 100)], 5000)).unwrap();
    for _ in 0..30 {
        rig.isr(&mut engine);
    }
    let at_hit = engine.position(0);
    signals.trigger_endstop(0);
    rig.isr(&mut engine);

    assert_eq!(engine.triggered_position(0), at_hit);
    assert_eq!(engine.position(0), at_hit);
    assert!(!engine.is_busy());

    engine.endstop_triggered(1);
    assert_eq!(engine.triggered_position(1), engine.position(1));
    assert!(signals.abort_pending());
}

// =============================================================================
// Position API and sync blocks
// =============================================================================

#[test]
fn test_set_position_requires_idle_engine() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 10)], 5000)).unwrap();
    assert!(matches!(
        engine.set_position(Position::ZERO),
        Err(Error::Motion(MotionError::NotSynchronized))
    ));

    rig.run(&mut engine);
    engine
        .set_position(Position::from_slice(&[5, -3]))
        .unwrap();
    engine.set_axis_position(1, 42).unwrap();
    assert_eq!(engine.report_positions(), Position::from_slice(&[5, 42]));
}

#[test]
fn test_sync_blocks_apply_in_order() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 10)], 5000)).unwrap();
    producer
        .push(MotionBlock::sync(SyncKind::Position(Position::from_slice(&[500]))))
        .unwrap();
    producer
        .push(MotionBlock::sync(SyncKind::Fan { fan: 1, speed: 200 }))
        .unwrap();
    producer.push(MotionBlock::sync(SyncKind::Power(300))).unwrap();
    producer.push(line(&[(0, 5)], 5000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 505);
    assert_eq!(rig.motor(0).net(), 15);
    assert_eq!(engine.planner().last_fan(), Some((1, 200)));
    assert_eq!(engine.planner().last_power(), Some(300));
    assert_eq!(engine.planner().completed_blocks(), 2);
}

#[test]
fn test_shared_engine_slot() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x"]);
    let (engine, rig) = build(&config, consumer, &signals);

    let shared: SharedEngine<Engine<'_>> = SharedEngine::new();
    assert!(matches!(
        shared.position(0),
        Err(Error::Motor(MotorError::NotInitialized))
    ));
    shared.isr();

    assert!(shared.install(engine).is_none());
    producer.push(line(&[(0, 25)], 5000)).unwrap();
    while shared.is_busy().unwrap() {
        rig.timer.elapsed.set(0);
        shared.isr();
    }
    shared.synchronize().unwrap();
    assert_eq!(shared.position(0).unwrap(), 25);

    shared.set_axis_position(0, -7).unwrap();
    assert_eq!(shared.positions().unwrap().axis(0), -7);
    assert!(shared.take().is_some());
    assert!(!shared.is_installed());
}

// =============================================================================
// Input shaping
// =============================================================================

fn shaped_config() -> EngineConfig {
    let mut x = AxisConfig::linear();
    x.shaping = Some(ShapingConfig::new(40.0));
    EngineConfig::default()
        .with_axis("x", x)
        .and_then(|c| c.with_axis("y", AxisConfig::linear()))
        .unwrap()
}

#[test]
fn test_shaped_axis_keeps_step_count() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = shaped_config();
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 200), (1, 200)], 1000)).unwrap();
    producer.push(line(&[(0, -150), (1, -150)], 1000)).unwrap();

    // Echoes still pending keep the engine busy after the last block
    let mut isrs = 0;
    while engine.planner().completed_blocks() < 2 {
        rig.isr(&mut engine);
        isrs += 1;
        assert!(isrs < ISR_LIMIT);
        assert_eq!(engine.position(0), rig.motor(0).net());
    }
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 50);
    assert_eq!(rig.motor(0).net(), 50);
    assert_eq!(engine.position(1), 50);
    assert_eq!(engine.diagnostics().dropped_echoes, 0);
}

#[test]
fn test_shaping_queue_holds_at_full_step_rate() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = shaped_config();
    let (mut engine, rig) = build(&config, consumer, &signals);

    // Well above the 10000 steps/s the echo queue was sized for
    producer.push(line(&[(0, 5000)], 60_000)).unwrap();
    producer.push(line(&[(0, -3000)], 60_000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.diagnostics().dropped_echoes, 0);
    assert_eq!(engine.position(0), 2000);
    assert_eq!(rig.motor(0).net(), 2000);
}

#[test]
fn test_shaping_frequency_changes_need_idle_engine() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = shaped_config();
    let (mut engine, rig) = build(&config, consumer, &signals);

    assert_eq!(engine.shaping_frequency(0).unwrap(), 40.0);
    producer.push(line(&[(0, 20)], 1000)).unwrap();
    assert!(matches!(
        engine.set_shaping_frequency(0, 50.0),
        Err(Error::Motion(MotionError::NotSynchronized))
    ));
    rig.run(&mut engine);

    engine.set_shaping_frequency(0, 50.0).unwrap();
    assert_eq!(engine.shaping_frequency(0).unwrap(), 50.0);
    assert!(matches!(
        engine.set_shaping_frequency(1, 50.0),
        Err(Error::Motion(MotionError::AxisNotShaped(1)))
    ));
    // Below the frequency the echo queue was sized for
    assert!(matches!(
        engine.set_shaping_frequency(0, 20.0),
        Err(Error::Config(ConfigError::InvalidShapingFrequency(_)))
    ));

    engine.set_shaping_frequency(0, 0.0).unwrap();
    assert_eq!(engine.shaping_frequency(0).unwrap(), 0.0);

    assert!(matches!(
        engine.set_shaping_damping_ratio(0, 1.5),
        Err(Error::Config(ConfigError::InvalidDampingRatio(_)))
    ));
    engine.set_shaping_damping_ratio(0, 0.0).unwrap();
    assert_eq!(engine.shaping_damping_ratio(0).unwrap(), 0.0);
    assert_eq!(engine.settings().shaping[0].unwrap().factor2, 64);
}

// =============================================================================
// Linear advance
// =============================================================================

#[test]
fn test_linear_advance_moves_extruder_separately() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut config = axes(&["x", "e"]);
    config.linear_advance.enabled = true;
    config.linear_advance.k = 0.05;
    let (mut engine, rig) = build(&config, consumer, &signals);

    let block = BlockBuilder::new(TIMER)
        .steps(0, 400)
        .steps(1, 100)
        .rates(500, 4000, 500)
        .acceleration(20_000)
        .linear_advance(1, 0.05)
        .build()
        .unwrap();
    assert!(block.advance.is_active());
    producer.push(block).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 400);
    // Every block step was withheld; the advance task emitted them plus pressure
    assert_eq!(engine.position(1), 100 + engine.advance_steps());
    assert_eq!(rig.motor(1).net(), engine.position(1));
    assert!(rig.motor(1).pulses() > 0);
}

#[test]
fn test_extrusion_without_advance_is_plain() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "e"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    producer.push(line(&[(0, 80), (1, 20)], 2000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(1), 20);
    assert_eq!(rig.motor(1).pulses(), 20);
    assert_eq!(engine.advance_steps(), 0);
}

// =============================================================================
// Babystepping
// =============================================================================

#[test]
fn test_babysteps_move_motors_not_position() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (_producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer, &signals);

    signals.babystep(0, 3);
    signals.babystep(1, -2);
    for _ in 0..10 {
        rig.isr(&mut engine);
    }

    assert!(!signals.has_babysteps());
    assert_eq!(rig.motor(0).net(), 3);
    assert_eq!(rig.motor(1).net(), -2);
    assert_eq!(engine.position(0), 0);
    // DIR is restored after each babystep
    assert!(!rig.motor(0).forward());
    assert!(engine.axis_is_enabled(1));
}

// =============================================================================
// Enable lines and multi-motor axes
// =============================================================================

#[test]
fn test_shared_enable_line() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (_producer, consumer) = queue.split();
    let mut x = AxisConfig::linear();
    x.enable_group = Some(0);
    let mut y = AxisConfig::linear();
    y.enable_group = Some(0);
    let config = EngineConfig::default()
        .with_axis("x", x)
        .and_then(|c| c.with_axis("y", y))
        .and_then(|c| c.with_axis("z", AxisConfig::linear()))
        .unwrap();
    let (mut engine, rig) = build(&config, consumer, &signals);

    engine.enable_all().unwrap();
    assert!(rig.motor(2).enabled());

    assert!(!engine.disable_axis(0).unwrap());
    assert!(!engine.axis_is_enabled(0));
    assert!(rig.motor(0).enabled());
    assert!(engine.disable_axis(1).unwrap());
    assert!(!rig.motor(1).enabled());
    assert!(engine.disable_axis(2).unwrap());

    assert!(matches!(
        engine.enable_axis(9),
        Err(Error::Motor(MotorError::AxisOutOfRange(9)))
    ));
}

#[test]
fn test_locked_motor_squares_gantry() {
    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let mut x = AxisConfig::linear();
    x.motors = 2;
    let config = EngineConfig::default().with_axis("x", x).unwrap();
    let (mut engine, rig) = build(&config, consumer, &signals);

    engine.set_separate_multi_axis(true);
    engine.set_motor_lock(0, 1, true).unwrap();
    producer.push(line(&[(0, 20)], 5000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 20);
    assert_eq!(rig.motors[0][0].pulses(), 20);
    assert_eq!(rig.motors[0][1].pulses(), 0);

    assert!(matches!(
        engine.set_motor_lock(0, 2, true),
        Err(Error::Motor(MotorError::MotorOutOfRange { axis: 0, motor: 2 }))
    ));
    engine.set_all_motor_locks(0, false, None).unwrap();
    engine.set_separate_multi_axis(false);
    producer.push(line(&[(0, 10)], 5000)).unwrap();
    rig.run(&mut engine);

    assert_eq!(rig.motors[0][0].pulses(), 30);
    assert_eq!(rig.motors[0][1].pulses(), 10);
}

// =============================================================================
// Direct stepping
// =============================================================================

#[test]
fn test_page_block_follows_bitstream() {
    let store: PageStore<4> = PageStore::new();
    // Every event steps axis 0
    store.write(0, &[0x88; PAGE_SIZE]).unwrap();

    let signals = EngineSignals::new();
    let mut queue: BlockQueue<16> = BlockQueue::new();
    let (mut producer, consumer) = queue.split();
    let config = axes(&["x", "y"]);
    let (mut engine, rig) = build(&config, consumer.with_pages(&store), &signals);

    let page_block = BlockBuilder::new(TIMER)
        .page(0, 10)
        .direction(0, true)
        .rates(2000, 2000, 2000)
        .build()
        .unwrap();
    producer.push(page_block).unwrap();
    let missing = BlockBuilder::new(TIMER)
        .page(3, 10)
        .rates(2000, 2000, 2000)
        .build()
        .unwrap();
    producer.push(missing).unwrap();
    rig.run(&mut engine);

    assert_eq!(engine.position(0), 10);
    assert_eq!(rig.motor(0).pulses(), 10);
    assert_eq!(rig.motor(1).pulses(), 0);
    assert_eq!(engine.planner().completed_blocks(), 1);
}

// =============================================================================
// Builder
// =============================================================================

#[test]
fn test_builder_reports_missing_parts() {
    let config = axes(&["x"]);

    let result = EngineBuilder::<BlockConsumer<'_, 16>, Recorder, SimTimer, NoopDelay>::new()
        .config(&config)
        .unwrap()
        .build();
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));

    let result = EngineBuilder::<BlockConsumer<'_, 16>, Recorder, SimTimer, NoopDelay>::new()
        .config(&config)
        .unwrap()
        .attach_named("q", Recorder::default());
    assert!(matches!(result, Err(Error::Config(ConfigError::AxisNotFound(_)))));

    let result = EngineBuilder::<BlockConsumer<'_, 16>, Recorder, SimTimer, NoopDelay>::new()
        .config(&config)
        .unwrap()
        .attach_named("x", Recorder::default())
        .and_then(|b| b.attach(0, Recorder::default()));
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidMotorCount(2)))
    ));
}
