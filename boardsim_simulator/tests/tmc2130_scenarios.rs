//! End-to-end stepper driver scenarios on a full board.

use boardsim_shared::{LineStatus, Peripheral, PortDecl, PortId, SimContext, ViewSnapshot};
use boardsim_simulator::devices::tmc2130::command::CommandWord;
use boardsim_simulator::devices::tmc2130::{DriverConfig, DriverState, Tmc2130};
use boardsim_simulator::{Board, BoardSettings, SpiMaster};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::any::Any;
use std::collections::BTreeMap;

const BENCH: &str = include_str!("../../boards/bench.toml");
const STANDSTILL: u64 = 1 << 20;

fn bench() -> Board {
    let settings = BoardSettings::from_toml_str(BENCH).unwrap();
    Board::new(&settings).unwrap()
}

fn step(board: &mut Board, count: usize) {
    for _ in 0..count {
        board.drive("x.step", 1).unwrap();
        board.drive("x.step", 0).unwrap();
    }
}

fn x(board: &Board) -> &Tmc2130 {
    board.device::<Tmc2130>("X").unwrap()
}

/// Counts rising edges on whatever line it is wired to.
struct EdgeCounter {
    level: u32,
    rising: usize,
}

const COUNTER_PORTS: &[PortDecl] = &[PortDecl::input(0, "in", 1)];

impl Peripheral for EdgeCounter {
    fn name(&self) -> &str {
        "edges"
    }

    fn kind(&self) -> &'static str {
        "edges"
    }

    fn ports(&self) -> &'static [PortDecl] {
        COUNTER_PORTS
    }

    fn on_input(&mut self, _port: PortId, value: u32, _ctx: &mut SimContext<'_>) {
        if value != 0 && self.level == 0 {
            self.rising += 1;
        }
        self.level = value;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn with_diag_counter(board: &mut Board) {
    let pins = BTreeMap::from([("in".to_string(), "x.diag".to_string())]);
    board
        .attach(Box::new(EdgeCounter { level: 0, rising: 0 }), &pins)
        .unwrap();
}

fn diag_edges(board: &Board) -> usize {
    board.device::<EdgeCounter>("edges").unwrap().rising
}

#[test]
fn test_forward_motion_then_far_end_stop() {
    let mut board = bench();
    board.drive("x.dir", 1).unwrap();

    step(&mut board, 500);
    assert!((x(&board).position() - 15.0).abs() < 1e-4);
    assert_eq!(board.line_value("x.diag").unwrap(), 0);
    assert_eq!(f32::from_bits(board.line_value("x.pos").unwrap()), x(&board).position());

    step(&mut board, 20_000);
    assert_eq!(x(&board).position(), 200.0);
    assert!(x(&board).stall_guard());
    assert_eq!(board.line_value("x.diag").unwrap(), 1);
}

#[test]
fn test_home_to_minimum_raises_min_out() {
    let mut board = bench();
    board.drive("x.dir", 0).unwrap();
    step(&mut board, 999);
    assert_eq!(board.line_value("x.min").unwrap(), 0);
    step(&mut board, 1);
    assert_eq!(x(&board).position(), 0.0);
    assert_eq!(board.line_value("x.min").unwrap(), 1);
    step(&mut board, 50);
    assert_eq!(x(&board).position(), 0.0);
}

#[test]
fn test_register_write_then_read_back_over_spi() {
    let mut board = bench();
    let spi = SpiMaster::new(&board, "spi.cs", "spi.mosi", "spi.miso").unwrap();

    spi.transfer(&mut board, &CommandWord::write(0x6C, 0x0001_0135).to_bytes())
        .unwrap();
    spi.transfer(&mut board, &CommandWord::read(0x6C).to_bytes()).unwrap();
    let reply = spi.transfer(&mut board, &CommandWord::read(0x00).to_bytes()).unwrap();
    let word = CommandWord::from_bytes(reply.try_into().unwrap());
    assert_eq!(word.data(), 0x0001_0135);
    // power-on reset flag is still latched: GSTAT has not been read
    assert!(word.status().reset_flag);
}

#[test]
fn test_partial_transaction_is_dropped() {
    let mut board = bench();
    let spi = SpiMaster::new(&board, "spi.cs", "spi.mosi", "spi.miso").unwrap();
    spi.transfer(&mut board, &CommandWord::write(0x10, 0x0000_1F08).to_bytes())
        .unwrap();
    let before = x(&board).registers().clone();
    let pending = x(&board).pending_reply();

    let write = CommandWord::write(0x10, 0xFFFF_FFFF).to_bytes();
    spi.transfer(&mut board, &write[..4]).unwrap();
    let mut long = write.to_vec();
    long.push(0);
    spi.transfer(&mut board, &long).unwrap();

    assert_eq!(x(&board).registers(), &before);
    assert_eq!(x(&board).pending_reply(), pending);
}

#[test]
fn test_drv_status_reports_standstill_and_hold_current() {
    let mut board = bench();
    let spi = SpiMaster::new(&board, "spi.cs", "spi.mosi", "spi.miso").unwrap();
    // IHOLD = 8, IRUN = 31
    spi.transfer(&mut board, &CommandWord::write(0x10, 0x0000_1F08).to_bytes())
        .unwrap();
    step(&mut board, 1);
    assert_eq!(x(&board).field("DRV_STATUS", "cs_actual"), Some(31));
    assert_eq!(x(&board).field("DRV_STATUS", "sg_result"), Some(250));

    board.advance(STANDSTILL);
    assert_eq!(x(&board).field("DRV_STATUS", "stst"), Some(1));
    assert_eq!(x(&board).field("DRV_STATUS", "cs_actual"), Some(8));
    assert_eq!(x(&board).state(), DriverState::Stalled);
}

#[test]
fn test_standstill_asserts_diag_once_per_idle_period() {
    let mut board = bench();
    with_diag_counter(&mut board);
    board.drive("x.dir", 1).unwrap();

    step(&mut board, 10);
    board.advance(3 * STANDSTILL);
    assert_eq!(diag_edges(&board), 1);
    assert_eq!(board.invoke("X", "WaitStandstill", &[]), LineStatus::Completed);

    step(&mut board, 10);
    assert_eq!(board.line_value("x.diag").unwrap(), 0);
    board.advance(STANDSTILL - 1);
    assert_eq!(diag_edges(&board), 1);
    board.advance(1);
    assert_eq!(diag_edges(&board), 2);
}

#[test]
fn test_disabled_driver_ignores_steps() {
    let mut board = bench();
    board.drive("x.en", 1).unwrap();
    step(&mut board, 100);
    assert_eq!(x(&board).step_count(), 0);
    assert_eq!(x(&board).state(), DriverState::Disabled);
    board.drive("x.en", 0).unwrap();
    step(&mut board, 100);
    assert_eq!(x(&board).step_count(), -100);
}

#[test]
fn test_reconfigure_is_idempotent() {
    let mut a = bench();
    let mut b = bench();
    b.device_mut::<Tmc2130>("X")
        .unwrap()
        .configure(DriverConfig::default())
        .unwrap();
    for board in [&mut a, &mut b] {
        board.drive("x.dir", 1).unwrap();
        step(board, 321);
    }
    assert_eq!(x(&a).position(), x(&b).position());
    assert_eq!(x(&a).state(), x(&b).state());
}

#[test]
fn test_set_position_respects_travel() {
    let mut board = bench();
    assert_eq!(board.invoke("X", "SetPosition", &["42.5".into()]), LineStatus::Completed);
    assert!((x(&board).position() - 42.5).abs() < 1e-4);
    assert_eq!(board.invoke("X", "SetPosition", &["500".into()]), LineStatus::Completed);
    assert_eq!(x(&board).position(), 200.0);
    assert_eq!(board.line_value("x.diag").unwrap(), 1);
}

#[test]
fn test_random_steps_never_leave_travel() {
    let mut board = bench();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        board.drive("x.dir", rng.random_range(0..2)).unwrap();
        step(&mut board, rng.random_range(0..400));
        let pos = x(&board).position();
        assert!((0.0..=200.0).contains(&pos), "position {pos} left the travel range");
        if rng.random_bool(0.1) {
            board.advance(rng.random_range(0..2 * STANDSTILL));
        }
    }
}

fn reconfigure(board: &mut Board, cfg: DriverConfig) {
    board
        .with_device::<Tmc2130, _>("X", |x, ctx| x.reconfigure(cfg, ctx))
        .unwrap()
        .unwrap();
}

#[test]
fn test_off_grid_start_offset_keeps_both_ends_in_travel() {
    for (start_pos, steps_per_mm) in [(10.005, 100), (0.333, 3), (199.996, 80), (7.77, 16), (0.05, 7)] {
        let mut board = bench();
        let cfg = DriverConfig {
            steps_per_mm,
            start_pos,
            ..DriverConfig::default()
        };
        reconfigure(&mut board, cfg);
        let full_travel = 200 * steps_per_mm as usize + 10;

        board.drive("x.dir", 0).unwrap();
        step(&mut board, full_travel);
        let low = x(&board).position();
        assert!(low >= 0.0, "start {start_pos}: minimum {low} is below 0");
        assert!(low < 1.0 / steps_per_mm as f32, "start {start_pos}: minimum {low} is not the last step");
        assert_eq!(board.line_value("x.min").unwrap(), 1, "start {start_pos}");
        assert!(x(&board).stall_guard());

        board.drive("x.dir", 1).unwrap();
        step(&mut board, full_travel);
        let high = x(&board).position();
        assert!(high <= 200.0, "start {start_pos}: maximum {high} is above 200");
        assert!(200.0 - high < 1.0 / steps_per_mm as f32, "start {start_pos}: maximum {high}");
        assert_eq!(board.line_value("x.min").unwrap(), 0);
    }
}

#[test]
fn test_random_geometry_never_leaves_travel() {
    let mut rng = StdRng::seed_from_u64(0x0ff_9e1d);
    for _ in 0..20 {
        let mut board = bench();
        let max_mm: i16 = rng.random_range(1..=50);
        let cfg = DriverConfig {
            steps_per_mm: rng.random_range(1..=64),
            max_mm,
            start_pos: rng.random_range(0.0..=max_mm as f32),
            ..DriverConfig::default()
        };
        reconfigure(&mut board, cfg.clone());
        for _ in 0..40 {
            board.drive("x.dir", rng.random_range(0..2)).unwrap();
            step(&mut board, rng.random_range(0..1_000));
            let pos = x(&board).position();
            assert!((0.0..=max_mm as f32).contains(&pos), "{cfg:?}: position {pos} left the travel range");
        }
    }
}

#[test]
fn test_reconfigure_clears_end_stop_state() {
    let mut board = bench();
    board.drive("x.dir", 0).unwrap();
    step(&mut board, 1_500);
    assert!(x(&board).stall_guard());
    assert_eq!(board.line_value("x.diag").unwrap(), 1);
    assert_eq!(board.line_value("x.min").unwrap(), 1);

    reconfigure(&mut board, DriverConfig::default());
    let driver = x(&board);
    assert_eq!(driver.position(), 10.0);
    assert!(!driver.stall_guard());
    assert!(!driver.diag_asserted());
    assert_eq!(driver.state(), DriverState::Idle);
    assert_eq!(board.line_value("x.diag").unwrap(), 0);
    assert_eq!(board.line_value("x.min").unwrap(), 0);
    assert_eq!(board.line_value("x.pos").unwrap(), 10.0f32.to_bits());
    let views = board.views();
    assert!(matches!(views[0].1.snapshot(), ViewSnapshot::Motor { stalled: false, position, .. } if position == 10.0));

    // the standstill timeout armed by the last step was dropped
    board.advance(2 * STANDSTILL);
    assert!(!x(&board).standstill());
    assert_eq!(board.line_value("x.diag").unwrap(), 0);
}

#[test]
fn test_views_publish_motor_state() {
    let mut board = bench();
    let views = board.views();
    let (name, view) = &views[0];
    assert_eq!(name, "X");
    board.drive("x.dir", 1).unwrap();
    step(&mut board, 100);
    assert_eq!(view.draw_simple(), "X: 11.00");
    assert!(view.draw().starts_with("X ["));
}
