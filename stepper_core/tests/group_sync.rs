//! StepMotorGroup fan-out and join behavior against the mock bus.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use stepper_core::mocks::{MockActuator, MockBus};
use stepper_core::{ControllerCfg, Port, StepMotorGroup};

const T: Duration = Duration::from_secs(2);

fn group(ports: &[Port]) -> (MockBus, StepMotorGroup<MockActuator>) {
    let bus = MockBus::new();
    let g = StepMotorGroup::open(&bus, ports, &ControllerCfg::default()).unwrap();
    (bus, g)
}

#[test]
fn next_pass_waits_for_every_issued_move() {
    let (bus, g) = group(&[Port::A, Port::B, Port::C]);
    let (a, b, c) = (bus.probe(Port::A), bus.probe(Port::B), bus.probe(Port::C));
    for m in [&a, &b, &c] {
        m.set_hold(true);
    }

    assert!(g.targets().set_many([Some(0), Some(10), Some(5), None]));
    assert!(b.wait_for_held(1, T));
    assert!(c.wait_for_held(1, T));
    assert_eq!(a.command_count(), 0);

    // Arrives mid-pass; must not start until B and C are done.
    assert!(g.targets().set(Port::A, 7));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(a.command_count(), 0);

    b.release_all();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(a.command_count(), 0);

    c.release_all();
    assert!(a.wait_for_held(1, T));
    a.release_all();
    assert!(g.wait_idle(T));

    assert_eq!(g.positions().unwrap(), [Some(7), Some(10), Some(5), None]);
    assert_eq!(b.command_count(), 1);
    assert_eq!(c.command_count(), 1);
    assert_eq!(g.stats().passes, 2);
    assert_eq!(g.stats().moves, 3);
}

#[test]
fn moves_in_one_pass_start_together() {
    let (bus, g) = group(&[Port::A, Port::D]);
    let (a, d) = (bus.probe(Port::A), bus.probe(Port::D));
    a.set_hold(true);
    d.set_hold(true);

    g.targets().set_many([Some(4), None, None, Some(-4)]);
    assert!(a.wait_for_held(1, T));
    assert!(d.wait_for_held(1, T));
    assert_eq!(a.release_all() + d.release_all(), 2);
    assert!(g.wait_idle(T));
    assert_eq!(g.positions().unwrap(), [Some(4), None, None, Some(-4)]);
}

#[test]
fn per_slot_speed_and_direction() {
    let (bus, g) = group(&[Port::A, Port::B]);
    g.speeds().set(Port::A, 100);
    g.speeds().set(Port::B, -100);
    g.targets().set_many([Some(50), Some(-30), None, None]);
    assert!(g.wait_idle(T));

    let a = bus.probe(Port::A).commands();
    let b = bus.probe(Port::B).commands();
    assert_eq!((a[0].speed, a[0].steps), (100, 50));
    assert_eq!((b[0].speed, b[0].steps), (-100, 30));
}

#[test]
fn slots_already_on_target_issue_nothing() {
    let bus = MockBus::new();
    bus.probe(Port::B).set_position(9);
    let g = StepMotorGroup::open(&bus, &[Port::A, Port::B], &ControllerCfg::default()).unwrap();
    assert_eq!(g.targets().get(Port::B), 9);

    g.targets().set(Port::A, 3);
    assert!(g.wait_idle(T));
    assert_eq!(bus.probe(Port::A).command_count(), 1);
    assert_eq!(bus.probe(Port::B).command_count(), 0);
}

#[test]
fn empty_slots_are_skipped() {
    let (bus, g) = group(&[Port::A]);
    assert!(!g.is_bound(Port::D));
    assert!(g.targets().set(Port::D, 9));
    assert!(g.wait_idle(T));
    for p in Port::ALL {
        assert_eq!(bus.probe(p).command_count(), 0);
    }
    assert_eq!(g.stats().passes, 1);
    assert!(g.set_reverse(Port::D, true).is_err());
    assert!(!g.reverse(Port::D));
}

#[test]
fn reset_all_zeroes_every_target_and_counter() {
    let (bus, g) = group(&[Port::B, Port::C]);
    g.targets().set_many([None, Some(12), Some(-6), None]);
    assert!(g.wait_idle(T));

    g.reset_all().unwrap();
    assert_eq!(g.targets().snapshot(), [0; 4]);
    assert_eq!(g.positions().unwrap(), [None, Some(0), Some(0), None]);
    assert_eq!(bus.probe(Port::B).resets(), 1);
    assert_eq!(bus.probe(Port::C).resets(), 1);
    assert_eq!(bus.probe(Port::A).resets(), 0);
    assert!(g.is_idle());
}

#[test]
fn brake_and_power_off_reach_every_bound_actuator() {
    let (bus, g) = group(&[Port::A, Port::C]);
    g.brake_all().unwrap();
    g.power_off_all().unwrap();
    for p in [Port::A, Port::C] {
        assert_eq!(bus.probe(p).brakes(), 1);
        assert_eq!(bus.probe(p).power_offs(), 1);
    }
    assert_eq!(bus.probe(Port::B).brakes(), 0);
}

#[test]
fn one_slot_fault_does_not_block_the_others() {
    let (bus, g) = group(&[Port::A, Port::B]);
    bus.probe(Port::A).fail_next_moves(1);
    g.targets().set_many([Some(5), Some(6), None, None]);
    assert!(g.wait_idle(T));
    assert_eq!(g.positions().unwrap(), [Some(0), Some(6), None, None]);
    assert_eq!(g.stats().faults, 1);
    assert_eq!(g.last_error().and_then(|e| e.port()), Some(Port::A));

    g.resync();
    assert!(g.wait_idle(T));
    assert_eq!(g.positions().unwrap(), [Some(5), Some(6), None, None]);
    assert_eq!(bus.probe(Port::B).command_count(), 1);
}

#[test]
fn out_of_range_slot_index_panics_and_leaves_group_idle() {
    let (bus, g) = group(&[Port::A, Port::B]);
    let write = catch_unwind(AssertUnwindSafe(|| g.targets().set(7usize, 123)));
    assert!(write.is_err());
    let read = catch_unwind(AssertUnwindSafe(|| g.speeds().get(9usize)));
    assert!(read.is_err());

    assert!(g.is_idle());
    assert_eq!(g.targets().snapshot(), [0; 4]);
    assert_eq!(bus.probe(Port::A).command_count(), 0);
    assert_eq!(g.stats().passes, 0);
}
