//! Single-axis operations, status polling and the periodic runner

mod common;

use common::{job_events, rig, run_to_idle, Rig};
use microcut_communication::StageCommand;
use microcut_core::{
    AppEvent, ConnectionEvent, ControllerStatus, Direction, JobEvent, LaserStatus, MotionError,
    Point2, ShapeInstruction,
};
use microcut_motion::run_until_idle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[test]
fn test_status_ready_refreshes_position() {
    let mut rig = rig([3.0, 4.0, 0.5], LaserStatus::Ready);
    assert_eq!(rig.controller.status(), ControllerStatus::Disconnected);

    assert_eq!(
        rig.controller.update_status(),
        Ok(ControllerStatus::Ready)
    );
    let position = rig.controller.logical_position();
    assert_eq!((position.x, position.y, position.z), (3.0, 4.0, 0.5));
    assert!(rig.controller.is_idle());
}

#[test]
fn test_abs_move_and_reversal_keep_logical_position() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();

    rig.controller.set_abs_position(1, 6.0).unwrap();
    assert_eq!(rig.controller.status(), ControllerStatus::Moving);
    run_to_idle(&mut rig.controller).unwrap();
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
    assert_eq!(rig.controller.axis(1).unwrap().logical_position, 6.0);

    // Reversal overtravels by the backlash; the model hides it
    rig.controller.set_abs_position(1, 5.0).unwrap();
    run_to_idle(&mut rig.controller).unwrap();
    assert!((rig.stage.lock().position(1) - 4.988).abs() < 1e-9);
    let axis = rig.controller.axis(1).unwrap();
    assert_eq!(axis.logical_position, 5.0);
    assert_eq!(axis.last_direction, Direction::Negative);
    assert!(axis.has_offset);
}

#[test]
fn test_relative_move() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.set_rel_position(2, 0.5).unwrap();
    run_to_idle(&mut rig.controller).unwrap();
    assert_eq!(rig.stage.lock().position(2), 5.5);
    assert_eq!(rig.controller.axis(2).unwrap().logical_position, 5.5);
}

#[test]
fn test_single_axis_range_checks() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    rig.stage.lock().clear_sent();

    assert!(matches!(
        rig.controller.set_abs_position(1, 13.0),
        Err(MotionError::AxisOutOfRange { axis: 1, .. })
    ));
    assert!(matches!(
        rig.controller.set_rel_position(2, -6.0),
        Err(MotionError::AxisOutOfRange { axis: 2, .. })
    ));
    assert_eq!(
        rig.controller.set_abs_position(4, 1.0),
        Err(MotionError::InvalidAxis { axis: 4 })
    );
    assert_eq!(
        rig.controller.go_home(0),
        Err(MotionError::InvalidAxis { axis: 0 })
    );

    // Only the position read of the relative move reached the stage
    assert_eq!(
        rig.stage.lock().sent(),
        &[StageCommand::QueryPosition { axis: 2 }]
    );
}

#[test]
fn test_velocity_and_acceleration_limits() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);

    assert!(matches!(
        rig.controller.set_velocity(0.5),
        Err(MotionError::InvalidParameter { .. })
    ));
    assert!(matches!(
        rig.controller.set_velocity(0.0),
        Err(MotionError::InvalidParameter { .. })
    ));
    assert!(matches!(
        rig.controller.set_acceleration(2.0),
        Err(MotionError::InvalidParameter { .. })
    ));

    assert_eq!(rig.controller.set_velocity(0.3), Ok(0.3));
    assert_eq!(rig.controller.set_acceleration(1.8), Ok(1.8));
    assert_eq!(rig.controller.velocity(), 0.3);
    assert_eq!(rig.controller.acceleration(), 1.8);
}

#[test]
fn test_abort_motion_powers_off() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.set_abs_position(1, 8.0).unwrap();
    rig.controller.tick().unwrap();

    rig.controller.abort_motion().unwrap();
    assert_eq!(rig.controller.status(), ControllerStatus::Off);
    assert!(rig.controller.is_idle());

    rig.controller.motor_on(&[1, 2, 3]).unwrap();
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
    assert_eq!(
        rig.controller.motor_off(&[1, 7]),
        Err(MotionError::InvalidAxis { axis: 7 })
    );
}

#[test]
fn test_abort_motion_ends_running_job() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let line = ShapeInstruction::Line {
        start: Point2::new(5.0, 5.0),
        end: Point2::new(7.0, 5.0),
    };
    rig.controller.perform(vec![line], true).unwrap();

    rig.controller.abort_motion().unwrap();
    assert!(!rig.controller.job_active());
    assert_eq!(rig.laser.lock().turn_off_count(), 1);
    assert!(job_events(&rig.events).contains(&JobEvent::Aborted {
        reason: MotionError::MotorsOff.to_string(),
    }));
}

#[test]
fn test_initialize_establishes_directions() {
    let mut rig = rig([6.0, 6.0, 1.0], LaserStatus::Ready);

    rig.controller.initialize().unwrap();
    assert!(rig.controller.job_active());
    run_to_idle(&mut rig.controller).unwrap();

    for axis in [1, 2] {
        let axis = rig.controller.axis(axis).unwrap();
        assert_eq!(axis.last_direction, Direction::Negative);
        assert!((axis.logical_position - 5.98).abs() < 1e-9);
    }
    assert_eq!(rig.controller.velocity(), 0.2);
    assert_eq!(rig.controller.acceleration(), 0.8);
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
    assert!(rig.events.history().contains(&AppEvent::Connection(
        ConnectionEvent::Connected {
            port: "simulated".to_string(),
        }
    )));
    // The probe runs once; a second command mode entry keeps directions
    rig.controller.enter_command_mode().unwrap();
    assert!(!rig.controller.job_active());
}

#[test]
fn test_interrupted_direction_probe_is_repeated() {
    let mut rig = rig([6.0, 6.0, 0.0], LaserStatus::Ready);
    rig.controller.initialize().unwrap();
    assert!(rig.controller.job_active());
    assert!(rig.controller.directions_known());

    rig.stage.lock().disconnect();
    assert_eq!(
        rig.controller.tick(),
        Err(MotionError::TransportDisconnected)
    );
    assert!(!rig.controller.directions_known());
}

#[test]
fn test_aborted_direction_probe_is_repeated() {
    let mut rig = rig([6.0, 6.0, 0.0], LaserStatus::Ready);
    rig.controller.initialize().unwrap();
    rig.controller.abort_motion().unwrap();
    assert!(!rig.controller.directions_known());

    rig.controller.motor_on(&[1, 2, 3]).unwrap();
    rig.controller.enter_command_mode().unwrap();
    assert!(rig.controller.job_active());
    run_to_idle(&mut rig.controller).unwrap();
    assert!(rig.controller.directions_known());
    assert_eq!(
        rig.controller.axis(1).unwrap().last_direction,
        Direction::Negative
    );
}

#[test]
fn test_directions_skipped_at_envelope_edge() {
    let mut rig = rig([0.01, 6.0, 0.0], LaserStatus::Ready);
    rig.controller.enter_command_mode().unwrap();
    assert!(!rig.controller.job_active());
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
}

#[test]
fn test_joystick_mode_reports_group_motion() {
    let mut rig = rig([6.0, 6.0, 0.0], LaserStatus::Ready);

    rig.controller.enter_joystick_mode().unwrap();
    assert!(rig.controller.joystick_mode());
    assert_eq!(rig.controller.status(), ControllerStatus::GroupMoving);

    rig.controller.enter_command_mode().unwrap();
    assert!(!rig.controller.joystick_mode());
    run_to_idle(&mut rig.controller).unwrap();
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
}

#[test]
fn test_not_connected() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.stage.lock().disconnect();

    assert_eq!(rig.controller.send_raw("1TP"), Err(MotionError::NotConnected));
    let line = ShapeInstruction::Line {
        start: Point2::new(5.0, 5.0),
        end: Point2::new(6.0, 5.0),
    };
    assert_eq!(
        rig.controller.perform(vec![line], false),
        Err(MotionError::NotConnected)
    );
}

#[tokio::test]
async fn test_runner_completes_job() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let line = ShapeInstruction::Line {
        start: Point2::new(5.0, 5.0),
        end: Point2::new(6.0, 6.0),
    };
    rig.controller.perform(vec![line], true).unwrap();
    let Rig {
        controller,
        stage,
        events,
        ..
    } = rig;
    let controller = Arc::new(Mutex::new(controller));

    let (_stop_tx, stop_rx) = watch::channel(false);
    run_until_idle(controller.clone(), Duration::from_millis(1), stop_rx)
        .await
        .unwrap();

    assert!(controller.lock().is_idle());
    assert!(job_events(&events).contains(&JobEvent::Finished {
        instructions: 1,
        stopped: false,
    }));
    assert_eq!(stage.lock().position(1), 6.0);
}

#[tokio::test]
async fn test_runner_forwards_stop() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let quad = ShapeInstruction::Quadr {
        corners: [
            Point2::new(5.0, 5.0),
            Point2::new(6.0, 5.0),
            Point2::new(6.0, 6.0),
            Point2::new(5.0, 6.0),
        ],
    };
    rig.controller.perform(vec![quad], true).unwrap();
    let Rig {
        controller,
        laser,
        events,
        ..
    } = rig;
    let controller = Arc::new(Mutex::new(controller));

    let (stop_tx, stop_rx) = watch::channel(false);
    stop_tx.send(true).unwrap();
    run_until_idle(controller, Duration::from_millis(1), stop_rx)
        .await
        .unwrap();

    assert!(job_events(&events).contains(&JobEvent::Finished {
        instructions: 1,
        stopped: true,
    }));
    assert_eq!(laser.lock().turn_off_count(), 1);
}
