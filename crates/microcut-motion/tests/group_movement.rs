//! Group movement jobs end to end over the simulated stage and laser

mod common;

use common::{job_events, latches, rig, rig_with_config, run_to_idle, steps};
use microcut_communication::{Laser, LaserCall, StageCommand};
use microcut_core::{
    AppEvent, ConnectionEvent, ControllerStatus, JobEvent, LaserStatus, MotionError, Point2,
    ShapeInstruction,
};
use microcut_motion::{
    DetectorEvent, DetectorMode, MotionCompletionDetector, MotionConfig, RingExpander,
};

fn square(x: f64, y: f64, size: f64) -> [Point2; 4] {
    [
        Point2::new(x, y),
        Point2::new(x + size, y),
        Point2::new(x + size, y + size),
        Point2::new(x, y + size),
    ]
}

fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> ShapeInstruction {
    ShapeInstruction::Line {
        start: Point2::new(x1, y1),
        end: Point2::new(x2, y2),
    }
}

#[test]
fn test_completion_fires_on_third_repeat() {
    let mut detector = MotionCompletionDetector::new(2, None);
    detector.arm(DetectorMode::Axis(1), "");

    let samples = ["5.0", "5.0", "5.1", "5.1", "5.1", "5.1"];
    let events: Vec<DetectorEvent> = samples
        .iter()
        .map(|s| detector.observe(Some(s)))
        .collect();

    assert!(events[..5]
        .iter()
        .all(|e| matches!(e, DetectorEvent::Moving(_))));
    assert_eq!(events[5], DetectorEvent::Complete);
}

#[test]
fn test_rect_without_burn_is_not_expanded() {
    let mut rig = rig([1.0, 1.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let rect = ShapeInstruction::Rect {
        corners: square(1.0, 1.0, 1.0),
        rotation: 0.0,
        burn_width_px: 0,
    };

    rig.controller.perform(vec![rect], false).unwrap();
    assert_eq!(rig.controller.engine().job().unwrap().instructions.len(), 1);

    run_to_idle(&mut rig.controller).unwrap();
    assert!(job_events(&rig.events).contains(&JobEvent::Finished {
        instructions: 1,
        stopped: false,
    }));
    // Five corners, plus a slack take-up where x and then y reverse
    assert_eq!(latches(&rig.stage).len(), 7);
}

#[test]
fn test_ring_coverage() {
    let expander = RingExpander::new(0.001, 0.001);
    let rect = ShapeInstruction::Rect {
        corners: square(0.0, 0.0, 10.0),
        rotation: 0.0,
        burn_width_px: 10,
    };

    let rings = expander.expand(&rect);
    let expected = (0.01 * std::f64::consts::SQRT_2 / 0.001).ceil() as usize;
    assert_eq!(rings.len(), expected);
    assert_eq!(rings.len(), 15);

    for (k, ring) in rings.iter().enumerate() {
        let corners = ring.corners().unwrap();
        let offset = (k + 1) as f64 * 0.001;
        assert!((corners[0].x + offset).abs() < 1e-9);
        assert!((corners[0].y + offset).abs() < 1e-9);
        assert!((corners[2].x - (10.0 + offset)).abs() < 1e-9);
        assert!((corners[2].y - (10.0 + offset)).abs() < 1e-9);
    }
}

#[test]
fn test_out_of_range_aborts_before_moving() {
    let mut rig = rig([6.0, 6.0, 0.0], LaserStatus::On);
    rig.controller.refresh_positions().unwrap();
    rig.stage.lock().clear_sent();

    let result = rig.controller.perform(vec![line(6.0, 6.0, 20.0, 6.0)], true);

    assert!(matches!(
        result,
        Err(MotionError::OutOfTravelRange { x, .. }) if x == 20.0
    ));
    let sent = rig.stage.lock().sent().to_vec();
    assert!(matches!(sent[0], StageCommand::DefineGroup { .. }));
    assert!(sent[1..]
        .iter()
        .all(|c| matches!(c, StageCommand::GroupBreak { .. })));
    assert_eq!(rig.laser.lock().turn_off_count(), 1);
    assert!(job_events(&rig.events)
        .iter()
        .any(|e| matches!(e, JobEvent::Aborted { .. })));
    assert!(rig.controller.is_idle());
    assert!(!rig.stage.lock().has_group());
}

#[test]
fn test_line_gates_laser_around_single_edge() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();

    rig.controller
        .perform(vec![line(5.0, 5.0, 6.0, 5.0)], true)
        .unwrap();
    run_to_idle(&mut rig.controller).unwrap();

    assert_eq!(
        rig.laser.lock().calls(),
        &[LaserCall::TurnOn, LaserCall::TurnOff]
    );
    assert_eq!(steps(&rig.events), vec![(0, 0), (0, 1), (0, 5)]);
    assert_eq!(latches(&rig.stage), vec![(5.0, 5.0), (6.0, 5.0)]);
    assert_eq!(rig.controller.status(), ControllerStatus::Ready);
    assert_eq!(rig.controller.logical_position().x, 6.0);
}

#[test]
fn test_unready_laser_does_not_fail_job() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Power);
    rig.controller.refresh_positions().unwrap();

    rig.controller
        .perform(vec![line(5.0, 5.0, 5.5, 5.5)], true)
        .unwrap();
    run_to_idle(&mut rig.controller).unwrap();

    assert_eq!(rig.laser.lock().calls(), &[LaserCall::TurnOff]);
    assert!(job_events(&rig.events).contains(&JobEvent::Finished {
        instructions: 1,
        stopped: false,
    }));
}

#[test]
fn test_burned_rect_keeps_beam_across_rings() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let rect = ShapeInstruction::Rect {
        corners: square(5.0, 5.0, 0.01),
        rotation: 0.0,
        burn_width_px: 12,
    };

    rig.controller.perform(vec![rect], true).unwrap();
    // 12 px at 0.089 µm/px need two 1 µm rings
    assert_eq!(rig.controller.engine().job().unwrap().instructions.len(), 3);

    run_to_idle(&mut rig.controller).unwrap();

    assert_eq!(
        rig.laser.lock().calls(),
        &[LaserCall::TurnOn, LaserCall::TurnOff]
    );
    assert!(latches(&rig.stage).len() >= 15);
    assert!(rig
        .stage
        .lock()
        .sent()
        .iter()
        .any(|c| matches!(c, StageCommand::GroupWaitStop { .. })));
    assert!(job_events(&rig.events).contains(&JobEvent::Finished {
        instructions: 3,
        stopped: false,
    }));
}

#[test]
fn test_burn_rings_past_envelope_abort_before_cutting() {
    let mut rig = rig([11.0, 11.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    rig.stage.lock().clear_sent();
    // The outline fits, but 200 px of border reaches past 12 mm
    let rect = ShapeInstruction::Rect {
        corners: square(11.99, 11.99, 0.005),
        rotation: 0.0,
        burn_width_px: 200,
    };

    let result = rig.controller.perform(vec![rect], true);

    assert!(matches!(
        result,
        Err(MotionError::OutOfTravelRange { x, .. }) if x > 12.0
    ));
    assert_eq!(rig.laser.lock().calls(), &[LaserCall::TurnOff]);
    assert!(latches(&rig.stage).is_empty());
    assert!(rig.controller.is_idle());
    assert!(!rig.stage.lock().has_group());
}

#[test]
fn test_oversized_burn_width_is_rejected() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let rect = ShapeInstruction::Rect {
        corners: square(5.0, 5.0, 1.0),
        rotation: 0.0,
        burn_width_px: u32::MAX,
    };

    assert!(matches!(
        rig.controller.perform(vec![rect], false),
        Err(MotionError::OutOfTravelRange { .. })
    ));
    assert!(rig.controller.engine().job().is_none());
    assert!(latches(&rig.stage).is_empty());
}

#[test]
fn test_del_rect_cuts_inward_rings_with_beam_on() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let del_rect = ShapeInstruction::DelRect {
        corners: square(5.0, 5.0, 0.007),
        rotation: 0.0,
    };

    rig.controller.perform(vec![del_rect], true).unwrap();
    let job = rig.controller.engine().job().unwrap();
    // Half of 7 µm holds three 1 µm rings
    assert_eq!(job.instructions.len(), 4);
    assert!(job.instructions[1..]
        .iter()
        .all(|i| matches!(i, ShapeInstruction::SubRect { .. })));

    run_to_idle(&mut rig.controller).unwrap();

    assert_eq!(
        rig.laser.lock().calls(),
        &[LaserCall::TurnOn, LaserCall::TurnOff]
    );
    assert!(job_events(&rig.events).contains(&JobEvent::Finished {
        instructions: 4,
        stopped: false,
    }));
    // The innermost ring closes on its own start corner
    let position = rig.controller.logical_position();
    assert!((position.x - 5.003).abs() < 1e-9);
    assert!((position.y - 5.003).abs() < 1e-9);
}

#[test]
fn test_reversing_group_move_takes_up_slack_first() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();

    // Out along x, then back: the return reverses axis 1
    rig.controller
        .perform(vec![line(5.0, 5.0, 6.0, 5.0), line(6.0, 5.0, 5.5, 5.0)], false)
        .unwrap();
    run_to_idle(&mut rig.controller).unwrap();

    let sent = rig.stage.lock().sent().to_vec();
    let wait = sent
        .iter()
        .position(|c| matches!(c, StageCommand::GroupWaitStop { .. }))
        .expect("slack take-up before the reversal");
    // Pre-move: raw 6 less one backlash increment, then the real target
    assert!(matches!(
        sent[wait - 1],
        StageCommand::GroupLatch { x, y, .. } if x == 5.988 && y == 5.0
    ));
    assert!(matches!(
        sent[wait + 1],
        StageCommand::GroupLatch { x, y, .. } if x == 5.488 && y == 5.0
    ));
    assert_eq!(rig.controller.logical_position().x, 5.5);
    assert!((rig.stage.lock().position(1) - 5.488).abs() < 1e-9);
}

#[test]
fn test_stop_request_ends_after_current_move() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    let quad = ShapeInstruction::Quadr {
        corners: square(5.0, 5.0, 1.0),
    };

    rig.controller.perform(vec![quad.clone(), quad], true).unwrap();
    assert!(rig.controller.request_stop());
    run_to_idle(&mut rig.controller).unwrap();

    assert_eq!(latches(&rig.stage), vec![(5.0, 5.0)]);
    assert!(job_events(&rig.events).contains(&JobEvent::Finished {
        instructions: 2,
        stopped: true,
    }));
    assert_eq!(rig.laser.lock().calls(), &[LaserCall::TurnOff]);
    assert!(!rig.controller.request_stop());
}

#[test]
fn test_second_job_rejected_while_active() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller
        .perform(vec![line(5.0, 5.0, 6.0, 6.0)], false)
        .unwrap();
    assert_eq!(
        rig.controller.perform(vec![line(5.0, 5.0, 6.0, 6.0)], false),
        Err(MotionError::JobAlreadyActive)
    );
    assert!(rig.controller.request_stop());
    run_to_idle(&mut rig.controller).unwrap();
    assert_eq!(rig.controller.perform(vec![], false), Err(MotionError::EmptyJob));
}

#[test]
fn test_disconnect_mid_job_turns_laser_off() {
    let mut rig = rig([5.0, 5.0, 0.0], LaserStatus::Ready);
    rig.controller.refresh_positions().unwrap();
    rig.controller
        .perform(vec![line(5.0, 5.0, 8.0, 5.0)], true)
        .unwrap();

    while rig.laser.lock().calls().is_empty() {
        rig.controller.tick().unwrap();
    }
    rig.stage.lock().disconnect();

    assert_eq!(
        rig.controller.tick(),
        Err(MotionError::TransportDisconnected)
    );
    assert_eq!(rig.laser.lock().turn_off_count(), 1);
    assert_eq!(rig.laser.lock().status(), LaserStatus::Ready);
    assert_eq!(rig.controller.status(), ControllerStatus::Disconnected);
    assert!(rig.controller.is_idle());

    let history = rig.events.history();
    assert!(history.iter().any(|e| matches!(
        e,
        AppEvent::Connection(ConnectionEvent::Disconnected { .. })
    )));
    assert!(job_events(&rig.events)
        .iter()
        .any(|e| matches!(e, JobEvent::Aborted { .. })));
}

#[test]
fn test_silent_stage_stalls_when_bounded() {
    let config = MotionConfig {
        max_silent_polls: Some(3),
        ..Default::default()
    };
    let mut rig = rig_with_config([5.0, 5.0, 0.0], LaserStatus::Ready, config);
    rig.controller
        .perform(vec![line(5.0, 5.0, 6.0, 5.0)], true)
        .unwrap();
    rig.stage.lock().set_silent(true);

    let mut result = Ok(());
    for _ in 0..10 {
        result = rig.controller.tick();
        if result.is_err() {
            break;
        }
    }

    assert_eq!(result, Err(MotionError::Stalled { polls: 4 }));
    assert!(rig.controller.is_idle());
    assert_eq!(rig.controller.status(), ControllerStatus::Disconnected);
}
