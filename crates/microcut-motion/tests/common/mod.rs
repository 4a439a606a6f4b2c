#![allow(dead_code)]

use microcut_communication::{
    SharedLaser, SharedTransport, SimulatedLaser, SimulatedStage, StageCommand,
};
use microcut_core::{AppEvent, EventBus, EventBusConfig, JobEvent, LaserStatus, MotionError};
use microcut_motion::{MotionConfig, MotionController};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Rig {
    pub controller: MotionController,
    pub stage: Arc<Mutex<SimulatedStage>>,
    pub laser: Arc<Mutex<SimulatedLaser>>,
    pub events: Arc<EventBus>,
}

pub fn rig(position: [f64; 3], laser: LaserStatus) -> Rig {
    rig_with_config(position, laser, MotionConfig::default())
}

pub fn rig_with_config(position: [f64; 3], laser: LaserStatus, config: MotionConfig) -> Rig {
    let stage = Arc::new(Mutex::new(SimulatedStage::new(position)));
    let laser = Arc::new(Mutex::new(SimulatedLaser::new(laser)));
    let events = Arc::new(EventBus::with_config(EventBusConfig {
        enable_history: true,
        ..Default::default()
    }));
    let transport: SharedTransport = stage.clone();
    let shared_laser: SharedLaser = laser.clone();
    let controller =
        MotionController::new(transport, Some(shared_laser), config, Arc::clone(&events));
    Rig {
        controller,
        stage,
        laser,
        events,
    }
}

/// Tick until idle; returns the number of ticks taken
pub fn run_to_idle(controller: &mut MotionController) -> Result<usize, MotionError> {
    for ticks in 0..10_000 {
        if controller.is_idle() {
            return Ok(ticks);
        }
        controller.tick()?;
    }
    panic!("controller never became idle");
}

pub fn latches(stage: &Mutex<SimulatedStage>) -> Vec<(f64, f64)> {
    stage
        .lock()
        .sent()
        .iter()
        .filter_map(|c| match c {
            StageCommand::GroupLatch { x, y, .. } => Some((*x, *y)),
            _ => None,
        })
        .collect()
}

pub fn job_events(events: &EventBus) -> Vec<JobEvent> {
    events
        .history()
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::Job(job) => Some(job),
            _ => None,
        })
        .collect()
}

pub fn steps(events: &EventBus) -> Vec<(usize, u8)> {
    job_events(events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::StepChanged { item, step } => Some((item, step)),
            _ => None,
        })
        .collect()
}
