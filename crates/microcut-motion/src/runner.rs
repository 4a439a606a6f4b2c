//! Periodic driver for [`MotionController::tick`].

use crate::controller::MotionController;
use microcut_core::MotionError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Tick `controller` every `period` until it is idle.
///
/// Setting the `stop` channel to `true` asks the running job to finish its
/// current move and end. Returns the error that ended polling, if any.
pub async fn run_until_idle(
    controller: Arc<Mutex<MotionController>>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<(), MotionError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if *stop.borrow_and_update() {
        controller.lock().request_stop();
    }
    let mut stop_open = true;

    loop {
        tokio::select! {
            changed = stop.changed(), if stop_open => {
                match changed {
                    Ok(()) if *stop.borrow_and_update() => {
                        if controller.lock().request_stop() {
                            tracing::info!("Stop requested, finishing the current move");
                        }
                    }
                    Ok(()) => {}
                    // Sender gone; keep running to completion
                    Err(_) => stop_open = false,
                }
            }
            _ = interval.tick() => {
                let mut controller = controller.lock();
                controller.tick()?;
                if controller.is_idle() {
                    tracing::debug!("Controller idle, polling stopped");
                    return Ok(());
                }
            }
        }
    }
}
