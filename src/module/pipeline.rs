//! Provide Loop for each Camera.
//!
//! One thread per camera: take a frame, analyze it, repeat. Frame N is fully
//! published before frame N+1 is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::module::camera::{factory, Camera};
use crate::module::display::{Display, FileDisplay, NullDisplay};
use crate::module::error::{Error, Result};
use crate::module::identity::Identity;
use crate::module::network::Network;
use crate::module::util::init::TagvisionProperty;
use crate::module::vision::pose::PoseEstimator;
use crate::module::vision::tag_detector::TagDetector;
use crate::module::vision::TagFinder;

/// Start every camera loop this unit runs.
///
/// Fails before spawning anything when the identity has no camera count.
///
/// # Arguments
///
/// * `property` - Paths and configuration.
/// * `identity` - This unit.
/// * `network` - Blip transport shared by all cameras.
/// * `stop` - Set to end every loop at the next frame boundary.
/// * `make_finder` - Builds the tag finder for a camera index.
///
pub fn start<F, M>(
    property: &TagvisionProperty,
    identity: Identity,
    network: Arc<dyn Network>,
    stop: Arc<AtomicBool>,
    mut make_finder: M,
) -> Result<Vec<JoinHandle<Result<()>>>>
where
    F: TagFinder + 'static,
    M: FnMut(u32) -> F,
{
    let count = factory::num_cameras(identity)?;
    log::info!("{} runs {} camera(s)", identity, count);
    let handles = (0..count)
        .map(|camera_num| {
            let display: Arc<dyn Display> = if property.conf.display.enabled {
                Arc::new(FileDisplay::new(&property.path.img.overlay(camera_num)))
            } else {
                Arc::new(NullDisplay)
            };
            run(
                identity,
                camera_num,
                property.clone(),
                make_finder(camera_num),
                Arc::clone(&network),
                display,
                Arc::clone(&stop),
            )
        })
        .collect();
    Ok(handles)
}

/// Start the loop for one camera.
///
/// The camera is opened on the loop thread and never leaves it.
pub fn run<F: TagFinder + 'static>(
    identity: Identity,
    camera_num: u32,
    property: TagvisionProperty,
    finder: F,
    network: Arc<dyn Network>,
    display: Arc<dyn Display>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<Result<()>> {
    let conf = property.conf.clone();
    spawn(
        move || factory::get(identity, camera_num, &conf),
        identity,
        camera_num,
        property,
        finder,
        network,
        display,
        stop,
    )
}

#[allow(clippy::too_many_arguments)]
fn spawn<C, F>(
    open_camera: C,
    identity: Identity,
    camera_num: u32,
    property: TagvisionProperty,
    finder: F,
    network: Arc<dyn Network>,
    display: Arc<dyn Display>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<Result<()>>
where
    C: FnOnce() -> Result<Box<dyn Camera>> + Send + 'static,
    F: TagFinder + 'static,
{
    thread::spawn(move || {
        let mut camera = open_camera()?;
        let mut detector = TagDetector::new(
            identity,
            camera.as_ref(),
            camera_num,
            finder,
            &property.conf,
            network,
            display,
        )?;
        let res = drive(camera.as_mut(), &mut detector, &stop);
        if let Err(e) = &res {
            log::error!("Camera {} stopped: {}", camera_num, e);
        }
        res
    })
}

/// Pull frames until `stop` is set.
///
/// Frame faults and flush timeouts are logged and the loop carries on; a
/// camera failure or a closed network ends it.
pub fn drive<F: TagFinder, E: PoseEstimator>(
    camera: &mut dyn Camera,
    detector: &mut TagDetector<F, E>,
    stop: &AtomicBool,
) -> Result<()> {
    let mut frames: u64 = 0;
    let mut dropped: u64 = 0;
    while !stop.load(Ordering::Relaxed) {
        let req = camera.next_request()?;
        frames += 1;
        match detector.analyze(req) {
            Ok(()) => {}
            Err(e) if e.is_frame_fault() => {
                dropped += 1;
                log::warn!("Frame {} dropped: {}", frames, e);
            }
            Err(e @ Error::FlushTimeout(_)) => log::warn!("Frame {}: {}", frames, e),
            Err(e) => return Err(e),
        }
    }
    log::info!("Stopped after {} frames, {} dropped", frames, dropped);
    Ok(())
}
