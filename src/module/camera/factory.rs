//! Chooses a camera implementation for this unit.
//!

use std::path::Path;
use std::sync::OnceLock;

use super::fake::FakeCamera;
use super::real::V4l2Camera;
use super::{Camera, Size};
use crate::module::error::{Error, Result};
use crate::module::identity::Identity;
use crate::module::util::conf::Config;

/// Whether capture hardware is present, decided once per process.
///
/// The first caller's `device_prefix` decides; later calls reuse the answer.
pub fn hardware_available(device_prefix: &str) -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| device_present(device_prefix))
}

/// Whether the first capture device under `device_prefix` exists.
fn device_present(device_prefix: &str) -> bool {
    let device = format!("{}0", device_prefix);
    let available = Path::new(&device).exists();
    log::info!("Capture hardware at {}: {}", device, available);
    available
}

/// Returns the camera for the given unit and index.
///
/// # Arguments
///
/// * `identity` - This unit's identity.
/// * `camera_num` - Index of the camera on this unit.
/// * `conf` - Application configuration.
///
pub fn get(identity: Identity, camera_num: u32, conf: &Config) -> Result<Box<dyn Camera>> {
    get_with(
        hardware_available(&conf.camera.device_prefix),
        identity,
        camera_num,
        conf,
    )
}

/// Same as [`get`] with the hardware decision made by the caller.
pub fn get_with(
    hardware: bool,
    identity: Identity,
    camera_num: u32,
    conf: &Config,
) -> Result<Box<dyn Camera>> {
    if hardware {
        return Ok(Box::new(V4l2Camera::new(identity, camera_num, conf)?));
    }
    let fake = &conf.fake;
    let camera = if camera_num == 0 {
        let size = Size {
            width: fake.tag_width,
            height: fake.tag_height,
        };
        FakeCamera::new(&fake.tag_image, size, fake.fps, fake.jitter)
    } else {
        let size = Size {
            width: conf.camera.width,
            height: conf.camera.height,
        };
        FakeCamera::new(&fake.blob_image, size, fake.fps, 0.0)
    };
    Ok(Box::new(camera))
}

/// How many cameras the given unit runs.
pub fn num_cameras(identity: Identity) -> Result<u32> {
    match identity {
        Identity::Unknown => Ok(2),
        Identity::RightAmp
        | Identity::LeftAmp
        | Identity::Shooter
        | Identity::GamePiece
        | Identity::GlobalGamePiece
        | Identity::CoralRight
        | Identity::CoralLeft
        | Identity::SwerveRight
        | Identity::SwerveLeft
        | Identity::Funnel
        | Identity::Dev // has one v2 camera at the moment
        | Identity::DistTest => Ok(1),
        Identity::Flipped => Ok(0),
        Identity::GlobalRight | Identity::GlobalLeft | Identity::Dev2 => {
            Err(Error::UnknownIdentity(identity))
        }
    }
}
