//! Config Handler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::module::identity::Identity;

/// Provides TOML config file handling.
pub mod toml {

    use super::DEFAULT_CONFIG;
    use crate::module::define;
    use crate::module::error::Result;
    use std::fs::File;
    use std::io::prelude::*;
    use std::path::Path;

    /// Loads a configuration file from the given directory.
    /// If not found, generates a default config file.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file is located or should be created.
    ///
    pub fn load(dir: &str) -> Result<super::Config> {
        // Check if the config file exists
        let path = Path::new(dir).join(define::path::CONF_FILE);

        if !path.is_file() {
            // Create the default config if it doesn't exist
            log::info!("No config at {}, writing defaults", path.display());
            let config: super::Config = toml::from_str(DEFAULT_CONFIG)?;
            let toml_str = toml::to_string(&config)?;
            let mut file = File::create(&path)?;
            file.write_all(toml_str.as_bytes())?;
        }

        // Load the config
        let conf_str: String = std::fs::read_to_string(&path)?;
        let conf: super::Config = toml::from_str(&conf_str)?;
        Ok(conf)
    }

    /// Saves a configuration file to the given directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the configuration file should be saved.
    /// * `conf` - The configuration data to be saved.
    ///
    pub fn save(dir: &str, conf: &super::Config) -> Result<()> {
        let toml_str = toml::to_string(conf)?;
        let path = crate::module::util::path::join(&[dir, define::path::CONF_FILE]);
        let mut file = File::create(path)?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// Parses the built-in defaults.
    pub fn defaults() -> Result<super::Config> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }
}

/// Represents the configuration data structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub system: System,
    pub camera: Camera,
    pub fake: Fake,
    pub detector: Detector,
    pub tag: Tag,
    pub network: Network,
    pub display: Display,
    /// Per-identity calibration overrides, keyed by identity name.
    #[serde(default)]
    pub calibration: HashMap<String, Calibration>,
}

impl Config {
    /// Calibration for the given unit, falling back to the camera default.
    pub fn calibration_for(&self, identity: Identity) -> &Calibration {
        self.calibration
            .get(identity.name())
            .unwrap_or(&self.camera.calibration)
    }

    /// Physical tag side length the given unit should assume.
    pub fn tag_size_for(&self, identity: Identity) -> f64 {
        match identity {
            Identity::DistTest => self.tag.calibration_size,
            _ => self.tag.size,
        }
    }
}

/// Represents system-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct System {
    pub log_level: String,
}

/// Represents camera-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Camera {
    pub device_prefix: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffers: u32,
    pub calibration: Calibration,
}

/// Pinhole intrinsics plus Brown-Conrady distortion.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Calibration {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

/// Represents fake-camera configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Fake {
    pub tag_image: String,
    pub tag_width: u32,
    pub tag_height: u32,
    pub blob_image: String,
    pub fps: f64,
    pub jitter: f64,
}

/// Represents tag-finder configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Detector {
    pub family: String,
    pub threads: usize,
}

/// Represents tag geometry configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Tag {
    pub size: f64,
    pub calibration_size: f64,
}

/// Represents network-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Network {
    pub flush_timeout_ms: u64,
    pub capacity: usize,
}

/// Represents display-related configuration parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Display {
    pub enabled: bool,
}

// Default configuration data in TOML format
const DEFAULT_CONFIG: &str = r#"
[system]
  log_level = 'INFO' # Log level ('DEBUG', 'INFO', 'WARN', 'ERROR')

[camera]
  device_prefix = '/dev/video' # Camera number is appended
  width = 832 # Image width
  height = 616 # Image height
  fps = 30 # Requested frame rate
  buffers = 2 # Driver buffers

[camera.calibration]
  # nominal pi v2 camera at 832x616
  fx = 660.0
  fy = 660.0
  cx = 416.0
  cy = 308.0
  k1 = -0.32
  k2 = 0.12
  p1 = 0.0
  p2 = 0.0
  k3 = -0.02

[fake]
  tag_image = 'asset/img/tag_and_board.jpg' # Still for fake camera 0
  tag_width = 5504 # full-size (huge)
  tag_height = 3096
  blob_image = 'asset/img/blob.jpg' # Still for the other fake cameras
  fps = 30.0 # Paced frame rate, 0 for as fast as possible
  jitter = 0.1 # Random fraction of the frame interval

[detector]
  family = 'tag36h11' # Tag family
  threads = 4 # Worker threads

[tag]
  size = 0.1651 # Normal tag side, 6.5 inches, in meters
  calibration_size = 0.033 # Distortion rig tag side, in meters

[network]
  flush_timeout_ms = 20 # Longest wait for the transport on flush
  capacity = 64 # Publications held before a flush blocks

[display]
  enabled = true # Draw and save the overlay image
"#;

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    #[test]
    fn run_load() {
        let dir = "/tmp/tagvisiontest/conf_load/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        let _ = fs::remove_file(Path::new(dir).join("conf.toml"));
        let res = toml::load(dir).unwrap();
        assert_eq!(res.detector.family, "tag36h11");
        assert_eq!(res.detector.threads, 4);
        assert!(Path::new(dir).join("conf.toml").is_file());
    }

    #[test]
    fn run_save_and_reload() {
        let dir = "/tmp/tagvisiontest/conf_save/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        let mut conf = toml::defaults().unwrap();
        conf.calibration.insert(
            "SHOOTER".to_owned(),
            Calibration {
                fx: 900.0,
                fy: 901.0,
                cx: 400.0,
                cy: 300.0,
                k1: 0.0,
                k2: 0.0,
                p1: 0.0,
                p2: 0.0,
                k3: 0.0,
            },
        );
        toml::save(dir, &conf).unwrap();
        let res = toml::load(dir).unwrap();
        assert_eq!(res.calibration_for(Identity::Shooter).fx, 900.0);
        assert_eq!(res.calibration_for(Identity::Dev).fx, 660.0);
    }

    #[test]
    fn broken_file_is_config_error() {
        let dir = "/tmp/tagvisiontest/conf_broken/";
        fs::create_dir_all(Path::new(dir)).unwrap();
        fs::write(Path::new(dir).join("conf.toml"), "[system\n").unwrap();
        let res = toml::load(dir);
        assert!(matches!(
            res,
            Err(crate::module::error::Error::Config(_))
        ));
    }

    #[test]
    fn defaults_match_constants() {
        use crate::module::define;
        let conf = toml::defaults().unwrap();
        assert_eq!(conf.camera.device_prefix, define::path::VIDEO_DEVICE_PREFIX);
        assert_eq!(conf.fake.tag_image, define::path::TAG_AND_BOARD_IMAGE);
        assert_eq!(conf.fake.blob_image, define::path::BLOB_IMAGE);
        assert_eq!(conf.detector.family, define::tag::FAMILY);
        assert_eq!(conf.detector.threads, define::detector::THREADS);
        assert_eq!(conf.tag.size, define::tag::SIZE);
        assert_eq!(conf.tag.calibration_size, define::tag::CALIBRATION_SIZE);
        assert_eq!(conf.network.flush_timeout_ms, define::network::FLUSH_TIMEOUT_MS);
        assert_eq!(conf.network.capacity, define::network::CAPACITY);
        assert_eq!(
            crate::module::vision::lens::LensModel::from(&conf.camera.calibration)
                .distortion
                .coefficients(),
            [-0.32, 0.12, 0.0, 0.0, -0.02]
        );
    }

    #[test]
    fn tag_size_test() {
        let conf = toml::defaults().unwrap();
        assert_eq!(conf.tag_size_for(Identity::DistTest), 0.033);
        for identity in Identity::ALL {
            if identity != Identity::DistTest {
                assert_eq!(conf.tag_size_for(identity), 0.1651);
            }
        }
    }
}
