//! Module for Constants and Paths Definitions
//!
//! This module defines various constants and paths used throughout the application.

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "tagvision";

    /// Where the Raspberry Pi exposes its board serial.
    pub const CPUINFO_FILE: &str = "/proc/cpuinfo";
}

/// File Paths
pub mod path {

    // Persistent Data Directory
    pub const PERSISTENT_DIR: &str = "/data/";

    // Ephemeral Data Directory
    pub const EPHEMERAL_DIR: &str = "/run/user/1000/";

    // Log Directory
    pub const LOG_DIR: &str = "log";

    // Configuration File
    pub const CONF_FILE: &str = "conf.toml";

    // Last Overlay Image
    pub const LAST_IMAGE: &str = "vision.jpg";

    // Still image replayed by the fake camera 0
    pub const TAG_AND_BOARD_IMAGE: &str = "asset/img/tag_and_board.jpg";

    // Still image replayed by the other fake cameras
    pub const BLOB_IMAGE: &str = "asset/img/blob.jpg";

    // V4L2 device node prefix, the camera number is appended.
    pub const VIDEO_DEVICE_PREFIX: &str = "/dev/video";
}

/// Tag Geometry
pub mod tag {
    /// Tag family decoded by the detector.
    pub const FAMILY: &str = "tag36h11";

    /// Normal tag side length, 6.5 inches, in meters.
    pub const SIZE: f64 = 0.1651;

    /// The distortion rig uses a 33 mm, 20% scale, tag.
    pub const CALIBRATION_SIZE: f64 = 0.033;
}

/// Detector Defaults
pub mod detector {
    /// Worker threads used by the tag finder.
    pub const THREADS: usize = 4;
}

/// Network Defaults
pub mod network {
    /// Root of every vision topic.
    pub const ROOT: &str = "vision";

    /// Leaf of the blip topic.
    pub const BLIPS: &str = "blips";

    /// Longest a flush may wait on the transport, in milliseconds.
    pub const FLUSH_TIMEOUT_MS: u64 = 20;

    /// Publications the loopback transport holds before a flush blocks.
    pub const CAPACITY: usize = 64;
}
