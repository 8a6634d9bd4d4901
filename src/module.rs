//! This module contains all the sub-modules of the project.

pub mod camera; // Camera module: Capture abstraction, V4L2 and still-image cameras.
pub mod define; // Definition module: Contains definitions and constants used throughout the project.
pub mod display; // Display module: Debug overlay drawing and output.
pub mod error; // Error module: Error type shared by every module.
pub mod identity; // Identity module: Resolves which unit this process runs on.
pub mod network; // Network module: Blip publishing and flushing.
pub mod pipeline; // Pipeline module: Per-camera capture and analysis threads.
pub mod util; // Utility module: Provides various utility functions and helpers.
pub mod vision; // Vision module: Tag undistortion, pose estimation and analysis.
