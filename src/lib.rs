//! Tagvision, the AprilTag localization pipeline of a robot's vision coprocessor.
//!
//! Each camera runs its own loop: capture a frame, find tags, undistort their
//! corners, estimate their poses and publish one blip list per frame to the
//! robot. The tag-family decoder is supplied by the host through
//! [`module::vision::TagFinder`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::sync::atomic::AtomicBool;
//! # use tagvision::module::vision::TagFinder;
//! # fn demo<F: TagFinder + 'static>(make_finder: impl FnMut(u32) -> F) -> tagvision::module::error::Result<()> {
//! use tagvision::module::{identity::Identity, network::LoopbackNetwork, pipeline};
//!
//! let property = tagvision::module::util::init::resource::init()?;
//! tagvision::init_log(&property.path.dir.data, "tagvision", &property.conf.system.log_level)?;
//! let (network, _robot) = LoopbackNetwork::from_conf(&property.conf.network);
//! let stop = Arc::new(AtomicBool::new(false));
//! for handle in pipeline::start(&property, Identity::get(), Arc::new(network), stop, make_finder)? {
//!     let _ = handle.join();
//! }
//! # Ok(())
//! # }
//! ```

pub mod module; // Import the module submodule that contains other modules

use crate::module::define;
use crate::module::error::{Error, Result};

/// This function initializes the logger system using the log4rs crate.
///
/// # Arguments
/// * `dir` - A string slice that holds the directory where the log file will be stored
/// * `name` - A string slice that holds the name of the logger and the log file
/// * `level` - Level name such as `INFO`; anything unparsable means `INFO`
///
/// # Log Example
/// ```
/// log::debug!("Debug Message"); // Log a debug message
/// log::info!("Info Message"); // Log an info message
/// log::warn!("Warning Message"); // Log a warning message
/// log::error!("Error Message"); // Log an error message
/// ```
pub fn init_log(dir: &str, name: &str, level: &str) -> Result<()> {
    use crate::module::util::path::join; // Import the join function from the path module
    use log::LevelFilter; // Import the LevelFilter enum from the log crate
    use log4rs::append::file::FileAppender; // Import the FileAppender struct from the log4rs crate
    use log4rs::config::{Appender, Config, Root}; // Import the Appender, Config, and Root structs from the log4rs crate
    use log4rs::encode::pattern::PatternEncoder; // Import the PatternEncoder struct from the log4rs crate

    let level: LevelFilter = level.parse().unwrap_or(LevelFilter::Info);

    let logfile = FileAppender::builder() // Create a new FileAppender builder
        .encoder(Box::new(PatternEncoder::new(
            // Set the encoder to a new PatternEncoder with a custom format
            "{h({d} - {l}: {m}{n})}",
        )))
        .build(join(&[
            // Build the FileAppender with the joined path of the directory, the log directory, and the name
            dir,
            define::path::LOG_DIR,
            &format!("{}.log", name),
        ]))?;

    let config = Config::builder() // Create a new Config builder
        .appender(Appender::builder().build("logfile", Box::new(logfile))) // Add an appender with the name "logfile"
        .build(Root::builder().appender("logfile").build(level)) // Root logger at the configured level
        .map_err(|e| Error::Config(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| Error::Config(e.to_string()))?; // Initialize the logger system with the Config
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{debug, error, info, warn};
    use std::fs;
    use std::path::Path;

    // A simple test case for the init_log function
    #[test]
    fn test_log() {
        // Define a test directory and name
        let dir = "/tmp/tagvisiontest/";
        let name = "test_log";

        // Call the init_log function
        init_log(dir, name, "INFO").unwrap();

        // Perform some logging
        debug!("Debug Message");
        info!("Info Message");
        warn!("Warning Message");
        error!("Error Message");

        // Read the contents of the log file
        let log_file_path_str = "/tmp/tagvisiontest/log/test_log.log";
        let log_file_path = Path::new(log_file_path_str);
        let log_contents = fs::read_to_string(log_file_path).expect("Failed to read log file");

        // Assert that log messages are present in the file
        assert!(!log_contents.contains("Debug Message"));
        assert!(log_contents.contains("Info Message"));
        assert!(log_contents.contains("Warning Message"));
        assert!(log_contents.contains("Error Message"));
    }
}
