//! This module is responsible for preparing the resources needed by the application, such as directories, configurations, logs, etc.
//!

pub mod resource {
    use super::TagvisionProperty;
    use crate::module::error::Result;

    /// Initialize the application resources and return a TagvisionProperty instance containing paths and configurations.
    ///
    pub fn init() -> Result<TagvisionProperty> {
        // Prepare the app data directory
        let paths = crate::module::util::path::dir::create_app_sub_dir()?;

        // Load the app configuration file, writing defaults on first start
        let conf = crate::module::util::conf::toml::load(&paths.dir.data)?;

        Ok(TagvisionProperty { path: paths, conf })
    }
}

/// This struct represents the properties of the app, such as paths and configurations.
///
#[derive(Debug, Clone)]
pub struct TagvisionProperty {
    pub path: crate::module::util::path::TagvisionPath, // The paths of the app resources
    pub conf: crate::module::util::conf::Config,        // The configurations of the app
}
