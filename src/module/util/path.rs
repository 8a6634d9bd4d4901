//! Path Operations Module
//!
//! This module handles path operations for directories and files.

use std::path::PathBuf;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a single path string.
/// It uses the PathBuf type to handle platform-specific separators and conversions.
/// Non UTF-8 results are converted lossily.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.to_string_lossy().into_owned()
}

pub mod dir {
    //! Directory Operations Submodule
    //!
    //! This submodule provides functions for directory operations.

    use std::fs;
    use std::path::Path;

    use super::{TagvisionDir, TagvisionImg, TagvisionPath};
    use crate::module::define;
    use crate::module::error::Result;

    /// Create Directory from Path List
    ///
    /// This function takes a slice of strings as input and creates a directory with the joined path.
    /// It returns the path if the directory creation succeeds.
    pub fn create_dir_from_path_list(paths: &[&str]) -> Result<String> {
        let path = super::join(paths);
        fs::create_dir_all(Path::new(&path))?;
        Ok(path)
    }

    /// Create Subdirectory in Either Directory
    ///
    /// Uses the first directory as parent if it exists, the second one otherwise.
    pub fn create_subdir_in_either_dir(dir1: &str, dir2: &str, name: &str) -> Result<String> {
        let parent: &str = if Path::new(dir1).is_dir() { dir1 } else { dir2 };
        create_dir_from_path_list(&[parent, name])
    }

    /// Create Data Directory
    ///
    /// Persistent storage is preferred; the ephemeral directory is used on
    /// units without it.
    pub fn create_data_dir() -> Result<String> {
        create_subdir_in_either_dir(
            define::path::PERSISTENT_DIR,
            define::path::EPHEMERAL_DIR,
            define::system::NAME,
        )
    }

    /// Create Temporary Directory
    pub fn create_tmp_dir() -> Result<String> {
        create_dir_from_path_list(&[define::path::EPHEMERAL_DIR, define::system::NAME])
    }

    /// Create Application Subdirectory and Paths
    ///
    /// Creates the data, tmp and log directories and returns the
    /// resulting path set.
    pub fn create_app_sub_dir() -> Result<TagvisionPath> {
        create_app_sub_dir_in(&create_data_dir()?, &create_tmp_dir()?)
    }

    /// Same as [`create_app_sub_dir`] rooted at explicit directories.
    pub fn create_app_sub_dir_in(data_dir: &str, tmp_dir: &str) -> Result<TagvisionPath> {
        let data_dir = create_dir_from_path_list(&[data_dir])?;
        let tmp_dir = create_dir_from_path_list(&[tmp_dir])?;
        let log_dir = create_dir_from_path_list(&[&data_dir, define::path::LOG_DIR])?;
        let last_img = super::join(&[&tmp_dir, define::path::LAST_IMAGE]);
        Ok(TagvisionPath {
            dir: TagvisionDir {
                data: data_dir,
                tmp: tmp_dir,
                log: log_dir,
            },
            img: TagvisionImg { last: last_img },
        })
    }
}

/// Paths of Resources
#[derive(Debug, Clone)]
pub struct TagvisionPath {
    /// Directories Paths
    pub dir: TagvisionDir,
    /// Images Paths
    pub img: TagvisionImg,
}

/// Paths of Directories
#[derive(Debug, Clone)]
pub struct TagvisionDir {
    /// Data Directory Path
    pub data: String,
    /// Temporary Directory Path
    pub tmp: String,
    /// Log Directory Path
    pub log: String,
}

/// Paths of Images
#[derive(Debug, Clone)]
pub struct TagvisionImg {
    /// Last overlay image, rewritten every displayed frame
    pub last: String,
}

impl TagvisionImg {
    /// Overlay image of the given camera; camera 0 uses [`TagvisionImg::last`].
    pub fn overlay(&self, camera_num: u32) -> String {
        match camera_num {
            0 => self.last.clone(),
            n => self.last.replacen(".jpg", &format!("{n}.jpg"), 1),
        }
    }
}
