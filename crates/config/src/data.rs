use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Data {
    /// Path to the detection data file. This is the file the engine loads at
    /// startup and reloads whenever an update source reports a newer version.
    pub file: PathBuf,

    /// Whether the engine should copy the data file into a temporary
    /// directory and operate on the copy. With this enabled the original
    /// file can be replaced on disk (for example by an external updater)
    /// while the engine still holds the previous version resident.
    pub temp_copy: bool,

    /// Directory used for temporary data copies. If unset, the system temp
    /// directory is used. Only relevant when `temp_copy` is enabled.
    pub temp_dir: Option<PathBuf>,

    /// Property names detection results are restricted to. An empty list
    /// means every property the data file carries is available.
    pub properties: Vec<String>,
}

impl Default for Data {
    fn default() -> Self {
        Self {
            file: PathBuf::from("uascope-data.txt"),
            temp_copy: false,
            temp_dir: None,
            properties: Vec::new(),
        }
    }
}
