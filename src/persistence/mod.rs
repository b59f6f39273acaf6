use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use log::debug;
use serde::Deserialize;

use crate::core::Result;

const APP_NAME: &str = "ankiport";

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join(APP_NAME)
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> Result<T> {
    load_json_from(&get_data_file_path(filename))
}

/// Missing file yields `T::default()`; unreadable or malformed JSON is an error.
pub fn load_json_from<T: for<'de> Deserialize<'de> + Default>(file_path: &Path) -> Result<T> {
    if !file_path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(file_path)?;
    let data: T = serde_json::from_str(&json)?;
    debug!("Data loaded from: {}", file_path.display());
    Ok(data)
}
