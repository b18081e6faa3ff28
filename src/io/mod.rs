//! State persistence
//!
//! Learnable parameters are saved and loaded through a flat state dictionary
//! under fixed key names, serialized as JSON. The dictionary is deliberately
//! dumb: names map to flat f32 buffers, and every module knows how to place
//! its own parameters into it and take them back out.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Flat, ordered parameter dictionary: name → flattened f32 data
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// Save a state dictionary to a JSON file
///
/// # Example
///
/// ```no_run
/// use cuantizar::io::{save_state, StateDict};
///
/// let mut state = StateDict::new();
/// state.insert("bit_width_offset".to_string(), vec![2.0]);
/// save_state(&state, "model.json").unwrap();
/// ```
pub fn save_state(state: &StateDict, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    let data = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;

    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

/// Load a state dictionary from a JSON file
pub fn load_state(path: impl AsRef<Path>) -> Result<StateDict> {
    let path = path.as_ref();

    let ext = path.extension().and_then(|s| s.to_str());
    if ext != Some("json") {
        return Err(Error::Serialization(format!(
            "unsupported state file extension: {}",
            ext.unwrap_or("<none>")
        )));
    }

    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))
}
