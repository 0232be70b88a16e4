//! Reading and writing fragment documents as JSON element trees.
//!
//! A fragment is one serialized [`Element`] rooted at `Model`:
//!
//! ```json
//! {
//!   "tag": "Model",
//!   "children": [
//!     { "tag": "Field", "attrs": { "name": "R1" } }
//!   ]
//! }
//! ```

use std::{fs, path::Path};

use log::debug;

use flowsheet_core::element::Element;

use crate::FlowsheetError;

/// Decode a fragment from JSON text. `origin` names the source in errors.
pub fn parse_fragment(json: &str, origin: &str) -> Result<Element, FlowsheetError> {
    serde_json::from_str(json).map_err(|err| FlowsheetError::new_decode_error(err, origin))
}

/// Read and decode the fragment at `path`.
pub fn read_fragment(path: impl AsRef<Path>) -> Result<Element, FlowsheetError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    let fragment = parse_fragment(&json, &path.display().to_string())?;
    debug!(path = path.display().to_string(), children = fragment.children().len(); "Fragment read");
    Ok(fragment)
}

/// Write `model` to `path` as pretty-printed JSON.
pub fn write_fragment(path: impl AsRef<Path>, model: &Element) -> Result<(), FlowsheetError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(model)
        .map_err(|err| FlowsheetError::new_encode_error(err, path.display().to_string()))?;
    fs::write(path, json)?;
    Ok(())
}
