use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::Result;
use crate::reconstruction::ReconstructionStats;
use crate::room::{RoomDimensions, Window};

/// Serializes an object to a pretty-printed JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    std::fs::write(output_path, j)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Where the room dimensions in a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomSource {
    Reconstructed,
    Manual,
    Fallback,
}

/// Everything the floorplan renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloorplanReport {
    pub timestamp: String,
    pub source: RoomSource,
    pub room: RoomDimensions,
    pub windows: Vec<Window>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ReconstructionStats>,
}

impl FloorplanReport {
    pub fn new(
        source: RoomSource,
        room: RoomDimensions,
        windows: Vec<Window>,
        stats: Option<ReconstructionStats>,
    ) -> FloorplanReport {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        FloorplanReport {
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
            source,
            room,
            windows,
            stats,
        }
    }
}

pub fn write_report(output_path: impl AsRef<Path>, report: &FloorplanReport) -> Result<()> {
    let output_path = output_path.as_ref();
    object_to_json(output_path, report)?;
    log::info!("floorplan report written to {:?}", output_path);
    Ok(())
}
