//! JSON persistence for [`gkl_core::PumpSettings`]. The core only owns the
//! shape of the record; reading and writing the file is this binary's job.

use anyhow::{Context, Result};
use gkl_core::PumpSettings;
use std::path::Path;

pub fn load(path: &Path) -> Result<Vec<PumpSettings>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn save(path: &Path, settings: &[PumpSettings]) -> Result<()> {
    let text = serde_json::to_string_pretty(settings).context("serializing pump settings")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}
