use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use xcw_types::SCHEMA_VERSION;

/// Per-app durable record allowing a later tail to continue without
/// replaying already-emitted logs. Unknown keys survive a
/// read-modify-write cycle for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeState {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    pub app: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub udid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_log_timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResumeState {
    pub fn new(app: &str, udid: &str) -> Self {
        ResumeState {
            event_type: "resume_state".to_string(),
            schema_version: SCHEMA_VERSION,
            app: app.to_string(),
            udid: udid.to_string(),
            last_seen_timestamp: None,
            last_log_timestamp: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now().to_rfc3339());
    }
}

/// `<state-dir>/resume/<bundle-id>.json`, parent created 0755.
pub fn default_resume_path(app: &str) -> Result<PathBuf> {
    let app = app.trim();
    if app.is_empty() {
        bail!("app is required for resume state path");
    }
    let dir = crate::config::state_dir().join("resume");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir.join(format!("{}.json", app)))
}

pub fn load_resume_state(path: &Path) -> Result<Option<ResumeState>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let state: ResumeState =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(state))
}

/// Atomic replace: write a sibling temp file, then rename over the target.
pub fn save_resume_state(path: &Path, state: &ResumeState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(state)?;
    body.push('\n');

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body.as_bytes())?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
