use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::memory::OutlineSeed;
use crate::model::command::Focus;
use crate::model::refresh::RefreshRequest;

/// Error type for script loading
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse script: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("could not parse script: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("script has an empty outline")]
    EmptyOutline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub outline: Vec<OutlineSeed>,
    /// Backend latency per call
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted event. Nodes are named by gnx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Submit a command to the queue
    Add {
        action: String,
        #[serde(default)]
        node: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        refresh: RefreshRequest,
        #[serde(default)]
        focus: Focus,
        #[serde(default)]
        from_outline: bool,
        #[serde(default)]
        name: Option<String>,
    },
    /// The user clicks a node in the outline
    Select { node: String },
    /// A UI handler asks for a refresh
    Refresh {
        #[serde(default)]
        focus: Focus,
        #[serde(default)]
        flags: RefreshRequest,
        #[serde(default)]
        node: Option<String>,
        #[serde(default)]
        preserve_range: bool,
    },
    /// The backend asks for a refresh on its own
    Push {
        #[serde(default)]
        focus: Focus,
        #[serde(default)]
        flags: RefreshRequest,
        #[serde(default)]
        node: Option<String>,
    },
    /// Let time pass
    Wait { ms: u64 },
    /// Wait until the queue and the coordinator are idle
    Settle,
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Add { .. } => "add",
            Step::Select { .. } => "select",
            Step::Refresh { .. } => "refresh",
            Step::Push { .. } => "push",
            Step::Wait { .. } => "wait",
            Step::Settle => "settle",
        }
    }
}

/// Parse a script from text; `json` picks the format
pub fn parse_script(text: &str, json: bool) -> Result<Script, ScriptError> {
    let script: Script = if json {
        serde_json::from_str(text)?
    } else {
        toml::from_str(text)?
    };
    if script.outline.is_empty() {
        return Err(ScriptError::EmptyOutline);
    }
    Ok(script)
}

pub fn read_script(path: &Path) -> Result<Script, ScriptError> {
    let text = fs::read_to_string(path).map_err(|e| ScriptError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_script(&text, json)
}
