use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration, read from `outline-bridge.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub panes: PaneDebounceConfig,
    #[serde(default)]
    pub reveal: RevealConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Window in which refresh requests are merged into one pass
    #[serde(default = "default_refresh_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            debounce_ms: default_refresh_debounce_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Per-collaborator debounce windows for the secondary panes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneDebounceConfig {
    #[serde(default = "default_pane_debounce_ms")]
    pub documents_ms: u64,
    #[serde(default = "default_pane_debounce_ms")]
    pub buttons_ms: u64,
    #[serde(default = "default_pane_debounce_ms")]
    pub goto_ms: u64,
    #[serde(default = "default_pane_debounce_ms")]
    pub undo_ms: u64,
    #[serde(default = "default_states_debounce_ms")]
    pub states_ms: u64,
}

impl Default for PaneDebounceConfig {
    fn default() -> Self {
        PaneDebounceConfig {
            documents_ms: default_pane_debounce_ms(),
            buttons_ms: default_pane_debounce_ms(),
            goto_ms: default_pane_debounce_ms(),
            undo_ms: default_pane_debounce_ms(),
            states_ms: default_states_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealConfig {
    /// Retry a failed reveal once after redrawing the whole tree
    #[serde(default = "default_true")]
    pub retry_with_tree_refresh: bool,
}

impl Default for RevealConfig {
    fn default() -> Self {
        RevealConfig {
            retry_with_tree_refresh: true,
        }
    }
}

fn default_refresh_debounce_ms() -> u64 {
    50
}

fn default_pane_debounce_ms() -> u64 {
    100
}

fn default_states_debounce_ms() -> u64 {
    80
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.refresh.debounce(), Duration::from_millis(50));
        assert_eq!(config.panes.states_ms, 80);
        assert!(config.reveal.retry_with_tree_refresh);
    }

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[panes]
undo_ms = 20

[reveal]
retry_with_tree_refresh = false
"#,
        )
        .unwrap();
        assert_eq!(config.panes.undo_ms, 20);
        assert_eq!(config.panes.goto_ms, 100);
        assert!(!config.reveal.retry_with_tree_refresh);
        assert_eq!(config.refresh.debounce_ms, 50);
    }
}
