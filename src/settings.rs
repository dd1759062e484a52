use serde::{Deserialize, Serialize};

/* ============================= LABELS ============================= */

/// Names of the labels the operator stamps on every child pod.
///
/// These are the *only* channel the core uses to locate and filter pods
/// (spec §3 "Labels"), so their names are configurable rather than baked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelNames {
    pub kind_label: String,
    pub namespace_label: String,
    pub name_label: String,
    pub component_label: String,
    pub hosts_from_label: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            kind_label: "perftest.stackhpc.com/kind".to_string(),
            namespace_label: "perftest.stackhpc.com/namespace".to_string(),
            name_label: "perftest.stackhpc.com/name".to_string(),
            component_label: "perftest.stackhpc.com/component".to_string(),
            hosts_from_label: "perftest.stackhpc.com/hosts-from".to_string(),
        }
    }
}

/* ============================= PRIORITY WINDOW ============================= */

/// Descending priority window used by the priority manager (spec §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityWindow {
    pub min: i64,
    pub max: i64,
}

impl Default for PriorityWindow {
    fn default() -> Self {
        Self {
            min: 0,
            max: 1_000_000,
        }
    }
}

/* ============================= SETTINGS ============================= */

/// Process-wide configuration, loaded once at startup.
///
/// Sourced from built-in defaults, an optional config file, and environment
/// variables prefixed `KUBE_PERFTEST__` (double underscore separates nested
/// keys, e.g. `KUBE_PERFTEST__LABELS__KIND_LABEL`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub default_image_tag: String,
    pub default_image_pull_policy: String,
    pub labels: LabelNames,
    pub scheduler_name: String,
    pub queue_name: String,
    pub discovery_container_image: String,
    pub priority_window: PriorityWindow,
    pub reconcile_timeout_secs: u64,
    pub scrape_timeout_secs: u64,
    pub requeue_interval_secs: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_image_tag: "latest".to_string(),
            default_image_pull_policy: "IfNotPresent".to_string(),
            labels: LabelNames::default(),
            scheduler_name: "volcano".to_string(),
            queue_name: "default".to_string(),
            discovery_container_image: "ghcr.io/stackhpc/kube-perftest-discovery:latest"
                .to_string(),
            priority_window: PriorityWindow::default(),
            reconcile_timeout_secs: 30,
            scrape_timeout_secs: 60,
            requeue_interval_secs: 30,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional config file, then environment.
    ///
    /// `config_path` is an explicit `--config` override; when `None`, the
    /// file at `/etc/kube-perftest/config.yaml` is used if present, and its
    /// absence is not an error.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?);

        let file_path = config_path.unwrap_or("/etc/kube-perftest/config.yaml");
        builder = builder.add_source(config::File::with_name(file_path).required(false));

        builder = builder.add_source(
            config::Environment::with_prefix("KUBE_PERFTEST")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels_are_namespaced() {
        let labels = LabelNames::default();
        assert!(labels.kind_label.starts_with("perftest.stackhpc.com/"));
        assert!(labels.component_label.starts_with("perftest.stackhpc.com/"));
    }

    #[test]
    fn test_priority_window_default_ordering() {
        let w = PriorityWindow::default();
        assert!(w.max > w.min);
    }

    #[test]
    fn test_settings_default_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).expect("should serialize");
        let deserialized: Settings = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(deserialized.scheduler_name, settings.scheduler_name);
        assert_eq!(deserialized.reconcile_timeout_secs, 30);
    }

    #[test]
    fn test_settings_load_with_no_file_uses_defaults() {
        let settings = Settings::load(Some("/nonexistent/path/config.yaml"))
            .expect("should fall back to defaults");
        assert_eq!(settings.scheduler_name, "volcano");
        assert_eq!(settings.queue_name, "default");
    }
}
