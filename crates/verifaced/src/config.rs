use std::path::PathBuf;

use veriface_core::matcher::DEFAULT_MATCH_THRESHOLD;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite vector store.
    pub db_path: PathBuf,
    /// Whether a persistent store is configured. When false the null store
    /// is used: no duplicate check, nothing persisted.
    pub store_enabled: bool,
    /// Cosine similarity above which a descriptor counts as already enrolled.
    pub match_threshold: f64,
    /// Capacity of the per-session frame queue.
    pub frame_queue: usize,
    /// Wallet address attached to records enrolled by this process.
    pub wallet_address: Option<String>,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("VERIFACE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir().join("vectors.db"));

        Self {
            db_path,
            store_enabled: std::env::var("VERIFACE_STORE_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            match_threshold: env_unit_f64("VERIFACE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            frame_queue: env_usize("VERIFACE_FRAME_QUEUE", 16).max(1),
            wallet_address: std::env::var("VERIFACE_WALLET_ADDRESS")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("veriface")
}

/// Read a value in `[0, 1]`. Unparseable, non-finite or out-of-range values
/// fall back to `default`.
fn env_unit_f64(key: &str, default: f64) -> f64 {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => v,
        _ => {
            tracing::warn!(key, value = %raw, default, "ignoring invalid value, expected a number in [0, 1]");
            default
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_fallbacks() {
        assert_eq!(env_unit_f64("VERIFACE_TEST_UNSET_F64", 0.9), 0.9);
        assert_eq!(env_usize("VERIFACE_TEST_UNSET_USIZE", 16), 16);
    }

    #[test]
    fn test_env_parse_and_garbage() {
        std::env::set_var("VERIFACE_TEST_THRESHOLD", "0.85");
        assert_eq!(env_unit_f64("VERIFACE_TEST_THRESHOLD", 0.9), 0.85);
        std::env::set_var("VERIFACE_TEST_THRESHOLD", "high");
        assert_eq!(env_unit_f64("VERIFACE_TEST_THRESHOLD", 0.9), 0.9);
        std::env::remove_var("VERIFACE_TEST_THRESHOLD");
    }

    #[test]
    fn test_threshold_rejects_non_finite_and_out_of_range() {
        for raw in ["NaN", "inf", "-inf", "1.5", "-0.1"] {
            std::env::set_var("VERIFACE_TEST_BAD_THRESHOLD", raw);
            assert_eq!(env_unit_f64("VERIFACE_TEST_BAD_THRESHOLD", 0.9), 0.9, "{raw}");
        }
        for (raw, expected) in [("0", 0.0), ("1", 1.0), (" 0.75 ", 0.75)] {
            std::env::set_var("VERIFACE_TEST_BAD_THRESHOLD", raw);
            assert_eq!(env_unit_f64("VERIFACE_TEST_BAD_THRESHOLD", 0.9), expected);
        }
        std::env::remove_var("VERIFACE_TEST_BAD_THRESHOLD");
    }
}
