use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, schema::Config};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "botline.toml",
    "botline.yaml",
    "botline.yml",
    "botline.json",
];

/// Load config from the given path (format chosen by extension).
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./botline.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/botline/botline.{toml,yaml,yml,json}` (user-global)
///
/// Returns `Config::default()` if no config file is found.
#[must_use]
pub fn discover_and_load() -> Config {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    Config::default()
}

fn parse_config(raw: &str, path: &Path) -> Result<Config> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "toml" => toml::from_str(raw).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => {
            return Err(Error::UnsupportedFormat {
                path: path.display().to_string(),
            });
        },
    };

    parsed.map_err(|message| Error::Parse {
        path: path.display().to_string(),
        message,
    })
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "botline") {
        for name in CONFIG_FILENAMES {
            let p = dirs.config_dir().join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::schema::{ChannelKind, RuntimeKind},
        std::io::Write,
    };

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "botline.toml",
            r#"
default_agent = "claude"

[[agents]]
name = "claude"
runtime = "session-native"
command = "claude"
args = ["--no-color"]

[[channels]]
kind = "mock"
id = "dev"
default_agent = "claude"

[throttle]
max_chunk_len = 1000
"#,
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.default_agent.as_deref(), Some("claude"));
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].runtime, RuntimeKind::SessionNative);
        assert_eq!(cfg.agents[0].args, vec!["--no-color"]);
        assert_eq!(cfg.channels[0].kind, ChannelKind::Mock);
        assert_eq!(cfg.throttle.max_chunk_len, 1000);
        // Unset sections keep their defaults.
        assert_eq!(cfg.ledger.max_lines, 200);
    }

    #[test]
    fn loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "botline.json",
            r#"{"agents": [{"name": "echo", "command": "cat"}]}"#,
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.agents[0].name, "echo");
        assert_eq!(cfg.agents[0].runtime, RuntimeKind::Cli);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "botline.ini", "agents = []");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "botline.toml", "agents = \"not a list\"");
        assert!(matches!(load_config(&path), Err(Error::Parse { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_config(&path), Err(Error::Read { .. })));
    }
}
