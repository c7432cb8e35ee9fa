//! Bootstrap env file for defai.
//!
//! File: `~/.defai/.env` (standard dotenvy format). Holds values that should
//! survive restarts without editing a shell profile, such as the wallet
//! bound to the REPL session.

use std::path::{Path, PathBuf};

/// `~/.defai`, falling back to the working directory without a home.
pub fn defai_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".defai")
}

/// Path to the defai-specific `.env` file: `~/.defai/.env`.
pub fn defai_env_path() -> PathBuf {
    defai_home().join(".env")
}

/// Load env vars from `~/.defai/.env`.
///
/// Call this **after** `dotenvy::dotenv()`. dotenvy never overwrites
/// existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.defai/.env`
pub fn load_defai_env() {
    let path = defai_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Set `vars` in `~/.defai/.env`, keeping unrelated entries.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    write_env_file(&defai_env_path(), vars)
}

/// Values are double-quoted so that `#` and other shell-special characters
/// survive a dotenvy round trip.
fn write_env_file(path: &Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut entries: Vec<(String, String)> = if path.exists() {
        dotenvy::from_path_iter(path)
            .map_err(std::io::Error::other)?
            .filter_map(|r| r.ok())
            .collect()
    } else {
        Vec::new()
    };

    for (key, value) in vars {
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    let mut content = String::new();
    for (key, value) in &entries {
        // Escape backslashes and quotes so a value cannot inject new keys.
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(path: &Path) -> Vec<(String, String)> {
        dotenvy::from_path_iter(path)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn env_path_is_under_defai_home() {
        let path = defai_env_path();
        assert!(path.to_string_lossy().contains(".defai"));
        assert!(path.to_string_lossy().ends_with(".env"));
    }

    #[test]
    fn write_creates_parent_dirs_and_quotes_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(".env");

        write_env_file(&path, &[("WEB3_PROVIDER_URL", "https://rpc.example/#frag")]).unwrap();

        assert_eq!(
            parse(&path),
            vec![(
                "WEB3_PROVIDER_URL".to_string(),
                "https://rpc.example/#frag".to_string()
            )]
        );
    }

    #[test]
    fn write_updates_key_and_keeps_others() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DEFAI_NETWORK=\"coston2\"\nWALLET_ADDRESS=\"0x1\"\n").unwrap();

        write_env_file(&path, &[("WALLET_ADDRESS", "0x2")]).unwrap();

        assert_eq!(
            parse(&path),
            vec![
                ("DEFAI_NETWORK".to_string(), "coston2".to_string()),
                ("WALLET_ADDRESS".to_string(), "0x2".to_string()),
            ]
        );
    }

    #[test]
    fn write_escapes_quotes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        write_env_file(&path, &[("LLM_MODEL", "a\" INJECTED=\"x")]).unwrap();

        assert_eq!(
            parse(&path),
            vec![("LLM_MODEL".to_string(), "a\" INJECTED=\"x".to_string())]
        );
    }
}
