//! File-based store for the external board's OAuth token. Guarded with
//! `fs2` advisory locks because a `config login` CLI invocation can write
//! concurrently with the running gateway process.

use std::path::{Path, PathBuf};

use sa_domain::model::Token;

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("hh_token.json"),
        }
    }

    /// Load the most recently written token, if any.
    pub fn load(&self) -> sa_domain::Result<Option<Token>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(&self.path)?;
        fs2::FileExt::lock_shared(&file)
            .map_err(|e| sa_domain::Error::Auth(format!("token store lock failed: {e}")))?;
        let raw = std::io::read_to_string(&file)?;
        fs2::FileExt::unlock(&file)
            .map_err(|e| sa_domain::Error::Auth(format!("token store unlock failed: {e}")))?;
        let token: Token = serde_json::from_str(&raw)?;
        Ok(Some(token))
    }

    /// Overwrite with the most recent token (the latest row always wins).
    pub fn save(&self, token: &Token) -> sa_domain::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(token)?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)?;
            fs2::FileExt::lock_exclusive(&file)
                .map_err(|e| sa_domain::Error::Auth(format!("token store lock failed: {e}")))?;
            let mut writer = std::io::BufWriter::new(file);
            writer.write_all(json.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            use std::io::Write;
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?;
            fs2::FileExt::lock_exclusive(&file)
                .map_err(|e| sa_domain::Error::Auth(format!("token store lock failed: {e}")))?;
            let mut writer = std::io::BufWriter::new(file);
            writer.write_all(json.as_bytes())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_token() -> Token {
        Token {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 3600,
            obtained_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        let token = sample_token();
        store.save(&token).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "a");
        assert_eq!(loaded.refresh_token, "r");
    }

    #[test]
    fn save_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save(&sample_token()).unwrap();
        let mut t2 = sample_token();
        t2.access_token = "b".to_string();
        store.save(&t2).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "b");
    }
}
