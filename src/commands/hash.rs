// hash.rs - Content hash tracker
// Remembers the SHA-256 of each command file's last-seen content so that
// filesystem events which do not change a file's bytes never trigger a reload.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::CommandError;

#[derive(Default)]
pub struct HashTracker {
    digests: Mutex<HashMap<PathBuf, String>>,
}

impl HashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `path`, store the digest, and report whether it differs from the
    /// previous one. A path seen for the first time counts as changed.
    pub async fn analyze_and_hash(&self, path: &Path) -> Result<bool, CommandError> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| CommandError::io(path, e))?;
        let digest = digest(&contents);

        let mut digests = self.digests.lock().await;
        let previous = digests.insert(path.to_path_buf(), digest.clone());
        Ok(previous.as_deref() != Some(digest.as_str()))
    }

    /// Drop the digests for `path` and everything below it
    pub async fn forget(&self, path: &Path) {
        self.digests
            .lock()
            .await
            .retain(|tracked, _| !tracked.starts_with(path));
    }
}

fn digest(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}
