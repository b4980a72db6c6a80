use async_trait::async_trait;
use bedside_core::{AudioClip, AudioPlayer, PlaybackError};
use std::path::PathBuf;
use tracing::info;

/// Writes every reply clip to a file in a directory.
pub struct ClipDirectoryPlayer {
    dir: PathBuf,
}

impl ClipDirectoryPlayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AudioPlayer for ClipDirectoryPlayer {
    async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!(
            "reply-{}.{}",
            chrono::Local::now().format("%Y%m%dT%H%M%S%.3f"),
            clip.extension()
        );
        let path = self.dir.join(name);
        tokio::fs::write(&path, &clip.bytes).await?;
        info!(path = %path.display(), bytes = clip.bytes.len(), "Saved reply audio");
        Ok(())
    }
}
