//! Reply audio playback.
//!
//! The agent may attach base64 encoded speech to a reply. [`play_payload`] decodes and
//! plays one payload and only logs failures; the session runs it on a task it owns.

use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, error};

/// Decoded audio as sent by the agent (WAV or MP3 bytes, passed through untouched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
}

impl AudioClip {
    /// Best-effort container guess from the magic bytes.
    pub fn extension(&self) -> &'static str {
        match self.bytes.as_slice() {
            [b'R', b'I', b'F', b'F', ..] => "wav",
            [b'I', b'D', b'3', ..] | [0xFF, 0xE0..=0xFF, ..] => "mp3",
            [b'O', b'g', b'g', b'S', ..] => "ogg",
            _ => "bin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Audio payload is empty")]
    Empty,
    #[error("Audio output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Audio playback failed: {0}")]
    Device(String),
}

/// Decodes the base64 `audio` field of a reply.
pub fn decode_clip(payload: &str) -> Result<AudioClip, PlaybackError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    if bytes.is_empty() {
        return Err(PlaybackError::Empty);
    }
    Ok(AudioClip { bytes })
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError>;
}

/// Discards every clip.
pub struct SilentPlayer;

#[async_trait]
impl AudioPlayer for SilentPlayer {
    async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError> {
        debug!(bytes = clip.bytes.len(), "Discarding reply audio");
        Ok(())
    }
}

/// Decodes `payload` and plays it. Errors are logged, never returned.
pub async fn play_payload(player: Arc<dyn AudioPlayer>, payload: String) {
    let result = match decode_clip(&payload) {
        Ok(clip) => player.play(clip).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!(error = %e, "Audio playback error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPlayer {
        played: Mutex<Vec<AudioClip>>,
    }

    #[async_trait]
    impl AudioPlayer for RecordingPlayer {
        async fn play(&self, clip: AudioClip) -> Result<(), PlaybackError> {
            self.played.lock().unwrap().push(clip);
            Ok(())
        }
    }

    struct BrokenPlayer;

    #[async_trait]
    impl AudioPlayer for BrokenPlayer {
        async fn play(&self, _clip: AudioClip) -> Result<(), PlaybackError> {
            Err(PlaybackError::Device("no output device".into()))
        }
    }

    #[test]
    fn test_decode_clip() {
        let clip = decode_clip("UklGRiQAAABXQVZF").unwrap();
        assert_eq!(&clip.bytes[..4], b"RIFF");
        assert_eq!(clip.extension(), "wav");

        assert!(matches!(decode_clip("not base64!"), Err(PlaybackError::Decode(_))));
        assert!(matches!(decode_clip(""), Err(PlaybackError::Empty)));
    }

    #[test]
    fn test_extension_sniffing() {
        let clip = |bytes: &[u8]| AudioClip {
            bytes: bytes.to_vec(),
        };
        assert_eq!(clip(b"ID3\x04").extension(), "mp3");
        assert_eq!(clip(&[0xFF, 0xFB, 0x90]).extension(), "mp3");
        assert_eq!(clip(b"OggS").extension(), "ogg");
        assert_eq!(clip(&[0x00, 0x01]).extension(), "bin");
    }

    #[tokio::test]
    async fn test_play_payload_plays_decoded_clip() {
        let player = Arc::new(RecordingPlayer::default());

        play_payload(player.clone(), "SUQzBA==".to_string()).await;

        let played = player.played.lock().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].bytes, b"ID3\x04");
    }

    #[tokio::test]
    async fn test_play_payload_swallows_failures() {
        tokio::spawn(play_payload(Arc::new(BrokenPlayer), "SUQzBA==".to_string()))
            .await
            .expect("playback task must not panic on device errors");
        tokio::spawn(play_payload(Arc::new(SilentPlayer), "%%%".to_string()))
            .await
            .expect("playback task must not panic on bad payloads");
    }
}
