use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle to a published artifact, like an object URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactHandle(u64);

impl ArtifactHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct PublishedArtifact {
    pub bytes: Arc<[u8]>,
    pub filename: String,
}

#[derive(Debug)]
struct Entry {
    artifact: PublishedArtifact,
    release_at: Option<Instant>,
}

/// Live artifact handles. A handle is released a fixed delay after its
/// download starts, or explicitly.
#[derive(Debug)]
pub struct ArtifactRegistry {
    next_handle: u64,
    release_delay: Duration,
    entries: HashMap<ArtifactHandle, Entry>,
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl ArtifactRegistry {
    pub fn new(release_delay: Duration) -> Self {
        Self { next_handle: 0, release_delay, entries: HashMap::new() }
    }

    pub fn release_delay(&self) -> Duration {
        self.release_delay
    }

    pub fn publish(&mut self, bytes: Vec<u8>, filename: impl Into<String>) -> ArtifactHandle {
        self.next_handle += 1;
        let handle = ArtifactHandle(self.next_handle);
        let artifact = PublishedArtifact { bytes: bytes.into(), filename: filename.into() };
        log::debug!(
            "published artifact {} ({}, {} bytes)",
            handle.raw(),
            artifact.filename,
            artifact.bytes.len()
        );
        self.entries.insert(handle, Entry { artifact, release_at: None });
        handle
    }

    pub fn get(&self, handle: ArtifactHandle) -> Option<&PublishedArtifact> {
        self.entries.get(&handle).map(|entry| &entry.artifact)
    }

    /// Hands the artifact to a download and schedules its release. A second
    /// trigger restarts the delay.
    pub fn trigger_download(
        &mut self,
        handle: ArtifactHandle,
        now: Instant,
    ) -> Option<PublishedArtifact> {
        let entry = self.entries.get_mut(&handle)?;
        entry.release_at = Some(now + self.release_delay);
        Some(entry.artifact.clone())
    }

    /// Releases every handle whose delay has elapsed at `now`.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|handle, entry| match entry.release_at {
            Some(release_at) if release_at <= now => {
                log::debug!("released artifact {}", handle.raw());
                false
            }
            _ => true,
        });
        before - self.entries.len()
    }

    pub fn release(&mut self, handle: ArtifactHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}
