//! Arrival debounce for freshly created inbox files.
//!
//! A create event fires as soon as a copy starts. Waiting a short grace
//! period and re-checking the path avoids picking up files that vanished
//! in the meantime (temporary files, cancelled copies).

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Outcome of waiting out the grace period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// Path is still a regular file.
    Arrived { size_bytes: u64 },
    /// Path is gone or is no longer a file.
    Vanished,
}

/// Wait `grace`, then check that `path` is still a regular file.
pub async fn await_arrival(path: &Path, grace: Duration) -> Arrival {
    sleep(grace).await;

    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Arrival::Arrived {
            size_bytes: metadata.len(),
        },
        _ => Arrival::Vanished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_still_present_has_arrived() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clip.mp4");
        fs::write(&path, vec![1u8; 64]).unwrap();

        let arrival = await_arrival(&path, Duration::from_millis(10)).await;
        assert_eq!(arrival, Arrival::Arrived { size_bytes: 64 });
    }

    #[tokio::test]
    async fn test_file_removed_during_grace_vanishes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.mp4");
        fs::write(&path, b"x").unwrap();

        let waiting = {
            let path = path.clone();
            tokio::spawn(async move { await_arrival(&path, Duration::from_millis(200)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        fs::remove_file(&path).unwrap();

        assert_eq!(waiting.await.unwrap(), Arrival::Vanished);
    }

    #[tokio::test]
    async fn test_directory_is_not_an_arrival() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("folder.mp4");
        fs::create_dir(&dir).unwrap();

        assert_eq!(await_arrival(&dir, Duration::ZERO).await, Arrival::Vanished);
    }
}
