//! Inbox scanning and the ingestible-file filter.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions accepted from the inbox (case-insensitive). GIFs are ingestible
/// so they can be turned into loops or recompressed.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm", ".m4v", ".gif"];

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Dotfiles such as `._clip.mp4` are metadata written by other tools.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Whether a path should become a job.
pub fn is_candidate(path: &Path) -> bool {
    is_video_file(path) && !is_hidden(path)
}

/// Candidate files directly inside `inbox`, sorted by name.
///
/// Subdirectories are not descended into. A missing inbox yields nothing.
pub fn scan_inbox(inbox: &Path) -> Vec<PathBuf> {
    WalkDir::new(inbox)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_candidate(path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/in/clip.mp4")));
        assert!(is_video_file(Path::new("/in/clip.MOV")));
        assert!(is_video_file(Path::new("/in/clip.WebM")));
        assert!(is_video_file(Path::new("/in/anim.gif")));
        assert!(!is_video_file(Path::new("/in/clip.ts")));
        assert!(!is_video_file(Path::new("/in/notes.txt")));
        assert!(!is_video_file(Path::new("/in/clip")));
    }

    #[test]
    fn test_hidden_files_are_not_candidates() {
        assert!(!is_candidate(Path::new("/in/._clip.mp4")));
        assert!(!is_candidate(Path::new("/in/.clip_palette.png")));
        assert!(is_candidate(Path::new("/in/clip.mp4")));
    }

    #[test]
    fn test_scan_inbox_is_flat_and_sorted() {
        let temp = TempDir::new().unwrap();
        let inbox = temp.path();
        File::create(inbox.join("b.mov")).unwrap();
        File::create(inbox.join("a.mp4")).unwrap();
        File::create(inbox.join("readme.txt")).unwrap();
        File::create(inbox.join(".hidden.mp4")).unwrap();
        fs::create_dir(inbox.join("nested")).unwrap();
        File::create(inbox.join("nested").join("c.mp4")).unwrap();

        let found = scan_inbox(inbox);
        assert_eq!(found, vec![inbox.join("a.mp4"), inbox.join("b.mov")]);
    }

    #[test]
    fn test_scan_missing_inbox() {
        assert!(scan_inbox(Path::new("/nonexistent/clipper/inbox")).is_empty());
    }

    // **Feature: clipper, Property 7: Extension allow-list**
    //
    // A path is a candidate exactly when its lowercased extension is one of
    // mp4, mov, avi, mkv, webm, m4v or gif.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_video_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("mp4"), Just("MP4"), Just("mov"), Just("Mov"),
                Just("avi"), Just("mkv"), Just("MKV"), Just("webm"),
                Just("m4v"), Just("gif"), Just("GIF"),
                Just("txt"), Just("jpg"), Just("png"), Just("ts"),
                Just("srt"), Just("part"), Just("crdownload"),
            ],
        ) {
            let path = PathBuf::from(format!("/inbox/{}.{}", basename, ext));
            let expected = matches!(
                ext.to_lowercase().as_str(),
                "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" | "gif"
            );
            prop_assert_eq!(is_video_file(&path), expected);
            prop_assert_eq!(is_candidate(&path), expected);
        }
    }
}
