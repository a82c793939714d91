//! Directory scan for video/subtitle pairs.
//!
//! Walks a directory tree and pairs each video file with a subtitle file of
//! the same stem in the same directory.

use crate::item::NewItem;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions picked up by the scan (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "webm", "ts"];

/// Subtitle extensions, in order of preference when several exist.
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt"];

/// Suffix added to the stem of every output file.
pub const OUTPUT_SUFFIX: &str = "_subtitled";

/// Container of every output file.
pub const OUTPUT_EXTENSION: &str = "mp4";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

pub fn is_subtitle_file(path: &Path) -> bool {
    has_extension(path, SUBTITLE_EXTENSIONS)
}

/// Whether `path` looks like something this tool produced.
fn is_own_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.ends_with(OUTPUT_SUFFIX))
        .unwrap_or(false)
}

/// `<output_dir or video dir>/<stem>_subtitled.mp4`
pub fn derive_output_path(video_path: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => video_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    dir.join(format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION))
}

/// Subtitle next to `video_path` with the same stem, if any.
pub fn find_subtitle(video_path: &Path) -> Option<PathBuf> {
    let dir = video_path.parent()?;
    let stem = video_path.file_stem()?.to_str()?;

    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_subtitle_file(path))
        .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .collect();

    found.sort_by_key(|path| {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        SUBTITLE_EXTENSIONS
            .iter()
            .position(|candidate| *candidate == ext)
            .unwrap_or(SUBTITLE_EXTENSIONS.len())
    });
    found.into_iter().next()
}

/// Scan `root` recursively and build one item per paired video.
///
/// Hidden directories and previous outputs are skipped, and so are videos
/// without a subtitle. Results are sorted by video path.
pub fn scan_pairs(root: &Path, output_dir: Option<&Path>) -> Vec<NewItem> {
    if !root.exists() {
        return Vec::new();
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() && entry.depth() > 0 {
            if let Some(name) = entry.file_name().to_str() {
                return !name.starts_with('.');
            }
        }
        true
    });

    let mut items = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_video_file(path) || is_own_output(path) {
            continue;
        }

        match find_subtitle(path) {
            Some(subtitle) => items.push(NewItem::new(
                path,
                subtitle,
                derive_output_path(path, output_dir),
            )),
            None => tracing::debug!(video = %path.display(), "no subtitle found, skipping"),
        }
    }

    items.sort_by(|a, b| a.video_path.cmp(&b.video_path));
    tracing::info!(root = %root.display(), pairs = items.len(), "scan complete");
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_extension_matching() {
        assert!(is_video_file(Path::new("/media/movie.mkv")));
        assert!(is_video_file(Path::new("/media/movie.MKV")));
        assert!(is_video_file(Path::new("/media/clip.webm")));
        assert!(!is_video_file(Path::new("/media/movie.srt")));
        assert!(!is_video_file(Path::new("/media/movie")));
        assert!(is_subtitle_file(Path::new("/media/movie.ASS")));
        assert!(!is_subtitle_file(Path::new("/media/movie.txt")));
    }

    #[test]
    fn test_derive_output_path() {
        assert_eq!(
            derive_output_path(Path::new("/media/show/ep01.mkv"), None),
            PathBuf::from("/media/show/ep01_subtitled.mp4")
        );
        assert_eq!(
            derive_output_path(Path::new("/media/show/ep01.mkv"), Some(Path::new("/out"))),
            PathBuf::from("/out/ep01_subtitled.mp4")
        );
    }

    #[test]
    fn test_scan_pairs_videos_with_subtitles() {
        let tmp = TempDir::new().unwrap();
        let season = tmp.path().join("season1");
        fs::create_dir(&season).unwrap();

        File::create(season.join("ep01.mkv")).unwrap();
        File::create(season.join("ep01.srt")).unwrap();
        File::create(season.join("ep02.mp4")).unwrap();
        File::create(season.join("ep02.vtt")).unwrap();
        File::create(season.join("ep02.ass")).unwrap();
        // No subtitle
        File::create(season.join("ep03.mkv")).unwrap();
        // Previous output
        File::create(season.join("ep01_subtitled.mp4")).unwrap();
        File::create(season.join("ep01_subtitled.srt")).unwrap();

        let items = scan_pairs(tmp.path(), None);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].video_path, season.join("ep01.mkv"));
        assert_eq!(items[0].subtitle_path, season.join("ep01.srt"));
        assert_eq!(items[0].output_path, season.join("ep01_subtitled.mp4"));

        assert_eq!(items[1].video_path, season.join("ep02.mp4"));
        // .ass is preferred over .vtt
        assert_eq!(items[1].subtitle_path, season.join("ep02.ass"));
    }

    #[test]
    fn test_scan_skips_hidden_directories() {
        let tmp = TempDir::new().unwrap();
        let hidden = tmp.path().join(".trash");
        fs::create_dir(&hidden).unwrap();
        File::create(hidden.join("a.mkv")).unwrap();
        File::create(hidden.join("a.srt")).unwrap();

        assert!(scan_pairs(tmp.path(), None).is_empty());
        assert!(scan_pairs(&tmp.path().join("missing"), None).is_empty());
    }

    #[test]
    fn test_scan_with_output_dir() {
        let tmp = TempDir::new().unwrap();
        File::create(tmp.path().join("film.avi")).unwrap();
        File::create(tmp.path().join("film.ssa")).unwrap();
        let out = tmp.path().join("burned");

        let items = scan_pairs(tmp.path(), Some(&out));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].output_path, out.join("film_subtitled.mp4"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_output_keeps_stem_and_dir(
            stem in "[a-zA-Z0-9 ._-]{1,20}",
            ext_idx in 0usize..7,
        ) {
            prop_assume!(!stem.starts_with('.') && !stem.ends_with('.'));
            let video = PathBuf::from("/media").join(format!("{}.{}", stem, VIDEO_EXTENSIONS[ext_idx]));
            let output = derive_output_path(&video, None);
            prop_assert_eq!(output.parent(), Some(Path::new("/media")));
            prop_assert_eq!(
                output.file_name().unwrap().to_string_lossy().to_string(),
                format!("{}_subtitled.mp4", video.file_stem().unwrap().to_string_lossy())
            );
        }
    }
}
