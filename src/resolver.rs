//! Find the file an extractor call just produced.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::result::{Error, Result};

/// Leftovers of an interrupted or in-progress download
const INTERMEDIATE_SUFFIXES: [&str; 4] = [".part", ".ytdl", ".temp", ".tmp"];

/// Names of the regular files in a directory, intermediate artifacts excluded
pub fn snapshot(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();

    for entry in dir.read_dir()? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if INTERMEDIATE_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            continue;
        }
        names.insert(name);
    }

    Ok(names)
}

/// Return the path of the newest file present in `after` but not in `before`.
///
/// Equal modification times are broken by taking the greatest name.
/// No new file is an error: the name is never guessed.
pub fn resolve(
    before: &BTreeSet<String>,
    after: &BTreeSet<String>,
    dir: &Path,
) -> Result<PathBuf> {
    let modified = |name: &str| -> SystemTime {
        dir.join(name)
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };

    after
        .difference(before)
        .map(|name| (modified(name), name))
        .max()
        .map(|(_, name)| dir.join(name))
        .ok_or_else(|| Error::OutputResolutionFailed(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, fs};

    use super::{resolve, snapshot};
    use crate::result::Error;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn returns_the_new_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), b"a").unwrap();
        fs::write(dir.path().join("b.mp3"), b"b").unwrap();

        let path = resolve(&set(&["a.mp3"]), &set(&["a.mp3", "b.mp3"]), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("b.mp3"));
    }

    #[test]
    fn equal_times_pick_greatest_name() {
        // Missing files share the same fallback time
        let dir = tempfile::tempdir().unwrap();
        let path = resolve(&set(&[]), &set(&["x.m4a", "y.mp3"]), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("y.mp3"));
    }

    #[test]
    fn no_new_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = resolve(&set(&["a.mp3"]), &set(&["a.mp3"]), dir.path());
        assert!(matches!(res, Err(Error::OutputResolutionFailed(_))));
    }

    #[test]
    fn snapshot_skips_partial_downloads_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("song.mp3"), b"x").unwrap();
        fs::write(dir.path().join("song.webm.part"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(snapshot(dir.path()).unwrap(), set(&["song.mp3"]));
    }
}
