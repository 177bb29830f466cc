use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::result::{bail, Result};

/// Split a file name into its stem and its extension with the leading dot
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// Reserve an unused path in `out_dir` by creating an empty file there.
///
/// Format for 1st file: `<stem><ext>`,
/// for 2nd file and up: `<stem> (<count>)<ext>`.
pub fn reserve_unused_path(out_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let (stem, dot_ext) = split_name(file_name);

    // Creating the file is what makes the reservation safe against concurrent requests
    let try_reserve = |path: PathBuf| -> Result<Option<PathBuf>> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    };

    if let Some(path) = try_reserve(out_dir.join(file_name))? {
        return Ok(path);
    }

    for n in 2u16.. {
        if let Some(path) = try_reserve(out_dir.join(format!("{stem} ({n}){dot_ext}")))? {
            return Ok(path);
        }
    }

    bail(format!(
        "Every name derived from {file_name} is already taken in {}",
        out_dir.display()
    ))
}

/// Move a file into `out_dir`, never overwriting an existing file
pub fn move_to_unused(file: &Path, out_dir: &Path) -> Result<PathBuf> {
    let Some(file_name) = file.file_name().and_then(|name| name.to_str()) else {
        return bail(format!("Invalid file name: {}", file.display()));
    };

    let target = reserve_unused_path(out_dir, file_name)?;
    if let Err(err) = fs::rename(file, &target) {
        // Free the reservation
        let _ = fs::remove_file(&target);
        return Err(err.into());
    }

    Ok(target)
}
