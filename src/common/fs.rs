use std::{ffi::OsStr, fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Make sure the outputs root is usable, creating it and any missing parents on first run.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => anyhow::bail!("Outputs root {} is a file, not a folder", path.display()),
        Err(_) => fs::create_dir_all(path)
            .with_context(|| format!("Could not create outputs root {}", path.display())),
    }
}

/// Survey and state folders are inputs, so they are never created here.
pub(crate) fn require_dir_exists(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => anyhow::bail!("Expected a data folder at {}, found a file", path.display()),
        Err(_) => anyhow::bail!("Data folder {} not found", path.display()),
    }
}

/// Lowercased extension of a path, if any.
pub(crate) fn extension_lower(path: &Path) -> Option<String> {
    path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase)
}

/// Find a sibling of `path` with the same stem and the given extension (either case).
pub(crate) fn sibling_with_extension(path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_ascii_lowercase(), ext.to_ascii_uppercase()].into_iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// `.shp` files directly inside `dir` whose `.shx` and `.dbf` companions share the same stem,
/// in file-name order.
pub(crate) fn shapefile_families(dir: &Path) -> Result<Vec<PathBuf>> {
    require_dir_exists(dir)?;

    let mut families = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || extension_lower(path).as_deref() != Some("shp") {
            continue;
        }
        if sibling_with_extension(path, "shx").is_some() && sibling_with_extension(path, "dbf").is_some() {
            families.push(path.to_path_buf());
        } else {
            log::debug!("skipping incomplete shapefile family {}", path.display());
        }
    }
    Ok(families)
}

/// Immediate subdirectories of `dir`, in name order.
pub(crate) fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    require_dir_exists(dir)?;

    WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name().into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(anyhow::Error::new(e).context(format!("Failed to list {}", dir.display())))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn family_requires_all_three_components() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "b.shp");
        touch(tmp.path(), "b.shx");
        touch(tmp.path(), "b.dbf");
        touch(tmp.path(), "a.shp");
        touch(tmp.path(), "a.dbf");

        let families = shapefile_families(tmp.path()).unwrap();
        assert_eq!(families, vec![tmp.path().join("b.shp")]);
    }

    #[test]
    fn families_are_sorted_and_extension_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        for stem in ["z", "m"] {
            touch(tmp.path(), &format!("{stem}.SHP"));
            touch(tmp.path(), &format!("{stem}.SHX"));
            touch(tmp.path(), &format!("{stem}.DBF"));
        }

        let families = shapefile_families(tmp.path()).unwrap();
        assert_eq!(families, vec![tmp.path().join("m.SHP"), tmp.path().join("z.SHP")]);
    }

    #[test]
    fn subdirectories_skip_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("PA")).unwrap();
        fs::create_dir(tmp.path().join("AC")).unwrap();
        touch(tmp.path(), "README");

        let dirs = subdirectories(tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("AC"), tmp.path().join("PA")]);
    }

    #[test]
    fn outputs_root_is_created_but_never_replaces_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("outputs").join("nested");
        ensure_dir_exists(&root).unwrap();
        assert!(root.is_dir());
        ensure_dir_exists(&root).unwrap();

        touch(tmp.path(), "taken");
        let err = ensure_dir_exists(&tmp.path().join("taken")).unwrap_err();
        assert!(err.to_string().contains("is a file"), "{err}");
    }

    #[test]
    fn data_folders_are_required_not_created() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("2019");
        assert!(require_dir_exists(&missing).unwrap_err().to_string().contains("not found"));
        assert!(!missing.exists());

        touch(tmp.path(), "2022");
        assert!(require_dir_exists(&tmp.path().join("2022")).is_err());
        assert!(require_dir_exists(tmp.path()).is_ok());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(shapefile_families(&tmp.path().join("nope")).is_err());
    }
}
