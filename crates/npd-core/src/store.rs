//! Lock store: the persisted lock description plus the marker files that
//! identify a dependency directory as machine-generated.

use npd_schema::{LOCK_FILE, LockDescription};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::DepsError;
use crate::paths::{GITIGNORE_FILE, README_FILE};

/// Contents of the exclusion marker: fetched sources stay out of version
/// control, the lock description goes in.
pub const GITIGNORE_CONTENTS: &str = "node_modules\n";

/// Contents of the generated-directory notice.
pub const README_CONTENTS: &str = "\
This directory and the files immediately inside it are automatically generated
when you change this package's npm dependencies. Commit the files in this
directory (npm-shrinkwrap.json, .gitignore, and this README) to source control
so that others run the same versions of sub-dependencies.

You should NOT check in the node_modules directory that npd automatically
creates; if you are using git, the .gitignore file tells git to ignore it.
";

/// Load the lock description from `path`.
///
/// A missing file yields `Ok(None)`. So does a corrupt one: an unreadable
/// lock carries no trustworthy pins, and treating it as absent forces a full
/// reinstall that rewrites it.
///
/// # Errors
///
/// Returns [`DepsError::IoFailure`] if the file exists but cannot be read.
pub async fn load_lock(path: &Path) -> Result<Option<LockDescription>, DepsError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DepsError::io("failed to read", path, e)),
    };

    match LockDescription::parse(&content) {
        Ok(lock) => Ok(Some(lock)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring corrupt lock description");
            Ok(None)
        }
    }
}

/// Persist `lock` as `dir/npm-shrinkwrap.json` in canonical form.
///
/// The file is first written to a temporary name and then renamed so that
/// readers never observe a partially written lock.
///
/// # Errors
///
/// Returns [`DepsError::IoFailure`] if writing or renaming fails.
pub async fn save_lock(dir: &Path, lock: &LockDescription) -> Result<(), DepsError> {
    let path = dir.join(LOCK_FILE);
    let content = lock.to_canonical_string().map_err(|e| {
        DepsError::io(
            "failed to serialize",
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)
        .await
        .map_err(DepsError::io_at("failed to write", &temp_path))?;
    fs::rename(&temp_path, &path)
        .await
        .map_err(DepsError::io_at("failed to replace", &path))?;

    debug!(path = %path.display(), entries = lock.len(), "saved lock description");
    Ok(())
}

/// Write the `.gitignore` and `README` markers into `dir`.
///
/// # Errors
///
/// Returns [`DepsError::IoFailure`] if either file cannot be written.
pub async fn write_scaffold(dir: &Path) -> Result<(), DepsError> {
    for (name, contents) in [
        (GITIGNORE_FILE, GITIGNORE_CONTENTS),
        (README_FILE, README_CONTENTS),
    ] {
        let path = dir.join(name);
        fs::write(&path, contents)
            .await
            .map_err(DepsError::io_at("failed to write", &path))?;
    }
    Ok(())
}

/// Rewrite the markers in `dir` if either is missing or altered.
///
/// Returns whether anything was written.
///
/// # Errors
///
/// Returns [`DepsError::IoFailure`] if a marker cannot be written.
pub async fn ensure_scaffold(dir: &Path) -> Result<bool, DepsError> {
    let gitignore = fs::read_to_string(dir.join(GITIGNORE_FILE)).await.ok();
    let readme = fs::read_to_string(dir.join(README_FILE)).await.ok();

    if gitignore.as_deref() == Some(GITIGNORE_CONTENTS) && readme.as_deref() == Some(README_CONTENTS)
    {
        return Ok(false);
    }
    write_scaffold(dir).await?;
    Ok(true)
}
