use std::fs;
use std::path::Path;

use anyhow::Result;

use super::Error;

/// Copy a task output to its sink destination, replacing an earlier result.
///
/// Symlinks are followed: the sink always holds real data, never links back
/// into the working dir. Directory outputs are copied recursively.
pub fn persist(src: &Path, tgt: &Path) -> Result<()> {
    if tgt.is_dir() && !tgt.is_symlink() {
        fs::remove_dir_all(tgt)?;
    } else if tgt.exists() || tgt.is_symlink() {
        fs::remove_file(tgt)?;
    }
    copy_resolved(src, tgt)
}

fn copy_resolved(src: &Path, tgt: &Path) -> Result<()> {
    // metadata() follows links, so a dangling link ends up in the error branch
    match fs::metadata(src) {
        Ok(meta) if meta.is_dir() => {
            fs::create_dir_all(tgt)?;
            for entry in fs::read_dir(src)? {
                let entry = entry?;
                copy_resolved(&entry.path(), &tgt.join(entry.file_name()))?;
            }
        }
        Ok(_) => {
            fs::copy(src, tgt)?;
        }
        Err(_) => return Err(Error::NotPersistable(src.display().to_string()).into()),
    }
    Ok(())
}
