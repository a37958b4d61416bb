use std::io;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;
use crate::packet::FileEntry;
use crate::protocol::field;
// Working-directory listing for LST

/// Immediate entries of `root`, sorted by name.
///
/// Entries whose name is not UTF-8 or does not fit a [`FileEntry`] are
/// skipped with a warning, as are entries that vanish or cannot be stat'ed
/// mid-listing. Failing to read `root` itself is an error.
pub fn list_directory(root: &Path) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e).into()),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        let Some(name) = entry.file_name().to_str() else {
            warn!(entry = %entry.path().display(), "skipping entry with non UTF-8 name");
            continue;
        };
        if name.len() > field::FILENAME {
            warn!(name, "skipping entry with name longer than {} bytes", field::FILENAME);
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(name, "skipping entry: {}", e);
                continue;
            }
        };
        entries.push(FileEntry {
            filename: name.to_string(),
            filesize: metadata.len(),
            is_dir: metadata.is_dir(),
        });
    }

    Ok(entries)
}
