//! Base/user index scanning (spec §4.D, §6): which type buckets a library
//! directory declares, and where each bucket's file lives.

use super::TypeName;
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const BUCKET_EXTENSION: &str = "sage_templates";

/// Where one type bucket's records live on disk.
#[derive(Debug, Clone)]
pub struct TypeBucketSource {
    pub path: PathBuf,
}

/// The set of type buckets one library directory declares.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    pub types: HashMap<TypeName, TypeBucketSource>,
}

impl LibraryIndex {
    /// Scan `dir` for `<type>.sage_templates` files. A missing directory
    /// yields an empty index rather than an error: an absent user index is
    /// a normal "no overrides" state.
    pub fn read(dir: &Path) -> Result<Self> {
        let mut types = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self { types }),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            types.insert(TypeName::new(stem), TypeBucketSource { path });
        }
        Ok(Self { types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_empty_index() {
        let index = LibraryIndex::read(Path::new("/nonexistent/sage-test-path")).unwrap();
        assert!(index.types.is_empty());
    }

    #[test]
    fn test_scans_bucket_files_by_stem() {
        let dir = std::env::temp_dir().join(format!("sage-index-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Ia.sage_templates"), b"stub").unwrap();
        std::fs::write(dir.join("II.sage_templates"), b"stub").unwrap();
        std::fs::write(dir.join("readme.txt"), b"not a bucket").unwrap();

        let index = LibraryIndex::read(&dir).unwrap();
        assert_eq!(index.types.len(), 2);
        assert!(index.types.contains_key(&TypeName::new("Ia")));
        assert!(index.types.contains_key(&TypeName::new("II")));

        std::fs::remove_dir_all(&dir).ok();
    }
}
