use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Discovers image files under an input path.
///
/// Walks recursively in file-name order, keeps files whose extension is in
/// the allow-list (case-insensitive) and prunes excluded directories, such as
/// an output tree nested inside the input. Unreadable entries are logged and
/// skipped.
pub struct SourceWalker {
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl SourceWalker {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excluded: Vec::new(),
        }
    }

    /// Skips everything under `dir`.
    pub fn exclude(mut self, dir: &Path) -> Self {
        self.excluded.push(normalize(dir));
        self
    }

    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    /// Image files under `root` (or `root` itself if it is an image file).
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && self.is_image(e.path()))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        found
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded.is_empty() {
            return false;
        }
        let path = normalize(path);
        self.excluded.iter().any(|dir| path.starts_with(dir))
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_walk_filters_by_extension_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("b.JPEG"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested").join("c.png"));

        let walker = SourceWalker::new(&["jpg", "jpeg", "png"]);
        let found = walker.walk(root);

        assert_eq!(
            found,
            vec![
                root.join("a.jpg"),
                root.join("b.JPEG"),
                root.join("nested").join("c.png"),
            ]
        );
    }

    #[test]
    fn test_walk_is_sorted() {
        let tmp = TempDir::new().unwrap();
        for name in ["z.jpg", "m.jpg", "a.jpg"] {
            touch(&tmp.path().join(name));
        }
        let found = SourceWalker::new(&["jpg"]).walk(tmp.path());
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "m.jpg", "z.jpg"]);
    }

    #[test]
    fn test_walk_prunes_excluded_output_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("sorted").join("0").join("a.jpg"));

        let found = SourceWalker::new(&["jpg"])
            .exclude(&root.join("sorted"))
            .walk(root);
        assert_eq!(found, vec![root.join("a.jpg")]);
    }

    #[test]
    fn test_walk_accepts_single_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("solo.png");
        touch(&file);
        assert_eq!(SourceWalker::new(&[".png"]).walk(&file), vec![file]);
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(SourceWalker::new(&["jpg"])
            .walk(&tmp.path().join("missing"))
            .is_empty());
    }
}
