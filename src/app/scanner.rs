use crate::app::error::{Error, Result};
use crate::app::models::SourceFile;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use pathdiff::diff_paths;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Resolves a source location (file, directory or glob) into Rust files.
pub struct Scanner {
    location: String,
    root: PathBuf,
    include_set: GlobSet,
    single_file: Option<PathBuf>,
}

impl Scanner {
    pub fn new(location: &str) -> Result<Self> {
        let unresolvable = || Error::SourceUnresolvable {
            location: location.to_string(),
        };
        let path = Path::new(location);

        if path.is_file() {
            let file = path.canonicalize().map_err(|_| unresolvable())?;
            let root = file.parent().map(Path::to_path_buf).ok_or_else(unresolvable)?;
            return Ok(Self {
                location: location.to_string(),
                root,
                include_set: GlobSet::empty(),
                single_file: Some(file),
            });
        }

        let (base, pattern) = if path.is_dir() {
            (path.to_path_buf(), "**/*.rs".to_string())
        } else if location.contains(GLOB_CHARS) {
            split_glob(path).ok_or_else(unresolvable)?
        } else {
            return Err(unresolvable());
        };

        let root = base.canonicalize().map_err(|_| unresolvable())?;
        let include_set = build_globset(&[pattern]).ok_or_else(unresolvable)?;

        Ok(Self {
            location: location.to_string(),
            root,
            include_set,
            single_file: None,
        })
    }

    /// Every matching Rust file, sorted by path.
    pub fn scan(&self) -> Result<Vec<SourceFile>> {
        let mut paths = match &self.single_file {
            Some(file) => vec![file.clone()],
            None => self.walk()?,
        };

        // Sorted order is the traversal order the extractor relies on.
        paths.sort();

        if paths.is_empty() {
            return Err(Error::SourceUnresolvable {
                location: self.location.clone(),
            });
        }

        Ok(paths
            .into_iter()
            .map(|path| {
                let module = module_path(&path, &self.root);
                SourceFile { path, module }
            })
            .collect())
    }

    fn walk(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        // Standard ignore walker (handles .gitignore automatically)
        let walker = WalkBuilder::new(&self.root).git_ignore(true).build();

        for result in walker {
            let entry = result.map_err(|err| Error::Analysis {
                path: self.root.clone(),
                line: 0,
                column: 0,
                message: err.to_string(),
            })?;
            if let Some(path) = self.process_entry(entry.path()) {
                paths.push(path);
            }
        }

        Ok(paths)
    }

    fn process_entry(&self, path: &Path) -> Option<PathBuf> {
        if !path.is_file() || path.extension() != Some(OsStr::new("rs")) {
            return None;
        }

        let relative = diff_paths(path, &self.root)?;
        self.include_set
            .is_match(&relative)
            .then(|| path.to_path_buf())
    }
}

/// Splits `src/**/*.rs` into the walkable base `src` and the pattern `**/*.rs`.
fn split_glob(path: &Path) -> Option<(PathBuf, String)> {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();

    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !text.contains(GLOB_CHARS) {
            base.push(component);
        } else {
            rest.push(text.into_owned());
        }
    }

    if base.as_os_str().is_empty() {
        base.push(".");
    }

    (!rest.is_empty()).then(|| (base, rest.join("/")))
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        match Glob::new(pat) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                log::warn!("Invalid glob pattern {pat}: {err}");
                return None;
            }
        }
    }
    builder.build().ok()
}

/// Module path of `file`, rooted at `crate`.
///
/// Paths are taken relative to the `src/` directory of the nearest enclosing
/// cargo package, falling back to the scan root when the file lives outside one.
pub fn module_path(file: &Path, root: &Path) -> String {
    let base = crate_src_dir(file).unwrap_or_else(|| root.to_path_buf());
    let relative = diff_paths(file, &base)
        .filter(|rel| !rel.components().any(|c| c == Component::ParentDir))
        .unwrap_or_else(|| PathBuf::from(file.file_name().unwrap_or_default()));

    let mut segments = vec!["crate".to_string()];
    let mut parts = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();

    if let Some(last) = parts.last() {
        let is_root_file = parts.len() == 1 && (last == "lib" || last == "main");
        if last == "mod" || is_root_file {
            parts.pop();
        }
    }

    segments.extend(parts);
    segments.join("::")
}

fn crate_src_dir(file: &Path) -> Option<PathBuf> {
    let package = file
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("Cargo.toml").is_file())?;
    let src = package.join("src");

    file.starts_with(&src).then_some(src)
}
