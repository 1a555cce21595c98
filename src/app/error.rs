use std::path::PathBuf;
use thiserror::Error;

/// Failures of the extract → transform → render pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source location `{location}` does not resolve to any Rust file")]
    SourceUnresolvable { location: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}:{column}: {message}", path.display())]
    Analysis {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("type `{type_name}` not found in `{location}`")]
    TypeNotFound { type_name: String, location: String },

    #[error("`{type_name}` in {} is a {kind}, not a struct", path.display())]
    NotAStruct {
        type_name: String,
        kind: &'static str,
        path: PathBuf,
    },

    #[error("type `{type_name}` is declared more than once: {}", candidates.join(", "))]
    AmbiguousType {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("failed to parse template `{name}`")]
    TemplateParse {
        name: String,
        #[source]
        source: tera::Error,
    },

    #[error("failed to render template `{name}`")]
    TemplateExecution {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// The template rendered, but not into valid Rust. `raw` is still usable.
    #[error("generated code is not valid Rust: {source}")]
    Format {
        raw: String,
        #[source]
        source: syn::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
