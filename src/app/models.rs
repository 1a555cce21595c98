use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

/// The normalized shape of one source struct, produced once per extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    /// Module path of the declaration, rooted at `crate`.
    pub package: String,
    pub name: String,
    /// Directory holding the declaring file.
    pub dir: PathBuf,
    pub file: PathBuf,
    /// Fields in declaration order.
    pub fields: Vec<FieldInfo>,
    /// Union of every field's discovered imports.
    pub imports: BTreeSet<String>,
}

/// A single member of a source struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: String,
    /// Verbatim attribute text, empty when the field carries none.
    pub tag: String,
    /// How the field is read off a source value (`username`, `0`).
    pub access: String,
    pub imports: BTreeSet<String>,
}

/// A user-declared condition/action pair. Both halves are opaque text.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub when: String,
    #[serde(rename(deserialize = "do"), alias = "action")]
    pub action: String,
}

/// Selection and augmentation rules for one DTO.
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    pub dto_name: String,
    pub includes: HashSet<String>,
    pub excludes: HashSet<String>,
    pub renames: BTreeMap<String, String>,
    pub add_fields: Vec<String>,
    pub filters: Vec<Filter>,
    pub imports: Vec<String>,
    pub exclude_imports: HashSet<String>,
    pub template: Option<PathBuf>,
}

/// Everything a template can see.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub package: String,
    pub source_type: String,
    pub dto_name: String,
    pub imports: Vec<String>,
    pub fields: Vec<FieldData>,
    pub add_fields: Vec<String>,
    pub filters: Vec<Filter>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldData {
    /// Name emitted in the DTO.
    pub name: String,
    /// Name on the source struct, untouched by renames.
    pub source_name: String,
    pub access: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub tag: String,
}

/// One fully resolved generation request.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: String,
    pub type_name: String,
    pub output_dir: Option<PathBuf>,
    pub output_file: String,
    pub transform: TransformConfig,
}

/// Represents the final configuration after merging defaults, documents and CLI args.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub jobs: Vec<Job>,
    /// True when the jobs came from a batch document.
    pub batch: bool,
}

/// A source file discovered during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub module: String,
}
