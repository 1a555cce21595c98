use crate::app::cli::Cli;
use crate::app::models::{Filter, Job, RuntimeConfig, TransformConfig};
use anyhow::{bail, Context, Result};
use convert_case::{Case, Casing};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File written by `--init`.
pub const SAMPLE_PATH: &str = "dtogen.sample.toml";

#[derive(Deserialize, Debug, Default)]
pub struct BatchDocument {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub dtos: Vec<DtoConfig>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GlobalConfig {
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exclude_imports: Vec<String>,
    pub source: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DtoConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: Option<String>,
    pub name: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub add_fields: Vec<String>,
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub template: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct DefaultsFile {
    #[serde(default)]
    global: GlobalConfig,
}

/// User-level defaults from ~/.config/dtogen/defaults.toml, if present.
fn load_user_defaults() -> Result<GlobalConfig> {
    let Some(home) = dirs::home_dir() else {
        log::warn!("Could not determine home directory; skipping user defaults");
        return Ok(GlobalConfig::default());
    };
    let config_path = home.join(".config").join("dtogen").join("defaults.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content = fs::read_to_string(&config_path)
        .context(format!("Failed to read defaults at {:?}", config_path))?;

    let parsed: DefaultsFile = toml::from_str(&content)
        .context(format!("Failed to parse {:?}", config_path))?;

    Ok(parsed.global)
}

/// Parses a batch document, picking the format from the file extension.
pub fn load_document(path: &Path) -> Result<BatchDocument> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read config file {:?}", path))?;

    parse_document(&content, path)
}

fn parse_document(content: &str, path: &Path) -> Result<BatchDocument> {
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");

    if is_yaml {
        serde_yaml::from_str(content).context(format!("Failed to parse {:?}", path))
    } else {
        toml::from_str(content).context(format!("Failed to parse {:?}", path))
    }
}

fn merge_vecs(base: Vec<String>, overlay: Vec<String>) -> Vec<String> {
    let mut combined = base;
    combined.extend(overlay);
    // Deduplicate while keeping order
    let mut seen = std::collections::HashSet::new();
    combined.retain(|item| seen.insert(item.clone()));
    combined
}

/// Layers `overlay` on top of `base`: lists concatenate, scalars in `overlay` win.
fn merge_global(base: GlobalConfig, overlay: GlobalConfig) -> GlobalConfig {
    GlobalConfig {
        output_dir: overlay.output_dir.or(base.output_dir),
        imports: merge_vecs(base.imports, overlay.imports),
        exclude_imports: merge_vecs(base.exclude_imports, overlay.exclude_imports),
        source: overlay.source.or(base.source),
    }
}

pub fn default_dto_name(type_name: &str) -> String {
    format!("{type_name}DTO")
}

/// `UserDTO` -> `user_dto.rs`.
pub fn default_output_file(dto_name: &str) -> String {
    format!("{}.rs", dto_name.to_case(Case::Snake))
}

fn job_from_entry(global: &GlobalConfig, dto: DtoConfig) -> Job {
    let source = dto
        .source
        .or_else(|| global.source.clone())
        .unwrap_or_else(|| ".".to_string());
    let dto_name = dto.name.unwrap_or_else(|| default_dto_name(&dto.type_name));
    let output_file = dto.output.unwrap_or_else(|| default_output_file(&dto_name));

    Job {
        source,
        type_name: dto.type_name,
        output_dir: global.output_dir.clone(),
        output_file,
        transform: TransformConfig {
            dto_name,
            includes: dto.includes.into_iter().collect(),
            excludes: dto.excludes.into_iter().collect(),
            renames: dto.renames,
            add_fields: dto.add_fields,
            filters: dto.filters,
            imports: global.imports.clone(),
            exclude_imports: global.exclude_imports.iter().cloned().collect(),
            template: dto.template,
        },
    }
}

/// Expands a batch document into one job per declared DTO.
pub fn jobs_from_document(defaults: GlobalConfig, document: BatchDocument) -> Vec<Job> {
    let global = merge_global(defaults, document.global);
    document
        .dtos
        .into_iter()
        .map(|dto| job_from_entry(&global, dto))
        .collect()
}

fn job_from_cli(defaults: GlobalConfig, cli: Cli) -> Result<Job> {
    let Some(type_name) = cli.type_name else {
        bail!("--type is required unless --config is given");
    };
    let trimmed = |items: Vec<String>| {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    };

    let entry = DtoConfig {
        type_name,
        source: Some(cli.src),
        name: cli.name,
        output: cli.out,
        excludes: trimmed(cli.exclude),
        includes: trimmed(cli.include),
        add_fields: Vec::new(),
        renames: cli.renames.into_iter().collect(),
        filters: Vec::new(),
        template: cli.template,
    };
    let global = merge_global(
        defaults,
        GlobalConfig {
            output_dir: cli.dir,
            ..GlobalConfig::default()
        },
    );

    Ok(job_from_entry(&global, entry))
}

pub fn resolve_config(cli: Cli) -> Result<RuntimeConfig> {
    let defaults = load_user_defaults()?;

    // Batch document > single-type CLI flags
    let config = match cli.config.clone() {
        Some(path) => RuntimeConfig {
            jobs: jobs_from_document(defaults, load_document(&path)?),
            batch: true,
        },
        None => RuntimeConfig {
            jobs: vec![job_from_cli(defaults, cli)?],
            batch: false,
        },
    };

    Ok(config)
}

pub fn generate_sample(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{:?} already exists; refusing to overwrite it", path);
    }
    fs::write(path, SAMPLE).context(format!("Failed to write {:?}", path))
}

const SAMPLE: &str = r#"# Global settings applied to all DTOs unless overridden
[global]
output_dir = "./src/dto"
imports = []
exclude_imports = []
source = "./src"

[[dtos]]
type = "User"
source = "./src/models"
name = "UserDTO"
output = "user_dto.rs"
excludes = ["password"]
# includes = ["id", "username"]
# add_fields = ["pub display_name: String"]
# template = "templates/dto.rs.tera"

# [dtos.renames]
# username = "login"

# [[dtos.filters]]
# when = "source.is_confidential"
# do = """
# dto.email = String::new();
# """
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_document_defaults_names_and_sources() {
        let doc = parse_document(
            r#"
[global]
output_dir = "out"
imports = ["serde::Serialize"]
source = "./src"

[[dtos]]
type = "User"
excludes = ["password"]

[[dtos]]
type = "OrderLine"
source = "./orders"
name = "LineView"
renames = { qty = "quantity" }
filters = [{ when = "source.hidden", do = "dto.qty = 0;" }]
"#,
            Path::new("dtogen.toml"),
        )
        .unwrap();
        let jobs = jobs_from_document(GlobalConfig::default(), doc);

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].source, "./src");
        assert_eq!(jobs[0].transform.dto_name, "UserDTO");
        assert_eq!(jobs[0].output_file, "user_dto.rs");
        assert_eq!(jobs[0].output_dir, Some(PathBuf::from("out")));
        assert!(jobs[0].transform.excludes.contains("password"));
        assert_eq!(jobs[0].transform.imports, ["serde::Serialize"]);

        assert_eq!(jobs[1].source, "./orders");
        assert_eq!(jobs[1].output_file, "line_view.rs");
        assert_eq!(jobs[1].transform.renames["qty"], "quantity");
        assert_eq!(jobs[1].transform.filters[0].action, "dto.qty = 0;");
    }

    #[test]
    fn yaml_document_is_accepted() {
        let doc = parse_document(
            "global:\n  exclude_imports: [\"uuid::Uuid\"]\ndtos:\n  - type: User\n    includes: [id, email]\n    add_fields:\n      - \"pub extra: u8\"\n",
            Path::new("dtogen.yaml"),
        )
        .unwrap();
        let jobs = jobs_from_document(GlobalConfig::default(), doc);

        assert_eq!(jobs[0].source, ".");
        assert_eq!(jobs[0].output_dir, None);
        assert!(jobs[0].transform.exclude_imports.contains("uuid::Uuid"));
        assert_eq!(jobs[0].transform.includes.len(), 2);
        assert_eq!(jobs[0].transform.add_fields, ["pub extra: u8"]);
    }

    #[test]
    fn user_defaults_sit_beneath_the_document() {
        let defaults = GlobalConfig {
            output_dir: Some(PathBuf::from("defaults")),
            imports: vec!["a::A".to_string(), "b::B".to_string()],
            exclude_imports: Vec::new(),
            source: Some("lib".to_string()),
        };
        let document = BatchDocument {
            global: GlobalConfig {
                output_dir: Some(PathBuf::from("doc")),
                imports: vec!["b::B".to_string(), "c::C".to_string()],
                ..GlobalConfig::default()
            },
            dtos: Vec::new(),
        };
        let merged = merge_global(defaults, document.global);

        assert_eq!(merged.output_dir, Some(PathBuf::from("doc")));
        assert_eq!(merged.imports, ["a::A", "b::B", "c::C"]);
        assert_eq!(merged.source.as_deref(), Some("lib"));
    }

    #[test]
    fn cli_flags_build_a_single_job() {
        let cli = <Cli as clap::Parser>::try_parse_from([
            "dtogen", "-s", "src/models", "-t", "User", "-e", "password, ,salt", "-r", "username:login", "-d", "gen",
        ])
        .unwrap();
        let job = job_from_cli(GlobalConfig::default(), cli).unwrap();

        assert_eq!(job.source, "src/models");
        assert_eq!(job.output_file, "user_dto.rs");
        assert_eq!(job.output_dir, Some(PathBuf::from("gen")));
        assert_eq!(job.transform.excludes.len(), 2);
        assert!(job.transform.excludes.contains("salt"));
        assert_eq!(job.transform.renames["username"], "login");
    }

    #[test]
    fn sample_document_parses() {
        let doc = parse_document(SAMPLE, Path::new(SAMPLE_PATH)).unwrap();

        assert_eq!(doc.dtos.len(), 1);
        assert_eq!(doc.dtos[0].type_name, "User");
        assert_eq!(doc.global.output_dir, Some(PathBuf::from("./src/dto")));
    }

    #[test]
    fn sample_is_not_overwritten() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(SAMPLE_PATH);

        generate_sample(&path).unwrap();
        assert!(generate_sample(&path).is_err());
    }
}
