use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate DTO structs from existing Rust structs"
)]
pub struct Cli {
    /// Source file, directory or glob (e.g., 'src/models/**/*.rs')
    #[arg(long, short = 's', default_value = ".")]
    pub src: String,

    /// Struct to generate from (required unless --config or --init)
    #[arg(long = "type", short = 't', required_unless_present_any = ["config", "init"])]
    pub type_name: Option<String>,

    /// Output DTO struct name [default: <TYPE>DTO]
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Output file name [default: snake_case(<NAME>).rs]
    #[arg(long, short = 'o')]
    pub out: Option<String>,

    /// Output directory [default: next to the source file]
    #[arg(long, short = 'd')]
    pub dir: Option<PathBuf>,

    /// Comma-separated fields to exclude
    #[arg(long, short = 'e', value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Comma-separated fields to include (overrides --exclude)
    #[arg(long, short = 'i', value_delimiter = ',')]
    pub include: Vec<String>,

    /// Field rename as Source:Target (repeatable)
    #[arg(long = "replace", short = 'r', value_parser = parse_rename)]
    pub renames: Vec<(String, String)>,

    /// Path to a custom template file
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Batch document (TOML or YAML) declaring several DTOs
    #[arg(long, conflicts_with = "type_name")]
    pub config: Option<PathBuf>,

    /// Write a sample batch document to dtogen.sample.toml
    #[arg(long, conflicts_with_all = ["config", "type_name"])]
    pub init: bool,
}

fn parse_rename(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() && !to.contains(':') => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("expected Source:Target, got `{value}`")),
    }
}
