use crate::app::emitter::Emitter;
use crate::app::error::Error;
use crate::app::extractor::extract;
use crate::app::models::Job;
use crate::app::transform::transform;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Output of one extract → transform → render cycle, not yet on disk.
#[derive(Debug)]
pub struct Generated {
    pub destination: PathBuf,
    pub code: String,
    /// False when the code could not be reformatted and is written as rendered.
    pub formatted: bool,
}

/// Runs the pipeline for `job`. Touches nothing on disk besides reading sources.
pub fn generate(job: &Job, emitter: &Emitter<'_>) -> Result<Generated> {
    let info = extract(&job.source, &job.type_name)?;
    let context = transform(&info, &job.transform);

    let template = match &job.transform.template {
        Some(path) => Some(fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?),
        None => None,
    };

    let (code, formatted) = match emitter.render(&context, template.as_deref()) {
        Ok(code) => (code, true),
        Err(Error::Format { raw, source }) => {
            log::warn!(
                "{} is not valid Rust ({source}); keeping unformatted output",
                job.transform.dto_name
            );
            (raw, false)
        }
        Err(err) => return Err(err.into()),
    };

    let dir = job.output_dir.clone().unwrap_or(info.dir);
    Ok(Generated {
        destination: dir.join(&job.output_file),
        code,
        formatted,
    })
}

/// Writes the generated code through a temp file so a destination is either
/// fully replaced or left as it was.
pub fn persist(generated: &Generated) -> Result<()> {
    let destination = &generated.destination;
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).context(format!("Failed to create output directory {:?}", dir))?;

    // Temp files start owner-only; an existing destination keeps its mode.
    let permissions = match fs::metadata(destination) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    };

    let mut file = NamedTempFile::new_in(dir)
        .context(format!("Failed to create temp file in {:?}", dir))?;
    file.write_all(generated.code.as_bytes())
        .context(format!("Failed to write {:?}", destination))?;
    if let Some(permissions) = permissions {
        file.as_file()
            .set_permissions(permissions)
            .context(format!("Failed to set permissions for {:?}", destination))?;
    }
    file.persist(destination)
        .map_err(|err| err.error)
        .context(format!("Failed to write {:?}", destination))?;

    Ok(())
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}
