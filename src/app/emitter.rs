use crate::app::error::{Error, Result};
use crate::app::models::TemplateContext;
use tera::{Context, Tera};

/// Template used when a DTO does not name its own.
pub const DEFAULT_TEMPLATE: &str = include_str!("templates/dto.rs.tera");

/// Renders template contexts into formatted Rust source.
pub struct Emitter<'t> {
    default_template: &'t str,
}

impl<'t> Emitter<'t> {
    pub const fn new(default_template: &'t str) -> Self {
        Self { default_template }
    }

    /// Renders `context` through `template` (or the default) and pretty-prints the result.
    ///
    /// When the rendered text is not valid Rust the raw output comes back in
    /// [`Error::Format`] so the caller can still keep it.
    pub fn render(&self, context: &TemplateContext, template: Option<&str>) -> Result<String> {
        let (name, source) = match template {
            Some(source) => ("custom", source),
            None => ("default", self.default_template),
        };

        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.add_raw_template(name, source)
            .map_err(|source| Error::TemplateParse {
                name: name.to_string(),
                source,
            })?;

        let execution = |source| Error::TemplateExecution {
            name: name.to_string(),
            source,
        };
        let context = Context::from_serialize(context).map_err(execution)?;
        let raw = tera.render(name, &context).map_err(execution)?;

        format_source(raw)
    }
}

/// Canonical formatting pass.
fn format_source(raw: String) -> Result<String> {
    match syn::parse_file(&raw) {
        Ok(file) => Ok(prettyplease::unparse(&file)),
        Err(source) => Err(Error::Format { raw, source }),
    }
}
