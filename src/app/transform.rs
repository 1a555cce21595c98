use crate::app::models::{FieldData, FieldInfo, StructInfo, TemplateContext, TransformConfig};
use std::collections::{BTreeSet, HashSet};

impl TransformConfig {
    /// Includes win outright; excludes only apply when no includes are given.
    pub fn keeps(&self, field: &str) -> bool {
        if self.includes.is_empty() {
            !self.excludes.contains(field)
        } else {
            self.includes.contains(field)
        }
    }

    fn output_name(&self, field: &str) -> String {
        self.renames
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }
}

/// Applies selection, renaming and augmentation rules to an extracted struct.
///
/// Names in the config that match no field are ignored.
pub fn transform(info: &StructInfo, config: &TransformConfig) -> TemplateContext {
    let kept: Vec<&FieldInfo> = info
        .fields
        .iter()
        .filter(|field| config.keeps(&field.name))
        .collect();

    let fields = kept
        .iter()
        .map(|field| FieldData {
            name: config.output_name(&field.name),
            source_name: field.name.clone(),
            access: field.access.clone(),
            ty: field.ty.clone(),
            tag: field.tag.clone(),
        })
        .collect();

    let discovered: BTreeSet<&String> = kept.iter().flat_map(|field| &field.imports).collect();

    TemplateContext {
        package: info.package.clone(),
        source_type: info.name.clone(),
        dto_name: config.dto_name.clone(),
        imports: merge_imports(&config.imports, discovered, &config.exclude_imports),
        fields,
        add_fields: config.add_fields.clone(),
        filters: config.filters.clone(),
    }
}

/// Configured imports first, then discovered ones minus exclusions; no duplicates.
fn merge_imports<'a>(
    configured: &[String],
    discovered: impl IntoIterator<Item = &'a String>,
    excluded: &HashSet<String>,
) -> Vec<String> {
    let mut combined = configured.to_vec();
    combined.extend(
        discovered
            .into_iter()
            .filter(|import| !excluded.contains(*import))
            .cloned(),
    );

    // Deduplicate while keeping order
    let mut seen = HashSet::new();
    combined.retain(|item| seen.insert(item.clone()));
    combined
}
