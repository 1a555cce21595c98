use crate::app::error::{Error, Result};
use crate::app::models::{FieldInfo, SourceFile, StructInfo};
use crate::app::scanner::Scanner;
use proc_macro2::{LineColumn, Span};
use quote::ToTokens;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;
use syn::spanned::Spanned;
use syn::{
    Attribute, GenericArgument, Item, ItemStruct, PathArguments, ReturnType, Type,
    TypeParamBound, UseTree,
};

/// Locates `type_name` under `location` and reduces it to a [`StructInfo`].
///
/// Every file is read and parsed before the lookup starts, so a broken file
/// anywhere under the location fails the whole extraction.
pub fn extract(location: &str, type_name: &str) -> Result<StructInfo> {
    let files = Scanner::new(location)?.scan()?;
    log::debug!("Scanning {} file(s) under {location}", files.len());

    let parsed = files
        .into_iter()
        .map(ParsedFile::load)
        .collect::<Result<Vec<_>>>()?;

    extract_from(&parsed, type_name, location)
}

/// A source file held together with its syntax tree.
pub struct ParsedFile {
    pub source: SourceFile,
    text: String,
    ast: syn::File,
}

impl ParsedFile {
    pub fn load(source: SourceFile) -> Result<Self> {
        let text = fs::read_to_string(&source.path).map_err(|err| Error::Io {
            path: source.path.clone(),
            source: err,
        })?;
        Self::parse(source, text)
    }

    pub fn parse(source: SourceFile, text: String) -> Result<Self> {
        let text = match text.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => text,
        };
        let ast = syn::parse_file(&text).map_err(|err| {
            let start = err.span().start();
            Error::Analysis {
                path: source.path.clone(),
                line: start.line,
                column: start.column + 1,
                message: err.to_string(),
            }
        })?;
        Ok(Self { source, text, ast })
    }
}

/// A type-namespace item that carries the requested name.
struct Candidate<'a> {
    file: &'a ParsedFile,
    module: String,
    scope: &'a [Item],
    item: &'a Item,
}

pub fn extract_from(files: &[ParsedFile], type_name: &str, location: &str) -> Result<StructInfo> {
    let mut candidates = Vec::new();
    for file in files {
        collect_candidates(
            file,
            file.source.module.clone(),
            &file.ast.items,
            type_name,
            &mut candidates,
        );
    }

    let candidate = match candidates.len() {
        0 => {
            return Err(Error::TypeNotFound {
                type_name: type_name.to_string(),
                location: location.to_string(),
            })
        }
        1 => candidates.remove(0),
        _ => {
            return Err(Error::AmbiguousType {
                type_name: type_name.to_string(),
                candidates: candidates
                    .iter()
                    .map(|c| format!("{}::{type_name} ({})", c.module, c.file.source.path.display()))
                    .collect(),
            })
        }
    };

    let Item::Struct(item) = candidate.item else {
        return Err(Error::NotAStruct {
            type_name: type_name.to_string(),
            kind: item_kind(candidate.item),
            path: candidate.file.source.path.clone(),
        });
    };

    let scope = Scope::new(&candidate.module, candidate.scope, item);
    let text = SourceText::new(&candidate.file.text);
    let fields = read_fields(item, &scope, &text);
    let imports = fields.iter().flat_map(|f| f.imports.iter().cloned()).collect();

    let path = &candidate.file.source.path;
    log::debug!(
        "Found {}::{type_name} with {} field(s) in {}",
        candidate.module,
        fields.len(),
        path.display()
    );

    Ok(StructInfo {
        package: candidate.module,
        name: type_name.to_string(),
        dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        file: path.clone(),
        fields,
        imports,
    })
}

fn collect_candidates<'a>(
    file: &'a ParsedFile,
    module: String,
    items: &'a [Item],
    type_name: &str,
    out: &mut Vec<Candidate<'a>>,
) {
    for item in items {
        if let Item::Mod(inner) = item {
            if let Some((_, content)) = &inner.content {
                let nested = format!("{module}::{}", inner.ident);
                collect_candidates(file, nested, content, type_name, out);
            }
            continue;
        }

        if type_ident(item).is_some_and(|ident| ident == type_name) {
            out.push(Candidate {
                file,
                module: module.clone(),
                scope: items,
                item,
            });
        }
    }
}

fn type_ident(item: &Item) -> Option<&syn::Ident> {
    match item {
        Item::Struct(i) => Some(&i.ident),
        Item::Enum(i) => Some(&i.ident),
        Item::Union(i) => Some(&i.ident),
        Item::Type(i) => Some(&i.ident),
        Item::Trait(i) => Some(&i.ident),
        Item::TraitAlias(i) => Some(&i.ident),
        _ => None,
    }
}

const fn item_kind(item: &Item) -> &'static str {
    match item {
        Item::Enum(_) => "enum",
        Item::Union(_) => "union",
        Item::Type(_) => "type alias",
        Item::Trait(_) | Item::TraitAlias(_) => "trait",
        _ => "item",
    }
}

fn read_fields(item: &ItemStruct, scope: &Scope, text: &SourceText) -> Vec<FieldInfo> {
    let mut fields: Vec<FieldInfo> = Vec::new();

    for (index, field) in item.fields.iter().enumerate() {
        let (name, access) = match &field.ident {
            Some(ident) => (ident.to_string(), ident.to_string()),
            None => {
                let mut name = member_name(&field.ty).unwrap_or_else(|| format!("field{index}"));
                if fields.iter().any(|f| f.name == name) {
                    name = format!("{name}{index}");
                }
                (name, index.to_string())
            }
        };

        let mut refs = TypeRefs::default();
        scope.collect_type(&field.ty, &mut refs);

        fields.push(FieldInfo {
            name,
            ty: text.type_text(&field.ty, &refs.relative),
            tag: text.tag_text(&field.attrs),
            access,
            imports: refs.imports,
        });
    }

    fields
}

/// Unqualified name for a positional member: `pkg::Base` -> `Base`.
fn member_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) if p.qself.is_none() => p.path.segments.last().map(|s| s.ident.to_string()),
        Type::Reference(r) => member_name(&r.elem),
        Type::Ptr(p) => member_name(&p.elem),
        Type::Paren(p) => member_name(&p.elem),
        Type::Group(g) => member_name(&g.elem),
        _ => None,
    }
}

/// What a field type needs once it is written outside its declaring module.
#[derive(Default)]
struct TypeRefs {
    imports: BTreeSet<String>,
    /// `self::`/`super::` prefixes to cut from the written type.
    relative: Vec<(LineColumn, LineColumn)>,
}

/// Name resolution for the module that declares the struct.
struct Scope {
    module: String,
    uses: HashMap<String, String>,
    locals: HashSet<String>,
    generics: HashSet<String>,
}

impl Scope {
    fn new(module: &str, items: &[Item], item: &ItemStruct) -> Self {
        let mut uses = HashMap::new();
        let mut locals = HashSet::new();

        for item in items {
            match item {
                Item::Use(u) => flatten_use(&u.tree, &mut Vec::new(), module, &mut uses),
                Item::Mod(m) => {
                    locals.insert(m.ident.to_string());
                }
                other => {
                    if let Some(ident) = type_ident(other) {
                        locals.insert(ident.to_string());
                    }
                }
            }
        }

        let generics = item
            .generics
            .type_params()
            .map(|p| p.ident.to_string())
            .collect();

        Self {
            module: module.to_string(),
            uses,
            locals,
            generics,
        }
    }

    /// Records the import the emitted code needs for `path`, if any.
    fn resolve(&self, path: &syn::Path, out: &mut TypeRefs) {
        if path.leading_colon.is_some() {
            return;
        }
        let Some(first) = path.segments.first().map(|s| s.ident.to_string()) else {
            return;
        };

        match first.as_str() {
            "self" | "super" => self.resolve_relative(path, out),
            "crate" | "Self" => {}
            _ if path.segments.len() == 1 && self.generics.contains(&first) => {}
            _ => {
                let import = self.uses.get(&first).cloned().or_else(|| {
                    self.locals
                        .contains(&first)
                        .then(|| format!("{}::{first}", self.module))
                });
                out.imports.extend(import);
            }
        }
    }

    /// `super::role::Role` is written as `role::Role` with `role` imported
    /// by its crate path.
    fn resolve_relative(&self, path: &syn::Path, out: &mut TypeRefs) {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        let depth = segments
            .iter()
            .take_while(|s| matches!(s.as_str(), "self" | "super"))
            .count();
        let Some(head) = path.segments.iter().nth(depth) else {
            return;
        };

        if let Some(import) = absolute_path(&segments[..=depth], &self.module) {
            out.imports.insert(import);
            out.relative
                .push((path.segments[0].ident.span().start(), head.ident.span().start()));
        }
    }

    fn collect_type(&self, ty: &Type, out: &mut TypeRefs) {
        match ty {
            Type::Path(p) => {
                if let Some(qself) = &p.qself {
                    self.collect_type(&qself.ty, out);
                } else {
                    self.resolve(&p.path, out);
                }
                self.collect_arguments(&p.path, out);
            }
            Type::Reference(r) => self.collect_type(&r.elem, out),
            Type::Ptr(p) => self.collect_type(&p.elem, out),
            Type::Slice(s) => self.collect_type(&s.elem, out),
            Type::Array(a) => self.collect_type(&a.elem, out),
            Type::Paren(p) => self.collect_type(&p.elem, out),
            Type::Group(g) => self.collect_type(&g.elem, out),
            Type::Tuple(t) => t.elems.iter().for_each(|e| self.collect_type(e, out)),
            Type::BareFn(f) => {
                f.inputs.iter().for_each(|arg| self.collect_type(&arg.ty, out));
                self.collect_return(&f.output, out);
            }
            Type::TraitObject(t) => self.collect_bounds(t.bounds.iter(), out),
            Type::ImplTrait(t) => self.collect_bounds(t.bounds.iter(), out),
            _ => {}
        }
    }

    fn collect_arguments(&self, path: &syn::Path, out: &mut TypeRefs) {
        for segment in &path.segments {
            match &segment.arguments {
                PathArguments::AngleBracketed(args) => {
                    for arg in &args.args {
                        match arg {
                            GenericArgument::Type(ty) => self.collect_type(ty, out),
                            GenericArgument::AssocType(assoc) => self.collect_type(&assoc.ty, out),
                            GenericArgument::Constraint(c) => {
                                self.collect_bounds(c.bounds.iter(), out);
                            }
                            _ => {}
                        }
                    }
                }
                PathArguments::Parenthesized(args) => {
                    args.inputs.iter().for_each(|ty| self.collect_type(ty, out));
                    self.collect_return(&args.output, out);
                }
                PathArguments::None => {}
            }
        }
    }

    fn collect_return(&self, output: &ReturnType, out: &mut TypeRefs) {
        if let ReturnType::Type(_, ty) = output {
            self.collect_type(ty, out);
        }
    }

    fn collect_bounds<'b>(
        &self,
        bounds: impl Iterator<Item = &'b TypeParamBound>,
        out: &mut TypeRefs,
    ) {
        for bound in bounds {
            if let TypeParamBound::Trait(t) = bound {
                self.resolve(&t.path, out);
                self.collect_arguments(&t.path, out);
            }
        }
    }
}

/// Flattens a `use` tree into `alias -> import path` entries.
fn flatten_use(
    tree: &UseTree,
    prefix: &mut Vec<String>,
    module: &str,
    out: &mut HashMap<String, String>,
) {
    match tree {
        UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            flatten_use(&p.tree, prefix, module, out);
            prefix.pop();
        }
        UseTree::Name(n) => {
            let mut segments = prefix.clone();
            if n.ident != "self" {
                segments.push(n.ident.to_string());
            }
            if let (Some(alias), Some(path)) = (segments.last(), absolute_path(&segments, module)) {
                out.insert(alias.clone(), path);
            }
        }
        UseTree::Rename(r) => {
            let mut segments = prefix.clone();
            if r.ident != "self" {
                segments.push(r.ident.to_string());
            }
            if let Some(path) = absolute_path(&segments, module) {
                out.insert(r.rename.to_string(), format!("{path} as {}", r.rename));
            }
        }
        UseTree::Group(g) => {
            for item in &g.items {
                flatten_use(item, prefix, module, out);
            }
        }
        // Glob imports cannot be attributed to a single name.
        UseTree::Glob(_) => {}
    }
}

/// Rewrites `self::`/`super::` against `module`. Bare crate imports yield `None`.
fn absolute_path(segments: &[String], module: &str) -> Option<String> {
    let first = segments.first()?;
    let mut base: Vec<&str> = module.split("::").collect();

    let rest = match first.as_str() {
        "self" => &segments[1..],
        "super" => {
            let depth = segments.iter().take_while(|s| *s == "super").count();
            for _ in 0..depth {
                if base.len() > 1 {
                    base.pop();
                }
            }
            &segments[depth..]
        }
        _ if segments.len() == 1 => return None,
        _ => return Some(segments.join("::")),
    };

    if rest.is_empty() {
        return None;
    }
    base.extend(rest.iter().map(String::as_str));
    Some(base.join("::"))
}

/// Maps span locations back to the file text they came from.
struct SourceText<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, line_starts }
    }

    fn offset(&self, at: LineColumn) -> Option<usize> {
        let start = *self.line_starts.get(at.line.checked_sub(1)?)?;
        let line = &self.text[start..];
        line.char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(line.len()))
            .nth(at.column)
            .map(|i| start + i)
    }

    fn slice(&self, span: Span) -> Option<&'a str> {
        let start = self.offset(span.start())?;
        let end = self.offset(span.end())?;
        self.text.get(start..end).filter(|s| !s.is_empty())
    }

    /// Written type with the `cuts` removed and whitespace runs collapsed.
    fn type_text(&self, ty: &Type, cuts: &[(LineColumn, LineColumn)]) -> String {
        let written = self
            .written(ty.span(), cuts)
            .unwrap_or_else(|| ty.to_token_stream().to_string());
        written.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn written(&self, span: Span, cuts: &[(LineColumn, LineColumn)]) -> Option<String> {
        let end = self.offset(span.end())?;
        let mut at = self.offset(span.start())?;
        let mut ranges = cuts
            .iter()
            .map(|(from, to)| Some((self.offset(*from)?, self.offset(*to)?)))
            .collect::<Option<Vec<_>>>()?;
        ranges.sort_unstable();

        let mut written = String::new();
        for (from, to) in ranges {
            written.push_str(self.text.get(at..from)?);
            at = to;
        }
        written.push_str(self.text.get(at..end)?);
        Some(written).filter(|s| !s.is_empty())
    }

    /// Non-doc attributes, verbatim, one per line.
    fn tag_text(&self, attrs: &[Attribute]) -> String {
        attrs
            .iter()
            .filter(|attr| !attr.path().is_ident("doc"))
            .map(|attr| {
                self.slice(attr.span())
                    .map_or_else(|| attr.to_token_stream().to_string(), str::to_owned)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parsed(module: &str, file: &str, code: &str) -> ParsedFile {
        let source = SourceFile {
            path: PathBuf::from(file),
            module: module.to_string(),
        };
        ParsedFile::parse(source, code.to_string()).unwrap()
    }

    fn extract_one(code: &str, type_name: &str) -> Result<StructInfo> {
        let files = [parsed("crate::models::user", "src/models/user.rs", code)];
        extract_from(&files, type_name, "src/models")
    }

    fn names(info: &StructInfo) -> Vec<&str> {
        info.fields.iter().map(|f| f.name.as_str()).collect()
    }

    const USER: &str = r#"
use chrono::{DateTime, Utc};
use crate::auth::PasswordHash;

/// An account.
pub struct User {
    pub id: i64,
    /// Login handle.
    #[serde(rename = "username")]
    pub username: String,
    pub email: Option<String>,
    pub password: PasswordHash,
    pub created_at: DateTime<Utc>,
}
"#;

    #[test]
    fn fields_keep_declaration_order_and_types() {
        let info = extract_one(USER, "User").unwrap();

        assert_eq!(info.package, "crate::models::user");
        assert_eq!(info.dir, PathBuf::from("src/models"));
        assert_eq!(names(&info), ["id", "username", "email", "password", "created_at"]);
        assert_eq!(info.fields[2].ty, "Option<String>");
        assert_eq!(info.fields[4].ty, "DateTime<Utc>");
        assert_eq!(info.fields[1].access, "username");
    }

    #[test]
    fn tags_are_verbatim_and_skip_docs() {
        let info = extract_one(USER, "User").unwrap();

        assert_eq!(info.fields[1].tag, r#"#[serde(rename = "username")]"#);
        assert_eq!(info.fields[0].tag, "");
    }

    #[test]
    fn imports_are_tracked_per_field() {
        let info = extract_one(USER, "User").unwrap();

        assert!(info.fields[0].imports.is_empty());
        assert_eq!(
            info.fields[3].imports.iter().collect::<Vec<_>>(),
            ["crate::auth::PasswordHash"]
        );
        assert_eq!(
            info.fields[4].imports.iter().collect::<Vec<_>>(),
            ["chrono::DateTime", "chrono::Utc"]
        );
        assert_eq!(info.imports.len(), 3);
    }

    #[test]
    fn import_discovery_unwraps_nested_shapes() {
        let code = r"
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use uuid::Uuid;
use rust_decimal::Decimal as Money;
use super::role::Role;
use self::audit::Entry;

pub struct Audit;
pub trait Hook {}

pub struct Ledger<T> {
    pub balances: HashMap<Uuid, Vec<Option<Box<Money>>>>,
    pub roles: &'static [Role; 4],
    pub entries: *const (Entry, Audit),
    pub events: Receiver<T>,
    pub hook: Box<dyn Hook + Send>,
    pub plain: std::time::Duration,
}
";
        let info = extract_one(code, "Ledger").unwrap();
        let imports: Vec<_> = info.imports.iter().map(String::as_str).collect();

        assert_eq!(
            imports,
            [
                "crate::models::role::Role",
                "crate::models::user::Audit",
                "crate::models::user::Hook",
                "crate::models::user::audit::Entry",
                "rust_decimal::Decimal as Money",
                "std::collections::HashMap",
                "std::sync::mpsc::Receiver",
                "uuid::Uuid",
            ]
        );
    }

    #[test]
    fn relative_paths_become_imports() {
        let code = r"
pub struct Audit;

pub struct User {
    pub id: i64,
    pub audit: self::Audit,
    pub role: super::role::Role,
    pub history: Vec<super::super::log::Entry>,
}
";
        let info = extract_one(code, "User").unwrap();

        assert_eq!(info.fields[1].ty, "Audit");
        assert_eq!(
            info.fields[1].imports.iter().collect::<Vec<_>>(),
            ["crate::models::user::Audit"]
        );
        assert_eq!(info.fields[2].ty, "role::Role");
        assert_eq!(
            info.fields[2].imports.iter().collect::<Vec<_>>(),
            ["crate::models::role"]
        );
        assert_eq!(info.fields[3].ty, "Vec<log::Entry>");
        assert_eq!(
            info.fields[3].imports.iter().collect::<Vec<_>>(),
            ["crate::log"]
        );
    }

    #[test]
    fn generic_params_and_prelude_types_contribute_nothing() {
        let code = "pub struct Page<T> { pub items: Vec<T>, pub total: usize, pub next: Option<String> }";
        let info = extract_one(code, "Page").unwrap();

        assert!(info.imports.is_empty());
    }

    #[test]
    fn positional_members_get_synthesized_names() {
        let code = "pub struct Audited(pub pkg::Base, pub &'static str, (u8, u8), pub pkg::Base);";
        let info = extract_one(code, "Audited").unwrap();

        assert_eq!(names(&info), ["Base", "str", "field2", "Base3"]);
        assert_eq!(info.fields[0].ty, "pkg::Base");
        assert_eq!(info.fields[0].access, "0");
        assert_eq!(info.fields[3].access, "3");
    }

    #[test]
    fn inline_modules_are_searched() {
        let code = "pub mod api { use crate::ids::Id; pub struct Order { pub id: Id } }";
        let info = extract_one(code, "Order").unwrap();

        assert_eq!(info.package, "crate::models::user::api");
        assert_eq!(info.fields[0].imports.iter().collect::<Vec<_>>(), ["crate::ids::Id"]);
    }

    #[test]
    fn enum_is_not_a_struct() {
        let err = extract_one("pub enum User { A, B }", "User").unwrap_err();
        assert!(matches!(err, Error::NotAStruct { kind: "enum", .. }));
    }

    #[test]
    fn missing_type_is_reported() {
        let err = extract_one(USER, "Account").unwrap_err();
        assert!(matches!(err, Error::TypeNotFound { .. }));
    }

    #[test]
    fn duplicate_declarations_are_ambiguous() {
        let files = [
            parsed("crate::a", "src/a.rs", "pub struct User { pub id: u32 }"),
            parsed("crate::b", "src/b.rs", "pub struct User { pub id: u64 }"),
        ];
        let err = extract_from(&files, "User", "src").unwrap_err();

        let Error::AmbiguousType { candidates, .. } = err else {
            panic!("expected ambiguity, got {err:?}");
        };
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].starts_with("crate::a::User"));
    }

    #[test]
    fn parse_failure_is_an_analysis_error() {
        let source = SourceFile {
            path: PathBuf::from("src/broken.rs"),
            module: "crate::broken".to_string(),
        };
        let err = ParsedFile::parse(source, "pub struct {".to_string())
            .err()
            .unwrap();

        assert!(matches!(err, Error::Analysis { line: 1, .. }));
    }

    #[test]
    fn absolute_paths_resolve_relative_prefixes() {
        let segs = |s: &str| s.split("::").map(str::to_string).collect::<Vec<_>>();

        assert_eq!(absolute_path(&segs("super::super::x::Y"), "crate::a::b"), Some("crate::x::Y".into()));
        assert_eq!(absolute_path(&segs("self::Y"), "crate::a"), Some("crate::a::Y".into()));
        assert_eq!(absolute_path(&segs("serde"), "crate::a"), None);
    }
}
