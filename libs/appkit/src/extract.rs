//! Static requirement extraction.
//!
//! Reads the `requirements = [...]` argument of the first `#[app(...)]`
//! attribute in a Rust source file. The file is only parsed, never compiled,
//! so it may reference crates that are not installed yet.

use std::io;
use std::path::{Path, PathBuf};

use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{Attribute, Expr, ExprLit, Item, ItemEnum, ItemImpl, ItemStruct, Lit, Meta, Token};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract requirements from a source file on disk.
pub fn extract_requirements_from_file(path: &Path) -> Result<Vec<String>, ExtractError> {
    let source = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ExtractError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ExtractError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    extract_requirements(&source)
}

/// Extract requirements from source text. No app attribute means no requirements.
pub fn extract_requirements(source: &str) -> Result<Vec<String>, ExtractError> {
    let file = syn::parse_file(source).map_err(|e| {
        let start = e.span().start();
        ExtractError::Syntax {
            line: start.line,
            column: start.column + 1,
            message: e.to_string(),
        }
    })?;

    let mut finder = AppAttributeFinder::default();
    finder.visit_file(&file);
    Ok(finder.found.map(requirements_of).unwrap_or_default())
}

/// First `#[app]` attribute in declaration order, wherever the item is nested:
/// inline modules, function bodies, other impls.
#[derive(Default)]
struct AppAttributeFinder<'ast> {
    found: Option<&'ast Attribute>,
}

impl<'ast> AppAttributeFinder<'ast> {
    fn check(&mut self, attrs: &'ast [Attribute]) {
        if self.found.is_none() {
            self.found = attrs.iter().find(|a| is_app_attribute(a));
        }
    }
}

impl<'ast> Visit<'ast> for AppAttributeFinder<'ast> {
    fn visit_item(&mut self, item: &'ast Item) {
        if self.found.is_none() {
            visit::visit_item(self, item);
        }
    }

    fn visit_item_impl(&mut self, item: &'ast ItemImpl) {
        self.check(&item.attrs);
        if self.found.is_none() {
            visit::visit_item_impl(self, item);
        }
    }

    fn visit_item_struct(&mut self, item: &'ast ItemStruct) {
        self.check(&item.attrs);
    }

    fn visit_item_enum(&mut self, item: &'ast ItemEnum) {
        self.check(&item.attrs);
    }
}

/// `#[app]`, `#[appkit::app(...)]`, `#[anything::app]`.
fn is_app_attribute(attr: &Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|seg| seg.ident == "app")
}

fn requirements_of(attr: &Attribute) -> Vec<String> {
    let Meta::List(_) = &attr.meta else {
        return Vec::new();
    };
    let Ok(args) = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated) else {
        return Vec::new();
    };
    for meta in args {
        let Meta::NameValue(nv) = meta else { continue };
        if !nv.path.is_ident("requirements") {
            continue;
        }
        let Expr::Array(array) = nv.value else {
            return Vec::new();
        };
        return array
            .elems
            .into_iter()
            .filter_map(|elem| match elem {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value()),
                _ => None,
            })
            .collect();
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn finds_requirements_on_impl_block() {
        let src = r#"
            use appkit::app;

            #[derive(Default)]
            pub struct Model;

            #[app(name = "model", requirements = ["torch>=2.0", "numpy"])]
            impl Model {}
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["torch>=2.0", "numpy"]);
    }

    #[test]
    fn accepts_qualified_and_struct_attributes() {
        let src = r#"
            #[other::app(requirements = ["pandas"])]
            struct Thing;
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["pandas"]);
    }

    #[test]
    fn missing_or_bare_attribute_yields_empty() {
        assert!(extract_requirements("fn main() {}").unwrap().is_empty());
        assert!(extract_requirements("#[app] impl A {}").unwrap().is_empty());
        assert!(extract_requirements("#[app(name = \"x\")] impl A {}")
            .unwrap()
            .is_empty());
        assert!(extract_requirements("#[app(requirements = REQS)] impl A {}")
            .unwrap()
            .is_empty());
        assert!(extract_requirements("#[app(\"loose\", tokens)] impl A {}")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn skips_non_string_literals() {
        let src = r#"#[app(requirements = ["a", 1, true, "b"])] impl A {}"#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn first_match_wins() {
        let src = r#"
            #[app(requirements = ["first"])]
            impl A {}

            #[app(requirements = ["second"])]
            impl B {}
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["first"]);
    }

    #[test]
    fn descends_into_inline_modules() {
        let src = r#"
            mod inner {
                #[appkit::app(requirements = ["scipy"])]
                impl super::A {}
            }
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["scipy"]);
    }

    #[test]
    fn finds_apps_declared_inside_function_bodies() {
        let src = r#"
            fn main() {
                #[app(requirements = ["torch"])]
                impl Model {}
            }
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["torch"]);

        let src = r#"
            fn build() -> Model {
                mod nested {
                    #[appkit::app(requirements = ["onnx"])]
                    struct Model;
                }
                Model
            }
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["onnx"]);
    }

    #[test]
    fn nested_match_respects_declaration_order() {
        let src = r#"
            impl Outer {
                fn helper() {
                    #[app(requirements = ["inner"])]
                    impl A {}
                }
            }

            #[app(requirements = ["later"])]
            impl B {}
        "#;
        assert_eq!(extract_requirements(src).unwrap(), vec!["inner"]);
    }

    #[test]
    fn never_compiles_the_source() {
        let src = r#"
            use not_installed_yet::Model;
            compile_error!("this file does not build");

            #[app(requirements = ["not-installed-yet==1.0"])]
            impl Model {
                fn predict(&self) -> Output { unknown_function() }
            }
        "#;
        assert_eq!(
            extract_requirements(src).unwrap(),
            vec!["not-installed-yet==1.0"]
        );
    }

    #[test]
    fn syntax_error_reports_location() {
        let err = extract_requirements("fn broken( {\n").unwrap_err();
        match err {
            ExtractError::Syntax { line, .. } => assert!(line >= 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::Builder::new().suffix(".rs").tempfile().unwrap();
        writeln!(file, "#[app(requirements = [\"requests\"])] impl A {{}}").unwrap();
        assert_eq!(
            extract_requirements_from_file(file.path()).unwrap(),
            vec!["requests"]
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let err = extract_requirements_from_file(Path::new("/definitely/not/here.rs")).unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }), "got {err:?}");
    }
}
