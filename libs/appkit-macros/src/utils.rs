use proc_macro2::{Delimiter, TokenStream, TokenTree};
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::{GenericArgument, Pat, Path, PathArguments, Type};

/// True when the last segment of `path` is `name` (`endpoint`, `appkit::endpoint`, ...).
pub fn path_last_is(path: &Path, name: &str) -> bool {
    path.segments.last().is_some_and(|s| s.ident == name)
}

/// Up to two known names close to `input`, best match first.
pub fn suggest_similar(input: &str, known: &[&'static str]) -> Vec<&'static str> {
    let mut scored: Vec<(&'static str, f64)> = known
        .iter()
        .map(|&k| (k, strsim::jaro_winkler(input, k)))
        .filter(|(_, score)| *score > 0.6)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(2).map(|(k, _)| k).collect()
}

pub fn unknown_key_message(kind: &str, key: &str, known: &[&'static str]) -> String {
    let suggestions = suggest_similar(key, known);
    if suggestions.is_empty() {
        format!(
            "unknown {kind} parameter '{key}', expected one of: {}",
            known.join(", ")
        )
    } else {
        format!(
            "unknown {kind} parameter '{key}', did you mean one of: {}?",
            suggestions.join(", ")
        )
    }
}

/// The type as the author wrote it: `&str`, `Vec<u8>`, `HashMap<String, i64>`.
pub fn type_label(ty: &Type) -> String {
    let mut out = String::new();
    write_tokens(ty.to_token_stream(), &mut out);
    out
}

fn write_tokens(tokens: TokenStream, out: &mut String) {
    for tt in tokens {
        match tt {
            TokenTree::Group(g) => {
                let (open, close) = match g.delimiter() {
                    Delimiter::Parenthesis => ("(", ")"),
                    Delimiter::Bracket => ("[", "]"),
                    Delimiter::Brace => ("{", "}"),
                    Delimiter::None => ("", ""),
                };
                out.push_str(open);
                write_tokens(g.stream(), out);
                out.push_str(close);
            }
            TokenTree::Ident(ident) => {
                if out.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                    out.push(' ');
                }
                out.push_str(&ident.to_string());
            }
            TokenTree::Punct(p) => {
                out.push(p.as_char());
                if p.as_char() == ',' {
                    out.push(' ');
                }
            }
            TokenTree::Literal(lit) => out.push_str(&lit.to_string()),
        }
    }
}

/// `T` for `Result<T, E>` / `anyhow::Result<T>`; `None` for anything else.
pub fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(tp) = ty else {
        return None;
    };
    let last = tp.path.segments.last()?;
    if last.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

pub fn is_unit(ty: &Type) -> bool {
    match ty {
        Type::Tuple(t) => t.elems.is_empty(),
        Type::Paren(p) => is_unit(&p.elem),
        Type::Group(g) => is_unit(&g.elem),
        _ => false,
    }
}

/// How a parameter or return type can be described at registration time.
pub enum TypeKind<'a> {
    /// Has a schema: `TypeDescriptor::of::<T>()`.
    Schema(&'a Type),
    /// Known only by name.
    Opaque(String),
    /// `impl Trait`: no usable type.
    Untyped,
}

pub fn classify_type(ty: &Type) -> TypeKind<'_> {
    match ty {
        Type::Paren(p) => classify_type(&p.elem),
        Type::Group(g) => classify_type(&g.elem),
        Type::ImplTrait(_) | Type::Infer(_) => TypeKind::Untyped,
        Type::Reference(_)
        | Type::Ptr(_)
        | Type::BareFn(_)
        | Type::TraitObject(_)
        | Type::Never(_)
        | Type::Macro(_)
        | Type::Verbatim(_) => TypeKind::Opaque(type_label(ty)),
        Type::Tuple(t) if t.elems.is_empty() => TypeKind::Opaque(type_label(ty)),
        _ => TypeKind::Schema(ty),
    }
}

/// `input` for `input: T`, `_` for `_: T`, the written pattern otherwise.
pub fn param_name(pat: &Pat) -> String {
    match pat {
        Pat::Ident(p) => p.ident.unraw().to_string(),
        Pat::Wild(_) => "_".to_string(),
        other => {
            let mut out = String::new();
            write_tokens(other.to_token_stream(), &mut out);
            out
        }
    }
}
