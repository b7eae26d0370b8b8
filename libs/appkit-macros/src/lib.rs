use heck::ToSnakeCase;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote, ToTokens};
use syn::ext::IdentExt;
use syn::{
    parse::Parse, parse::ParseStream, parse_macro_input, punctuated::Punctuated, Attribute, Expr,
    FnArg, ImplItem, ImplItemFn, ItemImpl, Lit, LitStr, Meta, ReturnType, Token, Type,
};

mod utils;

use utils::{
    classify_type, is_unit, param_name, path_last_is, result_ok_type, type_label,
    unknown_key_message, TypeKind,
};

const APP_KEYS: &[&str] = &["name", "requirements"];
const ENDPOINT_KEYS: &[&str] = &["path"];
const HOOKS: &[&str] = &["setup", "download_weights"];

/// Configuration parsed from #[app(...)]
#[derive(Default)]
struct AppArgs {
    name: Option<LitStr>,
    requirements: Option<Expr>,
}

impl Parse for AppArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = AppArgs::default();
        let punctuated: Punctuated<Meta, Token![,]> =
            input.parse_terminated(Meta::parse, Token![,])?;

        for meta in punctuated {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("name") => {
                    if args.name.is_some() {
                        return Err(syn::Error::new_spanned(nv.path, "duplicate `name` parameter"));
                    }
                    match nv.value {
                        Expr::Lit(syn::ExprLit {
                            lit: Lit::Str(s), ..
                        }) => args.name = Some(s),
                        other => {
                            return Err(syn::Error::new_spanned(
                                other,
                                "name must be a string literal, e.g. name = \"calculator\"",
                            ));
                        }
                    }
                }
                // Checked when the app registers; a malformed value is a registration error.
                Meta::NameValue(nv) if nv.path.is_ident("requirements") => {
                    if args.requirements.is_some() {
                        return Err(syn::Error::new_spanned(
                            nv.path,
                            "duplicate `requirements` parameter",
                        ));
                    }
                    args.requirements = Some(nv.value);
                }
                other => {
                    let key = other
                        .path()
                        .get_ident()
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| other.path().to_token_stream().to_string());
                    return Err(syn::Error::new_spanned(
                        other,
                        unknown_key_message("app", &key, APP_KEYS),
                    ));
                }
            }
        }
        Ok(args)
    }
}

/// Parsed `#[endpoint]` / `#[endpoint(path = "/x")]`.
struct EndpointArgs {
    path: Option<LitStr>,
}

fn parse_endpoint_attr(attr: &Attribute) -> syn::Result<EndpointArgs> {
    let list = match &attr.meta {
        Meta::Path(_) => return Ok(EndpointArgs { path: None }),
        Meta::List(list) => list,
        Meta::NameValue(nv) => {
            return Err(syn::Error::new_spanned(
                nv,
                "expected #[endpoint] or #[endpoint(path = \"/route\")]",
            ));
        }
    };

    let mut path = None;
    let inner = list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
    for meta in inner {
        match meta {
            Meta::NameValue(nv) if nv.path.is_ident("path") => {
                if path.is_some() {
                    return Err(syn::Error::new_spanned(nv.path, "duplicate `path` parameter"));
                }
                match nv.value {
                    Expr::Lit(syn::ExprLit {
                        lit: Lit::Str(s), ..
                    }) => path = Some(s),
                    other => {
                        return Err(syn::Error::new_spanned(
                            other,
                            "path must be a string literal, e.g. path = \"/predict\"",
                        ));
                    }
                }
            }
            other => {
                let key = other.path().to_token_stream().to_string();
                return Err(syn::Error::new_spanned(
                    other,
                    unknown_key_message("endpoint", &key, ENDPOINT_KEYS),
                ));
            }
        }
    }
    Ok(EndpointArgs { path })
}

/// Remove every `#[endpoint...]` from the method and return the parsed one, if any.
fn take_endpoint_attr(method: &mut ImplItemFn) -> syn::Result<Option<EndpointArgs>> {
    let mut found: Option<EndpointArgs> = None;
    let mut kept = Vec::with_capacity(method.attrs.len());
    for attr in method.attrs.drain(..) {
        if !path_last_is(attr.path(), "endpoint") {
            kept.push(attr);
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new_spanned(attr, "duplicate #[endpoint] attribute"));
        }
        found = Some(parse_endpoint_attr(&attr)?);
    }
    method.attrs = kept;
    Ok(found)
}

enum Receiver {
    None,
    Ref,
    RefMut,
    Value,
}

fn receiver_of(method: &ImplItemFn) -> Receiver {
    match method.sig.receiver() {
        None => Receiver::None,
        Some(r) if r.reference.is_none() => Receiver::Value,
        Some(r) if r.mutability.is_some() => Receiver::RefMut,
        Some(_) => Receiver::Ref,
    }
}

fn typed_params(method: &ImplItemFn) -> Vec<(&syn::Pat, &Type)> {
    method
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pt) => Some((pt.pat.as_ref(), pt.ty.as_ref())),
            FnArg::Receiver(_) => None,
        })
        .collect()
}

fn descriptor_tokens(ty: &Type) -> Option<TokenStream2> {
    match classify_type(ty) {
        TypeKind::Schema(t) => Some(quote! { ::appkit::schema::TypeDescriptor::of::<#t>() }),
        TypeKind::Opaque(label) => Some(quote! { ::appkit::schema::TypeDescriptor::opaque(#label) }),
        TypeKind::Untyped => None,
    }
}

fn endpoint_def(
    self_ty: &Type,
    method: &ImplItemFn,
    args: EndpointArgs,
) -> syn::Result<TokenStream2> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "endpoint methods must be synchronous; they run on a blocking worker",
        ));
    }
    match receiver_of(method) {
        Receiver::Ref => {}
        Receiver::RefMut => {
            return Err(syn::Error::new_spanned(
                &sig.inputs,
                "endpoint methods take `&self`; the instance is shared by every request, use interior mutability for state",
            ));
        }
        Receiver::None | Receiver::Value => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "endpoint methods must take `&self`",
            ));
        }
    }

    let method_ident = &sig.ident;
    let name = method_ident.unraw().to_string();
    let params = typed_params(method);

    let param_calls = params.iter().map(|(pat, ty)| {
        let pname = param_name(pat);
        match descriptor_tokens(ty) {
            Some(td) => quote! { .param(#pname, ::core::option::Option::Some(#td)) },
            None => quote! { .param(#pname, ::core::option::Option::None) },
        }
    });

    // `-> Result<T, E>` describes `T`; `()` counts as no return type.
    let (output, fallible) = match &sig.output {
        ReturnType::Default => (None, false),
        ReturnType::Type(_, ty) => match result_ok_type(ty) {
            Some(ok) => (Some(ok), true),
            None => (Some(ty.as_ref()), false),
        },
    };
    let output = output.filter(|t| !is_unit(t));
    let returns_call = output
        .and_then(descriptor_tokens)
        .map(|td| quote! { .returns(#td) });

    let invoker_call = match (params.as_slice(), output) {
        ([(_, in_ty)], Some(_)) if matches!(classify_type(in_ty), TypeKind::Schema(_)) => {
            let ctor = if fallible {
                quote! { new }
            } else {
                quote! { infallible }
            };
            Some(quote! {
                .invoker(::appkit::handler::EndpointInvoker::#ctor(
                    |app: &#self_ty, input: #in_ty| app.#method_ident(input)
                ))
            })
        }
        _ => None,
    };

    let path_call = args.path.map(|p| quote! { .path(#p) });

    Ok(quote! {
        registry.tag_endpoint(
            ::appkit::registry::EndpointDef::new::<#self_ty>(#name)
                #path_call
                #(#param_calls)*
                #returns_call
                #invoker_call
        );
    })
}

fn hook_def(self_ty: &Type, method: &ImplItemFn) -> syn::Result<TokenStream2> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "lifecycle hooks must be synchronous",
        ));
    }
    match receiver_of(method) {
        Receiver::Ref | Receiver::RefMut => {}
        Receiver::None | Receiver::Value => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "lifecycle hooks must take `&mut self` or `&self`",
            ));
        }
    }

    let method_ident = &sig.ident;
    let name = method_ident.unraw().to_string();
    let params = typed_params(method);
    let param_calls = params.iter().map(|(pat, _)| {
        let pname = param_name(pat);
        quote! { .param(#pname) }
    });

    // Hooks must return nothing: `()`, `Result<(), E>`. Anything else is recorded by name.
    let (returned, fallible) = match &sig.output {
        ReturnType::Default => (None, false),
        ReturnType::Type(_, ty) => match result_ok_type(ty) {
            Some(ok) => (Some(ok), true),
            None => (Some(ty.as_ref()), false),
        },
    };
    let returned = returned.filter(|t| !is_unit(t));
    let returns_call = returned.map(|t| {
        let label = type_label(t);
        quote! { .returns(::appkit::schema::TypeDescriptor::opaque(#label)) }
    });

    let invoker_call = if params.is_empty() {
        let invoker = if fallible {
            quote! {
                ::appkit::handler::HookInvoker::new(|app: &mut #self_ty| {
                    app.#method_ident().map(|_| ())
                })
            }
        } else {
            quote! {
                ::appkit::handler::HookInvoker::infallible(|app: &mut #self_ty| {
                    let _ = app.#method_ident();
                })
            }
        };
        Some(quote! { .invoker(#invoker) })
    } else {
        None
    };

    Ok(quote! {
        .hook(
            ::appkit::registry::HookDef::new(#name)
                #(#param_calls)*
                #returns_call
                #invoker_call
        )
    })
}

fn registrator_ident(self_ty: &Type) -> syn::Result<proc_macro2::Ident> {
    let Type::Path(tp) = self_ty else {
        return Err(syn::Error::new_spanned(
            self_ty,
            "#[app] must be placed on an inherent impl of a named type",
        ));
    };
    let last = tp.path.segments.last().ok_or_else(|| {
        syn::Error::new_spanned(self_ty, "#[app] must be placed on an impl of a named type")
    })?;
    let snake = last.ident.unraw().to_string().to_snake_case();
    Ok(format_ident!("__{}_registrator", snake))
}

fn expand_app(args: AppArgs, mut item: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, trait_path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            trait_path,
            "#[app] must be placed on an inherent impl block, not a trait impl",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[app] does not support generic app types",
        ));
    }

    let self_ty = item.self_ty.as_ref().clone();
    let registrator = registrator_ident(&self_ty)?;

    let mut endpoint_defs = Vec::new();
    let mut hook_defs = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        if let Some(endpoint) = take_endpoint_attr(method)? {
            endpoint_defs.push(endpoint_def(&self_ty, method, endpoint)?);
        } else if HOOKS.iter().any(|h| method.sig.ident == *h) {
            hook_defs.push(hook_def(&self_ty, method)?);
        }
    }

    let name_call = args.name.map(|n| quote! { .name(#n) });
    let requirements_call = args
        .requirements
        .map(|r| quote! { .requirements_value(::appkit::serde_json::json!(#r)) });

    Ok(quote! {
        #item

        impl ::appkit::contracts::App for #self_ty {
            fn register(
                registry: &::appkit::registry::Registry,
            ) -> ::core::result::Result<(), ::appkit::registry::RegistryError> {
                #(#endpoint_defs)*
                registry.register(
                    ::appkit::registry::AppSpec::of::<#self_ty>()
                        #name_call
                        #requirements_call
                        #(#hook_defs)*
                )?;
                ::core::result::Result::Ok(())
            }
        }

        #[doc(hidden)]
        fn #registrator(
            registry: &::appkit::registry::Registry,
        ) -> ::core::result::Result<(), ::appkit::registry::RegistryError> {
            <#self_ty as ::appkit::contracts::App>::register(registry)
        }

        ::appkit::inventory::submit! {
            ::appkit::contracts::AppRegistrator(#registrator)
        }
    })
}

/// Declare the process's single app on an inherent `impl` block.
///
/// - `name = "..."`: display name (defaults to the type name)
/// - `requirements = ["pkg>=1.0", ...]`: package specifiers installed before the app loads
///
/// Methods tagged `#[endpoint]` or `#[endpoint(path = "/x")]` become routes; methods
/// named `setup` and `download_weights` become lifecycle hooks. The type must
/// implement `Default`.
///
/// Endpoints and hooks may return `Result<T, E>`. `E` must convert into
/// `anyhow::Error`, which every `std::error::Error + Send + Sync + 'static` does.
/// A plain `String` or other Display-only error does not; wrap it with
/// `anyhow::anyhow!` or return `anyhow::Result<T>` instead.
#[proc_macro_attribute]
pub fn app(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AppArgs);
    let item = match syn::parse::<ItemImpl>(item) {
        Ok(item) => item,
        Err(e) => {
            return syn::Error::new(
                e.span(),
                "#[app] must be placed on an impl block, e.g. #[app] impl MyApp { ... }",
            )
            .to_compile_error()
            .into();
        }
    };
    expand_app(args, item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Marks an endpoint method. Only meaningful inside an `#[app]` impl block,
/// which consumes it.
#[proc_macro_attribute]
pub fn endpoint(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = TokenStream2::from(item);
    let span = item
        .clone()
        .into_iter()
        .next()
        .map_or_else(Span::call_site, |first| first.span());
    let mut out: TokenStream2 = syn::Error::new(
        span,
        "#[endpoint] must be used on a method inside an #[appkit::app] impl block",
    )
    .to_compile_error();
    out.extend(item);
    out.into()
}
