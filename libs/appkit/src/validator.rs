//! Contract validation: checks that the registered app and its endpoints form
//! well-typed request/response contracts. Fails fast on the first problem.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::registry::{
    AppDescriptor, AppType, EndpointDescriptor, HookDescriptor, Registry, DOWNLOAD_WEIGHTS_HOOK,
    SETUP_HOOK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Endpoint contracts only (serving).
    #[default]
    Standard,
    /// Also requires `setup()` and `download_weights()` hooks (building).
    Strict,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointValidationError {
    #[error("{app} must be decorated as an app with #[appkit::app]")]
    NotAnApp { app: String },
    #[error("App {app} must have at least one endpoint method (#[endpoint])")]
    NoEndpoints { app: String },
    #[error("Endpoint method {method}() must accept an input parameter")]
    MissingInputParameter { method: String },
    #[error("Endpoint method {method}() must have a type hint for input parameter '{param}'")]
    MissingInputTypeHint { method: String, param: String },
    #[error("Endpoint method {method}() must have a return type hint")]
    MissingReturnTypeHint { method: String },
    #[error("Endpoint method {method}(): input type must be a schema-validated record type, got {actual}")]
    InputNotRecord { method: String, actual: String },
    #[error("Endpoint method {method}(): return type must be a schema-validated record type, got {actual}")]
    OutputNotRecord { method: String, actual: String },
    #[error("Endpoint method {method}() has an invalid path '{path}': {reason}")]
    InvalidPath {
        method: String,
        path: String,
        reason: &'static str,
    },
    #[error("Duplicate endpoint path '{path}' found in methods {first}() and {second}()")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },
    #[error("App {app} must define a {hook}() method")]
    MissingHook { app: String, hook: String },
    #[error("App {app} {hook}() must only accept 'self', found [{}]", receiver_and(.params))]
    HookParameters {
        app: String,
        hook: String,
        params: Vec<String>,
    },
    #[error("App {app} {hook}() must return nothing, got {actual}")]
    HookReturn {
        app: String,
        hook: String,
        actual: String,
    },
}

fn receiver_and(params: &[String]) -> String {
    std::iter::once("self")
        .chain(params.iter().map(String::as_str))
        .map(|p| format!("'{p}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate `app_type` against the registry. Returns the registered descriptor
/// and its endpoints sorted by name.
pub fn validate(
    registry: &Registry,
    app_type: &AppType,
    mode: ValidationMode,
) -> Result<(Arc<AppDescriptor>, Vec<Arc<EndpointDescriptor>>), EndpointValidationError> {
    let app = registry
        .descriptor(app_type)
        .ok_or_else(|| EndpointValidationError::NotAnApp {
            app: app_type.name().to_string(),
        })?;

    let mut endpoints = registry.list_endpoints(app_type);
    if endpoints.is_empty() {
        return Err(EndpointValidationError::NoEndpoints {
            app: app_type.name().to_string(),
        });
    }
    endpoints.sort_by(|a, b| a.name.cmp(&b.name));

    for endpoint in &endpoints {
        check_endpoint(endpoint)?;
        check_path(endpoint)?;
    }
    check_unique_paths(&endpoints)?;

    if mode == ValidationMode::Strict {
        for hook in [SETUP_HOOK, DOWNLOAD_WEIGHTS_HOOK] {
            check_hook(&app, app.hook(hook), hook)?;
        }
    }

    tracing::debug!(
        app = %app.name,
        endpoints = endpoints.len(),
        ?mode,
        "App contract validated"
    );
    Ok((app, endpoints))
}

fn check_endpoint(endpoint: &EndpointDescriptor) -> Result<(), EndpointValidationError> {
    let method = || endpoint.name.clone();

    let param = endpoint
        .signature
        .first_param()
        .ok_or_else(|| EndpointValidationError::MissingInputParameter { method: method() })?;
    let input = param
        .ty
        .as_ref()
        .ok_or_else(|| EndpointValidationError::MissingInputTypeHint {
            method: method(),
            param: param.name.clone(),
        })?;
    let output = endpoint
        .output_type()
        .ok_or_else(|| EndpointValidationError::MissingReturnTypeHint { method: method() })?;

    if !input.is_record() {
        return Err(EndpointValidationError::InputNotRecord {
            method: method(),
            actual: input.name().to_string(),
        });
    }
    if !output.is_record() {
        return Err(EndpointValidationError::OutputNotRecord {
            method: method(),
            actual: output.name().to_string(),
        });
    }
    Ok(())
}

/// Endpoint paths are literal routes: no captures, wildcards or query syntax.
fn check_path(endpoint: &EndpointDescriptor) -> Result<(), EndpointValidationError> {
    let invalid = |reason| EndpointValidationError::InvalidPath {
        method: endpoint.name.clone(),
        path: endpoint.path.clone(),
        reason,
    };
    let path = endpoint.path.as_str();
    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if rest.is_empty() {
        return Err(invalid("must name at least one segment"));
    }
    if path
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#'))
    {
        return Err(invalid("must not contain whitespace, '?' or '#'"));
    }
    if path.contains(['{', '}']) {
        return Err(invalid("must not contain route captures"));
    }
    let segments: Vec<&str> = rest.strip_suffix('/').unwrap_or(rest).split('/').collect();
    for segment in segments {
        if segment.is_empty() {
            return Err(invalid("must not contain empty segments"));
        }
        if segment.starts_with([':', '*']) {
            return Err(invalid("segments must not start with ':' or '*'"));
        }
    }
    Ok(())
}

fn check_unique_paths(endpoints: &[Arc<EndpointDescriptor>]) -> Result<(), EndpointValidationError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for endpoint in endpoints {
        if let Some(first) = seen.insert(&endpoint.path, &endpoint.name) {
            return Err(EndpointValidationError::DuplicatePath {
                path: endpoint.path.clone(),
                first: first.to_string(),
                second: endpoint.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_hook(
    app: &AppDescriptor,
    hook: Option<&HookDescriptor>,
    name: &str,
) -> Result<(), EndpointValidationError> {
    let app_name = || app.app_type.name().to_string();
    let hook = hook.ok_or_else(|| EndpointValidationError::MissingHook {
        app: app_name(),
        hook: name.to_string(),
    })?;
    if !hook.params.is_empty() {
        return Err(EndpointValidationError::HookParameters {
            app: app_name(),
            hook: name.to_string(),
            params: hook.params.clone(),
        });
    }
    if let Some(returns) = &hook.returns {
        return Err(EndpointValidationError::HookReturn {
            app: app_name(),
            hook: name.to_string(),
            actual: returns.name().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AppSpec, EndpointDef, HookDef};
    use crate::schema::TypeDescriptor;
    use std::collections::HashMap as Map;

    #[allow(dead_code)]
    #[derive(utoipa::ToSchema)]
    struct TwoNumbers {
        a: i64,
        b: i64,
    }

    #[allow(dead_code)]
    #[derive(utoipa::ToSchema)]
    struct Sum {
        result: i64,
    }

    #[derive(Default)]
    struct Calc;

    #[derive(Default)]
    struct NotRegistered;

    fn typed(name: &str) -> EndpointDef {
        EndpointDef::new::<Calc>(name)
            .param("input", Some(TypeDescriptor::of::<TwoNumbers>()))
            .returns(TypeDescriptor::of::<Sum>())
    }

    fn registry_with(defs: Vec<EndpointDef>) -> Registry {
        let reg = Registry::new();
        reg.register(AppSpec::of::<Calc>()).unwrap();
        for def in defs {
            reg.tag_endpoint(def);
        }
        reg
    }

    fn check(reg: &Registry) -> Result<(), EndpointValidationError> {
        validate(reg, &AppType::of::<Calc>(), ValidationMode::Standard).map(|_| ())
    }

    #[test]
    fn well_formed_app_passes_with_sorted_endpoints() {
        let reg = registry_with(vec![typed("subtract"), typed("add")]);
        let (app, endpoints) =
            validate(&reg, &AppType::of::<Calc>(), ValidationMode::Standard).unwrap();
        assert_eq!(app.name, "Calc");
        let names: Vec<_> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["add", "subtract"]);
    }

    #[test]
    fn unregistered_type_is_not_an_app() {
        let reg = registry_with(vec![typed("add")]);
        let err = validate(&reg, &AppType::of::<NotRegistered>(), ValidationMode::Standard)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "NotRegistered must be decorated as an app with #[appkit::app]"
        );
    }

    #[test]
    fn app_without_endpoints_fails() {
        let reg = registry_with(vec![]);
        let err = check(&reg).unwrap_err();
        assert!(err.to_string().contains("must have at least one endpoint"));
    }

    #[test]
    fn missing_input_parameter() {
        let reg = registry_with(vec![
            EndpointDef::new::<Calc>("run").returns(TypeDescriptor::of::<Sum>())
        ]);
        let err = check(&reg).unwrap_err();
        assert_eq!(err.to_string(), "Endpoint method run() must accept an input parameter");
    }

    #[test]
    fn untyped_input_parameter() {
        let reg = registry_with(vec![EndpointDef::new::<Calc>("run")
            .param("data", None)
            .returns(TypeDescriptor::of::<Sum>())]);
        let err = check(&reg).unwrap_err();
        assert!(
            err.to_string().contains("type hint for input parameter 'data'"),
            "{err}"
        );
    }

    #[test]
    fn missing_return_type() {
        let reg = registry_with(vec![EndpointDef::new::<Calc>("run")
            .param("input", Some(TypeDescriptor::of::<TwoNumbers>()))]);
        let err = check(&reg).unwrap_err();
        assert_eq!(
            err,
            EndpointValidationError::MissingReturnTypeHint {
                method: "run".into()
            }
        );
    }

    #[test]
    fn primitive_input_is_named() {
        let reg = registry_with(vec![EndpointDef::new::<Calc>("echo")
            .param("text", Some(TypeDescriptor::of::<String>()))
            .returns(TypeDescriptor::of::<Sum>())]);
        let err = check(&reg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Endpoint method echo(): input type must be a schema-validated record type, got String"
        );
    }

    #[test]
    fn map_output_is_named() {
        let reg = registry_with(vec![EndpointDef::new::<Calc>("counts")
            .param("input", Some(TypeDescriptor::of::<TwoNumbers>()))
            .returns(TypeDescriptor::of::<Map<String, i64>>())]);
        let err = check(&reg).unwrap_err();
        match err {
            EndpointValidationError::OutputNotRecord { method, actual } => {
                assert_eq!(method, "counts");
                assert_eq!(actual, "HashMap<String, i64>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn first_failing_endpoint_by_name_is_reported() {
        let reg = registry_with(vec![
            EndpointDef::new::<Calc>("zeta"),
            EndpointDef::new::<Calc>("alpha").param("x", None),
        ]);
        let err = check(&reg).unwrap_err();
        assert!(matches!(
            err,
            EndpointValidationError::MissingInputTypeHint { ref method, .. } if method == "alpha"
        ));
    }

    #[test]
    fn duplicate_paths_name_both_methods() {
        let reg = registry_with(vec![typed("add").path("/calc"), typed("sum").path("/calc")]);
        let err = check(&reg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate endpoint path '/calc' found in methods add() and sum()"
        );
    }

    #[test]
    fn explicit_path_colliding_with_a_default_names_both_methods() {
        let reg = registry_with(vec![typed("add"), typed("plus").path("add")]);
        let err = check(&reg).unwrap_err();
        assert_eq!(
            err,
            EndpointValidationError::DuplicatePath {
                path: "/add".into(),
                first: "add".into(),
                second: "plus".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Duplicate endpoint path '/add' found in methods add() and plus()"
        );

        let reg = registry_with(vec![typed("add"), typed("sum").path("/add")]);
        let err = check(&reg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate endpoint path '/add' found in methods add() and sum()"
        );
    }

    #[test]
    fn route_syntax_in_paths_is_rejected() {
        let cases = [
            ("/:item", "segments must not start with ':' or '*'"),
            ("/v1/*rest", "segments must not start with ':' or '*'"),
            ("/items/{id}", "must not contain route captures"),
            ("/a//b", "must not contain empty segments"),
            ("/", "must name at least one segment"),
            ("/add?x=1", "must not contain whitespace, '?' or '#'"),
            ("/two words", "must not contain whitespace, '?' or '#'"),
        ];
        for (path, reason) in cases {
            let reg = registry_with(vec![typed("add").path(path)]);
            let err = check(&reg).unwrap_err();
            assert_eq!(
                err,
                EndpointValidationError::InvalidPath {
                    method: "add".into(),
                    path: path.into(),
                    reason,
                },
                "{path}"
            );
        }
    }

    #[test]
    fn literal_paths_with_colons_and_trailing_slashes_pass() {
        let reg = registry_with(vec![
            typed("add").path("/v1:predict"),
            typed("sum").path("/counter/increment/"),
        ]);
        assert!(check(&reg).is_ok());
    }

    fn strict_registry(spec: AppSpec) -> Registry {
        let reg = Registry::new();
        reg.register(spec).unwrap();
        reg.tag_endpoint(typed("add"));
        reg
    }

    fn check_strict(reg: &Registry) -> Result<(), EndpointValidationError> {
        validate(reg, &AppType::of::<Calc>(), ValidationMode::Strict).map(|_| ())
    }

    #[test]
    fn strict_requires_both_hooks() {
        let reg = strict_registry(AppSpec::of::<Calc>().hook(HookDef::setup()));
        let err = check_strict(&reg).unwrap_err();
        assert_eq!(err.to_string(), "App Calc must define a download_weights() method");
        assert!(check(&reg).is_ok());
    }

    #[test]
    fn strict_rejects_hook_parameters() {
        let reg = strict_registry(
            AppSpec::of::<Calc>()
                .hook(HookDef::setup().param("config"))
                .hook(HookDef::download_weights()),
        );
        let err = check_strict(&reg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "App Calc setup() must only accept 'self', found ['self', 'config']"
        );
    }

    #[test]
    fn strict_rejects_hook_return_values() {
        let reg = strict_registry(
            AppSpec::of::<Calc>()
                .hook(HookDef::setup())
                .hook(HookDef::download_weights().returns(TypeDescriptor::opaque("String"))),
        );
        let err = check_strict(&reg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "App Calc download_weights() must return nothing, got String"
        );
    }

    #[test]
    fn strict_accepts_well_formed_hooks() {
        let reg = strict_registry(
            AppSpec::of::<Calc>()
                .hook(HookDef::setup())
                .hook(HookDef::download_weights()),
        );
        assert!(check_strict(&reg).is_ok());
    }
}
