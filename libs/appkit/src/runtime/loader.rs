use crate::contracts::AppRegistrator;
use crate::registry::{AppType, Registry};

use super::RuntimeError;

/// Reset `registry` and run every `#[app]` registrator linked into the binary.
pub fn load_app(registry: &Registry) -> Result<AppType, RuntimeError> {
    load_from(registry, inventory::iter::<AppRegistrator>)
}

pub(crate) fn load_from<'a, I>(registry: &Registry, registrators: I) -> Result<AppType, RuntimeError>
where
    I: IntoIterator<Item = &'a AppRegistrator>,
{
    registry.reset();
    for registrator in registrators {
        (registrator.0)(registry)?;
    }

    let app = registry.registered().ok_or(RuntimeError::NoApp)?;
    tracing::info!(
        app = %app.name,
        endpoints = registry.list_endpoints(&app.app_type).len(),
        "App loaded"
    );
    Ok(app.app_type.clone())
}
