use std::any::Any;

use crate::registry::{AppType, Registry, RegistryError};

/// A user-authored app type. Implemented by `#[appkit::app]`, or by hand using
/// the registry builders.
pub trait App: Any + Send + Sync {
    /// Tag this type's endpoints and register it as the app.
    fn register(registry: &Registry) -> Result<(), RegistryError>
    where
        Self: Sized;

    fn app_type() -> AppType
    where
        Self: Sized,
    {
        AppType::of::<Self>()
    }
}

/// The function type submitted by the macro via `inventory::submit!`.
pub struct AppRegistrator(pub fn(&Registry) -> Result<(), RegistryError>);

inventory::collect!(AppRegistrator);
