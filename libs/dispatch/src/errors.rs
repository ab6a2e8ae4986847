use gsm_core::{ProviderError, StoreError};
use gsm_provider_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Registry(err) => err.code(),
            DispatchError::Provider(err) => err.code(),
            DispatchError::Store(StoreError::NotFound(_)) => "not_found",
            DispatchError::Store(_) => "store_error",
        }
    }
}
