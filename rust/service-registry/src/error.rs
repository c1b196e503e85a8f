use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no service descriptor registered for {name}")]
    DescriptorNotFound { name: String },

    #[error("service type {service_type} is ambiguous without a scope")]
    AmbiguousServiceType { service_type: String },

    #[error("no service descriptor for type {service_type} with scope {scope}")]
    DescriptorNotFoundForType { service_type: String, scope: String },

    #[error("missing required identity: {field}")]
    MissingIdentity { field: &'static str },

    #[error("resolved key still contains an unresolved placeholder: {key}")]
    UnresolvedPlaceholder { key: String },
}
