//! Service descriptor catalog and key resolution (spec C2 Service
//! Registry, C3 Key Resolver).

mod catalog;
mod descriptor;
mod error;
mod resolver;

pub use catalog::{descriptor_by_type, descriptor_for, descriptors};
pub use descriptor::{ConfigFormat, KeyContext, KeyShape, Scope, ServiceDescriptor};
pub use error::{RegistryError, Result};
pub use resolver::{fallback_key_for_path, qualify_kv_key, resolve_kv_key};
