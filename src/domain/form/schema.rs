//! Form schema contract.
//!
//! # Design
//!
//! A form is any plain serde struct. The engine never inspects concrete
//! fields; it works against this trait, which supplies the schema name
//! and a field listing the generation service uses to understand what
//! it is filling in.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Description of one form field, shown to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty,
            description,
        }
    }
}

/// A user-defined form that the engine fills progressively.
///
/// `Default` is the empty form a fresh session starts from.
pub trait FormModel:
    Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable schema name, recorded on the session row.
    fn schema_name() -> &'static str;

    /// Field listing used to describe the form to the generation service.
    fn field_specs() -> Vec<FieldSpec>;
}
