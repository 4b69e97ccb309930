//! Custom Resource Definitions consumed by Warden
//!
//! Warden never writes these objects; it watches them and turns them into
//! typed authorization facts.

mod user;
mod user_binding;

pub use user::{User, UserSpec};
pub use user_binding::{
    BindingSubject, ConstraintTuple, UserBinding, UserBindingCondition, UserBindingSpec,
    UserBindingStatus,
};

use std::collections::BTreeMap;

/// Look up a non-empty value in an optional label or annotation map
pub(crate) fn non_empty<'a>(
    map: Option<&'a BTreeMap<String, String>>,
    key: &str,
) -> Option<&'a str> {
    map.and_then(|m| m.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
