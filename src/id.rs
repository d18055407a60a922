//! Code for handling IDs
use uuid::Uuid;

/// Define a new string ID type.
///
/// IDs are ordered so that anything keyed by them can be sorted into a deterministic order.
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `FacilityID`, `RegionID`, etc.)
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::rc::Rc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::rc::Rc::from(id))
            }
        }
    };
}
pub(crate) use define_id_type;

#[cfg(test)]
define_id_type!(GenericID);

/// Derive a version 3 UUID from a path of name parts.
///
/// The parts are trimmed, joined with `/` and lower-cased before hashing in the OID namespace, so
/// the same parts always give the same UUID regardless of case or surrounding whitespace.
pub fn deterministic_uuid<S: AsRef<str>>(parts: &[S]) -> String {
    let path = parts
        .iter()
        .map(|part| part.as_ref().trim())
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase();
    Uuid::new_v3(&Uuid::NAMESPACE_OID, path.as_bytes()).to_string()
}
