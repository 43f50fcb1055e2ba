use std::any::type_name;
use std::borrow::Cow;
use std::fmt;

/// Identity of the kind of component holding a port.
///
/// Two acquisitions share a handle only when their tags are equal. Tags are
/// usually derived from a type with [`OwnerTag::of`], so every instance of a
/// driver struct competes for ports as the same owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerTag(Cow<'static, str>);

impl OwnerTag {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Tag named after the type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for OwnerTag {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OwnerTag {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thermometer;
    struct Barometer;

    #[test]
    fn test_type_tags_differ_per_type() {
        assert_eq!(OwnerTag::of::<Thermometer>(), OwnerTag::of::<Thermometer>());
        assert_ne!(OwnerTag::of::<Thermometer>(), OwnerTag::of::<Barometer>());
        assert!(OwnerTag::of::<Thermometer>().as_str().ends_with("Thermometer"));
    }

    #[test]
    fn test_static_and_owned_names_compare_equal() {
        assert_eq!(OwnerTag::from("tester"), OwnerTag::from("tester".to_string()));
        assert_eq!(OwnerTag::new("tester").to_string(), "tester");
    }
}
