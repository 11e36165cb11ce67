//! Key composition from caller-supplied fragments.

use std::borrow::Cow;

/// Strategy combining key fragments into one canonical key.
///
/// Implementations may borrow from the fragments when no copy is needed. Any
/// `Fn(&[&str]) -> String` closure qualifies.
pub trait KeyComposer: Send + Sync {
    fn compose<'a>(&self, parts: &[&'a str]) -> Cow<'a, str>;
}

impl<F> KeyComposer for F
where
    F: Fn(&[&str]) -> String + Send + Sync,
{
    fn compose<'a>(&self, parts: &[&'a str]) -> Cow<'a, str> {
        Cow::Owned(self(parts))
    }
}

/// Ordered concatenation, the default composer.
///
/// Zero parts compose to `""`, a single part is borrowed as-is, anything else
/// is copied once into a buffer sized to the total length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Concat;

impl KeyComposer for Concat {
    #[inline]
    fn compose<'a>(&self, parts: &[&'a str]) -> Cow<'a, str> {
        match parts {
            [] => Cow::Borrowed(""),
            [only] => Cow::Borrowed(*only),
            _ => {
                let total = parts.iter().map(|part| part.len()).sum();
                let mut key = String::with_capacity(total);
                for part in parts {
                    key.push_str(part);
                }
                Cow::Owned(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_empty() {
        let key = Concat.compose(&[]);
        assert_eq!(key, "");
        assert!(matches!(key, Cow::Borrowed(_)));
    }

    #[test]
    fn test_concat_single_part_borrows() {
        let part = String::from("user:42");
        let key = Concat.compose(&[part.as_str()]);
        assert!(matches!(key, Cow::Borrowed(_)));
        assert_eq!(key.as_ptr(), part.as_ptr());
    }

    #[test]
    fn test_concat_in_order() {
        let key = Concat.compose(&["a", "b", "c"]);
        assert_eq!(key, "abc");
        assert_eq!(key.len(), 3);

        let key = Concat.compose(&["user:", "", "42"]);
        assert_eq!(key, "user:42");
    }

    #[test]
    fn test_closure_composer() {
        let joined = |parts: &[&str]| parts.join("/");
        assert_eq!(joined.compose(&["tenant", "user", "42"]), "tenant/user/42");
    }
}
