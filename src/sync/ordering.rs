//! Sort rules for list views.

use std::cmp::Ordering;

/// Compare two rows by a nullable key, then by title.
///
/// Rows with a key sort before rows without one. Equal keys, or two missing
/// keys, fall back to a case-insensitive title comparison.
#[must_use]
pub fn nullable_key_then_title<K: Ord>(
    a_key: Option<&K>,
    a_title: &str,
    b_key: Option<&K>,
    b_title: &str,
) -> Ordering {
    let by_key = match (a_key, b_key) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_key.then_with(|| compare_titles(a_title, b_title))
}

/// Case-insensitive title comparison.
#[must_use]
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Stable sort of `items` by [`nullable_key_then_title`].
pub fn sort_by_nullable_key<T, K, FK, FT>(items: &mut [T], key: FK, title: FT)
where
    K: Ord,
    FK: Fn(&T) -> Option<&K>,
    FT: Fn(&T) -> &str,
{
    items.sort_by(|a, b| nullable_key_then_title(key(a), title(a), key(b), title(b)));
}
