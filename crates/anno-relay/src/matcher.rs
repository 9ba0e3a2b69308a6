//! Tag filter evaluation.

/// Returns true if every tag in `subscription_tags` is present in
/// `event_tags`.
///
/// Comparison is exact string equality. Extra event tags are ignored and an
/// empty subscription matches every event.
#[must_use]
pub fn matches<E, S>(event_tags: &[E], subscription_tags: &[S]) -> bool
where
    E: AsRef<str>,
    S: AsRef<str>,
{
    subscription_tags
        .iter()
        .all(|want| event_tags.iter().any(|have| have.as_ref() == want.as_ref()))
}
