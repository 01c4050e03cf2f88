//! URL-safe record names derived from upstream identifiers

/// Lowercases `input` and collapses every run of characters outside
/// `[a-z0-9]` into a single `-`, trimming dashes at both ends.
///
/// Distinct inputs can share a slug (`1.0.0` and `1-0-0`); callers key
/// records by slug, so the last one written wins.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("acme/widgets", "acme-widgets")]
    #[case("Neos/Neos.Ui", "neos-neos-ui")]
    #[case("1.0.0", "1-0-0")]
    #[case("v2.0.0-beta1", "v2-0-0-beta1")]
    #[case("dev-master", "dev-master")]
    #[case("Jane Doe", "jane-doe")]
    #[case("--weird__name--", "weird-name")]
    #[case("", "")]
    fn slugify_returns_expected(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }
}
