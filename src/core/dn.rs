//! Distinguished-name helpers.
//!
//! A DN is built from an identity attribute value plus a fixed sub-tree
//! context, e.g. `cn=foo,ou=groups,o=example`. Directory servers compare
//! names case-insensitively, so every comparison here folds case.

/// Construct a DN from an id attribute name, its value and a context.
pub fn build(id_attr: &str, id_value: &str, context: &str) -> String {
    format!("{id_attr}={id_value},{context}")
}

/// True if `dn` lies within the sub-tree rooted at `context` (the root
/// itself included).
pub fn within_context(dn: &str, context: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let context = context.to_ascii_lowercase();
    dn == context || dn.ends_with(&format!(",{context}"))
}

/// Case-insensitive DN equality.
pub fn equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        assert_eq!(
            build("cn", "foo", "ou=groups,o=example"),
            "cn=foo,ou=groups,o=example"
        );
    }

    #[test]
    fn test_within_context() {
        assert!(within_context("cn=foo,ou=groups,o=example", "ou=groups,o=example"));
        assert!(within_context("cn=Foo,OU=Groups,o=example", "ou=groups,o=example"));
        assert!(within_context("ou=groups,o=example", "ou=groups,o=example"));
        assert!(!within_context("cn=foo,ou=people,o=example", "ou=groups,o=example"));
        // suffix match must respect component boundaries
        assert!(!within_context("cn=foo,xou=groups,o=example", "ou=groups,o=example"));
    }

    #[test]
    fn test_equal() {
        assert!(equal("CN=Foo,O=Example", "cn=foo,o=example"));
        assert!(!equal("cn=foo,o=example", "cn=bar,o=example"));
    }
}
