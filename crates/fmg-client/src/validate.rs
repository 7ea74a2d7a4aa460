//! Name validation for values interpolated into request URLs
//!
//! Errors name the field and the rule that failed, never the rejected value.

use crate::error::{FmgError, Result};

fn check(
    field: &str,
    value: &str,
    max_len: usize,
    allowed: impl Fn(char) -> bool,
    rule: &str,
) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > max_len {
        return Err(FmgError::validation(
            field,
            format!("must be 1-{} characters", max_len),
        ));
    }
    if !value.chars().all(allowed) {
        return Err(FmgError::validation(field, format!("may only contain {}", rule)));
    }
    Ok(())
}

/// ADOM names: letters, digits, `_` and `-`, up to 64 characters.
pub fn validate_adom(adom: &str) -> Result<()> {
    check(
        "adom",
        adom,
        64,
        |c| c.is_ascii_alphanumeric() || c == '_' || c == '-',
        "letters, digits, '_' and '-'",
    )
}

/// Device names, optionally suffixed with `[vdom]`.
pub fn validate_device(device: &str) -> Result<()> {
    let (name, vdom) = match device.split_once('[') {
        Some((name, rest)) => match rest.strip_suffix(']') {
            Some(vdom) => (name, Some(vdom)),
            None => return Err(FmgError::validation("device", "unterminated vdom suffix")),
        },
        None => (device, None),
    };

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    check("device", name, 64, allowed, "letters, digits, '_', '.' and '-'")?;
    if let Some(vdom) = vdom {
        check("vdom", vdom, 64, allowed, "letters, digits, '_', '.' and '-'")?;
    }
    Ok(())
}

/// Policy package names: letters, digits, `_` and `-`, up to 35 characters.
pub fn validate_package(package: &str) -> Result<()> {
    check(
        "package",
        package,
        35,
        |c| c.is_ascii_alphanumeric() || c == '_' || c == '-',
        "letters, digits, '_' and '-'",
    )
}

/// Firewall object names: letters, digits, `_`, `.`, `-` and spaces, up to 79 characters.
pub fn validate_object_name(name: &str) -> Result<()> {
    check(
        "name",
        name,
        79,
        |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ' '),
        "letters, digits, '_', '.', '-' and spaces",
    )
}

/// Script names allow the same characters as object names.
pub fn validate_script_name(name: &str) -> Result<()> {
    validate_object_name(name).map_err(|_| {
        FmgError::validation(
            "script",
            "must be 1-79 letters, digits, '_', '.', '-' or spaces",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adom() {
        assert!(validate_adom("root").is_ok());
        assert!(validate_adom("Branch_Offices-2").is_ok());
        assert!(validate_adom("").is_err());
        assert!(validate_adom("root/../x").is_err());
        assert!(validate_adom(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_device_with_vdom() {
        assert!(validate_device("FGT-60F.branch").is_ok());
        assert!(validate_device("FGT60F[root]").is_ok());
        assert!(validate_device("FGT60F[root").is_err());
        assert!(validate_device("FGT 60F").is_err());
    }

    #[test]
    fn test_package_and_object() {
        assert!(validate_package("default").is_ok());
        assert!(validate_package(&"p".repeat(36)).is_err());
        assert!(validate_object_name("Web Servers 10.0.0.0").is_ok());
        assert!(validate_object_name("bad\"name").is_err());
    }

    #[test]
    fn test_error_does_not_echo_value() {
        let err = validate_adom("secret$value").unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }
}
