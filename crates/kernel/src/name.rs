//! World name rules.
//!
//! A valid name consists only of ASCII letters, digits, `/`, `_` and `-`.
//! `/` separates nested directories and may not lead, trail or repeat, so a
//! name is always a relative path inside the world container and no two
//! spellings of one directory exist.
//! Interactive creation sanitizes user input; import and rename reject it.

/// Errors raised by name validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("world name {name:?} contains invalid character {character:?}")]
    InvalidCharacter { name: String, character: char },
    #[error("world name is empty")]
    EmptyName,
}

pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-')
}

/// Turn free-form input into a valid name: spaces become underscores, every
/// other disallowed character is dropped and empty path segments collapse.
pub fn sanitize(input: &str) -> Result<String, NameError> {
    let name: String = input
        .trim()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| is_allowed_char(*c))
        .collect();
    let name = name
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if name.is_empty() {
        return Err(NameError::EmptyName);
    }
    Ok(name)
}

/// Check a name as-is, reporting the first disallowed character. A `/` that
/// leads, trails or follows another `/` is reported as disallowed.
pub fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::EmptyName);
    }
    let invalid = |character| NameError::InvalidCharacter {
        name: name.to_string(),
        character,
    };
    if let Some(character) = name.chars().find(|c| !is_allowed_char(*c)) {
        return Err(invalid(character));
    }
    if name.split('/').any(str::is_empty) {
        return Err(invalid('/'));
    }
    Ok(())
}

/// Whether `inner` names a directory nested inside `outer`'s directory,
/// compared segment-wise and ignoring case.
pub fn is_nested_in(inner: &str, outer: &str) -> bool {
    let (inner, outer) = (key(inner), key(outer));
    inner
        .strip_prefix(&outer)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Registry key for a name. Two names collide iff their keys are equal.
pub fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
