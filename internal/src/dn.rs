use crate::error::{DirectoryError, Result};

/// Leading `attr=value` component of a distinguished name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    pub attribute: String,
    pub value: String,
}

/// Splits on unescaped `separator`, keeping escapes in place
fn split_escaped(input: &str, separator: char) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (index, c) in input.char_indices() {
        match (escaped, c) {
            (true, _) => escaped = false,
            (false, '\\') => escaped = true,
            (false, c) if c == separator => {
                parts.push(&input[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }

    if escaped {
        return Err(DirectoryError::WrongParameter(format!(
            "unterminated escape in DN {input}"
        )));
    }

    parts.push(&input[start..]);
    Ok(parts)
}

fn parse_component(dn: &str, component: &str) -> Result<Rdn> {
    let (attribute, value) = component.split_once('=').ok_or_else(|| {
        DirectoryError::WrongParameter(format!("DN component `{component}` of {dn} has no `=`"))
    })?;

    let (attribute, value) = (attribute.trim(), value.trim());
    if attribute.is_empty() || value.is_empty() {
        return Err(DirectoryError::WrongParameter(format!(
            "DN component `{component}` of {dn} is incomplete"
        )));
    }

    Ok(Rdn {
        attribute: attribute.to_string(),
        value: unescape(value),
    })
}

/// Resolves `\XX` hex pairs and `\c` escapes of a value
fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'\\' {
            result.push(bytes[index]);
            index += 1;
            continue;
        }

        let pair = bytes.get(index + 1..index + 3);
        match pair {
            Some([high, low]) if high.is_ascii_hexdigit() && low.is_ascii_hexdigit() => {
                let digits = [*high, *low];
                let hex = std::str::from_utf8(&digits).ok();
                if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    result.push(byte);
                }
                index += 3;
            }
            _ => {
                if let Some(escaped) = bytes.get(index + 1) {
                    result.push(*escaped);
                }
                index += 2;
            }
        }
    }

    String::from_utf8_lossy(&result).into_owned()
}

/// Validates `attr=value,...` syntax and returns every component
pub fn parse(dn: &str) -> Result<Vec<Rdn>> {
    let dn = dn.trim();
    if dn.is_empty() {
        return Err(DirectoryError::WrongParameter("DN cannot be empty".to_string()));
    }

    split_escaped(dn, ',')?
        .into_iter()
        .map(|component| {
            // multi-valued RDNs are accepted, their first pair is what counts
            let first = split_escaped(component, '+')?
                .into_iter()
                .next()
                .unwrap_or_default();
            parse_component(dn, first)
        })
        .collect()
}

/// Leading RDN of a DN
pub fn leading_rdn(dn: &str) -> Result<Rdn> {
    parse(dn)?
        .into_iter()
        .next()
        .ok_or_else(|| DirectoryError::WrongParameter(format!("DN {dn} has no components")))
}

/// Checks the DN names an entry through `naming_attribute` and, when the
/// entity already carries a name, that both agree. Returns the RDN value.
pub fn check_naming(dn: &str, naming_attribute: &str, name: &str) -> Result<String> {
    let rdn = leading_rdn(dn)?;

    if !rdn.attribute.eq_ignore_ascii_case(naming_attribute) {
        return Err(DirectoryError::WrongParameter(format!(
            "DN {dn} must start with {naming_attribute}="
        )));
    }

    if !name.is_empty() && !name.eq_ignore_ascii_case(&rdn.value) {
        return Err(DirectoryError::WrongParameter(format!(
            "DN {dn} does not match name {name}"
        )));
    }

    Ok(rdn.value)
}

/// Joins a caller supplied relative base with the configured root base
pub fn join_base(relative: &str, root: &str) -> String {
    let relative = relative.trim().trim_end_matches(',');
    match (relative.is_empty(), root.is_empty()) {
        (true, _) => root.to_string(),
        (false, true) => relative.to_string(),
        (false, false) => format!("{relative},{root}"),
    }
}
