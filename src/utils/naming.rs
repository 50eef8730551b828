//! Key naming helpers for document rewrites

use serde_json::{Map, Value};

/// Convert a `PascalCase` or `camelCase` key to `snake_case`.
///
/// Acronym runs stay together: `OSName` becomes `os_name`,
/// `ClientIpAddress` becomes `client_ip_address`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map_or(false, char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    out
}

/// Rename the top-level keys of an object to `snake_case`, leaving nested
/// values untouched
pub fn snake_case_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (snake_case(&k), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("ClientIpAddress"), "client_ip_address");
        assert_eq!(snake_case("OSName"), "os_name");
        assert_eq!(snake_case("userAgent"), "user_agent");
        assert_eq!(snake_case("Version"), "version");
        assert_eq!(snake_case("IPAddress"), "ip_address");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("Line2Number"), "line2_number");
    }

    #[test]
    fn test_snake_case_keys_is_shallow() {
        let map = json!({"QueryString": {"PageSize": "10"}, "HttpMethod": "GET"});
        let renamed = snake_case_keys(map.as_object().unwrap().clone());
        assert_eq!(renamed["query_string"], json!({"PageSize": "10"}));
        assert_eq!(renamed["http_method"], json!("GET"));
    }
}
