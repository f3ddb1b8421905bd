use tracing::{debug, warn};

/// Split "Name: Value" header arguments into pairs, skipping malformed ones
pub fn parse_headers(header_strings: &[String]) -> Vec<(String, String)> {
    header_strings
        .iter()
        .filter_map(|raw| {
            let Some((name, value)) = raw.split_once(':') else {
                warn!(header = %raw, "Invalid header format, expected 'Name: Value'");
                return None;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() {
                warn!(header = %raw, "Header name is empty");
                return None;
            }
            debug!(name, "Adding header");
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
