// ── JSON path evaluator ──
//
// Parameter paths are dotted with optional bracketed indices:
// `mqtt.enable`, `valves[0].state`. This is a tiny evaluator over
// `serde_json::Value`; the typed coercion layer sits on top.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a dotted/indexed path into segments. An empty path is valid and
/// addresses the payload root.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }
    for part in path.split('.') {
        if part.is_empty() {
            return Err(format!("empty segment in path '{path}'"));
        }
        let mut rest = part;
        // Leading key portion before any bracket.
        if let Some(bracket) = rest.find('[') {
            let (key, indices) = rest.split_at(bracket);
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            rest = indices;
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some((index, after)) = stripped.split_once(']') else {
                    return Err(format!("unclosed index in path '{path}'"));
                };
                let index: usize = index
                    .parse()
                    .map_err(|_| format!("bad index '{index}' in path '{path}'"))?;
                segments.push(PathSegment::Index(index));
                rest = after;
            }
            if !rest.is_empty() {
                return Err(format!("trailing characters after index in path '{path}'"));
            }
        } else {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    Ok(segments)
}

/// Descend `segments` into `value`. `None` when any intermediate key or
/// index is missing.
pub fn lookup<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current.as_object()?.get(key)?,
            PathSegment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// The final key segment of a path -- the Gen1 query parameter name.
pub fn last_key(path: &str) -> &str {
    let last = path.rsplit('.').next().unwrap_or(path);
    last.split('[').next().unwrap_or(last)
}

/// Build the nested JSON object `{a: {b: {c: value}}}` for a dotted path.
/// Bracketed indices are not meaningful in write payloads and are treated
/// as an error by the caller before reaching here.
pub fn nest(path: &str, value: Value) -> Value {
    let mut current = value;
    for segment in path.rsplit('.') {
        let mut object = serde_json::Map::new();
        object.insert(segment.to_string(), current);
        current = Value::Object(object);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_dotted_path() {
        assert_eq!(
            parse_path("mqtt.enable").unwrap(),
            vec![
                PathSegment::Key("mqtt".into()),
                PathSegment::Key("enable".into())
            ]
        );
    }

    #[test]
    fn parse_indexed_path() {
        assert_eq!(
            parse_path("valves[0].state").unwrap(),
            vec![
                PathSegment::Key("valves".into()),
                PathSegment::Index(0),
                PathSegment::Key("state".into())
            ]
        );
    }

    #[test]
    fn parse_rejects_malformed_indices() {
        assert!(parse_path("valves[x].state").is_err());
        assert!(parse_path("valves[0.state").is_err());
        assert!(parse_path("a..b").is_err());
    }

    #[test]
    fn lookup_descends_objects_and_arrays() {
        let payload = json!({
            "valves": [ { "state": "closed" } ],
            "mqtt": { "enable": true },
        });
        let segments = parse_path("valves[0].state").unwrap();
        assert_eq!(lookup(&payload, &segments), Some(&json!("closed")));

        let segments = parse_path("mqtt.enable").unwrap();
        assert_eq!(lookup(&payload, &segments), Some(&json!(true)));
    }

    #[test]
    fn lookup_missing_intermediate_is_none() {
        let payload = json!({ "mqtt": { "enable": true } });
        let segments = parse_path("wifi.ssid").unwrap();
        assert_eq!(lookup(&payload, &segments), None);
    }

    #[test]
    fn last_key_of_paths() {
        assert_eq!(last_key("mqtt.enable"), "enable");
        assert_eq!(last_key("eco_mode_enabled"), "eco_mode_enabled");
        assert_eq!(last_key("valves[0].state"), "state");
        assert_eq!(last_key("relays[0]"), "relays");
    }

    #[test]
    fn nest_builds_config_payload() {
        assert_eq!(nest("eco_mode", json!(true)), json!({ "eco_mode": true }));
        assert_eq!(
            nest("sta.ssid", json!("lab")),
            json!({ "sta": { "ssid": "lab" } })
        );
    }
}
