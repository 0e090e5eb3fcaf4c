use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::error::{Result, SignalError};

/// One scheduled pickup within a route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduledStop {
    pub place: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pickup_time: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    route_id: String,
    place_pickup_times: String,
}

/// Pickup routes by id, each an ordered list of stops.
#[derive(Debug, Clone, Default)]
pub struct RouteBook {
    routes: HashMap<String, Vec<ScheduledStop>>,
}

impl RouteBook {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let book = Self::from_reader(file)?;
        info!(path = %path.as_ref().display(), routes = book.routes.len(), "Loaded pickup routes");
        Ok(book)
    }

    /// Reads a table whose `place_pickup_times` column holds a Python-style
    /// list literal such as `[{'place': 'Ringsend', 'pickup_time': '07:30'}]`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut routes = HashMap::new();
        for result in rdr.deserialize() {
            let record: RouteRecord = result?;
            let json = python_literal_to_json(&record.place_pickup_times);
            let stops: Vec<ScheduledStop> = serde_json::from_str(&json).map_err(|e| {
                SignalError::invalid_data(
                    "routes",
                    format!("route {}: unreadable stop list: {e}", record.route_id),
                )
            })?;
            routes.entry(record.route_id.trim().to_string()).or_insert(stops);
        }
        Ok(Self { routes })
    }

    pub fn insert(&mut self, route_id: impl Into<String>, stops: Vec<ScheduledStop>) {
        self.routes.insert(route_id.into(), stops);
    }

    pub fn stops(&self, route_id: &str) -> Result<&[ScheduledStop]> {
        self.routes
            .get(route_id)
            .map(Vec::as_slice)
            .ok_or_else(|| SignalError::UnknownRoute {
                route_id: route_id.to_string(),
            })
    }
}

/// Rewrites a Python list/dict literal as JSON: quotes become double quotes,
/// `None`/`True`/`False` become `null`/`true`/`false`, and trailing commas
/// before a closing bracket are dropped.
fn python_literal_to_json(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' && i + 1 < chars.len() {
                    let next = chars[i + 1];
                    if next == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(next);
                    }
                    i += 1;
                } else if c == q {
                    out.push('"');
                    quote = None;
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            None if c == '\'' || c == '"' => {
                out.push('"');
                quote = Some(c);
            }
            None if c.is_ascii_alphabetic() => {
                let start = i;
                while i + 1 < chars.len() && chars[i + 1].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..=i].iter().collect();
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            None if c == ',' => {
                let closes = chars[i + 1..]
                    .iter()
                    .find(|ch| !ch.is_whitespace())
                    .is_some_and(|ch| *ch == ']' || *ch == '}');
                if !closes {
                    out.push(c);
                }
            }
            None => out.push(c),
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_literal_to_json() {
        let src = r#"[{'place': "O'Connell St", 'pickup_time': '07:30', 'note': None}, ]"#;
        assert_eq!(
            python_literal_to_json(src),
            r#"[{"place": "O'Connell St", "pickup_time": "07:30", "note": null} ]"#
        );
        assert_eq!(
            python_literal_to_json(r#"['it\'s', 'say \"hi\"']"#),
            r#"["it's", "say \"hi\""]"#
        );
    }

    #[test]
    fn test_load_routes_in_stop_order() {
        let csv = "route_id,place_pickup_times\n\
                   R1,\"[{'place': 'Ringsend', 'pickup_time': '07:30'}, {'place': 'Fairview Park', 'pickup_time': '08:10'}]\"\n";
        let book = RouteBook::from_reader(csv.as_bytes()).unwrap();

        let stops = book.stops("R1").unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].place, "Ringsend");
        assert_eq!(stops[1].pickup_time, "08:10");
    }

    #[test]
    fn test_missing_pickup_time_is_empty() {
        let csv = "route_id,place_pickup_times\nR2,\"[{'place': 'Ringsend', 'pickup_time': None}, {'place': 'Clontarf'}]\"\n";
        let book = RouteBook::from_reader(csv.as_bytes()).unwrap();
        let stops = book.stops("R2").unwrap();
        assert_eq!(stops[0].pickup_time, "");
        assert_eq!(stops[1].pickup_time, "");
    }

    #[test]
    fn test_unknown_route() {
        let book = RouteBook::default();
        assert!(matches!(
            book.stops("R9"),
            Err(SignalError::UnknownRoute { route_id }) if route_id == "R9"
        ));
    }

    #[test]
    fn test_malformed_stop_list() {
        let csv = "route_id,place_pickup_times\nR1,\"[{'place': \"\n";
        assert!(matches!(
            RouteBook::from_reader(csv.as_bytes()),
            Err(SignalError::InvalidData { .. })
        ));
    }
}
