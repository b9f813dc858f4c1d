//! `text/event-stream` decoding for realtime store subscriptions.
//!
//! The store streams `put` and `patch` events whose data is
//! `{"path": "/a/b", "data": <json>}`, relative to the watched location.
//! A local JSON tree mirrors the location and each event is applied to it.

use crate::favorites::types::StoreError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerEvent {
    pub event: String,
    pub data: String,
}

/// Incremental SSE decoder. Chunks may split lines (and UTF-8 sequences)
/// anywhere; complete events are returned as soon as their blank-line
/// terminator arrives.
#[derive(Debug, Default)]
pub(crate) struct EventStreamParser {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    /// Consumes one transport chunk.
    ///
    /// # Arguments
    ///
    /// * `chunk` - Raw bytes as received, of any length
    ///
    /// # Returns
    ///
    /// Events completed by this chunk, in stream order. Partial lines and
    /// fields of an unterminated event stay buffered for the next call.
    ///
    /// # Edge Case Behavior
    ///
    /// - `\r\n` line endings are accepted alongside `\n`
    /// - Lines starting with `:` are comments and ignored
    /// - Multiple `data:` lines are joined with `\n`
    /// - An event without an `event:` field is reported as `message`
    /// - Invalid UTF-8 is replaced rather than rejected
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(ServerEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Store-level meaning of an event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoreEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    /// The store stopped serving this location (rules changed, data moved).
    Cancel(String),
    /// The credential used for the stream expired or was revoked.
    AuthRevoked,
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

impl StoreEvent {
    /// Interprets a raw event.
    ///
    /// # Returns
    ///
    /// `Ok(None)` for event types this client does not handle.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] when a `put` or `patch` payload is not a
    /// `{path, data}` object.
    pub fn parse(event: &ServerEvent) -> Result<Option<Self>, StoreError> {
        let path_data = || -> Result<PathData, StoreError> {
            serde_json::from_str(&event.data).map_err(|e| StoreError::Decode(e.to_string()))
        };
        Ok(Some(match event.event.as_str() {
            "put" => {
                let PathData { path, data } = path_data()?;
                StoreEvent::Put { path, data }
            }
            "patch" => {
                let PathData { path, data } = path_data()?;
                StoreEvent::Patch { path, data }
            }
            "keep-alive" => StoreEvent::KeepAlive,
            "cancel" => StoreEvent::Cancel(event.data.clone()),
            "auth_revoked" => StoreEvent::AuthRevoked,
            _ => return Ok(None),
        }))
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

/// Writes `data` at `path`. `null` deletes; emptied objects are pruned, since
/// the store has no notion of an empty location.
fn put_at(node: &mut Value, path: &[&str], data: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = data;
        return;
    };

    let map = ensure_object(node);
    let child = map.entry(head.to_string()).or_insert(Value::Null);
    put_at(child, rest, data);

    let prune = child.is_null() || child.as_object().is_some_and(Map::is_empty);
    if prune {
        map.remove(*head);
    }
    let now_empty = map.is_empty();
    if now_empty {
        *node = Value::Null;
    }
}

/// Applies a `put` or `patch` to the mirrored tree.
///
/// `put` replaces the value at its path. `patch` replaces each named child
/// under its path and leaves siblings alone. Control events are no-ops here;
/// the subscription pump acts on them.
///
/// # Edge Case Behavior
///
/// - A `null` value deletes, and parents left empty are removed with it
/// - Writing below a scalar replaces the scalar with an object
/// - A `patch` whose data is not an object changes nothing
pub(crate) fn apply(root: &mut Value, event: StoreEvent) {
    match event {
        StoreEvent::Put { path, data } => put_at(root, &segments(&path), data),
        StoreEvent::Patch { path, data } => {
            let base = segments(&path);
            if let Value::Object(children) = data {
                for (key, value) in children {
                    let mut full = base.clone();
                    full.push(&key);
                    put_at(root, &full, value);
                }
            }
        }
        StoreEvent::KeepAlive | StoreEvent::Cancel(_) | StoreEvent::AuthRevoked => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = EventStreamParser::default();
        assert!(parser.feed(b"event: put\nda").is_empty());
        let events = parser.feed(b"ta: {\"path\":\"/\",\"data\":null}\n\n");
        assert_eq!(
            events,
            vec![ServerEvent {
                event: "put".into(),
                data: "{\"path\":\"/\",\"data\":null}".into(),
            }]
        );
    }

    #[test]
    fn test_parser_crlf_and_comments() {
        let mut parser = EventStreamParser::default();
        let events = parser.feed(b": hello\r\nevent: keep-alive\r\ndata: null\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "keep-alive");
        assert_eq!(events[0].data, "null");
    }

    #[test]
    fn test_parser_multiple_events_one_chunk() {
        let mut parser = EventStreamParser::default();
        let events = parser.feed(b"event: a\ndata: 1\n\nevent: b\ndata: 2\ndata: 3\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "2\n3");
    }

    #[test]
    fn test_put_root_then_child_delete() {
        let mut root = Value::Null;
        apply(
            &mut root,
            StoreEvent::Put {
                path: "/".into(),
                data: json!({"m1": {"title": "Heat"}, "m2": {"title": "Ronin"}}),
            },
        );
        apply(
            &mut root,
            StoreEvent::Put {
                path: "/m1".into(),
                data: Value::Null,
            },
        );
        assert_eq!(root, json!({"m2": {"title": "Ronin"}}));

        apply(
            &mut root,
            StoreEvent::Put {
                path: "/m2".into(),
                data: Value::Null,
            },
        );
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_patch_merges_children() {
        let mut root = json!({"title": "Heat", "year": "1995"});
        apply(
            &mut root,
            StoreEvent::Patch {
                path: "/".into(),
                data: json!({"year": "1996", "kind": "movie"}),
            },
        );
        assert_eq!(root, json!({"title": "Heat", "year": "1996", "kind": "movie"}));
    }

    #[test]
    fn test_nested_put_creates_parents() {
        let mut root = Value::Null;
        apply(
            &mut root,
            StoreEvent::Put {
                path: "/m1/title".into(),
                data: json!("Heat"),
            },
        );
        assert_eq!(root, json!({"m1": {"title": "Heat"}}));
    }

    #[test]
    fn test_store_event_parse() {
        let put = StoreEvent::parse(&ServerEvent {
            event: "put".into(),
            data: r#"{"path":"/m1","data":{"title":"Heat"}}"#.into(),
        })
        .unwrap();
        assert_eq!(
            put,
            Some(StoreEvent::Put {
                path: "/m1".into(),
                data: json!({"title": "Heat"}),
            })
        );

        let revoked = StoreEvent::parse(&ServerEvent {
            event: "auth_revoked".into(),
            data: "credential is no longer valid".into(),
        })
        .unwrap();
        assert_eq!(revoked, Some(StoreEvent::AuthRevoked));

        let unknown = StoreEvent::parse(&ServerEvent {
            event: "message".into(),
            data: "x".into(),
        })
        .unwrap();
        assert_eq!(unknown, None);

        assert!(StoreEvent::parse(&ServerEvent {
            event: "put".into(),
            data: "not json".into(),
        })
        .is_err());
    }
}
