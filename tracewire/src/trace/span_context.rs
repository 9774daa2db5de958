//! Immutable propagation state: `TraceState` and `SpanContext`.

use crate::trace::{SpanId, TraceFlags, TraceId};
use std::collections::VecDeque;
use std::str::FromStr;
use thiserror::Error;

/// Vendor-specific trace configuration carried alongside the trace and span
/// ids, represented as an ordered list of key-value pairs.
///
/// See the [W3C specification] for the constraints on keys and values.
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The empty `TraceState`, as a constant.
    pub const NONE: TraceState = TraceState(None);

    /// Validates a list-member key per the [W3C specification].
    ///
    /// [W3C specification]: https://www.w3.org/TR/trace-context/#key
    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }

        let allowed_special = |b: u8| b == b'_' || b == b'-' || b == b'*' || b == b'/';
        let mut vendor_start = None;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if !(b.is_ascii_lowercase() || b.is_ascii_digit() || allowed_special(b) || b == b'@') {
                return false;
            }

            if i == 0 && (!b.is_ascii_lowercase() && !b.is_ascii_digit()) {
                return false;
            } else if b == b'@' {
                if vendor_start.is_some() || i + 14 < key.len() {
                    return false;
                }
                vendor_start = Some(i);
            } else if let Some(start) = vendor_start {
                if i == start + 1 && !(b.is_ascii_lowercase() || b.is_ascii_digit()) {
                    return false;
                }
            }
        }

        true
    }

    /// Validates a list-member value per the [W3C specification].
    ///
    /// [W3C specification]: https://www.w3.org/TR/trace-context/#value
    fn valid_value(value: &str) -> bool {
        if value.len() > 256 {
            return false;
        }

        !(value.contains(',') || value.contains('='))
    }

    /// Creates a `TraceState` from the given key-value collection.
    ///
    /// ```
    /// use tracewire::trace::TraceState;
    ///
    /// let kvs = vec![("foo", "bar"), ("apple", "banana")];
    /// let trace_state = TraceState::from_key_value(kvs);
    ///
    /// assert!(trace_state.is_ok());
    /// assert_eq!(trace_state.unwrap().header(), String::from("foo=bar,apple=banana"))
    /// ```
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = trace_state
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(key.as_str()) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(value.as_str()) {
                    return Err(TraceStateError::Value(value));
                }

                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(ordered_data)))
        }
    }

    /// Retrieves a value for a given key, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter()
                .find_map(|item| (item.0.as_str() == key).then_some(item.1.as_str()))
        })
    }

    /// Returns a new `TraceState` with the given key-value pair inserted at
    /// the front of the list. An existing value for the key is removed first,
    /// so an update also moves the entry to the most-recently-updated
    /// position.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(&key);
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));
        kvs.push_front((key, value));

        Ok(trace_state)
    }

    /// Returns a new `TraceState` with the entry for the given key removed.
    /// Removing an absent key returns an unchanged clone.
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }

        Ok(self.delete_from_deque(&key))
    }

    fn delete_from_deque(&self, key: &str) -> TraceState {
        let mut owned = self.clone();
        if let Some(kvs) = owned.0.as_mut() {
            if let Some(index) = kvs.iter().position(|x| x.0 == key) {
                kvs.remove(index);
            }
        }
        owned
    }

    /// Renders the `tracestate` header value, delimiting each key and value
    /// with a `=` and each entry with a `,`.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Renders the list with the given key/value and entry delimiters.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{}{}{}", key, entry_delimiter, value))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }

    /// Renders the header, dropping whole entries from the
    /// least-recently-updated (back) end until the result fits in `max_len`
    /// bytes.
    pub fn trimmed_header(&self, max_len: usize) -> String {
        let mut header = String::new();
        if let Some(kvs) = self.0.as_ref() {
            for (key, value) in kvs.iter() {
                // +1 for the list delimiter when the header is non-empty
                let entry_len = key.len() + 1 + value.len();
                let needed = entry_len + usize::from(!header.is_empty());
                if header.len() + needed > max_len {
                    break;
                }
                if !header.is_empty() {
                    header.push(',');
                }
                header.push_str(key);
                header.push('=');
                header.push_str(value);
            }
        }
        header
    }

    /// Number of entries in the list.
    pub fn len(&self) -> usize {
        self.0.as_ref().map(VecDeque::len).unwrap_or(0)
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').collect();
        let mut key_value_pairs: Vec<(String, String)> = Vec::with_capacity(list_members.len());

        for list_member in list_members {
            match list_member.find('=') {
                None => return Err(TraceStateError::List(list_member.to_string())),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs
                        .push((key.to_string(), value.trim_start_matches('=').to_string()));
                }
            }
        }

        TraceState::from_key_value(key_value_pairs)
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#key> for the requirements.
    #[error("{0} is not a valid key in TraceState")]
    Key(String),

    /// The value is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#value> for the requirements.
    #[error("{0} is not a valid value in TraceState")]
    Value(String),

    /// The list member is invalid.
    ///
    /// See <https://www.w3.org/TR/trace-context/#list> for the requirements.
    #[error("{0} is not a valid list member in TraceState")]
    List(String),
}

/// Immutable portion of a span which can be serialized and propagated across
/// process boundaries.
///
/// The representation conforms to the [W3C TraceContext specification].
/// Spans without the `sampled` flag set in their [`TraceFlags`] are never
/// handed to the export pipeline.
///
/// [W3C TraceContext specification]: https://www.w3.org/TR/trace-context
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context, used where no span is available.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The id of the trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of this span.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Flags propagated with this context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if both the trace id and the span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if this context was extracted from a remote carrier
    /// rather than created in this process.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor-specific trace state.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn trace_state_test_data() -> Vec<(TraceState, &'static str, &'static str)> {
        vec![
            (TraceState::from_key_value(vec![("foo", "bar")]).unwrap(), "foo=bar", "foo"),
            (TraceState::from_key_value(vec![("foo", ""), ("apple", "banana")]).unwrap(), "foo=,apple=banana", "apple"),
            (TraceState::from_key_value(vec![("foo", "bar"), ("apple", "banana")]).unwrap(), "foo=bar,apple=banana", "apple"),
        ]
    }

    #[test]
    fn test_trace_state() {
        for test_case in trace_state_test_data() {
            assert_eq!(test_case.0.clone().header(), test_case.1);

            let new_key = format!("{}-{}", test_case.0.get(test_case.2).unwrap(), "test");

            let updated_trace_state = test_case.0.insert(test_case.2, new_key.clone());
            assert!(updated_trace_state.is_ok());
            let updated_trace_state = updated_trace_state.unwrap();

            let updated = format!("{}={}", test_case.2, new_key);

            let index = updated_trace_state.clone().header().find(&updated);

            assert!(index.is_some());
            assert_eq!(index.unwrap(), 0);

            let deleted_trace_state = updated_trace_state.delete(test_case.2.to_string());
            assert!(deleted_trace_state.is_ok());

            let deleted_trace_state = deleted_trace_state.unwrap();

            assert!(deleted_trace_state.get(test_case.2).is_none());
        }
    }

    #[test]
    fn test_trace_state_key_value_validation() {
        assert!(TraceState::from_key_value(vec![("foo", "ba=r")]).is_err());
        assert!(TraceState::from_key_value(vec![("foo", "ba,r")]).is_err());
        assert!(TraceState::from_key_value(vec![("Foo", "bar")]).is_err());
        assert!(TraceState::from_key_value(vec![("", "bar")]).is_err());
        assert!(TraceState::from_key_value(vec![("foo@vendor", "bar")]).is_ok());
        assert!(TraceState::from_key_value(vec![("7ea", "bar")]).is_ok());
    }

    #[test]
    fn test_trace_state_parse() {
        let state: TraceState = "foo=bar , apple=banana".parse().unwrap_or_default();
        // whitespace around members is not trimmed, so only well-formed input survives
        assert_eq!(state.header(), "");

        let state: TraceState = "foo=bar,apple=banana".parse().unwrap();
        assert_eq!(state.get("apple"), Some("banana"));
        assert_eq!(state.len(), 2);

        assert!("no-equals-sign".parse::<TraceState>().is_err());
    }

    #[test]
    fn test_trimmed_header_drops_oldest_entries() {
        let state = TraceState::from_key_value(vec![("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        assert_eq!(state.trimmed_header(512), "a=1,b=2,c=3");
        assert_eq!(state.trimmed_header(7), "a=1,b=2");
        assert_eq!(state.trimmed_header(3), "a=1");
        assert_eq!(state.trimmed_header(2), "");
    }

    #[test]
    fn test_span_context_validity() {
        assert!(!SpanContext::NONE.is_valid());
        assert!(!SpanContext::new(
            TraceId::from(1u128),
            SpanId::INVALID,
            TraceFlags::SAMPLED,
            false,
            TraceState::NONE,
        )
        .is_valid());

        let cx = SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        );
        assert!(cx.is_valid());
        assert!(cx.is_sampled());
        assert!(cx.is_remote());
    }
}
