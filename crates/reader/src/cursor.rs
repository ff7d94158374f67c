//! Opaque pagination cursors.
//!
//! A cursor is base64 over a `:`-delimited field list. Each kind has its own
//! layout; list cursors additionally embed the sort dimension and order they
//! were minted with so replays under different sort parameters can be
//! rejected instead of silently returning garbage pages.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use lumenlake_types::{SortBy, SortOrder};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CursorError {
    /// The cursor string is not one of ours. Client error.
    #[error("invalid cursor")]
    InvalidCursor,
    /// A list cursor was replayed with different sort parameters.
    #[error(
        "cursor was minted with sort {minted_by}/{minted_order}, \
         request asks for {requested_by}/{requested_order}"
    )]
    SortMismatch {
        minted_by: SortBy,
        minted_order: SortOrder,
        requested_by: SortBy,
        requested_order: SortOrder,
    },
}

/// Decoded pagination state. Layouts, `:`-delimited:
/// history `<ledger_sequence>`, operations `<ledger_sequence>:<operation_index>`,
/// list `<sort_value>:<account_id>:<sort_by>:<sort_order>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    History {
        ledger_sequence: u32,
    },
    Operations {
        ledger_sequence: u32,
        operation_index: u32,
    },
    List {
        sort_value: String,
        account_id: String,
        sort_by: SortBy,
        sort_order: SortOrder,
    },
}

impl Cursor {
    pub fn encode(&self) -> String {
        let plain = match self {
            Cursor::History { ledger_sequence } => ledger_sequence.to_string(),
            Cursor::Operations {
                ledger_sequence,
                operation_index,
            } => format!("{ledger_sequence}:{operation_index}"),
            Cursor::List {
                sort_value,
                account_id,
                sort_by,
                sort_order,
            } => format!("{sort_value}:{account_id}:{sort_by}:{sort_order}"),
        };
        BASE64.encode(plain)
    }

    fn fields(raw: &str) -> Result<Vec<String>, CursorError> {
        let bytes = BASE64.decode(raw).map_err(|_| CursorError::InvalidCursor)?;
        let plain = String::from_utf8(bytes).map_err(|_| CursorError::InvalidCursor)?;
        Ok(plain.split(':').map(str::to_string).collect())
    }

    /// Empty input is "no cursor"; anything non-empty must decode exactly.
    pub fn decode_history(raw: Option<&str>) -> Result<Option<u32>, CursorError> {
        let Some(raw) = non_empty(raw) else {
            return Ok(None);
        };
        let fields = Self::fields(raw)?;
        match fields.as_slice() {
            [sequence] => sequence
                .parse()
                .map(Some)
                .map_err(|_| CursorError::InvalidCursor),
            _ => Err(CursorError::InvalidCursor),
        }
    }

    pub fn decode_operations(raw: Option<&str>) -> Result<Option<(u32, u32)>, CursorError> {
        let Some(raw) = non_empty(raw) else {
            return Ok(None);
        };
        let fields = Self::fields(raw)?;
        match fields.as_slice() {
            [sequence, index] => {
                let sequence = sequence.parse().map_err(|_| CursorError::InvalidCursor)?;
                let index = index.parse().map_err(|_| CursorError::InvalidCursor)?;
                Ok(Some((sequence, index)))
            }
            _ => Err(CursorError::InvalidCursor),
        }
    }

    /// Decodes a list cursor and validates it against the request's sort
    /// parameters; a mismatch is a client error, not a silent re-sort.
    pub fn decode_list(
        raw: Option<&str>,
        requested_by: SortBy,
        requested_order: SortOrder,
    ) -> Result<Option<(String, String)>, CursorError> {
        let Some(raw) = non_empty(raw) else {
            return Ok(None);
        };
        let fields = Self::fields(raw)?;
        match fields.as_slice() {
            [sort_value, account_id, sort_by, sort_order] => {
                let minted_by: SortBy =
                    sort_by.parse().map_err(|_| CursorError::InvalidCursor)?;
                let minted_order: SortOrder =
                    sort_order.parse().map_err(|_| CursorError::InvalidCursor)?;
                if minted_by != requested_by || minted_order != requested_order {
                    return Err(CursorError::SortMismatch {
                        minted_by,
                        minted_order,
                        requested_by,
                        requested_order,
                    });
                }
                Ok(Some((sort_value.clone(), account_id.clone())))
            }
            _ => Err(CursorError::InvalidCursor),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn history_round_trips() {
        let encoded = Cursor::History {
            ledger_sequence: 123_456,
        }
        .encode();
        assert_eq!(Cursor::decode_history(Some(&encoded)), Ok(Some(123_456)));
    }

    #[test]
    fn operations_round_trips() {
        let encoded = Cursor::Operations {
            ledger_sequence: 88,
            operation_index: 3,
        }
        .encode();
        assert_eq!(
            Cursor::decode_operations(Some(&encoded)),
            Ok(Some((88, 3)))
        );
    }

    #[test]
    fn list_round_trips_and_binds_sort() {
        let encoded = Cursor::List {
            sort_value: "5000000".to_string(),
            account_id: "GALICE".to_string(),
            sort_by: SortBy::Balance,
            sort_order: SortOrder::Desc,
        }
        .encode();
        let decoded = Cursor::decode_list(Some(&encoded), SortBy::Balance, SortOrder::Desc)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, ("5000000".to_string(), "GALICE".to_string()));
    }

    #[test]
    fn list_replay_with_changed_sort_is_rejected() {
        let encoded = Cursor::List {
            sort_value: "5000000".to_string(),
            account_id: "GALICE".to_string(),
            sort_by: SortBy::Balance,
            sort_order: SortOrder::Desc,
        }
        .encode();
        let err = Cursor::decode_list(Some(&encoded), SortBy::LastModifiedLedger, SortOrder::Desc)
            .unwrap_err();
        assert!(matches!(err, CursorError::SortMismatch { .. }));
    }

    #[test]
    fn empty_decodes_to_none() {
        assert_eq!(Cursor::decode_history(None), Ok(None));
        assert_eq!(Cursor::decode_history(Some("")), Ok(None));
        assert_eq!(Cursor::decode_operations(Some("")), Ok(None));
    }

    #[test_case("not base64!!"; "not base64")]
    #[test_case("aGVsbG8="; "not a number")]
    #[test_case("MTI6YWJjOmJhbGFuY2U="; "wrong layout for history")]
    fn malformed_cursors_are_rejected(raw: &str) {
        assert_eq!(
            Cursor::decode_history(Some(raw)),
            Err(CursorError::InvalidCursor)
        );
    }

    #[test]
    fn cursors_are_opaque_base64() {
        let encoded = Cursor::History { ledger_sequence: 7 }.encode();
        assert!(BASE64.decode(&encoded).is_ok());
        assert!(!encoded.contains(':'));
    }
}
