//! Fixed-width tuple packing and partial-match comparison.
//!
//! A tuple is a fixed number of attribute values packed into a single
//! fixed-width byte record so it can live in a page slot of known size.
//! Each attribute gets an equal share of the record width, with any
//! remainder absorbed by the last attribute — the packing itself isn't
//! externally specified, so any scheme that's reversible and fixed-width
//! per relation works here.

/// The value a query uses to mean "match any value in this attribute",
/// and a tuple uses to mean "this attribute's value is unknown".
pub const WILDCARD: &str = "?";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TupleError {
    #[error("expected {expected} attributes, got {actual}")]
    WrongAttrCount { expected: usize, actual: usize },
    #[error("packed record is {actual} bytes, expected {expected}")]
    WrongRecordSize { expected: usize, actual: usize },
    #[error("packed record contains invalid UTF-8 in field {field}")]
    InvalidUtf8 { field: usize },
}

/// A fixed number of attribute values, in relation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    attrs: Vec<String>,
}

impl Tuple {
    /// Builds a tuple from already-split attribute values.
    pub fn new(attrs: Vec<String>) -> Self {
        Self { attrs }
    }

    /// Parses a comma-separated query/insert string, e.g. `"1234,?,abc"`.
    pub fn parse(s: &str, nattrs: usize) -> Result<Self, TupleError> {
        let attrs: Vec<String> = s.split(',').map(str::to_owned).collect();
        if attrs.len() != nattrs {
            return Err(TupleError::WrongAttrCount {
                expected: nattrs,
                actual: attrs.len(),
            });
        }
        Ok(Self { attrs })
    }

    pub fn attrs(&self) -> &[String] {
        &self.attrs
    }

    pub fn nattrs(&self) -> usize {
        self.attrs.len()
    }

    /// Per-attribute field width for a `tupsize`-byte record holding
    /// `nattrs` attributes: `tupsize / nattrs`, with the last field
    /// absorbing the remainder.
    pub fn field_width(tupsize: usize, nattrs: usize, index: usize) -> usize {
        let base = tupsize / nattrs;
        if index == nattrs - 1 {
            base + tupsize % nattrs
        } else {
            base
        }
    }

    /// Truncates `value` to at most `width` bytes, backing off to the
    /// nearest char boundary so the kept prefix is still valid UTF-8.
    fn truncate_to_width(value: &str, width: usize) -> &str {
        if value.len() <= width {
            return value;
        }
        let mut end = width;
        while end > 0 && !value.is_char_boundary(end) {
            end -= 1;
        }
        &value[..end]
    }

    /// Packs this tuple into a fixed `tupsize`-byte record, space-padded
    /// per field. A value wider than its field is truncated to fit,
    /// matching the fixed-width record format a partial-match scan
    /// expects every tuple to honor.
    pub fn pack(&self, tupsize: usize) -> Vec<u8> {
        let nattrs = self.attrs.len();
        let mut out = vec![b' '; tupsize];
        let mut offset = 0;
        for (i, value) in self.attrs.iter().enumerate() {
            let width = Self::field_width(tupsize, nattrs, i);
            let value = Self::truncate_to_width(value, width);
            out[offset..offset + value.len()].copy_from_slice(value.as_bytes());
            offset += width;
        }
        out
    }

    /// Unpacks a fixed `tupsize`-byte record into `nattrs` attribute
    /// values, trimming the space padding each field was written with.
    pub fn unpack(record: &[u8], tupsize: usize, nattrs: usize) -> Result<Self, TupleError> {
        if record.len() != tupsize {
            return Err(TupleError::WrongRecordSize {
                expected: tupsize,
                actual: record.len(),
            });
        }
        let mut attrs = Vec::with_capacity(nattrs);
        let mut offset = 0;
        for i in 0..nattrs {
            let width = Self::field_width(tupsize, nattrs, i);
            let field = &record[offset..offset + width];
            let s = std::str::from_utf8(field).map_err(|_| TupleError::InvalidUtf8 { field: i })?;
            attrs.push(s.trim_end().to_owned());
            offset += width;
        }
        Ok(Self { attrs })
    }

    /// Whether this tuple matches a query tuple: every non-wildcard
    /// query attribute must equal the corresponding tuple attribute.
    pub fn matches(&self, query: &Tuple) -> bool {
        self.attrs
            .iter()
            .zip(query.attrs.iter())
            .all(|(value, q)| q == WILDCARD || value == q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_comma() {
        let t = Tuple::parse("1234,?,abc", 3).unwrap();
        assert_eq!(t.attrs(), &["1234", "?", "abc"]);
    }

    #[test]
    fn parse_rejects_wrong_attr_count() {
        assert!(Tuple::parse("1,2", 3).is_err());
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let t = Tuple::parse("ab,cd,efg", 3).unwrap();
        let tupsize = 4 * 3;
        let packed = t.pack(tupsize);
        let restored = Tuple::unpack(&packed, tupsize, 3).unwrap();
        assert_eq!(t, restored);
    }

    #[test]
    fn pack_truncates_oversized_value_to_fit_its_field() {
        let t = Tuple::parse("toolongforfield", 1).unwrap();
        let packed = t.pack(4);
        let restored = Tuple::unpack(&packed, 4, 1).unwrap();
        assert_eq!(restored.attrs(), &["tool"]);
    }

    #[test]
    fn last_field_absorbs_remainder() {
        assert_eq!(Tuple::field_width(10, 3, 0), 3);
        assert_eq!(Tuple::field_width(10, 3, 1), 3);
        assert_eq!(Tuple::field_width(10, 3, 2), 4);
    }

    #[test]
    fn wildcard_query_matches_anything() {
        let t = Tuple::parse("waterloo,1234", 2).unwrap();
        let q = Tuple::parse("?,1234", 2).unwrap();
        assert!(t.matches(&q));
        let q2 = Tuple::parse("?,9999", 2).unwrap();
        assert!(!t.matches(&q2));
    }
}
