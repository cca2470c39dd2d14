//! Stream-to-table naming.

use sha1::{Digest, Sha1};

/// Derives the physical table name backing a logical stream.
///
/// The name is the lowercase hex SHA-1 digest of the stream name with a
/// leading underscore, giving a fixed-width (41 character), collision-
/// resistant identifier that cannot collide with ordinary table names.
#[must_use]
pub fn stream_table_name(stream_name: &str) -> String {
    let digest = Sha1::digest(stream_name.as_bytes());
    format!("_{}", hex::encode(digest))
}

/// Quotes an identifier for splicing into SQL, doubling any embedded
/// double quotes.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quotes a string literal for splicing into SQL, doubling any embedded
/// single quotes.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
