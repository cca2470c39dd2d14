//! Event store database schema.

use crate::table_name::quote_ident;

/// Bookkeeping table registering every logical stream.
pub const EVENT_STREAMS_TABLE: &str = "event_streams";

/// Bookkeeping table holding projection checkpoints.
pub const PROJECTIONS_TABLE: &str = "projections";

/// Suffix of the per-stream unique index guaranteeing optimistic
/// concurrency on `(aggregate_type, aggregate_id, aggregate_version)`.
/// A unique violation on this index is a concurrency conflict.
pub(crate) const AGGREGATE_VERSION_INDEX_SUFFIX: &str = "_aggregate_version_uq";

/// SQL to create the stream registry table.
pub const CREATE_EVENT_STREAMS_TABLE: &str = r"
CREATE TABLE event_streams (
    no               BIGSERIAL,
    real_stream_name VARCHAR(150) NOT NULL,
    stream_name      CHAR(41) NOT NULL,
    metadata         JSONB,
    PRIMARY KEY (no),
    UNIQUE (real_stream_name),
    UNIQUE (stream_name)
);
";

/// SQL to create the projection registry table.
pub const CREATE_PROJECTIONS_TABLE: &str = r"
CREATE TABLE projections (
    no           BIGSERIAL,
    name         VARCHAR(150) NOT NULL,
    position     JSONB,
    state        JSONB,
    status       VARCHAR(28) NOT NULL,
    locked_until TIMESTAMP(6),
    PRIMARY KEY (no),
    UNIQUE (name)
);
";

/// DDL statements creating a stream's physical table with its check
/// constraints and the two per-aggregate indexes.
pub(crate) fn create_stream_table_statements(table: &str) -> [String; 3] {
    let quoted = quote_ident(table);
    [
        format!(
            r"
CREATE TABLE {quoted} (
    no         BIGSERIAL,
    event_id   UUID NOT NULL,
    event_name VARCHAR(100) NOT NULL,
    payload    JSON NOT NULL,
    metadata   JSONB NOT NULL,
    created_at TIMESTAMP(6) NOT NULL,
    PRIMARY KEY (no),
    CONSTRAINT aggregate_version_not_null CHECK ((metadata->>'_aggregate_version') IS NOT NULL),
    CONSTRAINT aggregate_type_not_null CHECK ((metadata->>'_aggregate_type') IS NOT NULL),
    CONSTRAINT aggregate_id_not_null CHECK ((metadata->>'_aggregate_id') IS NOT NULL),
    UNIQUE (event_id)
);"
        ),
        format!(
            "CREATE UNIQUE INDEX {index} ON {quoted} ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), (metadata->>'_aggregate_version'));",
            index = quote_ident(&format!("{table}{AGGREGATE_VERSION_INDEX_SUFFIX}")),
        ),
        format!(
            "CREATE UNIQUE INDEX {index} ON {quoted} ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), no);",
            index = quote_ident(&format!("{table}_aggregate_replay_uq")),
        ),
    ]
}

/// DDL dropping a stream's physical table; a no-op when already absent.
pub(crate) fn drop_stream_table_statement(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table))
}
