//! SQLite schema definitions for the views database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// One row per (user, post) pair; `viewed_at` keeps the first recorded view.
const POST_VIEWS_TABLE_V1: Table = Table {
    name: "post_views",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("post_id", &SqlType::Integer, non_null = true),
        sqlite_column!("viewed_at", &SqlType::Text, non_null = true), // RFC 3339
    ],
    indices: &[("idx_post_views_post_id", "post_id")],
    unique_constraints: &[&["user_id", "post_id"]],
};

/// All versioned schemas for the views database.
///
/// Version 1: post_views table
pub const VIEW_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[POST_VIEWS_TABLE_V1],
}];
