//! SQL AST and rendering.
//!
//! Build SQL as a typed AST, then render to a string with automatic
//! parameter numbering. Every identifier is double-quoted on output and
//! every value travels as a `$n` placeholder, so nothing a caller puts in a
//! row ever ends up spliced into SQL text.

mod names;
pub use names::*;

mod expr;
pub use expr::*;

mod ddl;
pub use ddl::*;

mod render;
pub use render::*;

mod stmt;
pub use stmt::*;

/// Postgres truncates identifiers longer than this (NAMEDATALEN - 1).
pub const PG_IDENT_MAX: usize = 63;

/// Result of rendering SQL.
#[derive(Debug, Clone)]
pub struct RenderedSql {
    /// The SQL string with $1, $2, etc. placeholders.
    pub sql: String,

    /// Parameter names in order (maps to $1, $2, etc.).
    pub params: Vec<ParamName>,
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use accord_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value in single quotes with embedded quotes doubled.
/// Only used where Postgres accepts no parameter, such as COMMENT ON.
///
/// # Example
/// ```
/// use accord_sql::Lit;
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// Generate a standard index name for a table and columns.
///
/// Uses the convention `idx_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(accord_sql::index_name("user", &["email"]), "idx_user_email");
/// assert_eq!(accord_sql::index_name("post", &["author_id", "created_at"]), "idx_post_author_id_created_at");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    shorten_ident(&format!("idx_{}_{}", table, cols.join("_")))
}

/// Generate a standard unique index name for a table and columns.
///
/// Uses the convention `uq_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(accord_sql::unique_index_name("user", &["email"]), "uq_user_email");
/// assert_eq!(accord_sql::unique_index_name("category", &["shop_id", "handle"]), "uq_category_shop_id_handle");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    shorten_ident(&format!("uq_{}_{}", table, cols.join("_")))
}

/// Fit a generated identifier into [`PG_IDENT_MAX`] bytes.
///
/// Names that already fit are returned unchanged. Longer names keep a prefix
/// and get a stable blake3 suffix, so two long names that share a prefix
/// still come out distinct.
pub fn shorten_ident(name: &str) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name.to_string();
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];
    let max_prefix_len = PG_IDENT_MAX - suffix.len() - 1;

    // Generated names are expected to be ASCII snake_case; still, avoid splitting UTF-8.
    let mut len = max_prefix_len;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}
