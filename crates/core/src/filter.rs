//! Parameterised `WHERE` clause composition for record listings.
//!
//! Callers describe a listing as optional equality filters plus an optional free-text search
//! across a set of columns. The result is a SQL fragment that only ever contains column names
//! (checked against a strict identifier grammar) and `?` placeholders; every user-supplied
//! value travels separately as a bound parameter.
//!
//! ```
//! use oncobloom_core::filter::build_filter;
//!
//! let predicate = build_filter(
//!     &[("status", Some("Active"))],
//!     Some("smith"),
//!     &["full_name", "patient_id"],
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     predicate.sql(),
//!     "status = ? AND (full_name LIKE ? OR patient_id LIKE ?)"
//! );
//! assert_eq!(predicate.params(), ["Active", "%smith%", "%smith%"]);
//! ```

use crate::error::FilterError;
use crate::validation::is_sql_identifier;

/// A composed predicate: SQL text with `?` placeholders and the values to bind, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryPredicate {
    sql: String,
    params: Vec<String>,
}

impl QueryPredicate {
    /// The bare predicate (no `WHERE` keyword). Empty when nothing filters.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// `" WHERE <predicate>"`, or an empty string when nothing filters, ready to splice
    /// after a `FROM` clause.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Builder for a [`QueryPredicate`].
///
/// Absent and blank values are skipped. Column names are validated when the predicate is
/// built, so a bad name fails the whole build.
#[derive(Debug, Default)]
pub struct FilterSpec<'a> {
    equalities: Vec<(&'a str, String)>,
    free_text: Option<(String, &'a [&'a str])>,
}

impl<'a> FilterSpec<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column = value` when `value` is present and not blank.
    pub fn field(mut self, column: &'a str, value: Option<&str>) -> Self {
        if let Some(value) = non_blank(value) {
            self.equalities.push((column, value.to_owned()));
        }
        self
    }

    /// Matches `text` as a substring of any of `columns`.
    ///
    /// Blank text, or an empty column list, contributes nothing. `%` and `_` inside `text`
    /// keep their `LIKE` meaning.
    pub fn free_text(mut self, text: Option<&str>, columns: &'a [&'a str]) -> Self {
        self.free_text = non_blank(text).map(|text| (text.to_owned(), columns));
        self
    }

    pub fn build(self) -> Result<QueryPredicate, FilterError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for (column, value) in self.equalities {
            check_column(column)?;
            clauses.push(format!("{column} = ?"));
            params.push(value);
        }

        if let Some((text, columns)) = self.free_text {
            if !columns.is_empty() {
                let pattern = format!("%{text}%");
                let mut alternatives = Vec::with_capacity(columns.len());
                for column in columns {
                    check_column(column)?;
                    alternatives.push(format!("{column} LIKE ?"));
                    params.push(pattern.clone());
                }
                clauses.push(format!("({})", alternatives.join(" OR ")));
            }
        }

        Ok(QueryPredicate {
            sql: clauses.join(" AND "),
            params,
        })
    }
}

/// One-shot form of [`FilterSpec`].
pub fn build_filter(
    fields: &[(&str, Option<&str>)],
    free_text: Option<&str>,
    columns: &[&str],
) -> Result<QueryPredicate, FilterError> {
    let mut spec = FilterSpec::new();
    for &(column, value) in fields {
        spec = spec.field(column, value);
    }
    spec.free_text(free_text, columns).build()
}

fn check_column(column: &str) -> Result<(), FilterError> {
    if is_sql_identifier(column) {
        Ok(())
    } else {
        Err(FilterError::InvalidColumn(column.to_owned()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
