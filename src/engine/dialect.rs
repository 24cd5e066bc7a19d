use crate::config::model::DatabaseKind;

/// How a dialect surfaces row limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `SELECT TOP (n) ...`
    Top,
    /// `... LIMIT n`
    LimitSuffix,
}

/// How a dialect returns rows from mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `OUTPUT INSERTED.col` / `OUTPUT DELETED.col` before the WHERE clause.
    Output,
    /// `RETURNING col` at the end of the statement.
    Returning,
    /// The dialect cannot return rows; callers re-read through the read path.
    None,
}

/// Capability record describing how one backend spells SQL. A single struct
/// dispatched by data-source kind; there is no dialect class hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    pub kind: DatabaseKind,
}

impl Dialect {
    pub fn for_kind(kind: DatabaseKind) -> Dialect {
        Dialect { kind }
    }

    pub fn is_document(&self) -> bool {
        self.kind.is_document()
    }

    /// Quote an identifier, quoting each dot-separated part on its own so
    /// schema-qualified names stay intact.
    pub fn quote_ident(&self, ident: &str) -> String {
        ident
            .split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_part(&self, part: &str) -> String {
        match self.kind {
            DatabaseKind::MsSql | DatabaseKind::DwSql => format!("[{part}]"),
            DatabaseKind::MySql => format!("`{part}`"),
            DatabaseKind::PostgreSql => format!("\"{}\"", part.replace('"', "\"\"")),
            DatabaseKind::CosmosSql | DatabaseKind::CosmosNoSql => part.to_string(),
        }
    }

    /// Bind-parameter placeholder for the zero-based ordinal.
    pub fn placeholder(&self, ordinal: usize) -> String {
        match self.kind {
            DatabaseKind::MsSql | DatabaseKind::DwSql => format!("@P{}", ordinal + 1),
            DatabaseKind::PostgreSql => format!("${}", ordinal + 1),
            DatabaseKind::MySql => "?".to_string(),
            DatabaseKind::CosmosSql | DatabaseKind::CosmosNoSql => format!("@p{ordinal}"),
        }
    }

    pub fn limit_style(&self) -> LimitStyle {
        match self.kind {
            DatabaseKind::MsSql | DatabaseKind::DwSql => LimitStyle::Top,
            _ => LimitStyle::LimitSuffix,
        }
    }

    pub fn returning_style(&self) -> ReturningStyle {
        match self.kind {
            DatabaseKind::MsSql | DatabaseKind::DwSql => ReturningStyle::Output,
            DatabaseKind::PostgreSql => ReturningStyle::Returning,
            _ => ReturningStyle::None,
        }
    }

    /// The ESCAPE clause used with LIKE patterns.
    pub fn like_escape(&self) -> &'static str {
        match self.kind {
            // The backslash inside a MySQL string literal must itself be
            // escaped.
            DatabaseKind::MySql => " ESCAPE '\\\\'",
            DatabaseKind::CosmosSql | DatabaseKind::CosmosNoSql => "",
            _ => " ESCAPE '\\'",
        }
    }
}
