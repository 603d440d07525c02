//! Statement classification: class, target table, mutation flag and
//! the consistency hint. Malformed statements classify as `Other`;
//! routing then refuses them.

pub mod cache;
pub mod hint;

pub use cache::classify_cached;
pub use hint::Hint;

use super::sql::{find_clause, identifier_at, match_words, skip_whitespace_and_comments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: StatementKind,
    pub table: Option<String>,
    pub is_mutation: bool,
    pub hint: Hint,
}

impl Classification {
    fn other(hint: Hint) -> Self {
        Self {
            kind: StatementKind::Other,
            table: None,
            is_mutation: false,
            hint,
        }
    }
}

pub fn classify(sql: &str) -> Classification {
    let hint = hint::extract(sql);
    let start = skip_whitespace_and_comments(sql, 0);
    if start >= sql.len() {
        return Classification::other(hint);
    }

    let kind = match leading_keyword(sql, start).as_deref() {
        Some("SELECT") => StatementKind::Select,
        Some("INSERT") | Some("REPLACE") => StatementKind::Insert,
        Some("UPDATE") => StatementKind::Update,
        Some("DELETE") => StatementKind::Delete,
        Some("CREATE") | Some("ALTER") | Some("DROP") | Some("TRUNCATE") | Some("RENAME") => {
            StatementKind::Ddl
        }
        _ => return Classification::other(hint),
    };

    let table = match kind {
        StatementKind::Select | StatementKind::Delete => identifier_after(sql, &["FROM"], start),
        StatementKind::Insert => identifier_after(sql, &["INTO"], start),
        StatementKind::Update => {
            identifier_at(sql, skip_whitespace_and_comments(sql, start + "UPDATE".len()))
                .map(|(name, _)| name)
        }
        StatementKind::Ddl => identifier_after(sql, &["TABLE"], start)
            .or_else(|| ddl_table_without_keyword(sql, start)),
        _ => None,
    };

    Classification {
        kind,
        table,
        is_mutation: matches!(
            kind,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        ),
        hint,
    }
}

fn leading_keyword(sql: &str, start: usize) -> Option<String> {
    let bytes = sql.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    if end == start {
        return None;
    }
    Some(sql[start..end].to_ascii_uppercase())
}

fn identifier_after(sql: &str, clause: &[&str], from: usize) -> Option<String> {
    let at = find_clause(sql, clause, from)?;
    let after = match_words(sql, at, clause)?;
    let mut pos = skip_whitespace_and_comments(sql, after);

    // CREATE TABLE IF NOT EXISTS / DROP TABLE IF EXISTS
    for guard in [&["IF", "NOT", "EXISTS"][..], &["IF", "EXISTS"][..]] {
        if let Some(end) = match_words(sql, pos, guard) {
            pos = skip_whitespace_and_comments(sql, end);
            break;
        }
    }

    identifier_at(sql, pos).map(|(name, _)| name)
}

/// `TRUNCATE users` is valid MySQL without the TABLE keyword.
fn ddl_table_without_keyword(sql: &str, start: usize) -> Option<String> {
    let end = match_words(sql, start, &["TRUNCATE"])?;
    identifier_at(sql, skip_whitespace_and_comments(sql, end)).map(|(name, _)| name)
}

/// Guard used by tail replay: DDL that can be re-applied safely.
pub fn ddl_idempotent(sql: &str) -> bool {
    let start = skip_whitespace_and_comments(sql, 0);
    let upper = sql[start..].to_ascii_uppercase();

    if upper.starts_with("DROP") {
        upper.contains("IF EXISTS")
    } else if upper.starts_with("CREATE") {
        upper.contains("IF NOT EXISTS")
    } else if upper.starts_with("TRUNCATE") {
        true
    } else if upper.starts_with("ALTER") || upper.starts_with("RENAME") {
        false
    } else {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_select() {
        let c = classify("SELECT * FROM users WHERE id = 1");
        assert_eq!(c.kind, StatementKind::Select);
        assert_eq!(c.table.as_deref(), Some("users"));
        assert!(!c.is_mutation);
        assert_eq!(c.hint, Hint::Default);
    }

    #[test]
    fn test_select_without_table() {
        let c = classify("SELECT 1");
        assert_eq!(c.kind, StatementKind::Select);
        assert_eq!(c.table, None);
    }

    #[test]
    fn test_select_subquery_has_no_table() {
        let c = classify("SELECT * FROM (SELECT id FROM users) sub");
        assert_eq!(c.kind, StatementKind::Select);
        assert_eq!(c.table, None);
    }

    #[test]
    fn test_mutations() {
        let c = classify("INSERT INTO orders (id) VALUES (1)");
        assert_eq!(c.kind, StatementKind::Insert);
        assert_eq!(c.table.as_deref(), Some("orders"));
        assert!(c.is_mutation);

        let c = classify("update `users` set name = 'x' where id = 1");
        assert_eq!(c.kind, StatementKind::Update);
        assert_eq!(c.table.as_deref(), Some("users"));
        assert!(c.is_mutation);

        let c = classify("DELETE FROM users WHERE id = 1");
        assert_eq!(c.kind, StatementKind::Delete);
        assert_eq!(c.table.as_deref(), Some("users"));
        assert!(c.is_mutation);
    }

    #[test]
    fn test_ddl() {
        let c = classify("CREATE TABLE IF NOT EXISTS t1_orders (id BIGINT)");
        assert_eq!(c.kind, StatementKind::Ddl);
        assert_eq!(c.table.as_deref(), Some("t1_orders"));
        assert!(!c.is_mutation);

        let c = classify("DROP TABLE IF EXISTS t1_orders");
        assert_eq!(c.table.as_deref(), Some("t1_orders"));

        let c = classify("TRUNCATE archive");
        assert_eq!(c.kind, StatementKind::Ddl);
        assert_eq!(c.table.as_deref(), Some("archive"));
    }

    #[test]
    fn test_leading_comment_then_statement() {
        let c = classify("/*+ strong */ SELECT * FROM users");
        assert_eq!(c.kind, StatementKind::Select);
        assert_eq!(c.table.as_deref(), Some("users"));
        assert_eq!(c.hint, Hint::Strong);
    }

    #[test]
    fn test_malformed_is_other() {
        assert_eq!(classify("").kind, StatementKind::Other);
        assert_eq!(classify("   ").kind, StatementKind::Other);
        assert_eq!(classify("EXPLAIN SELECT 1").kind, StatementKind::Other);
        assert_eq!(classify("12 monkeys").kind, StatementKind::Other);
    }

    #[test]
    fn test_from_inside_literal_ignored() {
        let c = classify("SELECT 'FROM fake'");
        assert_eq!(c.table, None);
    }

    #[test]
    fn test_ddl_idempotence_guard() {
        assert!(ddl_idempotent("DROP TABLE IF EXISTS t"));
        assert!(!ddl_idempotent("DROP TABLE t"));
        assert!(ddl_idempotent("CREATE TABLE IF NOT EXISTS t (id INT)"));
        assert!(!ddl_idempotent("CREATE TABLE t (id INT)"));
        assert!(ddl_idempotent("TRUNCATE t"));
        assert!(!ddl_idempotent("ALTER TABLE t ADD COLUMN x INT"));
        assert!(ddl_idempotent("INSERT INTO t (id) VALUES (1)"));
    }
}
