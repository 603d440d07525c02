//! Tenant isolation rewrite. Every statement leaving the gateway
//! reads or mutates rows of exactly one tenant: the rewriter injects
//! the `tenant_id` predicate or column before routing.

use tracing::warn;

use super::classifier::{Classification, StatementKind};
use super::error::Error;
use super::sql::{
    find_clause, identifier_at, match_words, skip_quoted, skip_whitespace_and_comments,
};
use crate::routing::TenantId;
use crate::util::escape_single_quotes;

/// Table names DDL may create without a tenant prefix.
const SYSTEM_TABLES: &[&str] = &["migrations", "schema_versions", "system_config"];

pub fn rewrite(
    sql: &str,
    classification: &Classification,
    tenant: &TenantId,
    strict: bool,
) -> Result<String, Error> {
    let sql = trim_statement(sql);

    match classification.kind {
        StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
            if classification.kind == StatementKind::Select && classification.table.is_none() {
                // No table, nothing to scope (SELECT 1 and friends).
                return Ok(sql.to_string());
            }
            Ok(inject_predicate(sql, tenant))
        }
        StatementKind::Insert => rewrite_insert(sql, tenant, strict),
        StatementKind::Ddl => {
            check_ddl_table(classification.table.as_deref(), tenant);
            // Attribution comment: the shard's mutation log needs the
            // tenant so split tail-replay can filter DDL events.
            Ok(format!(
                "{} /* tenant_id = '{}' */",
                sql,
                escape_single_quotes(tenant.as_str())
            ))
        }
        _ => Ok(sql.to_string()),
    }
}

fn trim_statement(sql: &str) -> &str {
    let sql = sql.trim_end();
    sql.strip_suffix(';').map(|s| s.trim_end()).unwrap_or(sql)
}

fn tenant_predicate(tenant: &TenantId) -> String {
    format!("tenant_id = '{}'", escape_single_quotes(tenant.as_str()))
}

/// First clause that terminates a WHERE predicate, or end of statement.
fn next_clause(sql: &str, from: usize) -> usize {
    [
        &["GROUP", "BY"][..],
        &["ORDER", "BY"][..],
        &["LIMIT"][..],
        &["HAVING"][..],
    ]
    .iter()
    .filter_map(|words| find_clause(sql, words, from))
    .min()
    .unwrap_or(sql.len())
}

fn inject_predicate(sql: &str, tenant: &TenantId) -> String {
    let predicate = tenant_predicate(tenant);

    if let Some(where_pos) = find_clause(sql, &["WHERE"], 0) {
        let after = match_words(sql, where_pos, &["WHERE"]).unwrap_or(where_pos + 5);
        let end = next_clause(sql, after);
        let existing = sql[after..end].trim();
        let rest = sql[end..].trim_start();

        let mut out = format!("{} {} AND ({})", &sql[..after], predicate, existing);
        if !rest.is_empty() {
            out.push(' ');
            out.push_str(rest);
        }
        out
    } else {
        let pos = next_clause(sql, 0);
        let head = sql[..pos].trim_end();
        let rest = sql[pos..].trim_start();

        let mut out = format!("{} WHERE {}", head, predicate);
        if !rest.is_empty() {
            out.push(' ');
            out.push_str(rest);
        }
        out
    }
}

/// Quote-aware matching `)` for the `(` at `open`.
fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i),
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    None
}

fn has_tenant_column(columns: &str) -> bool {
    columns
        .split(',')
        .any(|column| column.trim().trim_matches('`').eq_ignore_ascii_case("tenant_id"))
}

fn rewrite_insert(sql: &str, tenant: &TenantId, strict: bool) -> Result<String, Error> {
    let bytes = sql.as_bytes();

    let into = find_clause(sql, &["INTO"], 0)
        .ok_or_else(|| Error::InvalidQuery("INSERT without INTO".into()))?;
    let after_into = match_words(sql, into, &["INTO"]).unwrap_or(into + 4);
    let ident_start = skip_whitespace_and_comments(sql, after_into);
    let (_, ident_end) = identifier_at(sql, ident_start)
        .ok_or_else(|| Error::InvalidQuery("INSERT without a table".into()))?;

    let open = skip_whitespace_and_comments(sql, ident_end);
    if open >= bytes.len() || bytes[open] != b'(' {
        if strict {
            return Err(Error::InvalidQuery(
                "INSERT without a column list cannot be tenant-scoped".into(),
            ));
        }
        warn!("INSERT without a column list passed through unscoped");
        return Ok(sql.to_string());
    }

    let close = matching_paren(sql, open)
        .ok_or_else(|| Error::InvalidQuery("unterminated column list".into()))?;
    if has_tenant_column(&sql[open + 1..close]) {
        return Ok(sql.to_string());
    }

    let values = match find_clause(sql, &["VALUES"], close) {
        Some(values) => values,
        None => {
            // INSERT … SELECT: appending a column without a value
            // would break the statement.
            warn!("INSERT without a VALUES list passed through unscoped");
            return Ok(sql.to_string());
        }
    };
    let after_values = match_words(sql, values, &["VALUES"]).unwrap_or(values + 6);

    // Splice points: the column list close paren, then each tuple's.
    let mut tuple_closes = vec![];
    let mut i = skip_whitespace_and_comments(sql, after_values);
    while i < bytes.len() && bytes[i] == b'(' {
        let tuple_close = matching_paren(sql, i)
            .ok_or_else(|| Error::InvalidQuery("unterminated value tuple".into()))?;
        tuple_closes.push(tuple_close);
        i = skip_whitespace_and_comments(sql, tuple_close + 1);
        if i < bytes.len() && bytes[i] == b',' {
            i = skip_whitespace_and_comments(sql, i + 1);
        } else {
            break;
        }
    }
    if tuple_closes.is_empty() {
        return Err(Error::InvalidQuery("VALUES without a tuple".into()));
    }

    let value = format!(", '{}'", escape_single_quotes(tenant.as_str()));
    let mut out = String::with_capacity(sql.len() + value.len() * (tuple_closes.len() + 1));
    let mut cursor = 0;

    out.push_str(&sql[cursor..close]);
    out.push_str(", tenant_id");
    cursor = close;

    for tuple_close in tuple_closes {
        out.push_str(&sql[cursor..tuple_close]);
        out.push_str(&value);
        cursor = tuple_close;
    }
    out.push_str(&sql[cursor..]);

    Ok(out)
}

/// New tables are either tenant-prefixed or system tables; anything
/// else is allowed with a warning.
fn check_ddl_table(table: Option<&str>, tenant: &TenantId) {
    let table = match table {
        Some(table) => table,
        None => return,
    };
    let prefixed = table.starts_with(&format!("{}_", tenant));
    let system = SYSTEM_TABLES.contains(&table);
    if !prefixed && !system {
        warn!(
            "DDL table \"{}\" is neither \"{}_\"-prefixed nor a system table",
            table, tenant
        );
    }
}
