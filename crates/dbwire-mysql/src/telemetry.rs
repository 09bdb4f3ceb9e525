//! OpenTelemetry-style span attributes and query-text sanitization (§6).
//!
//! This module does not depend on the `opentelemetry` crate — spans are
//! ordinary `tracing` spans whose field names follow the OTel semantic
//! conventions for database clients (`db.system.name`, `db.query.text`, …)
//! so a `tracing-opentelemetry` layer downstream can forward them verbatim.
//! No SQL parser lives here: just enough scanning to locate literals for
//! redaction and the leading keyword/table for a summary, per §1's
//! non-goal on a generic SQL parser.

use tracing::Span;

/// Replace string, numeric, hex, and binary literals in `sql` with `?` for
/// safe telemetry export, while leaving `LIMIT`/`OFFSET` numerics and
/// `IS [NOT] NULL` untouched.
///
/// This is a best-effort lexical scan, not a SQL parser: it tracks only
/// enough state to skip over quoted strings and to recognize the token
/// immediately preceding a numeric literal.
#[must_use]
pub fn sanitize_query_text(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0usize;
    let mut last_word = String::new();

    while i < bytes.len() {
        let c = bytes[i] as char;

        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                let start = i;
                i += 1;
                while i < bytes.len() {
                    let b = bytes[i] as char;
                    if b == '\\' && quote != '`' {
                        i += 2;
                        continue;
                    }
                    if b == quote {
                        if i + 1 < bytes.len() && bytes[i + 1] as char == quote {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                if quote == '`' {
                    // Backtick-quoted identifiers are not literals; keep verbatim.
                    out.push_str(&sql[start..i.min(sql.len())]);
                } else {
                    out.push('?');
                }
                last_word.clear();
            }
            'x' | 'X' if matches_hex_literal(bytes, i) => {
                let start = i;
                i += 2;
                while i < bytes.len() && bytes[i] as char != '\'' {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                let _ = start;
                out.push('?');
                last_word.clear();
            }
            'b' | 'B' if matches_bin_literal(bytes, i) => {
                i += 2;
                while i < bytes.len() && bytes[i] as char != '\'' {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push('?');
                last_word.clear();
            }
            '0' if i + 1 < bytes.len() && (bytes[i + 1] as char == 'x' || bytes[i + 1] as char == 'X') => {
                i += 2;
                while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                    i += 1;
                }
                out.push('?');
                last_word.clear();
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() {
                    let d = bytes[i] as char;
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        i += 1;
                    } else if (d == '+' || d == '-') && matches!(bytes.get(i.wrapping_sub(1)).map(|b| *b as char), Some('e') | Some('E')) {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let preceding = last_word.to_ascii_uppercase();
                if preceding == "LIMIT" || preceding == "OFFSET" {
                    out.push_str(&sql[start..i]);
                } else {
                    out.push('?');
                }
                last_word.clear();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let d = bytes[i] as char;
                    if d.is_ascii_alphanumeric() || d == '_' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let word = &sql[start..i];
                if word.eq_ignore_ascii_case("true") || word.eq_ignore_ascii_case("false") {
                    out.push('?');
                } else {
                    out.push_str(word);
                }
                last_word = word.to_string();
            }
            _ => {
                if !c.is_whitespace() {
                    last_word.clear();
                }
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn matches_hex_literal(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).map(|b| *b as char) == Some('\'')
}

fn matches_bin_literal(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).map(|b| *b as char) == Some('\'')
}

/// First keyword in a (sanitized) statement, upper-cased (`SELECT`, `INSERT`, …).
#[must_use]
pub fn operation_name(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

/// The table-like token following `FROM`/`INTO`/`UPDATE`/`JOIN`, if any, for
/// `db.query.summary` (e.g. `"SELECT users"`).
#[must_use]
pub fn target_table(sql: &str) -> Option<String> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    for (idx, word) in words.iter().enumerate() {
        let upper = word.to_ascii_uppercase();
        if matches!(upper.as_str(), "FROM" | "INTO" | "UPDATE" | "JOIN") {
            if let Some(next) = words.get(idx + 1) {
                let cleaned = next.trim_matches(|c: char| c == '`' || c == ',' || c == '(' || c == ')');
                if !cleaned.is_empty() {
                    return Some(cleaned.to_string());
                }
            }
        }
    }
    None
}

/// `db.query.summary` per OTel semantic conventions: `"{OPERATION} {target}"`
/// when a target table was found, else just the operation keyword.
#[must_use]
pub fn summarize(sql: &str) -> String {
    let op = operation_name(sql);
    match target_table(sql) {
        Some(table) => format!("{op} {table}"),
        None => op,
    }
}

/// Attributes describing the connection a span is attached to, filled in
/// once at handshake time and reused for every command on that connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionAttrs {
    pub server_address: String,
    pub server_port: u16,
    pub db_namespace: Option<String>,
    pub mysql_thread_id: u32,
    pub mysql_auth_plugin: Option<String>,
}

/// Open a `tracing` span for one statement dispatch, with OTel-conventioned
/// field names. `batch_size` is only recorded when `>= 2`, per §6.
#[must_use]
pub fn query_span(conn: &ConnectionAttrs, sql: &str, batch_size: Option<usize>) -> Span {
    let summary = summarize(sql);
    let sanitized = sanitize_query_text(sql);
    let span = tracing::debug_span!(
        "mysql.query",
        "db.system.name" = "mysql",
        "db.namespace" = conn.db_namespace.as_deref().unwrap_or(""),
        "db.collection.name" = target_table(sql).unwrap_or_default(),
        "db.operation.name" = operation_name(sql),
        "db.query.text" = %sanitized,
        "db.query.summary" = %summary,
        "server.address" = %conn.server_address,
        "server.port" = conn.server_port,
        "db.mysql.thread_id" = conn.mysql_thread_id,
        "db.mysql.auth_plugin" = conn.mysql_auth_plugin.as_deref().unwrap_or(""),
        "db.operation.batch.size" = tracing::field::Empty,
        "error.type" = tracing::field::Empty,
    );
    if let Some(n) = batch_size {
        if n >= 2 {
            span.record("db.operation.batch.size", n);
        }
    }
    span
}

/// Record `error.type` on a span opened by [`query_span`] after a failed
/// dispatch, using the error's variant name as the classification.
pub fn record_error_type(span: &Span, error_type: &str) {
    span.record("error.type", error_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_string_and_numeric_literals() {
        let sql = "SELECT * FROM users WHERE name = 'O''Brien' AND age = 42";
        let out = sanitize_query_text(sql);
        assert_eq!(out, "SELECT * FROM users WHERE name = ? AND age = ?");
    }

    #[test]
    fn preserves_limit_and_offset() {
        let sql = "SELECT * FROM t LIMIT 10 OFFSET 20";
        let out = sanitize_query_text(sql);
        assert_eq!(out, "SELECT * FROM t LIMIT 10 OFFSET 20");
    }

    #[test]
    fn preserves_is_null() {
        let sql = "SELECT * FROM t WHERE deleted_at IS NOT NULL";
        let out = sanitize_query_text(sql);
        assert_eq!(out, sql);
    }

    #[test]
    fn sanitizes_booleans_and_hex() {
        let sql = "UPDATE t SET active = TRUE, tok = X'DEADBEEF' WHERE id = 0x1F";
        let out = sanitize_query_text(sql);
        assert_eq!(out, "UPDATE t SET active = ?, tok = ? WHERE id = ?");
    }

    #[test]
    fn summary_extracts_operation_and_target() {
        assert_eq!(summarize("SELECT id FROM accounts WHERE id = 1"), "SELECT accounts");
        assert_eq!(summarize("CALL sp_refresh()"), "CALL");
    }

    #[test]
    fn batch_size_below_two_is_not_recorded() {
        let attrs = ConnectionAttrs {
            server_address: "127.0.0.1".into(),
            server_port: 3306,
            db_namespace: Some("test".into()),
            mysql_thread_id: 7,
            mysql_auth_plugin: Some("caching_sha2_password".into()),
        };
        // Just exercise that span construction doesn't panic for both cases.
        let _ = query_span(&attrs, "SELECT 1", Some(1));
        let _ = query_span(&attrs, "SELECT 1", Some(2));
    }
}
