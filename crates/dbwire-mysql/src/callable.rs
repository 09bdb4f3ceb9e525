//! Callable statement support (`CALL procedure(...)`).
//!
//! The binary protocol doesn't surface `OUT`/`INOUT` stored-procedure
//! parameters as bind values the way it does for a plain prepared statement
//! — a `CALL` only ever comes back as one or more ordinary result sets. The
//! common driver-level workaround (shared by most MySQL client libraries,
//! JDBC included) is to bind `OUT`/`INOUT` arguments to MySQL user-defined
//! session variables in the `CALL` text itself, then read them back with a
//! trailing `SELECT`.

use dbwire_core::Value;

/// Parameter direction for a callable-statement argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// Value flows into the procedure only.
    In,
    /// Value flows out of the procedure only; the caller's value is ignored.
    Out,
    /// Value flows both ways.
    InOut,
}

impl ParamMode {
    /// Parse a `PARAMETER_MODE` value from `INFORMATION_SCHEMA.PARAMETERS`
    /// (`"IN"`, `"OUT"`, `"INOUT"`, case-insensitively).
    #[must_use]
    pub fn from_information_schema(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "INOUT" => Some(Self::InOut),
            _ => None,
        }
    }
}

/// Build the `INFORMATION_SCHEMA.PARAMETERS` query (§4.5.4) that resolves a
/// stored procedure's declared parameter directions, in ordinal order.
#[must_use]
pub fn parameter_modes_query(procedure: &str) -> String {
    format!(
        "SELECT PARAMETER_MODE FROM INFORMATION_SCHEMA.PARAMETERS WHERE \
         SPECIFIC_NAME = {} AND ROUTINE_TYPE = 'PROCEDURE' AND PARAMETER_MODE IS NOT NULL \
         ORDER BY ORDINAL_POSITION",
        crate::types::quote_text_literal(procedure, false),
    )
}

/// One bound argument to a [`CallableStatement`].
#[derive(Debug, Clone)]
pub struct CallableParam {
    pub mode: ParamMode,
    pub value: Value,
}

impl CallableParam {
    #[must_use]
    pub fn input(value: Value) -> Self {
        Self { mode: ParamMode::In, value }
    }

    #[must_use]
    pub fn output() -> Self {
        Self { mode: ParamMode::Out, value: Value::Null }
    }

    #[must_use]
    pub fn in_out(value: Value) -> Self {
        Self { mode: ParamMode::InOut, value }
    }
}

/// A parsed `CALL procedure_name(...)` invocation with typed parameter
/// directions attached.
#[derive(Debug, Clone)]
pub struct CallableStatement {
    pub procedure: String,
    pub params: Vec<CallableParam>,
}

impl CallableStatement {
    #[must_use]
    pub fn new(procedure: impl Into<String>, params: Vec<CallableParam>) -> Self {
        Self { procedure: procedure.into(), params }
    }

    /// Session variable name bound to the `n`th parameter.
    fn var_name(n: usize) -> String {
        format!("@dbwire_callable_p{n}")
    }

    /// Build the `CALL` statement text to send over `COM_QUERY`.
    ///
    /// `IN` parameters are inlined as literals (quoted/escaped the same way
    /// client-prepared statements are); `OUT`/`INOUT` parameters are bound to
    /// a session variable, seeded with the caller's value first when the
    /// parameter is `INOUT`. `no_backslash_escapes` selects quote-doubling-only
    /// quoting when the session's `sql_mode` contains `NO_BACKSLASH_ESCAPES`.
    ///
    /// # Errors
    /// Propagates [`crate::types::format_value_for_sql`]'s rejection of
    /// non-finite `IN` float parameters.
    pub fn build_call_sql(&self, no_backslash_escapes: bool) -> Result<String, String> {
        let args: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| match p.mode {
                ParamMode::In => crate::types::format_value_for_sql(&p.value, no_backslash_escapes),
                ParamMode::Out | ParamMode::InOut => Ok(Self::var_name(i)),
            })
            .collect::<Result<_, _>>()?;
        Ok(format!("CALL {}({})", self.procedure, args.join(", ")))
    }

    /// Build the `SET` statement that seeds `INOUT` session variables before
    /// the `CALL`, or `None` if there's nothing to seed.
    ///
    /// # Errors
    /// Propagates [`crate::types::format_value_for_sql`]'s rejection of
    /// non-finite `INOUT` float parameters.
    pub fn build_seed_sql(&self, no_backslash_escapes: bool) -> Result<Option<String>, String> {
        let assignments: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.mode == ParamMode::InOut)
            .map(|(i, p)| {
                Ok(format!(
                    "{} := {}",
                    Self::var_name(i),
                    crate::types::format_value_for_sql(&p.value, no_backslash_escapes)?
                ))
            })
            .collect::<Result<_, String>>()?;
        if assignments.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("SET {}", assignments.join(", "))))
        }
    }

    /// Build the `SELECT` statement that retrieves `OUT`/`INOUT` values after
    /// the `CALL` completes, or `None` if there are none to retrieve.
    #[must_use]
    pub fn build_fetch_sql(&self) -> Option<String> {
        let vars: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.mode, ParamMode::Out | ParamMode::InOut))
            .map(|(i, _)| Self::var_name(i))
            .collect();
        if vars.is_empty() {
            None
        } else {
            Some(format!("SELECT {}", vars.join(", ")))
        }
    }

    /// Indices (into `self.params`) of the `OUT`/`INOUT` parameters, in the
    /// order they appear in `build_fetch_sql`'s projection — used to splice
    /// the fetched row's values back into the right slots.
    #[must_use]
    pub fn output_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.mode, ParamMode::Out | ParamMode::InOut))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Parse a bare `CALL procedure_name(...)` SQL string into a procedure name
/// and placeholder count, for callers that want to attach parameter modes
/// themselves via [`CallableStatement::new`].
///
/// Returns `None` if `sql` isn't a recognizable `CALL` statement.
#[must_use]
pub fn parse_call(sql: &str) -> Option<(String, usize)> {
    let trimmed = sql.trim();
    let rest = trimmed.strip_prefix("CALL ").or_else(|| trimmed.strip_prefix("call "))?;
    let open = rest.find('(')?;
    let name = rest[..open].trim().to_string();
    if name.is_empty() {
        return None;
    }
    let close = rest.rfind(')')?;
    if close < open {
        return None;
    }
    let arg_list = &rest[open + 1..close];
    let count = if arg_list.trim().is_empty() {
        0
    } else {
        crate::types::count_placeholders(arg_list)
    };
    Some((name, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_call_extracts_name_and_arity() {
        assert_eq!(parse_call("CALL sp_get_user(?, ?)"), Some(("sp_get_user".to_string(), 2)));
        assert_eq!(parse_call("call noop()"), Some(("noop".to_string(), 0)));
        assert_eq!(parse_call("SELECT 1"), None);
    }

    #[test]
    fn build_call_sql_inlines_in_binds_out_to_session_vars() {
        let stmt = CallableStatement::new(
            "sp_adjust_balance",
            vec![
                CallableParam::input(Value::Int(7)),
                CallableParam::output(),
            ],
        );
        assert_eq!(
            stmt.build_call_sql(false).unwrap(),
            "CALL sp_adjust_balance(7, @dbwire_callable_p1)"
        );
        assert_eq!(stmt.build_fetch_sql(), Some("SELECT @dbwire_callable_p1".to_string()));
        assert_eq!(stmt.output_indices(), vec![1]);
    }

    #[test]
    fn inout_param_is_seeded_then_fetched() {
        let stmt = CallableStatement::new(
            "sp_increment",
            vec![CallableParam::in_out(Value::Int(10))],
        );
        assert_eq!(
            stmt.build_seed_sql(false).unwrap(),
            Some("SET @dbwire_callable_p0 := 10".to_string())
        );
        assert_eq!(
            stmt.build_call_sql(false).unwrap(),
            "CALL sp_increment(@dbwire_callable_p0)"
        );
        assert_eq!(stmt.build_fetch_sql(), Some("SELECT @dbwire_callable_p0".to_string()));
    }

    #[test]
    fn build_call_sql_rejects_non_finite_in_param() {
        let stmt = CallableStatement::new(
            "sp_log_reading",
            vec![CallableParam::input(Value::Double(f64::NAN))],
        );
        assert!(stmt.build_call_sql(false).is_err());
    }

    #[test]
    fn no_backslash_escapes_affects_in_param_quoting() {
        let stmt = CallableStatement::new(
            "sp_log",
            vec![CallableParam::input(Value::Text("a\\b".to_string()))],
        );
        assert_eq!(stmt.build_call_sql(false).unwrap(), "CALL sp_log('a\\\\b')");
        assert_eq!(stmt.build_call_sql(true).unwrap(), "CALL sp_log('a\\b')");
    }

    #[test]
    fn parameter_modes_query_quotes_procedure_name() {
        let sql = parameter_modes_query("sp_o'brien");
        assert!(sql.contains("SPECIFIC_NAME = 'sp_o''brien'"));
        assert!(sql.contains("ORDER BY ORDINAL_POSITION"));
    }

    #[test]
    fn param_mode_parses_information_schema_values() {
        assert_eq!(ParamMode::from_information_schema("in"), Some(ParamMode::In));
        assert_eq!(ParamMode::from_information_schema("OUT"), Some(ParamMode::Out));
        assert_eq!(ParamMode::from_information_schema("InOut"), Some(ParamMode::InOut));
        assert_eq!(ParamMode::from_information_schema("bogus"), None);
    }

    #[test]
    fn all_in_params_need_no_fetch() {
        let stmt = CallableStatement::new(
            "sp_log",
            vec![CallableParam::input(Value::Text("hi".to_string()))],
        );
        assert!(stmt.build_fetch_sql().is_none());
        assert!(stmt.build_seed_sql(false).unwrap().is_none());
    }
}
