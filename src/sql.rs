use chrono::DateTime;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Column order for `INSERT INTO bookings VALUES (...)` without a column list.
const INSERT_COLUMNS: [&str; 4] = ["owner_id", "booked_by", "start", "end"];

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBooking {
        owner_id: Ulid,
        booked_by: String,
        start: Ms,
        end: Ms,
        returning: bool,
    },
    UpdateBooking {
        id: Ulid,
        patch: BookingPatch,
        returning: bool,
    },
    DeleteBooking {
        id: Ulid,
    },
    /// An owner's bookings; with `window`, only those overlapping it.
    SelectBookings {
        owner_id: Ulid,
        window: Option<Span>,
        exclude_id: Option<Ulid>,
    },
    SelectBooking {
        id: Ulid,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(table, assignments, selection, returning.is_some()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Whether a statement answers with booking rows. Only the statement shape
/// is inspected, so unbound `$n` placeholders are fine.
pub fn returns_rows(sql: &str) -> bool {
    let Ok(stmts) = Parser::parse_sql(&PostgreSqlDialect {}, sql) else {
        return false;
    };
    match stmts.as_slice() {
        [Statement::Query(_)] => true,
        [Statement::Insert(insert)] => insert.returning.is_some(),
        [Statement::Update { returning, .. }] => returning.is_some(),
        _ => false,
    }
}

fn expect_bookings(table: String) -> Result<(), SqlError> {
    if table == "bookings" {
        Ok(())
    } else {
        Err(SqlError::UnknownTable(table))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    expect_bookings(insert_table_name(insert)?)?;
    let rows = extract_insert_rows(insert)?;
    let [row] = rows else {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    };

    let columns: Vec<String> = if insert.columns.is_empty() {
        INSERT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != row.len() {
        return Err(SqlError::Parse(format!(
            "{} columns but {} values",
            columns.len(),
            row.len()
        )));
    }

    let (mut owner_id, mut booked_by, mut start, mut end) = (None, None, None, None);
    for (column, expr) in columns.iter().zip(row) {
        match column.as_str() {
            "owner_id" => owner_id = parse_ulid_or_null(expr, "owner_id")?,
            "booked_by" => booked_by = parse_string_or_null(expr, "booked_by")?,
            "start" => start = parse_timestamp_or_null(expr, "start")?,
            "end" => end = parse_timestamp_or_null(expr, "end")?,
            "id" => return Err(SqlError::invalid("id", "assigned by the server")),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::InsertBooking {
        owner_id: owner_id.ok_or(SqlError::MissingColumn("owner_id"))?,
        booked_by: booked_by.ok_or(SqlError::MissingColumn("booked_by"))?,
        start: start.ok_or(SqlError::MissingColumn("start"))?,
        end: end.ok_or(SqlError::MissingColumn("end"))?,
        returning: insert.returning.is_some(),
    })
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
    returning: bool,
) -> Result<Command, SqlError> {
    expect_bookings(table_factor_name(&table.relation)?)?;

    let mut patch = BookingPatch::default();
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        let value = &assignment.value;
        match column.as_str() {
            "start" => patch.start = Some(parse_timestamp(value, "start")?),
            "end" => patch.end = Some(parse_timestamp(value, "end")?),
            "booked_by" => {
                patch.booked_by = Some(
                    parse_string_or_null(value, "booked_by")?
                        .ok_or(SqlError::MissingColumn("booked_by"))?,
                )
            }
            "owner_id" => return Err(SqlError::invalid("owner_id", "cannot be changed")),
            "id" => return Err(SqlError::invalid("id", "cannot be changed")),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::UpdateBooking {
        id: extract_where_id(selection)?,
        patch,
        returning,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    expect_bookings(delete_table_name(delete)?)?;
    Ok(Command::DeleteBooking {
        id: extract_where_id(&delete.selection)?,
    })
}

/// Equality and comparison filters collected from a SELECT's WHERE clause.
#[derive(Default)]
struct BookingFilters {
    owner_id: Option<Ulid>,
    id: Option<Ulid>,
    exclude_id: Option<Ulid>,
    /// `start < x`: bookings starting before the window ends.
    starts_before: Option<Ms>,
    /// `"end" > x`: bookings ending after the window starts.
    ends_after: Option<Ms>,
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    expect_bookings(table_factor_name(&from.relation)?)?;

    let mut filters = BookingFilters::default();
    if let Some(selection) = &select.selection {
        extract_booking_filters(selection, &mut filters)?;
    }

    let window = match (filters.ends_after, filters.starts_before) {
        (None, None) => None,
        (Some(start), Some(end)) => Some(
            Span::try_new(start, end)
                .ok_or_else(|| SqlError::invalid("start", "overlap window is empty"))?,
        ),
        _ => {
            return Err(SqlError::Parse(
                "overlap filter needs both start < .. and \"end\" > ..".into(),
            ));
        }
    };

    match (filters.owner_id, filters.id) {
        (Some(owner_id), _) => Ok(Command::SelectBookings {
            owner_id,
            window,
            exclude_id: filters.exclude_id,
        }),
        (None, Some(id)) => Ok(Command::SelectBooking { id }),
        (None, None) => Err(SqlError::MissingFilter("owner_id")),
    }
}

fn extract_booking_filters(expr: &Expr, filters: &mut BookingFilters) -> Result<(), SqlError> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return Err(SqlError::Unsupported(format!("filter: {expr}")));
    };
    if *op == ast::BinaryOperator::And {
        extract_booking_filters(left, filters)?;
        return extract_booking_filters(right, filters);
    }
    let column = expr_column_name(left)
        .ok_or_else(|| SqlError::Unsupported(format!("filter: {expr}")))?;
    match (column.as_str(), op) {
        ("owner_id", ast::BinaryOperator::Eq) => {
            filters.owner_id = Some(parse_ulid_expr(right, "owner_id")?)
        }
        ("id", ast::BinaryOperator::Eq) => filters.id = Some(parse_ulid_expr(right, "id")?),
        ("id", ast::BinaryOperator::NotEq) => {
            filters.exclude_id = Some(parse_ulid_expr(right, "id")?)
        }
        ("start", ast::BinaryOperator::Lt) => {
            filters.starts_before = Some(parse_timestamp(right, "start")?)
        }
        ("end", ast::BinaryOperator::Gt) => {
            filters.ends_after = Some(parse_timestamp(right, "end")?)
        }
        _ => return Err(SqlError::Unsupported(format!("filter: {expr}"))),
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if values.rows.is_empty() => {
            Err(SqlError::Parse("empty VALUES".into()))
        }
        SetExpr::Values(values) => Ok(&values.rows),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right, "id"),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid_expr(expr: &Expr, column: &'static str) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::invalid(column, format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::invalid(column, format!("expected ULID string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid_or_null(expr: &Expr, column: &'static str) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_ulid_expr(expr, column).map(Some)
}

fn parse_string_or_null(expr: &Expr, column: &'static str) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::invalid(column, format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// Unix milliseconds, or an RFC 3339 instant normalised to UTC.
pub fn parse_timestamp_str(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        return Some(ms);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn parse_timestamp(expr: &Expr, column: &'static str) -> Result<Ms, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr: inner,
    } = expr
    {
        return parse_timestamp(inner, column)?
            .checked_neg()
            .ok_or_else(|| SqlError::invalid(column, "timestamp out of range"));
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) => s
            .parse()
            .map_err(|e| SqlError::invalid(column, format!("bad milliseconds: {e}"))),
        Some(Value::SingleQuotedString(s)) => parse_timestamp_str(s)
            .ok_or_else(|| SqlError::invalid(column, format!("bad timestamp: {s}"))),
        Some(value) => Err(SqlError::invalid(column, format!("expected timestamp, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_timestamp_or_null(expr: &Expr, column: &'static str) -> Result<Option<Ms>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_timestamp(expr, column).map(Some)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    InvalidValue { column: &'static str, reason: String },
}

impl SqlError {
    fn invalid(column: &'static str, reason: impl Into<String>) -> Self {
        SqlError::InvalidValue {
            column,
            reason: reason.into(),
        }
    }

    /// SQLSTATE: bad input values are 22023, everything else is a syntax error.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::MissingColumn(_) | SqlError::InvalidValue { .. } => "22023",
            _ => "42601",
        }
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(c) => write!(f, "missing value for {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidValue { column, reason } => write!(f, "invalid {column}: {reason}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const BOOKING: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    #[test]
    fn parse_insert_with_columns() {
        let sql = format!(
            r#"INSERT INTO bookings (owner_id, booked_by, start, "end") VALUES ('{OWNER}', 'guest1@example.com', 1000, 2000)"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { owner_id, booked_by, start, end, returning } => {
                assert_eq!(owner_id.to_string(), OWNER);
                assert_eq!(booked_by, "guest1@example.com");
                assert_eq!(start, 1000);
                assert_eq!(end, 2000);
                assert!(!returning);
            }
            cmd => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_columns_in_any_order() {
        let sql = format!(
            r#"INSERT INTO bookings ("end", start, booked_by, owner_id) VALUES (2000, 1000, 'g', '{OWNER}') RETURNING *"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { start, end, returning, .. } => {
                assert_eq!((start, end), (1000, 2000));
                assert!(returning);
            }
            cmd => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_positional() {
        let sql = format!("INSERT INTO bookings VALUES ('{OWNER}', 'g', 1000, 2000)");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::InsertBooking { start: 1000, end: 2000, .. }));
    }

    #[test]
    fn parse_insert_rfc3339_normalised_to_utc() {
        let sql = format!(
            r#"INSERT INTO bookings (owner_id, booked_by, start, "end") VALUES ('{OWNER}', 'g', '2025-06-05T11:00:00+02:00', '2025-06-05T10:00:00Z')"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { start, end, .. } => {
                assert_eq!(start, 1_749_114_000_000); // 09:00Z
                assert_eq!(end, start + 3_600_000);
            }
            cmd => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_missing_field() {
        let sql = format!(
            r#"INSERT INTO bookings (owner_id, start, "end") VALUES ('{OWNER}', 1000, 2000)"#
        );
        let err = parse_sql(&sql).unwrap_err();
        assert!(matches!(err, SqlError::MissingColumn("booked_by")));
        assert_eq!(err.sqlstate(), "22023");

        let sql = format!(
            r#"INSERT INTO bookings (owner_id, booked_by, start, "end") VALUES ('{OWNER}', NULL, 1000, 2000)"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("booked_by"))));
    }

    #[test]
    fn parse_insert_rejects_client_id() {
        let sql = format!(
            r#"INSERT INTO bookings (id, owner_id, booked_by, start, "end") VALUES ('{BOOKING}', '{OWNER}', 'g', 1000, 2000)"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::InvalidValue { column: "id", .. })));
    }

    #[test]
    fn parse_insert_bad_values() {
        let sql = format!("INSERT INTO bookings VALUES ('not-a-ulid', 'g', 1000, 2000)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::InvalidValue { column: "owner_id", .. })));

        let sql = format!("INSERT INTO bookings VALUES ('{OWNER}', 'g', 'next tuesday', 2000)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::InvalidValue { column: "start", .. })));
    }

    #[test]
    fn parse_multi_row_insert_unsupported() {
        let sql = format!(
            "INSERT INTO bookings VALUES ('{OWNER}', 'a', 1000, 2000), ('{OWNER}', 'b', 3000, 4000)"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_partial() {
        let sql = format!(r#"UPDATE bookings SET "end" = 5000 WHERE id = '{BOOKING}'"#);
        match parse_sql(&sql).unwrap() {
            Command::UpdateBooking { id, patch, returning } => {
                assert_eq!(id.to_string(), BOOKING);
                assert_eq!(
                    patch,
                    BookingPatch {
                        end: Some(5000),
                        ..Default::default()
                    }
                );
                assert!(!returning);
            }
            cmd => panic!("expected UpdateBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_all_fields_returning() {
        let sql = format!(
            r#"UPDATE bookings SET start = '2025-06-05T09:00:00Z', "end" = 1749117600000, booked_by = 'h' WHERE id = '{BOOKING}' RETURNING *"#
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateBooking { patch, returning, .. } => {
                assert_eq!(patch.start, Some(1_749_114_000_000));
                assert_eq!(patch.end, Some(1_749_117_600_000));
                assert_eq!(patch.booked_by.as_deref(), Some("h"));
                assert!(returning);
            }
            cmd => panic!("expected UpdateBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_owner_rejected() {
        let sql = format!("UPDATE bookings SET owner_id = '{OWNER}' WHERE id = '{BOOKING}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::InvalidValue { column: "owner_id", .. })));
    }

    #[test]
    fn parse_update_requires_where_id() {
        let sql = "UPDATE bookings SET booked_by = 'x'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_booking() {
        let sql = format!("DELETE FROM bookings WHERE id = '{BOOKING}'");
        match parse_sql(&sql).unwrap() {
            Command::DeleteBooking { id } => assert_eq!(id.to_string(), BOOKING),
            cmd => panic!("expected DeleteBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_by_owner() {
        let sql = format!("SELECT * FROM bookings WHERE owner_id = '{OWNER}'");
        match parse_sql(&sql).unwrap() {
            Command::SelectBookings { owner_id, window, exclude_id } => {
                assert_eq!(owner_id.to_string(), OWNER);
                assert_eq!(window, None);
                assert_eq!(exclude_id, None);
            }
            cmd => panic!("expected SelectBookings, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_overlap_window() {
        let sql = format!(
            r#"SELECT * FROM bookings WHERE owner_id = '{OWNER}' AND start < 2000 AND "end" > 1000 AND id <> '{BOOKING}'"#
        );
        match parse_sql(&sql).unwrap() {
            Command::SelectBookings { window, exclude_id, .. } => {
                assert_eq!(window, Some(Span::new(1000, 2000)));
                assert_eq!(exclude_id.map(|id| id.to_string()).as_deref(), Some(BOOKING));
            }
            cmd => panic!("expected SelectBookings, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_half_window_rejected() {
        let sql = format!("SELECT * FROM bookings WHERE owner_id = '{OWNER}' AND start < 2000");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_by_id() {
        let sql = format!("SELECT * FROM bookings WHERE id = '{BOOKING}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::SelectBooking { .. }));
    }

    #[test]
    fn parse_select_requires_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM bookings"),
            Err(SqlError::MissingFilter("owner_id"))
        ));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("DELETE FROM users WHERE id = '{OWNER}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(t)) if t == "users"));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }

    #[test]
    fn timestamp_strings() {
        assert_eq!(parse_timestamp_str("1749114000000"), Some(1_749_114_000_000));
        assert_eq!(parse_timestamp_str("2025-06-05T09:00:00Z"), Some(1_749_114_000_000));
        assert_eq!(parse_timestamp_str("2025-06-05T09:00:00.250Z"), Some(1_749_114_000_250));
        assert_eq!(parse_timestamp_str("yesterday"), None);
    }

    #[test]
    fn negated_timestamp_overflow_is_invalid() {
        let sql = format!(
            "UPDATE bookings SET start = -'-9223372036854775808' WHERE id = '{BOOKING}'"
        );
        let err = parse_sql(&sql).unwrap_err();
        assert!(matches!(err, SqlError::InvalidValue { column: "start", .. }));
        assert_eq!(err.sqlstate(), "22023");

        let sql = format!(r#"UPDATE bookings SET "end" = -5 WHERE id = '{BOOKING}'"#);
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::UpdateBooking { patch: BookingPatch { end: Some(-5), .. }, .. }
        ));
    }

    #[test]
    fn returns_rows_follows_statement_shape() {
        assert!(returns_rows("SELECT * FROM bookings WHERE owner_id = $1"));
        assert!(returns_rows(
            r#"INSERT INTO bookings (owner_id, booked_by, start, "end") VALUES ($1, $2, $3, $4) RETURNING *"#
        ));
        assert!(returns_rows(r#"UPDATE bookings SET "end" = $1 WHERE id = $2 RETURNING *"#));
        assert!(!returns_rows("DELETE FROM bookings WHERE id = $1"));
        assert!(!returns_rows(r#"UPDATE bookings SET "end" = $1 WHERE id = $2"#));
        // Keyword inside a literal is just data
        assert!(!returns_rows(&format!(
            r#"INSERT INTO bookings VALUES ('{OWNER}', 'returning guest', 1000, 2000)"#
        )));
        assert!(!returns_rows("not sql"));
    }
}
