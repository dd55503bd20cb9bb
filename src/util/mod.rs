use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub fn normalize_sql_whitespace(sql: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(sql.trim(), " ").to_string()
}

/// Normalizes an expression or definition fragment for comparison: collapses whitespace,
/// drops spaces just inside parentheses and lowercases type casts.
pub fn normalize_expression(expr: &str) -> String {
    static CAST: OnceLock<Regex> = OnceLock::new();
    static PAREN_OPEN: OnceLock<Regex> = OnceLock::new();
    static PAREN_CLOSE: OnceLock<Regex> = OnceLock::new();

    let collapsed = normalize_sql_whitespace(expr);
    let re_cast = CAST.get_or_init(|| {
        Regex::new(r"::([A-Za-z][A-Za-z0-9_\[\]]*)").expect("static regex")
    });
    let lowered = re_cast
        .replace_all(&collapsed, |caps: &regex::Captures| {
            format!("::{}", caps[1].to_lowercase())
        })
        .to_string();

    let re_open = PAREN_OPEN.get_or_init(|| Regex::new(r"\(\s+").expect("static regex"));
    let re_close = PAREN_CLOSE.get_or_init(|| Regex::new(r"\s+\)").expect("static regex"));
    let no_space_after_open = re_open.replace_all(&lowered, "(");
    re_close.replace_all(&no_space_after_open, ")").to_string()
}

pub fn expressions_equal(a: &str, b: &str) -> bool {
    normalize_expression(a) == normalize_expression(b)
}

pub fn optional_expressions_equal(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => expressions_equal(a, b),
        _ => false,
    }
}

/// Canonical spelling of a column type, so `int4`, `INT` and `integer` compare equal.
pub fn normalize_type(data_type: &str) -> String {
    let lowered = normalize_sql_whitespace(data_type).to_lowercase();
    let (base, suffix) = match lowered.find(['(', '[']) {
        Some(pos) => (lowered[..pos].trim_end(), &lowered[pos..]),
        None => (lowered.as_str(), ""),
    };
    let canonical = match base {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "serial4" => "serial",
        "serial8" => "bigserial",
        "bool" => "boolean",
        "varchar" => "character varying",
        "char" => "character",
        "float8" | "double" => "double precision",
        "float4" => "real",
        "decimal" => "numeric",
        "timestamp without time zone" => "timestamp",
        "timestamptz" => "timestamp with time zone",
        "timetz" => "time with time zone",
        "time without time zone" => "time",
        other => other,
    };
    format!("{canonical}{}", suffix.replace(' ', ""))
}

pub fn types_equal(a: &str, b: &str) -> bool {
    normalize_type(a) == normalize_type(b)
}

/// Auto-incrementing pseudo types.
pub fn is_serial_type(data_type: &str) -> bool {
    matches!(
        normalize_type(data_type).as_str(),
        "serial" | "bigserial" | "smallserial"
    )
}

/// Storage type behind an auto-incrementing pseudo type.
pub fn serial_storage_type(data_type: &str) -> String {
    match normalize_type(data_type).as_str() {
        "serial" => "integer".to_string(),
        "bigserial" => "bigint".to_string(),
        "smallserial" => "smallint".to_string(),
        _ => data_type.to_string(),
    }
}

/// Defaults evaluated from the clock. Each replica would evaluate these on its own.
pub fn is_now_expression(expr: &str) -> bool {
    static NOW: OnceLock<Regex> = OnceLock::new();
    let re = NOW.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(now\s*\(\s*\)|current_timestamp|current_date|current_time|localtimestamp|localtime|clock_timestamp\s*\(\s*\)|statement_timestamp\s*\(\s*\)|transaction_timestamp\s*\(\s*\))",
        )
        .expect("static regex")
    });
    re.is_match(expr)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Definition error in {object}: {message}")]
    Definition { object: String, message: String },

    #[error("Unsupported change to {object}: {message}")]
    UnsupportedChange { object: String, message: String },

    #[error("Invalid dependency order: {0}")]
    InvalidOrder(String),
}

impl SchemaError {
    pub fn definition(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Definition {
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedChange {
            object: object.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_expression_collapses_whitespace_and_parens() {
        assert_eq!(
            normalize_expression("CHECK (  amount   >  0 )"),
            "CHECK (amount > 0)"
        );
    }

    #[test]
    fn normalize_expression_lowercases_casts() {
        assert_eq!(normalize_expression("'a'::TEXT"), "'a'::text");
    }

    #[test]
    fn normalize_type_maps_aliases() {
        assert_eq!(normalize_type("INT4"), "integer");
        assert_eq!(normalize_type("varchar(20)"), "character varying(20)");
        assert_eq!(normalize_type("numeric(10, 2)"), "numeric(10,2)");
        assert_eq!(normalize_type("text[]"), "text[]");
        assert!(types_equal("timestamptz", "TIMESTAMP WITH TIME ZONE"));
        assert!(!types_equal("integer", "bigint"));
    }

    #[test]
    fn serial_types_are_detected() {
        assert!(is_serial_type("SERIAL"));
        assert!(is_serial_type("bigserial"));
        assert!(!is_serial_type("integer"));
        assert_eq!(serial_storage_type("bigserial"), "bigint");
        assert_eq!(serial_storage_type("text"), "text");
    }

    #[test]
    fn now_expressions_are_detected() {
        assert!(is_now_expression("now()"));
        assert!(is_now_expression("NOW( )"));
        assert!(is_now_expression("CURRENT_TIMESTAMP"));
        assert!(is_now_expression("current_date + 1"));
        assert!(!is_now_expression("'now'"));
        assert!(!is_now_expression("0"));
    }

    #[test]
    fn definition_error_names_object() {
        let err = SchemaError::definition("app.users.id", "column declares both a type and a foreign key");
        assert_eq!(
            err.to_string(),
            "Definition error in app.users.id: column declares both a type and a foreign key"
        );
    }
}
