//! Typed SQL values with literal encoding and bulk-file formatting.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::schema::FieldType;
use crate::dialect::Dialect;

/// A single column value read from, or written to, a database.
///
/// Binary/large-object types never appear here: they are excluded from the
/// working field intersection before any row is read.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, used for identity translation keys.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(d) => i64::try_from(*d).ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Lenient boolean view: accepts booleans, numerics (nonzero is true),
    /// and textual Y/N/T/F/true/false forms.
    #[must_use]
    pub fn as_bool_lenient(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::I64(v) => Some(*v != 0),
            SqlValue::F64(v) => Some(*v != 0.0),
            SqlValue::Decimal(d) => Some(!d.is_zero()),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "y" | "t" | "true" | "yes" | "1" => Some(true),
                "n" | "f" | "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Encode as a SQL literal for statement building.
    pub fn to_sql_literal(&self, dialect: &Dialect) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => dialect.bool_literal(*b).to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::Text(s) => dialect.quote_literal(s),
            SqlValue::Uuid(u) => format!("'{}'", u),
            SqlValue::DateTime(dt) => {
                format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S"))
            }
            SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
        }
    }

    /// Render for the bulk staging file.
    ///
    /// Booleans become "0"/"1" (lenient of numeric and textual input), dates
    /// and timestamps use the fixed `MM/dd/yyyy HH:mm:ss` form, times use
    /// `HH:mm:ss`, and NULL becomes the empty field.
    pub fn to_bulk_text(&self, field_type: FieldType) -> String {
        if field_type == FieldType::Boolean {
            if let Some(b) = self.as_bool_lenient() {
                return if b { "1" } else { "0" }.to_string();
            }
        }
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::DateTime(dt) => dt.format("%m/%d/%Y %H:%M:%S").to_string(),
            SqlValue::Date(d) => {
                format!("{} 00:00:00", d.format("%m/%d/%Y"))
            }
            SqlValue::Time(t) => t.format("%H:%M:%S").to_string(),
        }
    }

    /// The type-specific non-null default substituted for NULL when the
    /// destination column is NOT NULL. Doubles as the sentinel a nullable
    /// foreign key compares against when deciding to write NULL instead.
    #[must_use]
    pub fn non_null_default(field_type: FieldType) -> SqlValue {
        match field_type {
            FieldType::Integer => SqlValue::I64(0),
            FieldType::Float => SqlValue::F64(0.0),
            FieldType::Decimal => SqlValue::Decimal(Decimal::ZERO),
            FieldType::Boolean => SqlValue::Bool(false),
            FieldType::Text | FieldType::Other => SqlValue::Text(String::new()),
            FieldType::Guid => SqlValue::Uuid(Uuid::nil()),
            FieldType::DateTime => SqlValue::DateTime(default_date().and_hms_opt(0, 0, 0).unwrap()),
            FieldType::Date => SqlValue::Date(default_date()),
            FieldType::Time => SqlValue::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            // Binary fields never reach row processing
            FieldType::Binary => SqlValue::Null,
        }
    }
}

fn default_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}
