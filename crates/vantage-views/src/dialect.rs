//! Small per-dialect SQL fragments shared by the generator strategies.

use chrono::NaiveDate;
use vantage_core::{engine::Dialect, metric::TimeDimension};

/// Two-argument maximum.
pub(crate) fn greatest(dialect: Dialect, a: &str, b: &str) -> String {
  match dialect {
    Dialect::MySql => format!("GREATEST({a}, {b})"),
    Dialect::Sqlite => format!("MAX({a}, {b})"),
  }
}

/// Two-argument minimum.
pub(crate) fn least(dialect: Dialect, a: &str, b: &str) -> String {
  match dialect {
    Dialect::MySql => format!("LEAST({a}, {b})"),
    Dialect::Sqlite => format!("MIN({a}, {b})"),
  }
}

/// Whole days from `earlier` to `later`.
pub(crate) fn days_between(dialect: Dialect, later: &str, earlier: &str) -> String {
  match dialect {
    Dialect::MySql => format!("DATEDIFF({later}, {earlier})"),
    Dialect::Sqlite => {
      format!("CAST(julianday({later}) - julianday({earlier}) AS INTEGER)")
    }
  }
}

pub(crate) fn date_literal(dialect: Dialect, date: NaiveDate) -> String {
  let iso = date.format("%Y-%m-%d");
  match dialect {
    Dialect::MySql => format!("DATE '{iso}'"),
    Dialect::Sqlite => format!("'{iso}'"),
  }
}

/// Period label for a date column, or `None` for non-periodic dimensions.
///
/// Labels sort chronologically as strings: `2024-03`, `2024-Q1`.
pub(crate) fn period_label(
  dialect: Dialect,
  dimension: TimeDimension,
  column: &str,
) -> Option<String> {
  let expr = match (dialect, dimension) {
    (Dialect::MySql, TimeDimension::Monthly) => {
      format!("DATE_FORMAT({column}, '%Y-%m')")
    }
    (Dialect::MySql, TimeDimension::Quarterly) => {
      format!("CONCAT(YEAR({column}), '-Q', QUARTER({column}))")
    }
    (Dialect::Sqlite, TimeDimension::Monthly) => {
      format!("strftime('%Y-%m', {column})")
    }
    (Dialect::Sqlite, TimeDimension::Quarterly) => format!(
      "strftime('%Y', {column}) || '-Q' || ((CAST(strftime('%m', {column}) AS \
       INTEGER) + 2) / 3)"
    ),
    (_, TimeDimension::Current | TimeDimension::Lifetime) => return None,
  };
  Some(expr)
}

/// Running period number for a date column: months or quarters since year
/// zero. Consecutive calendar periods differ by one, so `n` periods back is
/// `index - n` whether or not the periods between have rows.
pub(crate) fn period_index(
  dialect: Dialect,
  dimension: TimeDimension,
  column: &str,
) -> Option<String> {
  let (year, month) = match dialect {
    Dialect::MySql => (format!("YEAR({column})"), format!("MONTH({column})")),
    Dialect::Sqlite => (
      format!("CAST(strftime('%Y', {column}) AS INTEGER)"),
      format!("CAST(strftime('%m', {column}) AS INTEGER)"),
    ),
  };
  let expr = match dimension {
    TimeDimension::Monthly => format!("{year} * 12 + {month} - 1"),
    TimeDimension::Quarterly => format!("{year} * 4 + ({month} - 1) / 3"),
    TimeDimension::Current | TimeDimension::Lifetime => return None,
  };
  Some(expr)
}

/// A numeric literal that both dialects read as a real number.
pub(crate) fn real(value: f64) -> String {
  if value.fract() == 0.0 && value.abs() < 1e15 {
    format!("{value:.1}")
  } else {
    format!("{value}")
  }
}
