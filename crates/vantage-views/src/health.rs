//! Customer health score: a bounded weighted-penalty formula.
//!
//! ```text
//! score = clamp(100 - risk - payment_delay - recency - no_history, 0, 100)
//! ```
//!
//! Every coefficient is a [`HealthWeights`] field. The SQL rendering and
//! [`score`] implement the same formula; the SQL one runs inside the view,
//! the Rust one is used by agents explaining a score.

use serde::{Deserialize, Serialize};
use vantage_core::engine::Dialect;

use crate::dialect::{greatest, least, real};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
  /// Points lost per unit of `risk_score` (risk scores are usually 0..1).
  pub risk_weight:          f64,
  pub payment_grace_days:   f64,
  /// Points lost per day of average payment beyond the grace period.
  pub payment_delay_weight: f64,
  pub recency_grace_days:   f64,
  /// Points lost per day since the last project beyond the grace period.
  pub recency_weight:       f64,
  /// Flat penalty for customers with no projects at all.
  pub no_history_penalty:   f64,
}

impl Default for HealthWeights {
  fn default() -> Self {
    Self {
      risk_weight:          40.0,
      payment_grace_days:   30.0,
      payment_delay_weight: 0.5,
      recency_grace_days:   90.0,
      recency_weight:       0.1,
      no_history_penalty:   50.0,
    }
  }
}

impl HealthWeights {
  /// Every coefficient must be finite and non-negative.
  pub fn validate(&self) -> Result<(), String> {
    let fields = [
      ("risk_weight", self.risk_weight),
      ("payment_grace_days", self.payment_grace_days),
      ("payment_delay_weight", self.payment_delay_weight),
      ("recency_grace_days", self.recency_grace_days),
      ("recency_weight", self.recency_weight),
      ("no_history_penalty", self.no_history_penalty),
    ];
    for (name, value) in fields {
      if !value.is_finite() || value < 0.0 {
        return Err(format!("health weight {name} must be a non-negative number"));
      }
    }
    Ok(())
  }
}

/// Evaluate the score in Rust. `None` inputs are treated as the SQL does
/// with NULLs: no risk, no delay, no recency penalty.
pub fn score(
  weights: &HealthWeights,
  risk_score: Option<f64>,
  average_payment_days: Option<f64>,
  days_since_last_project: Option<f64>,
  project_count: u64,
) -> f64 {
  let w = weights;
  let risk = risk_score.unwrap_or(0.0) * w.risk_weight;
  let delay = (average_payment_days.unwrap_or(w.payment_grace_days)
    - w.payment_grace_days)
    .max(0.0)
    * w.payment_delay_weight;
  let recency = (days_since_last_project.unwrap_or(w.recency_grace_days)
    - w.recency_grace_days)
    .max(0.0)
    * w.recency_weight;
  let no_history = if project_count == 0 { w.no_history_penalty } else { 0.0 };

  let raw = 100.0 - risk - delay - recency - no_history;
  if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) }
}

/// SQL expressions feeding the score, already qualified for the query.
#[derive(Debug, Clone)]
pub struct HealthInputs<'a> {
  pub risk_score:              &'a str,
  pub average_payment_days:    &'a str,
  pub days_since_last_project: &'a str,
  pub project_count:           &'a str,
}

/// Render the score as one SQL expression.
pub fn score_sql(
  dialect: Dialect,
  weights: &HealthWeights,
  inputs: &HealthInputs<'_>,
) -> String {
  let w = weights;
  let pay_grace = real(w.payment_grace_days);
  let rec_grace = real(w.recency_grace_days);

  let risk = format!("COALESCE({}, 0.0) * {}", inputs.risk_score, real(w.risk_weight));
  let delay = format!(
    "{} * {}",
    greatest(
      dialect,
      "0.0",
      &format!("COALESCE({}, {pay_grace}) - {pay_grace}", inputs.average_payment_days),
    ),
    real(w.payment_delay_weight),
  );
  let recency = format!(
    "{} * {}",
    greatest(
      dialect,
      "0.0",
      &format!("COALESCE({}, {rec_grace}) - {rec_grace}", inputs.days_since_last_project),
    ),
    real(w.recency_weight),
  );
  let no_history = format!(
    "CASE WHEN {} = 0 THEN {} ELSE 0.0 END",
    inputs.project_count,
    real(w.no_history_penalty),
  );

  // Opposing infinite penalties give NaN, which the engine reads as NULL.
  let raw =
    format!("COALESCE(100.0 - {risk} - {delay} - {recency} - {no_history}, 0.0)");
  greatest(dialect, "0.0", &least(dialect, "100.0", &raw))
}

/// Coarse bucket from project count and recency.
pub fn category_sql(project_count: &str, days_since_last_project: &str) -> String {
  let (c, d) = (project_count, days_since_last_project);
  format!(
    "CASE WHEN {c} >= 3 AND {d} <= 90 THEN 'EXCELLENT' \
     WHEN {c} >= 2 AND {d} <= 180 THEN 'GOOD' \
     WHEN {c} >= 1 AND {d} <= 365 THEN 'FAIR' \
     ELSE 'POOR' END"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  const RISKS: [&str; 8] =
    ["NULL", "-9e999", "-1000000.0", "-1.0", "0.0", "0.5", "1000000.0", "9e999"];
  const PAYMENT_DAYS: [&str; 8] =
    ["NULL", "-9e999", "-100000.0", "0.0", "30.0", "45.0", "1000000.0", "9e999"];
  const RECENCY: [&str; 6] = ["NULL", "-500000.0", "0.0", "90.0", "400.0", "9999999.0"];
  const COUNTS: [&str; 2] = ["0", "4"];

  fn parse(lit: &str) -> Option<f64> {
    if lit == "NULL" { None } else { Some(lit.parse().unwrap()) }
  }

  #[test]
  fn sql_score_stays_within_bounds() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let weights = HealthWeights::default();

    for risk in RISKS {
      for pay in PAYMENT_DAYS {
        for days in RECENCY {
          for count in COUNTS {
            let expr = score_sql(Dialect::Sqlite, &weights, &HealthInputs {
              risk_score:              risk,
              average_payment_days:    pay,
              days_since_last_project: days,
              project_count:           count,
            });
            let value: f64 = conn
              .query_row(&format!("SELECT {expr}"), [], |row| row.get(0))
              .unwrap();
            assert!(
              (0.0..=100.0).contains(&value),
              "score {value} out of bounds for risk={risk} pay={pay} days={days} count={count}"
            );

            let mirrored =
              score(&weights, parse(risk), parse(pay), parse(days), count.parse().unwrap());
            assert!((mirrored - value).abs() < 1e-6, "sql {value} != rust {mirrored}");
          }
        }
      }
    }
  }

  #[test]
  fn healthy_customer_scores_full_marks() {
    let w = HealthWeights::default();
    assert_eq!(score(&w, Some(0.0), Some(20.0), Some(10.0), 5), 100.0);
  }

  #[test]
  fn penalties_accumulate() {
    let w = HealthWeights::default();
    // 0.5 risk → 20, 50 payment days → 10, 190 days since → 10
    let s = score(&w, Some(0.5), Some(50.0), Some(190.0), 2);
    assert!((s - 60.0).abs() < 1e-9);
    // no projects at all
    assert_eq!(score(&w, Some(0.0), None, None, 0), 50.0);
  }

  #[test]
  fn mysql_rendering_uses_greatest_and_least() {
    let expr = score_sql(Dialect::MySql, &HealthWeights::default(), &HealthInputs {
      risk_score:              "c.risk_score",
      average_payment_days:    "c.average_payment_days",
      days_since_last_project: "d",
      project_count:           "n",
    });
    assert!(expr.starts_with("GREATEST(0.0, LEAST(100.0, COALESCE(100.0 - "));
    assert!(!expr.contains("MAX("));
  }

  #[test]
  fn negative_weights_are_rejected() {
    let w = HealthWeights { recency_weight: -1.0, ..Default::default() };
    assert!(w.validate().is_err());
    assert!(HealthWeights::default().validate().is_ok());
  }
}
