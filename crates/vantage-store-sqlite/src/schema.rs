//! Operational schema for the embedded SQLite store.
//!
//! Executed once at connection startup. Analytical views are created on top
//! of these tables at runtime; they are not part of this DDL.

/// Suffix of the table a loaded view is materialised into.
pub const RAPID_SUFFIX: &str = "__rapid";

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS customers_oltp (
    customer_id          INTEGER PRIMARY KEY,
    customer_name        TEXT NOT NULL,
    industry             TEXT,
    annual_revenue       REAL,
    credit_rating        TEXT,
    risk_score           REAL,            -- 0.0 (safe) .. 1.0 (risky)
    average_payment_days REAL,
    status               TEXT             -- 'ACTIVE' | 'INACTIVE' | NULL
);

CREATE TABLE IF NOT EXISTS projects_oltp (
    project_id    INTEGER PRIMARY KEY,
    customer_id   INTEGER NOT NULL REFERENCES customers_oltp(customer_id),
    project_type  TEXT NOT NULL,
    status        TEXT NOT NULL,
    start_date    TEXT NOT NULL,          -- YYYY-MM-DD
    end_date      TEXT,
    budget_amount REAL NOT NULL DEFAULT 0,
    actual_cost   REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS financial_transactions_oltp (
    transaction_id   INTEGER PRIMARY KEY,
    project_id       INTEGER REFERENCES projects_oltp(project_id),
    transaction_date TEXT NOT NULL,       -- YYYY-MM-DD
    transaction_type TEXT NOT NULL,       -- 'INVOICE' | 'PAYMENT' | 'COST'
    amount           REAL NOT NULL,
    status           TEXT NOT NULL DEFAULT 'COMPLETED'
);

CREATE INDEX IF NOT EXISTS projects_customer_idx ON projects_oltp(customer_id);
CREATE INDEX IF NOT EXISTS transactions_date_idx ON financial_transactions_oltp(transaction_date);

PRAGMA user_version = 1;
";
