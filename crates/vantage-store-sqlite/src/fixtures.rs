//! A small, consistent data set over the operational tables.
//!
//! Four customers (one inactive), three projects and seven transactions
//! spanning 2024-02 to 2025-06. Loaded by the server's `--sample-data` flag
//! and by tests that pin the reference date to 2025-06-30. Safe to load
//! twice.

pub const SAMPLE_DATA: &str = "
INSERT OR IGNORE INTO customers_oltp (customer_id, customer_name, industry, risk_score, average_payment_days, status) VALUES
  (1, 'Acme',    'Manufacturing', 0.2, 25, 'ACTIVE'),
  (2, 'Globex',  'Retail',        0.9, 75, 'ACTIVE'),
  (3, 'Initech', 'Software',      0.1, 30, NULL),
  (4, 'Hooli',   'Software',      0.0, 10, 'INACTIVE');

INSERT OR IGNORE INTO projects_oltp (project_id, customer_id, project_type, status, start_date, end_date, budget_amount, actual_cost) VALUES
  (10, 1, 'consulting',     'COMPLETED', '2025-01-10', '2025-03-01', 10000, 9000),
  (11, 1, 'implementation', 'ACTIVE',    '2025-05-01', NULL,         20000, 5000),
  (12, 2, 'consulting',     'COMPLETED', '2024-02-01', '2024-04-01',  8000, 9500);

INSERT OR IGNORE INTO financial_transactions_oltp (transaction_id, project_id, transaction_date, transaction_type, amount, status) VALUES
  (100, 10, '2025-02-15', 'INVOICE', 10000, 'COMPLETED'),
  (101, 10, '2025-03-20', 'PAYMENT',  8000, 'COMPLETED'),
  (102, 11, '2025-05-15', 'INVOICE',  5000, 'COMPLETED'),
  (103, 11, '2025-05-20', 'COST',     3000, 'COMPLETED'),
  (104, 12, '2024-03-01', 'INVOICE',  8000, 'COMPLETED'),
  (105, 12, '2024-04-15', 'PAYMENT',  8000, 'COMPLETED'),
  (106, 11, '2025-06-01', 'PAYMENT',  2000, 'PENDING');
";
