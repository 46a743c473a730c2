//! Email reports.
//!
//! `Mailer` sends rendered HTML through the Resend API. A missing API key
//! surfaces as `ServiceUnavailable` so callers can degrade instead of
//! failing the whole request.

use async_trait::async_trait;
use serde_json::json;

use crate::core::config::EmailConfig;
use crate::core::errors::ApiError;
use crate::transactions::TransactionSummary;

const REPORT_ROW_LIMIT: usize = 20;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an HTML email, returning the provider's message id.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, ApiError>;
}

pub struct ResendMailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl ResendMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, ApiError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ApiError::ServiceUnavailable(
                "Email service not configured".to_string(),
            ));
        }

        let payload = json!({
            "from": self.config.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(ApiError::upstream)?;

        if !status.is_success() {
            tracing::error!(%status, %body, "Email provider rejected the message");
            return Err(ApiError::Upstream(format!(
                "Failed to send email ({status})"
            )));
        }

        Ok(body
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Render the transaction report email: gradient header, stat blocks and
/// a table of the first twenty rows.
pub fn render_report_html(summary: &TransactionSummary) -> String {
    let rows = summary
        .transactions
        .iter()
        .take(REPORT_ROW_LIMIT)
        .map(|t| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>${:.2}</td><td>{}</td><td>{}</td></tr>",
                t.id, t.client_id, t.kind, t.tran_amt, t.tran_status, t.tran_date
            )
        })
        .collect::<String>();

    let overflow_note = if summary.transactions.len() > REPORT_ROW_LIMIT {
        format!(
            "<p><em>Showing first {} of {} transactions</em></p>",
            REPORT_ROW_LIMIT,
            summary.transactions.len()
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <style>
      body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
      .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
      .header {{ background: linear-gradient(135deg, #8b5cf6 0%, #ec4899 100%); color: white; padding: 20px; border-radius: 8px; }}
      .summary {{ background: #f3f4f6; padding: 15px; border-radius: 8px; margin: 20px 0; }}
      .stat {{ display: inline-block; margin: 10px 20px 10px 0; }}
      .stat-label {{ font-size: 12px; color: #6b7280; text-transform: uppercase; }}
      .stat-value {{ font-size: 24px; font-weight: bold; color: #1f2937; }}
      table {{ width: 100%; border-collapse: collapse; margin: 20px 0; }}
      th {{ background: #8b5cf6; color: white; padding: 12px; text-align: left; }}
      td {{ padding: 10px; border-bottom: 1px solid #e5e7eb; }}
      tr:nth-child(even) {{ background: #f9fafb; }}
      .footer {{ text-align: center; color: #6b7280; font-size: 12px; margin-top: 40px; }}
    </style>
  </head>
  <body>
    <div class="container">
      <div class="header">
        <h1>Transaction Intelligence Report</h1>
        <p>Generated on {generated_at}</p>
      </div>
      <div class="summary">
        <div class="stat">
          <div class="stat-label">Total Transactions</div>
          <div class="stat-value">{total}</div>
        </div>
        <div class="stat">
          <div class="stat-label">Total Amount</div>
          <div class="stat-value">${amount}</div>
        </div>
        <div class="stat">
          <div class="stat-label">Approved</div>
          <div class="stat-value">{approved}</div>
        </div>
        <div class="stat">
          <div class="stat-label">Declined</div>
          <div class="stat-value">{declined}</div>
        </div>
      </div>
      <h2>Transaction Details</h2>
      <table>
        <thead>
          <tr><th>ID</th><th>Client</th><th>Type</th><th>Amount</th><th>Status</th><th>Date</th></tr>
        </thead>
        <tbody>{rows}</tbody>
      </table>
      {overflow_note}
      <div class="footer">
        <p>This is an automated report from your Transaction Intelligence system.</p>
      </div>
    </div>
  </body>
</html>"#,
        generated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        total = summary.total_transactions,
        amount = summary.total_amount,
        approved = summary.approved_count,
        declined = summary.declined_count,
    )
}
