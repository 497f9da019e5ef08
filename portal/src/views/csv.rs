//! CSV export of list views.
//!
//! Documents are written with [`csv::Writer`]: CRLF row endings, and any field containing a
//! comma, quote, CR or LF is wrapped in quotes with embedded quotes doubled.

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    db::models::{invoices::InvoiceDBResponse, payments::PaymentDBResponse, users::UserDBResponse},
    errors::{Error, Result},
};

/// A record type with a fixed CSV layout
pub trait CsvRecord {
    /// File name prefix, e.g. `invoices`
    const ENTITY: &'static str;
    const HEADERS: &'static [&'static str];

    /// One value per header, in order
    fn fields(&self) -> Vec<String>;
}

/// Header line followed by one line per row
pub fn to_csv<T: CsvRecord>(rows: &[T]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.write_record(row.fields())?;
    }
    writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// `{entity}_export_{yyyy-MM-dd}.csv`
pub fn export_filename(entity: &str, date: NaiveDate) -> String {
    format!("{entity}_export_{}.csv", date.format("%Y-%m-%d"))
}

/// Download response for a CSV document
pub struct CsvExport {
    pub filename: String,
    pub body: Vec<u8>,
}

impl CsvExport {
    pub fn new<T: CsvRecord>(rows: &[T], today: NaiveDate) -> Result<Self> {
        let body = to_csv(rows).map_err(|e| Error::Internal {
            operation: format!("write {} export: {e}", T::ENTITY),
        })?;
        Ok(Self {
            filename: export_filename(T::ENTITY, today),
            body,
        })
    }
}

impl IntoResponse for CsvExport {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", self.filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.body,
        )
            .into_response()
    }
}

fn date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

impl CsvRecord for InvoiceDBResponse {
    const ENTITY: &'static str = "invoices";
    const HEADERS: &'static [&'static str] = &[
        "invoiceNumber",
        "userName",
        "userEmail",
        "projectId",
        "amount",
        "currency",
        "status",
        "issueDate",
        "dueDate",
        "paidDate",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.invoice_number.clone(),
            self.user_name.clone(),
            self.user_email.clone(),
            self.project_id.map(|id| id.to_string()).unwrap_or_default(),
            self.total().to_string(),
            self.currency.to_string(),
            self.status.to_string(),
            date(self.issue_date),
            date(self.due_date),
            self.paid_date.map(date).unwrap_or_default(),
        ]
    }
}

impl CsvRecord for PaymentDBResponse {
    const ENTITY: &'static str = "payments";
    const HEADERS: &'static [&'static str] = &[
        "id",
        "userId",
        "projectId",
        "amount",
        "currency",
        "status",
        "type",
        "paymentMethod",
        "stripeId",
        "createdAt",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.user_id.to_string(),
            self.project_id.map(|id| id.to_string()).unwrap_or_default(),
            self.total().to_string(),
            self.currency.to_string(),
            self.status.to_string(),
            self.payment_type.to_string(),
            self.payment_method.clone(),
            self.stripe_id.clone(),
            self.created_at.to_rfc3339(),
        ]
    }
}

impl CsvRecord for UserDBResponse {
    const ENTITY: &'static str = "users";
    const HEADERS: &'static [&'static str] = &["id", "displayName", "email", "role", "status", "createdAt"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.display_name.clone().unwrap_or_default(),
            self.email.clone(),
            if self.is_admin { "admin" } else { "client" }.to_string(),
            self.status.as_str().to_string(),
            self.created_at.to_rfc3339(),
        ]
    }
}
