//! Server-side list views.
//!
//! Every collection endpoint takes the same [`ListQuery`]: a case-insensitive substring `search`
//! over a few display fields, an exact `status` filter, an entity-specific extra filter and a
//! single-field sort. [`apply`] evaluates a query against rows fetched from the store; CSV export
//! serializes exactly what it returns.

pub mod csv;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::borrow::Cow;
use utoipa::{IntoParams, ToSchema};

use crate::{
    db::models::{
        invoices::InvoiceDBResponse, payments::PaymentDBResponse, projects::ProjectDBResponse,
        requests::RequestDBResponse, transfers::TransferDBResponse, users::UserDBResponse,
    },
    errors::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Query parameters shared by every list endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring matched against the entity's display fields
    pub search: Option<String>,
    /// Exact status to keep; `all` disables the filter
    pub status: Option<String>,
    /// Field to sort by (camelCase)
    pub sort: Option<String>,
    pub direction: Option<Direction>,
    /// Payment type filter (`initial` or `final`); payments only
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Role filter (`admin` or `client`); users only
    pub role: Option<String>,
}

/// Value a row is ordered by
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
    Date(NaiveDate),
}

impl SortKey {
    fn text(s: &str) -> Self {
        SortKey::Text(s.to_lowercase())
    }
}

/// A record type that can be listed through [`apply`]
pub trait Listable {
    /// Entity name used in error messages
    const ENTITY: &'static str;
    const SORT_FIELDS: &'static [&'static str];
    const DEFAULT_SORT: (&'static str, Direction);

    fn search_fields(&self) -> Vec<Cow<'_, str>>;

    fn status(&self) -> &str;

    fn matches_status(&self, status: &str) -> bool {
        self.status().eq_ignore_ascii_case(status)
    }

    fn matches_extra(&self, _query: &ListQuery) -> bool {
        true
    }

    /// `None` only for fields outside [`Listable::SORT_FIELDS`]
    fn sort_key(&self, field: &str) -> Option<SortKey>;
}

/// `None` for absent, blank or `all`
fn active_filter(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

/// Filter and sort `rows` according to `query`
pub fn apply<T: Listable>(mut rows: Vec<T>, query: &ListQuery) -> Result<Vec<T>> {
    let sort_field = match query.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(field) if T::SORT_FIELDS.contains(&field) => field,
        Some(field) => {
            return Err(Error::BadRequest {
                message: format!(
                    "Cannot sort {} by '{field}'; expected one of: {}",
                    T::ENTITY,
                    T::SORT_FIELDS.join(", ")
                ),
            });
        }
        None => T::DEFAULT_SORT.0,
    };
    let direction = query.direction.unwrap_or(T::DEFAULT_SORT.1);

    if let Some(needle) = active_search(query.search.as_deref()) {
        rows.retain(|row| row.search_fields().iter().any(|f| f.to_lowercase().contains(&needle)));
    }
    if let Some(status) = active_filter(query.status.as_deref()) {
        rows.retain(|row| row.matches_status(status));
    }
    rows.retain(|row| row.matches_extra(query));

    // Stable, so ties keep the store's newest-first order
    rows.sort_by(|a, b| {
        let ordering = a.sort_key(sort_field).cmp(&b.sort_key(sort_field));
        match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    });
    Ok(rows)
}

fn active_search(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
}

impl Listable for RequestDBResponse {
    const ENTITY: &'static str = "requests";
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "websiteType", "status"];
    const DEFAULT_SORT: (&'static str, Direction) = ("createdAt", Direction::Desc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.user_name.as_str()),
            Cow::Borrowed(self.user_email.as_str()),
            Cow::Borrowed(self.website_type.as_str()),
        ]
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "createdAt" => Some(SortKey::Time(self.created_at)),
            "websiteType" => Some(SortKey::text(&self.website_type)),
            "status" => Some(SortKey::text(self.status.as_str())),
            _ => None,
        }
    }
}

impl Listable for ProjectDBResponse {
    const ENTITY: &'static str = "projects";
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "deadline", "budget"];
    const DEFAULT_SORT: (&'static str, Direction) = ("createdAt", Direction::Desc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.user_email.as_str()),
            Cow::Borrowed(self.website_type.as_str()),
            Cow::Borrowed(self.user_name.as_str()),
        ]
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "createdAt" => Some(SortKey::Time(self.created_at)),
            "deadline" => Some(SortKey::Date(self.deadline)),
            "budget" => Some(SortKey::Int(self.budget)),
            _ => None,
        }
    }
}

impl Listable for InvoiceDBResponse {
    const ENTITY: &'static str = "invoices";
    const SORT_FIELDS: &'static [&'static str] = &["amount", "dueDate", "issueDate"];
    const DEFAULT_SORT: (&'static str, Direction) = ("dueDate", Direction::Asc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![
            Cow::Borrowed(self.user_name.as_str()),
            Cow::Borrowed(self.user_email.as_str()),
            Cow::Borrowed(self.invoice_number.as_str()),
        ];
        if let Some(project_id) = self.project_id {
            fields.push(Cow::Owned(project_id.to_string()));
        }
        fields
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    /// `overdue` selects sent invoices past their due date
    fn matches_status(&self, status: &str) -> bool {
        if status.eq_ignore_ascii_case("overdue") {
            return self.is_overdue(Utc::now());
        }
        self.status().eq_ignore_ascii_case(status)
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "amount" => Some(SortKey::Int(self.amount)),
            "dueDate" => Some(SortKey::Time(self.due_date)),
            "issueDate" => Some(SortKey::Time(self.issue_date)),
            _ => None,
        }
    }
}

impl Listable for PaymentDBResponse {
    const ENTITY: &'static str = "payments";
    const SORT_FIELDS: &'static [&'static str] = &["amount", "createdAt"];
    const DEFAULT_SORT: (&'static str, Direction) = ("createdAt", Direction::Desc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![Cow::Owned(self.user_id.to_string()), Cow::Borrowed(self.stripe_id.as_str())];
        if let Some(project_id) = self.project_id {
            fields.push(Cow::Owned(project_id.to_string()));
        }
        fields
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn matches_extra(&self, query: &ListQuery) -> bool {
        active_filter(query.kind.as_deref()).is_none_or(|kind| self.payment_type.as_str().eq_ignore_ascii_case(kind))
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "amount" => Some(SortKey::Int(self.amount)),
            "createdAt" => Some(SortKey::Time(self.created_at)),
            _ => None,
        }
    }
}

impl Listable for UserDBResponse {
    const ENTITY: &'static str = "users";
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "email"];
    const DEFAULT_SORT: (&'static str, Direction) = ("createdAt", Direction::Desc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![Cow::Borrowed(self.email.as_str())];
        if let Some(name) = &self.display_name {
            fields.push(Cow::Borrowed(name.as_str()));
        }
        fields
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn matches_extra(&self, query: &ListQuery) -> bool {
        match active_filter(query.role.as_deref()) {
            None => true,
            Some(role) if role.eq_ignore_ascii_case("admin") => self.is_admin,
            Some(role) if role.eq_ignore_ascii_case("client") => !self.is_admin,
            Some(_) => false,
        }
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "createdAt" => Some(SortKey::Time(self.created_at)),
            "email" => Some(SortKey::text(&self.email)),
            _ => None,
        }
    }
}

impl Listable for TransferDBResponse {
    const ENTITY: &'static str = "transfers";
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "amount"];
    const DEFAULT_SORT: (&'static str, Direction) = ("createdAt", Direction::Desc);

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![
            Cow::Borrowed(self.transfer_id.as_str()),
            Cow::Borrowed(self.destination.as_str()),
        ];
        if let Some(group) = &self.transfer_group {
            fields.push(Cow::Borrowed(group.as_str()));
        }
        fields
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn sort_key(&self, field: &str) -> Option<SortKey> {
        match field {
            "createdAt" => Some(SortKey::Time(self.created_at)),
            "amount" => Some(SortKey::Int(self.amount)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::models::users::UserStatus,
        lifecycle::invoice::InvoiceStatus,
        money::Currency,
    };
    use chrono::Duration;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn user(email: &str, name: Option<&str>, is_admin: bool, age_days: i64) -> UserDBResponse {
        let created = Utc::now() - Duration::days(age_days);
        UserDBResponse {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: name.map(str::to_string),
            photo_url: None,
            phone: None,
            company: None,
            bio: None,
            is_admin,
            status: UserStatus::Active,
            created_at: created,
            updated_at: created,
        }
    }

    fn invoice(number: &str, amount: i64, status: InvoiceStatus, due_in_days: i64) -> InvoiceDBResponse {
        let now = Utc::now();
        InvoiceDBResponse {
            id: Uuid::new_v4(),
            invoice_number: number.to_string(),
            user_id: Uuid::new_v4(),
            user_name: "Ada".to_string(),
            user_email: "ada@example.com".to_string(),
            project_id: None,
            amount,
            currency: Currency::Gbp,
            status,
            issue_date: now,
            due_date: now + Duration::days(due_in_days),
            paid_date: None,
            items: Json(vec![]),
            created_at: now,
        }
    }

    #[test]
    fn test_search_is_case_insensitive_over_display_fields() {
        let rows = vec![
            user("ada@example.com", Some("Ada Lovelace"), false, 1),
            user("grace@example.com", Some("Grace Hopper"), true, 2),
        ];
        let query = ListQuery {
            search: Some("LOVE".to_string()),
            ..Default::default()
        };
        let result = apply(rows, &query).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].email, "ada@example.com");
    }

    #[test]
    fn test_role_filter_and_default_order() {
        let rows = vec![
            user("old@example.com", None, false, 10),
            user("admin@example.com", None, true, 5),
            user("new@example.com", None, false, 1),
        ];
        let query = ListQuery {
            role: Some("client".to_string()),
            ..Default::default()
        };
        let emails: Vec<_> = apply(rows, &query).unwrap().into_iter().map(|u| u.email).collect();
        assert_eq!(emails, vec!["new@example.com", "old@example.com"]);
    }

    #[test]
    fn test_status_all_disables_filter() {
        let rows = vec![
            invoice("INV-1", 100, InvoiceStatus::Draft, 3),
            invoice("INV-2", 200, InvoiceStatus::Paid, 3),
        ];
        let query = ListQuery {
            status: Some("all".to_string()),
            ..Default::default()
        };
        assert_eq!(apply(rows, &query).unwrap().len(), 2);
    }

    #[test]
    fn test_invoice_default_sort_is_due_date_ascending() {
        let rows = vec![
            invoice("INV-late", 100, InvoiceStatus::Sent, 30),
            invoice("INV-soon", 100, InvoiceStatus::Sent, 1),
        ];
        let sorted = apply(rows, &ListQuery::default()).unwrap();
        assert_eq!(sorted[0].invoice_number, "INV-soon");
    }

    #[test]
    fn test_overdue_is_a_derived_status_filter() {
        let rows = vec![
            invoice("INV-overdue", 100, InvoiceStatus::Sent, -2),
            invoice("INV-current", 100, InvoiceStatus::Sent, 2),
            invoice("INV-draft", 100, InvoiceStatus::Draft, -2),
        ];
        let query = ListQuery {
            status: Some("overdue".to_string()),
            ..Default::default()
        };
        let result = apply(rows, &query).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].invoice_number, "INV-overdue");
    }

    #[test]
    fn test_explicit_sort_and_direction() {
        let rows = vec![
            invoice("INV-a", 300, InvoiceStatus::Sent, 1),
            invoice("INV-b", 100, InvoiceStatus::Sent, 2),
            invoice("INV-c", 200, InvoiceStatus::Sent, 3),
        ];
        let query = ListQuery {
            sort: Some("amount".to_string()),
            direction: Some(Direction::Desc),
            ..Default::default()
        };
        let amounts: Vec<_> = apply(rows, &query).unwrap().into_iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![300, 200, 100]);
    }

    #[test]
    fn test_unknown_sort_field_is_rejected() {
        let query = ListQuery {
            sort: Some("password".to_string()),
            ..Default::default()
        };
        let err = apply(Vec::<UserDBResponse>::new(), &query).unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }
}
