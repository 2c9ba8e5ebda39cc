// src/routes/invoice_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, ROLE_ADMIN, ROLE_RECEPTIONIST},
    scheduling::Transitions,
};

fn can_manage_invoices(auth: &AuthContext) -> bool {
    auth.role == ROLE_ADMIN || auth.role == ROLE_RECEPTIONIST
}

fn ensure_manage(auth: &AuthContext) -> Result<(), ApiError> {
    if can_manage_invoices(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/receptionist can manage invoices".into(),
        ))
    }
}

/* ============================================================
   Status
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft = 0,
    Sent = 1,
    Partial = 2,
    Paid = 3,
    Overdue = 4,
    Cancelled = 5,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Draft => write!(f, "draft"),
            InvoiceStatus::Sent => write!(f, "sent"),
            InvoiceStatus::Partial => write!(f, "partial"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Overdue => write!(f, "overdue"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// `overdue` has no incoming edge: it is derived from the due date, not
// requested by a user.
const INVOICE_TRANSITIONS: Transitions<InvoiceStatus> = Transitions::new(&[
    (InvoiceStatus::Draft, InvoiceStatus::Sent),
    (InvoiceStatus::Draft, InvoiceStatus::Cancelled),
    (InvoiceStatus::Sent, InvoiceStatus::Paid),
    (InvoiceStatus::Sent, InvoiceStatus::Partial),
    (InvoiceStatus::Sent, InvoiceStatus::Cancelled),
    (InvoiceStatus::Partial, InvoiceStatus::Paid),
    (InvoiceStatus::Partial, InvoiceStatus::Cancelled),
    (InvoiceStatus::Overdue, InvoiceStatus::Paid),
    (InvoiceStatus::Overdue, InvoiceStatus::Partial),
    (InvoiceStatus::Overdue, InvoiceStatus::Cancelled),
]);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/summary", get(get_financial_summary))
        .route("/invoices/{invoice_id}", get(get_invoice).patch(patch_invoice))
        .route("/invoices/{invoice_id}/status", patch(patch_invoice_status))
        .route("/invoices/{invoice_id}/payments", post(create_payment))
        .route("/invoices/patient/{patient_id}/balance", get(get_patient_balance))
}

/* ============================================================
   Rows / DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub patient_id: Uuid,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub status: InvoiceStatus,
    pub due_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn remaining_cents(&self) -> i64 {
        self.total_cents - self.paid_cents
    }
}

const INVOICE_COLUMNS: &str = r#"
    invoice_id, invoice_number, patient_id, subtotal_cents, tax_cents,
    total_cents, paid_cents, status, due_on, notes,
    created_by_user_id, created_at, updated_at
"#;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct InvoiceItemRow {
    pub invoice_item_id: Uuid,
    pub invoice_id: Uuid,
    pub treatment_id: Option<Uuid>,
    pub description: String,
    pub qty: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount_cents: i64,
    pub method: i16, // 0 cash, 1 credit_card, 2 bank_transfer, 3 check, 4 other
    pub reference: Option<String>,
    pub note: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    pub invoice: InvoiceRow,
    pub remaining_cents: i64,
    pub items: Vec<InvoiceItemRow>,
    pub payments: Vec<PaymentRow>,
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

async fn load_invoice(state: &AppState, invoice_id: Uuid) -> Result<InvoiceRow, ApiError> {
    let sql = format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        FROM invoice
        WHERE invoice_id = $1
        "#
    );
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(invoice_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "invoice not found".into()))
}

/* ============================================================
   POST /invoices
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceItem {
    pub treatment_id: Option<Uuid>,
    pub description: String,
    pub qty: Option<i32>,
    pub unit_price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    pub items: Vec<CreateInvoiceItem>,
    pub tax_cents: Option<i64>,
    pub due_on: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<Json<ApiOk<InvoiceDetail>>, ApiError> {
    ensure_manage(&auth)?;

    if req.items.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "an invoice needs at least one item".into(),
        ));
    }
    let tax_cents = req.tax_cents.unwrap_or(0);
    if tax_cents < 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "tax_cents must not be negative".into(),
        ));
    }

    let mut subtotal_cents: i64 = 0;
    for item in &req.items {
        let qty = item.qty.unwrap_or(1);
        if qty <= 0 {
            return Err(ApiError::BadRequest("VALIDATION_ERROR", "qty must be > 0".into()));
        }
        if item.unit_price_cents < 0 {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "unit_price_cents must not be negative".into(),
            ));
        }
        if item.description.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "item description is required".into(),
            ));
        }
        subtotal_cents += item.unit_price_cents * qty as i64;
    }
    let total_cents = subtotal_cents + tax_cents;

    let invoice_number = format!(
        "INV-{}-{}",
        Utc::now().format("%Y%m"),
        &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    );

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let sql = format!(
        r#"
        INSERT INTO invoice (
            invoice_number, patient_id, subtotal_cents, tax_cents,
            total_cents, status, due_on, notes, created_by_user_id
        )
        VALUES ($1,$2,$3,$4,$5, 0, $6,$7,$8)
        RETURNING {INVOICE_COLUMNS}
        "#
    );
    let invoice: InvoiceRow = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(&invoice_number)
        .bind(req.patient_id)
        .bind(subtotal_cents)
        .bind(tax_cents)
        .bind(total_cents)
        .bind(req.due_on)
        .bind(req.notes.as_deref())
        .bind(auth.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ApiError::BadRequest("INVOICE_CREATE_FAILED", format!("{e}")))?;

    for item in &req.items {
        let qty = item.qty.unwrap_or(1);
        sqlx::query(
            r#"
            INSERT INTO invoice_item (invoice_id, treatment_id, description, qty, unit_price_cents, total_cents)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(item.treatment_id)
        .bind(item.description.trim())
        .bind(qty)
        .bind(item.unit_price_cents)
        .bind(item.unit_price_cents * qty as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::BadRequest("INVOICE_ITEM_CREATE_FAILED", format!("{e}")))?;
    }

    tx.commit()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    get_invoice(State(state), auth, Path(invoice.invoice_id)).await
}

/* ============================================================
   GET /invoices
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListInvoicesQuery>,
) -> Result<Json<ApiOk<Vec<InvoiceRow>>>, ApiError> {
    let _ = &auth; // all staff may read billing state

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let sql = format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        FROM invoice
        WHERE ($1::uuid IS NULL OR patient_id = $1)
          AND ($2::smallint IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    );

    let rows: Vec<InvoiceRow> = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(q.patient_id)
        .bind(q.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   GET /invoices/summary
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct FinancialSummary {
    pub total_invoiced_cents: i64,
    pub total_paid_cents: i64,
    pub total_outstanding_cents: i64,
    pub overdue_cents: i64,
    pub invoice_count: i64,
}

pub async fn get_financial_summary(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<FinancialSummary>>, ApiError> {
    ensure_manage(&auth)?;

    // Cancelled invoices do not count toward any total. An open invoice
    // past its due date counts as overdue regardless of stored status.
    let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
          COALESCE(SUM(total_cents), 0),
          COALESCE(SUM(paid_cents), 0),
          COALESCE(SUM(total_cents - paid_cents), 0),
          COALESCE(SUM(total_cents - paid_cents)
              FILTER (WHERE due_on < CURRENT_DATE AND status IN (1, 2, 4)), 0),
          COUNT(*)
        FROM invoice
        WHERE status <> 5
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: FinancialSummary {
            total_invoiced_cents: row.0,
            total_paid_cents: row.1,
            total_outstanding_cents: row.2,
            overdue_cents: row.3,
            invoice_count: row.4,
        },
    }))
}

/* ============================================================
   GET /invoices/{id}
   ============================================================ */

pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<ApiOk<InvoiceDetail>>, ApiError> {
    let _ = &auth;

    let invoice = load_invoice(&state, invoice_id).await?;

    let items: Vec<InvoiceItemRow> = sqlx::query_as::<_, InvoiceItemRow>(
        r#"
        SELECT invoice_item_id, invoice_id, treatment_id, description, qty, unit_price_cents, total_cents
        FROM invoice_item
        WHERE invoice_id = $1
        ORDER BY invoice_item_id ASC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let payments: Vec<PaymentRow> = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT payment_id, invoice_id, amount_cents, method, reference, note, paid_at
        FROM payment
        WHERE invoice_id = $1
        ORDER BY paid_at ASC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let remaining_cents = invoice.remaining_cents();
    Ok(Json(ApiOk {
        data: InvoiceDetail {
            invoice,
            remaining_cents,
            items,
            payments,
        },
    }))
}

/* ============================================================
   PATCH /invoices/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchInvoiceRequest {
    pub due_on: Option<NaiveDate>,
    pub notes: Option<String>,
    // amounts are only editable while the invoice is a draft
    pub tax_cents: Option<i64>,
}

pub async fn patch_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<PatchInvoiceRequest>,
) -> Result<Json<ApiOk<InvoiceDetail>>, ApiError> {
    ensure_manage(&auth)?;

    let existing = load_invoice(&state, invoice_id).await?;

    if req.tax_cents.is_some() && existing.status != InvoiceStatus::Draft {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "amounts can only change while the invoice is a draft".into(),
        ));
    }
    if req.tax_cents.is_some_and(|t| t < 0) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "tax_cents must not be negative".into(),
        ));
    }

    let tax_cents = req.tax_cents.unwrap_or(existing.tax_cents);
    let total_cents = existing.subtotal_cents + tax_cents;

    sqlx::query(
        r#"
        UPDATE invoice
        SET due_on = COALESCE($2, due_on),
            notes = COALESCE($3, notes),
            tax_cents = $4,
            total_cents = $5,
            updated_at = now()
        WHERE invoice_id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(req.due_on)
    .bind(req.notes.as_deref())
    .bind(tax_cents)
    .bind(total_cents)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    get_invoice(State(state), auth, Path(invoice_id)).await
}

/* ============================================================
   PATCH /invoices/{id}/status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

pub async fn patch_invoice_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<PatchInvoiceStatusRequest>,
) -> Result<Json<ApiOk<InvoiceDetail>>, ApiError> {
    ensure_manage(&auth)?;

    let existing = load_invoice(&state, invoice_id).await?;

    if !INVOICE_TRANSITIONS.can_transition(existing.status, req.status) {
        return Err(ApiError::BadRequest(
            "INVALID_STATUS_TRANSITION",
            format!("invalid status transition: {} -> {}", existing.status, req.status),
        ));
    }

    sqlx::query(
        r#"
        UPDATE invoice
        SET status = $2, updated_at = now()
        WHERE invoice_id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(req.status)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    get_invoice(State(state), auth, Path(invoice_id)).await
}

/* ============================================================
   POST /invoices/{id}/payments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount_cents: i64,
    pub method: i16,
    pub reference: Option<String>,
    pub note: Option<String>,
}

pub async fn create_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<ApiOk<InvoiceDetail>>, ApiError> {
    ensure_manage(&auth)?;

    if req.amount_cents <= 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "amount_cents must be > 0".into(),
        ));
    }
    if !(0..=4).contains(&req.method) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "method must be 0..4".into(),
        ));
    }

    let existing = load_invoice(&state, invoice_id).await?;
    if !matches!(
        existing.status,
        InvoiceStatus::Sent | InvoiceStatus::Partial | InvoiceStatus::Overdue
    ) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("cannot record a payment against a {} invoice", existing.status),
        ));
    }
    if req.amount_cents > existing.remaining_cents() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!(
                "payment exceeds remaining balance ({} cents)",
                existing.remaining_cents()
            ),
        ));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO payment (invoice_id, amount_cents, method, reference, note)
        VALUES ($1,$2,$3,$4,$5)
        "#,
    )
    .bind(invoice_id)
    .bind(req.amount_cents)
    .bind(req.method)
    .bind(req.reference.as_deref())
    .bind(req.note.as_deref())
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::BadRequest("PAYMENT_CREATE_FAILED", format!("{e}")))?;

    let paid_cents = existing.paid_cents + req.amount_cents;
    let status = status_after_payment(existing.status, paid_cents, existing.total_cents);

    sqlx::query(
        r#"
        UPDATE invoice
        SET paid_cents = $2, status = $3, updated_at = now()
        WHERE invoice_id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(paid_cents)
    .bind(status)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tx.commit()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    get_invoice(State(state), auth, Path(invoice_id)).await
}

/// Status after a recorded payment: partial coverage -> `partial`, full
/// coverage -> `paid`, moving only along legal edges.
fn status_after_payment(
    current: InvoiceStatus,
    paid_cents: i64,
    total_cents: i64,
) -> InvoiceStatus {
    let next = if paid_cents >= total_cents {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Partial
    };
    if current == next || INVOICE_TRANSITIONS.can_transition(current, next) {
        next
    } else {
        current
    }
}

/* ============================================================
   GET /invoices/patient/{patient_id}/balance
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PatientBalance {
    pub patient_id: Uuid,
    pub total_invoiced_cents: i64,
    pub total_paid_cents: i64,
    pub balance_cents: i64,
}

pub async fn get_patient_balance(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<PatientBalance>>, ApiError> {
    let _ = &auth;

    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_cents), 0),
               COALESCE(SUM(paid_cents), 0)
        FROM invoice
        WHERE patient_id = $1
          AND status <> 5
        "#,
    )
    .bind(patient_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: PatientBalance {
            patient_id,
            total_invoiced_cents: row.0,
            total_paid_cents: row.1,
            balance_cents: row.0 - row.1,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use InvoiceStatus::*;

    #[test]
    fn invoice_transition_table_matches_billing_rules() {
        let allowed = [
            (Draft, Sent),
            (Draft, Cancelled),
            (Sent, Paid),
            (Sent, Partial),
            (Sent, Cancelled),
            (Partial, Paid),
            (Partial, Cancelled),
            (Overdue, Paid),
            (Overdue, Partial),
            (Overdue, Cancelled),
        ];
        let all = [Draft, Sent, Partial, Paid, Overdue, Cancelled];
        for from in all {
            for to in all {
                assert_eq!(
                    INVOICE_TRANSITIONS.can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn paid_and_cancelled_invoices_are_terminal() {
        assert!(INVOICE_TRANSITIONS.is_terminal(Paid));
        assert!(INVOICE_TRANSITIONS.is_terminal(Cancelled));
        assert!(!INVOICE_TRANSITIONS.is_terminal(Draft));
    }

    #[test]
    fn payments_advance_partial_then_paid() {
        assert_eq!(status_after_payment(Sent, 4_000, 10_000), Partial);
        assert_eq!(status_after_payment(Partial, 10_000, 10_000), Paid);
        assert_eq!(status_after_payment(Sent, 10_000, 10_000), Paid);
        assert_eq!(status_after_payment(Overdue, 5_000, 10_000), Partial);
        assert_eq!(status_after_payment(Overdue, 12_000, 10_000), Paid);
        // Repeated partial payments keep the invoice partial.
        assert_eq!(status_after_payment(Partial, 6_000, 10_000), Partial);
    }
}
