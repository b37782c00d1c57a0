//! Reshapes list fixtures into a single page of a live-looking response.
//!
//! A fixture carries its whole record list; clients page through it with
//! `limit` and the opaque `next_page` cursor handed back by the previous call.
//! The cursor is an absolute offset into the sorted, filtered list.

use std::cmp::Ordering;

use chrono::{Datelike, Months, NaiveDate};
use serde_json::{Map, Value};

use crate::context::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    InvalidNumber { field: &'static str, value: String },
    InvalidDate { field: String, value: String },
    ListNotArray { field: &'static str },
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::InvalidNumber { field, value } => {
                write!(f, "{} must be a non-negative integer, got {:?}", field, value)
            }
            ShapeError::InvalidDate { field, value } => {
                write!(f, "{} is not a YYYYMMDD or YYYYMM date: {:?}", field, value)
            }
            ShapeError::ListNotArray { field } => write!(f, "{} is not an array", field),
        }
    }
}

impl std::error::Error for ShapeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Transactions,
    Bills,
    BillDetails,
    Accounts,
    Approvals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Descending(&'static str),
    Ascending(&'static str, &'static str),
}

#[derive(Debug)]
struct KindSpec {
    list_field: &'static str,
    count_field: &'static str,
    cursor_field: &'static str,
    order: SortOrder,
    /// Primary and fallback date fields; `None` disables date filtering.
    date_fields: Option<(&'static str, &'static str)>,
}

const TRANSACTIONS: KindSpec = KindSpec {
    list_field: "trans_list",
    count_field: "trans_cnt",
    cursor_field: "next_page",
    order: SortOrder::Descending("trans_dtime"),
    date_fields: Some(("trans_dtime", "trans_date")),
};

const BILLS: KindSpec = KindSpec {
    list_field: "bill_list",
    count_field: "bill_cnt",
    cursor_field: "next_page",
    order: SortOrder::Descending("paid_out_date"),
    date_fields: Some(("paid_out_date", "charge_month")),
};

const BILL_DETAILS: KindSpec = KindSpec {
    list_field: "bill_detail_list",
    count_field: "bill_detail_cnt",
    cursor_field: "next_page",
    order: SortOrder::Descending("paid_dtime"),
    date_fields: Some(("paid_dtime", "paid_date")),
};

const ACCOUNTS: KindSpec = KindSpec {
    list_field: "account_list",
    count_field: "account_cnt",
    cursor_field: "next_page",
    order: SortOrder::Ascending("account_type", "account_num"),
    date_fields: None,
};

const APPROVALS: KindSpec = KindSpec {
    list_field: "approved_list",
    count_field: "approved_cnt",
    cursor_field: "next_page",
    order: SortOrder::Descending("approved_dtime"),
    date_fields: None,
};

impl RecordKind {
    /// Detection order; the first kind whose count field is present wins.
    const ALL: [RecordKind; 5] = [
        RecordKind::Transactions,
        RecordKind::Bills,
        RecordKind::BillDetails,
        RecordKind::Accounts,
        RecordKind::Approvals,
    ];

    pub fn detect(document: &Map<String, Value>) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| document.contains_key(kind.count_field()))
    }

    fn spec(self) -> &'static KindSpec {
        match self {
            RecordKind::Transactions => &TRANSACTIONS,
            RecordKind::Bills => &BILLS,
            RecordKind::BillDetails => &BILL_DETAILS,
            RecordKind::Accounts => &ACCOUNTS,
            RecordKind::Approvals => &APPROVALS,
        }
    }

    fn count_field(self) -> &'static str {
        self.spec().count_field
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Transactions => "transactions",
            RecordKind::Bills => "bills",
            RecordKind::BillDetails => "bill_details",
            RecordKind::Accounts => "accounts",
            RecordKind::Approvals => "approvals",
        }
    }
}

/// Paging inputs taken from the request.
///
/// Everything stays raw until a recognized list needs it, so a request that
/// pages nothing cannot fail on a malformed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationRequest {
    pub limit: Option<String>,
    pub next_page: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub from_month: Option<String>,
    pub to_month: Option<String>,
}

impl PaginationRequest {
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            limit: ctx.field("limit"),
            next_page: ctx.field("next_page"),
            from_date: ctx.field("from_date"),
            to_date: ctx.field("to_date"),
            from_month: ctx.field("from_month"),
            to_month: ctx.field("to_month"),
        }
    }

    /// `(limit, page)`; the page defaults to 0 without a cursor.
    fn offsets(&self, limit: &str) -> Result<(usize, usize), ShapeError> {
        let limit = parse_offset("limit", limit)?;
        let page = self
            .next_page
            .as_deref()
            .map(|raw| parse_offset("next_page", raw))
            .transpose()?
            .unwrap_or(0);
        Ok((limit, page))
    }

    fn date_range(&self) -> Result<Option<DateRange>, ShapeError> {
        let (from, to) = if self.from_date.is_some() || self.to_date.is_some() {
            (
                self.from_date.as_deref().map(|v| ("from_date", v)),
                self.to_date.as_deref().map(|v| ("to_date", v)),
            )
        } else {
            (
                self.from_month.as_deref().map(|v| ("from_month", v)),
                self.to_month.as_deref().map(|v| ("to_month", v)),
            )
        };

        if from.is_none() && to.is_none() {
            return Ok(None);
        }

        let start = from
            .map(|(field, raw)| parse_bound(field, raw, Bound::Start))
            .transpose()?;
        let end = to
            .map(|(field, raw)| parse_bound(field, raw, Bound::End))
            .transpose()?;

        Ok(Some(DateRange { start, end }))
    }
}

fn parse_offset(field: &'static str, raw: &str) -> Result<usize, ShapeError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ShapeError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

#[derive(Debug, Clone, Copy)]
struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

fn parse_bound(field: &str, raw: &str, bound: Bound) -> Result<NaiveDate, ShapeError> {
    let invalid = || ShapeError::InvalidDate {
        field: field.to_string(),
        value: raw.to_string(),
    };

    let raw = raw.trim();
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    match raw.len() {
        8 => parse_day(raw).ok_or_else(invalid),
        6 => {
            let first = parse_month(raw).ok_or_else(invalid)?;
            match bound {
                Bound::Start => Ok(first),
                Bound::End => last_day_of_month(first).ok_or_else(invalid),
            }
        }
        _ => Err(invalid()),
    }
}

fn parse_day(digits: &str) -> Option<NaiveDate> {
    let first = parse_month(digits)?;
    let day = digits.get(6..8)?.parse::<u32>().ok()?;
    first.with_day(day)
}

fn parse_month(digits: &str) -> Option<NaiveDate> {
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    let month = digits.get(4..6)?.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    first.checked_add_months(Months::new(1))?.pred_opt()
}

/// Date of a record: a leading `YYYYMMDD`, or a `YYYYMM` month read as its
/// first day. Time-of-day suffixes are ignored.
fn record_date(
    record: &Value,
    (primary, fallback): (&'static str, &'static str),
) -> Result<Option<NaiveDate>, ShapeError> {
    let Some((field, raw)) = [primary, fallback]
        .into_iter()
        .find_map(|field| scalar_text(record.get(field)?).map(|raw| (field, raw)))
    else {
        return Ok(None);
    };

    let invalid = || ShapeError::InvalidDate {
        field: field.to_string(),
        value: raw.clone(),
    };

    let digits = raw
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    let date = if digits >= 8 {
        parse_day(&raw[..8])
    } else if digits == 6 {
        parse_month(&raw[..6])
    } else {
        None
    };

    date.map(Some).ok_or_else(invalid)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Sort key for one field.
///
/// Total order: numbers first (in the kind's direction), then non-numeric
/// text (lexicographic, same direction), then missing values. Ties keep
/// fixture order because the sort is stable.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
    Missing,
}

impl SortKey {
    fn of(record: &Value, field: &str) -> Self {
        match record.get(field) {
            Some(Value::Number(n)) => n.as_f64().map_or(SortKey::Missing, SortKey::Number),
            Some(Value::String(s)) => {
                let s = s.trim();
                match s.parse::<f64>() {
                    Ok(n) if n.is_finite() => SortKey::Number(n),
                    _ if s.is_empty() => SortKey::Missing,
                    _ => SortKey::Text(s.to_string()),
                }
            }
            _ => SortKey::Missing,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Text(_) => 1,
            SortKey::Missing => 2,
        }
    }

    fn compare(&self, other: &Self, descending: bool) -> Ordering {
        let within = match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => return self.rank().cmp(&other.rank()),
        };
        if descending { within.reverse() } else { within }
    }
}

impl SortOrder {
    fn compare(self, a: &Value, b: &Value) -> Ordering {
        match self {
            SortOrder::Descending(field) => {
                SortKey::of(a, field).compare(&SortKey::of(b, field), true)
            }
            SortOrder::Ascending(first, second) => SortKey::of(a, first)
                .compare(&SortKey::of(b, first), false)
                .then_with(|| SortKey::of(a, second).compare(&SortKey::of(b, second), false)),
        }
    }
}

/// Applies sort, date filter, slice and cursor update to a list fixture.
///
/// Documents without a recognized count field, or requests without `limit`,
/// pass through untouched whatever the other paging fields hold.
pub fn shape(mut document: Value, req: &PaginationRequest) -> Result<Value, ShapeError> {
    let Some(raw_limit) = req.limit.as_deref() else {
        return Ok(document);
    };

    if let Some(fields) = document.as_object_mut()
        && let Some(kind) = RecordKind::detect(fields)
    {
        let (limit, page) = req.offsets(raw_limit)?;
        paginate(fields, kind, limit, page, req)?;
    }

    Ok(document)
}

fn paginate(
    document: &mut Map<String, Value>,
    kind: RecordKind,
    limit: usize,
    page: usize,
    req: &PaginationRequest,
) -> Result<(), ShapeError> {
    let spec = kind.spec();
    let new_cursor = limit.saturating_add(page);

    let mut records = match document.get_mut(spec.list_field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => std::mem::take(items),
        Some(_) => {
            return Err(ShapeError::ListNotArray {
                field: spec.list_field,
            });
        }
    };

    records.sort_by(|a, b| spec.order.compare(a, b));

    if let Some(date_fields) = spec.date_fields
        && let Some(range) = req.date_range()?
    {
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if record_date(&record, date_fields)?.is_some_and(|date| range.contains(date)) {
                kept.push(record);
            }
        }
        records = kept;
    }

    let total = records.len();
    let slice = records
        .into_iter()
        .skip(page)
        .take(limit)
        .collect::<Vec<_>>();
    let count = slice.len();

    if total > count.saturating_add(page) {
        document.insert(
            spec.cursor_field.to_string(),
            Value::String(new_cursor.to_string()),
        );
    } else {
        document.remove(spec.cursor_field);
    }

    document.insert(spec.list_field.to_string(), Value::Array(slice));
    document.insert(spec.count_field.to_string(), Value::String(count.to_string()));

    tracing::debug!(
        kind = kind.as_str(),
        page,
        limit,
        total,
        count,
        "paged fixture list"
    );

    Ok(())
}
