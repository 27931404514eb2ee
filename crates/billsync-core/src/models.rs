//! Source and target record types and the fixed target schema.

use chrono::NaiveDate;
use serde_json::{Map, Number, Value};

/// How a target column is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Date,
}

/// One column of the target table: where it comes from and how it is typed.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Column header in the source report.
    pub source: &'static str,
    /// Target column name without the table prefix.
    pub suffix: &'static str,
    pub kind: FieldKind,
}

const fn field(source: &'static str, suffix: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        source,
        suffix,
        kind,
    }
}

pub const FIELD_COUNT: usize = 21;

/// The target schema, in report column order.
pub const SCHEMA: [FieldSpec; FIELD_COUNT] = [
    field("ProjectOrganization", "projectorganization", FieldKind::Text),
    field("ProjectCode", "projectcode", FieldKind::Text),
    field("TaskNumber", "tasknumber", FieldKind::Text),
    field("Task", "task", FieldKind::Text),
    field("LaborCategory", "laborcategory", FieldKind::Text),
    field("Location", "location", FieldKind::Text),
    field("ProjectType", "projecttype", FieldKind::Text),
    field("PayCode", "paycode", FieldKind::Text),
    field("Person", "person", FieldKind::Text),
    field("Reference", "reference", FieldKind::Text),
    field("Date", "date", FieldKind::Date),
    field("ADJPostedDate", "adjposteddate", FieldKind::Date),
    field("FinancialPostedDate", "financialposteddate", FieldKind::Date),
    field("BillingCurrency", "billingcurrency", FieldKind::Text),
    field("BillRateBC", "billratebc", FieldKind::Decimal),
    field("Hours", "hours", FieldKind::Decimal),
    field("BillAmountBC", "billamountbc", FieldKind::Decimal),
    field("BillableAmountBC", "billableamountbc", FieldKind::Decimal),
    field("LocalCurrency", "localcurrency", FieldKind::Text),
    field("BillAmountLC", "billamountlc", FieldKind::Decimal),
    field("BillableAmountLC", "billableamountlc", FieldKind::Decimal),
];

/// Suffix of the column that scopes windows.
pub const WINDOW_DATE_SUFFIX: &str = "date";

/// One parsed report row: column name to raw text, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    columns: Vec<(String, String)>,
}

impl SourceRecord {
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self { columns }
    }

    /// Convenience constructor for literal rows.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Raw text of `column`, if the report has it.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A typed target value. Coercion failures are `Null`, never empty strings.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Decimal(f64),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// JSON form sent to the Web API. Dates use the canonical `YYYY-MM-DD` text.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Decimal(number) => {
                Number::from_f64(*number).map_or(Value::Null, Value::Number)
            }
            FieldValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            FieldValue::Null => Value::Null,
        }
    }
}

/// One row shaped for the target table. Values are aligned with [`SCHEMA`].
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    values: [FieldValue; FIELD_COUNT],
}

impl TargetRecord {
    pub fn new(values: [FieldValue; FIELD_COUNT]) -> Self {
        Self { values }
    }

    /// Value of the column with the given unprefixed suffix.
    pub fn get(&self, suffix: &str) -> Option<&FieldValue> {
        SCHEMA
            .iter()
            .position(|spec| spec.suffix == suffix)
            .map(|idx| &self.values[idx])
    }

    /// The work date that decides window membership.
    pub fn window_date(&self) -> Option<NaiveDate> {
        match self.get(WINDOW_DATE_SUFFIX) {
            Some(FieldValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    /// Iterates `(spec, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldSpec, &FieldValue)> {
        SCHEMA.iter().zip(self.values.iter())
    }

    /// JSON body for a create request, with every column name prefixed.
    pub fn to_json(&self, table_prefix: &str) -> Map<String, Value> {
        self.fields()
            .map(|(spec, value)| (format!("{}_{}", table_prefix, spec.suffix), value.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_null() -> TargetRecord {
        TargetRecord::new(std::array::from_fn(|_| FieldValue::Null))
    }

    #[test]
    fn test_schema_suffixes_are_unique() {
        for (i, a) in SCHEMA.iter().enumerate() {
            for b in SCHEMA.iter().skip(i + 1) {
                assert_ne!(a.suffix, b.suffix);
            }
        }
    }

    #[test]
    fn test_source_record_get() {
        let row = SourceRecord::from_pairs(&[("Person", "Ada"), ("Hours", "8")]);
        assert_eq!(row.get("Person"), Some("Ada"));
        assert_eq!(row.get("Task"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_to_json_prefixes_every_column() {
        let json = all_null().to_json("cr834");
        assert_eq!(json.len(), FIELD_COUNT);
        assert!(json.contains_key("cr834_billableamountlc"));
        assert_eq!(json["cr834_hours"], Value::Null);
    }

    #[test]
    fn test_field_value_json() {
        assert_eq!(FieldValue::Decimal(7.5).to_json(), serde_json::json!(7.5));
        let date = NaiveDate::from_ymd_opt(2025, 5, 30).unwrap();
        assert_eq!(FieldValue::Date(date).to_json(), serde_json::json!("2025-05-30"));
        assert_eq!(FieldValue::Text("x".into()).to_json(), serde_json::json!("x"));
    }

    #[test]
    fn test_window_date_missing() {
        assert_eq!(all_null().window_date(), None);
    }
}
