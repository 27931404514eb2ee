//! Row mapping from report columns to target columns.

use crate::dates::parse_date;
use crate::models::{FieldKind, FieldValue, SourceRecord, TargetRecord, SCHEMA};

/// Maps one report row onto the target schema.
///
/// Missing or empty columns become `Null`. Text passes through untouched,
/// decimals and dates that fail to parse become `Null`; bad values are
/// expected noise in the report and never an error.
pub fn map_record(row: &SourceRecord) -> TargetRecord {
    TargetRecord::new(std::array::from_fn(|idx| {
        let spec = &SCHEMA[idx];
        match row.get(spec.source) {
            None | Some("") => FieldValue::Null,
            Some(raw) => coerce(spec.kind, raw),
        }
    }))
}

pub fn map_records(rows: &[SourceRecord]) -> Vec<TargetRecord> {
    rows.iter().map(map_record).collect()
}

fn coerce(kind: FieldKind, raw: &str) -> FieldValue {
    match kind {
        FieldKind::Text => FieldValue::Text(raw.to_string()),
        FieldKind::Decimal => parse_decimal(raw).map_or(FieldValue::Null, FieldValue::Decimal),
        FieldKind::Date => parse_date(raw).map_or(FieldValue::Null, FieldValue::Date),
    }
}

/// Parses a decimal amount, tolerating surrounding whitespace.
///
/// Non-finite values are rejected because the Web API cannot store them.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn full_row() -> SourceRecord {
        SourceRecord::from_pairs(&[
            ("ProjectOrganization", "AZT"),
            ("ProjectCode", "P-100"),
            ("TaskNumber", "1.2"),
            ("Task", "Design"),
            ("LaborCategory", "Engineer II"),
            ("Location", "Phoenix"),
            ("ProjectType", "T&M"),
            ("PayCode", "REG"),
            ("Person", "Lovelace, Ada"),
            ("Reference", ""),
            ("Date", "5/30/2025"),
            ("ADJPostedDate", "2025-06-02"),
            ("FinancialPostedDate", "garbage"),
            ("BillingCurrency", "USD"),
            ("BillRateBC", "150.00"),
            ("Hours", " 7.5 "),
            ("BillAmountBC", "1125"),
            ("BillableAmountBC", "n/a"),
            ("LocalCurrency", "USD"),
            ("BillAmountLC", ""),
            ("BillableAmountLC", "1,125.00"),
        ])
    }

    #[test]
    fn test_map_text_fields() {
        let record = map_record(&full_row());
        assert_eq!(
            record.get("person"),
            Some(&FieldValue::Text("Lovelace, Ada".to_string()))
        );
        assert_eq!(record.get("projecttype"), Some(&FieldValue::Text("T&M".to_string())));
        assert_eq!(record.get("reference"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_map_decimal_fields() {
        let record = map_record(&full_row());
        assert_eq!(record.get("billratebc"), Some(&FieldValue::Decimal(150.0)));
        assert_eq!(record.get("hours"), Some(&FieldValue::Decimal(7.5)));
        assert_eq!(record.get("billamountbc"), Some(&FieldValue::Decimal(1125.0)));
        assert_eq!(record.get("billableamountbc"), Some(&FieldValue::Null));
        assert_eq!(record.get("billamountlc"), Some(&FieldValue::Null));
        assert_eq!(record.get("billableamountlc"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_map_date_fields() {
        let record = map_record(&full_row());
        assert_eq!(record.window_date(), NaiveDate::from_ymd_opt(2025, 5, 30));
        assert_eq!(
            record.get("adjposteddate"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()))
        );
        assert_eq!(record.get("financialposteddate"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_missing_columns_map_to_null() {
        let record = map_record(&SourceRecord::from_pairs(&[("Unrelated", "x")]));
        assert!(record.fields().all(|(_, value)| value.is_null()));
    }

    #[test]
    fn test_parse_decimal_never_panics_on_noise() {
        for noise in ["", " ", "abc", "--1", "1.2.3", "NaN", "inf", "1e999", "\u{0}"] {
            assert_eq!(parse_decimal(noise), None, "input {:?}", noise);
        }
        assert_eq!(parse_decimal("-12.25"), Some(-12.25));
        assert_eq!(parse_decimal("0"), Some(0.0));
    }

    #[test]
    fn test_map_records_preserves_order() {
        let rows = vec![
            SourceRecord::from_pairs(&[("Person", "a")]),
            SourceRecord::from_pairs(&[("Person", "b")]),
        ];
        let records = map_records(&rows);
        assert_eq!(records[1].get("person"), Some(&FieldValue::Text("b".into())));
    }
}
