use metrica::prelude::*;
use metrica::{execute, parse};
use proptest::prelude::*;

const STATUSES: [&str; 3] = ["active", "closed", "pending"];

fn eval(expression: &str, records: &[Record]) -> EvalResult<FormulaValue> {
    execute(&parse(expression).unwrap(), records)
}

fn records_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((0u32..100_000, 0usize..STATUSES.len()), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(amount, status)| {
                Record::new()
                    .with("amount", f64::from(amount))
                    .with("status", STATUSES[status])
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn multiplication_binds_tighter_than_addition(a in 0u32..1000, b in 0u32..1000, c in 0u32..1000) {
        let (a, b, c) = (f64::from(a), f64::from(b), f64::from(c));

        let value = eval(&format!("{} + {} * {}", a, b, c), &[]).unwrap();
        prop_assert_eq!(value, FormulaValue::Number(a + b * c));

        let value = eval(&format!("({} + {}) * {}", a, b, c), &[]).unwrap();
        prop_assert_eq!(value, FormulaValue::Number((a + b) * c));

        let value = eval(&format!("{} - {} - {}", a, b, c), &[]).unwrap();
        prop_assert_eq!(value, FormulaValue::Number(a - b - c));
    }

    #[test]
    fn where_sum_matches_filtered_subset(records in records_strategy(), status in 0usize..STATUSES.len()) {
        let wanted = STATUSES[status];
        let expected: f64 = records
            .iter()
            .filter(|r| r.get("status").and_then(FieldValue::as_text) == Some(wanted))
            .filter_map(|r| r.get("amount").and_then(FieldValue::as_number))
            .sum();

        let value = eval(&format!("SUM(amount WHERE status = \"{}\")", wanted), &records).unwrap();
        prop_assert_eq!(value, FormulaValue::Number(expected));
    }

    #[test]
    fn count_matches_record_count(records in records_strategy()) {
        let value = eval("COUNT(*)", &records).unwrap();
        prop_assert_eq!(value, FormulaValue::Number(records.len() as f64));
    }

    #[test]
    fn evaluation_is_idempotent(records in records_strategy()) {
        let formula = parse("RATIO(SUM(amount WHERE status = \"active\"), SUM(amount)) + MAX(amount)").unwrap();
        let first = execute(&formula, &records);
        let second = execute(&formula, &records);
        prop_assert_eq!(first, second);
    }
}
