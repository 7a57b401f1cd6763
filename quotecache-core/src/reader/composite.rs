//! Elementwise arithmetic over two readers, e.g. a spread or a ratio series.

use super::{post_process, Reader, ReaderError};
use crate::availability::AvailabilityReport;
use crate::domain::{columns, DateCriteria, Field, Row, Table};
use crate::filter::RowFilter;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Reader whose price columns are `op(left, right)`, joined by date (and by
/// identifier when both sides carry several instruments).
pub struct CompositeOpReader<L = Box<dyn Reader>, R = Box<dyn Reader>> {
    left: L,
    right: R,
    op: BinaryOp,
    name: String,
    filter: Option<RowFilter>,
}

pub fn combine<L: Reader, R: Reader>(left: L, right: R, op: BinaryOp) -> CompositeOpReader<L, R> {
    let name = format!("{}{}{}", left.name(), op.symbol(), right.name());
    CompositeOpReader {
        left,
        right,
        op,
        name,
        filter: None,
    }
}

pub fn spread<L: Reader, R: Reader>(left: L, right: R) -> CompositeOpReader<L, R> {
    combine(left, right, BinaryOp::Sub)
}

pub fn ratio<L: Reader, R: Reader>(left: L, right: R) -> CompositeOpReader<L, R> {
    combine(left, right, BinaryOp::Div)
}

pub fn sum<L: Reader, R: Reader>(left: L, right: R) -> CompositeOpReader<L, R> {
    combine(left, right, BinaryOp::Add)
}

pub fn product<L: Reader, R: Reader>(left: L, right: R) -> CompositeOpReader<L, R> {
    combine(left, right, BinaryOp::Mul)
}

/// How the two sides line up.
struct JoinPlan {
    on_identifier: bool,
    left_prefix: String,
    right_prefix: String,
}

impl<L: Reader, R: Reader> CompositeOpReader<L, R> {
    pub fn op(&self) -> BinaryOp {
        self.op
    }

    pub fn left(&self) -> &L {
        &self.left
    }

    pub fn right(&self) -> &R {
        &self.right
    }

    fn plan(&self, left: &Table, right: &Table) -> JoinPlan {
        let mut plan = JoinPlan {
            on_identifier: true,
            left_prefix: self.left.column_prefix().to_string(),
            right_prefix: self.right.column_prefix().to_string(),
        };

        let left_ids = left.distinct_identifiers();
        if left_ids.len() == 1 {
            plan.on_identifier = false;
            plan.left_prefix = left_ids.iter().map(|id| format!("{id}-")).collect();
        }
        let right_ids = right.distinct_identifiers();
        if right_ids.len() == 1 {
            plan.on_identifier = false;
            plan.right_prefix = right_ids.iter().map(|id| format!("{id}-")).collect();
        }

        if plan.left_prefix == plan.right_prefix {
            let (left_name, right_name) = (self.left.name(), self.right.name());
            if left_name == right_name {
                plan.left_prefix = format!("{left_name}-lhs-");
                plan.right_prefix = format!("{right_name}-rhs-");
            } else {
                plan.left_prefix = format!("{left_name}-");
                plan.right_prefix = format!("{right_name}-");
            }
        }
        plan
    }

    fn join(&self, left: &Table, right: &Table, plan: &JoinPlan) -> Table {
        let key = |row: &Row| -> (Option<String>, NaiveDate) {
            let id = plan.on_identifier.then(|| row.identifier.clone());
            (id, row.date)
        };

        let mut by_key: HashMap<(Option<String>, NaiveDate), Vec<&Row>> = HashMap::new();
        for row in right.iter() {
            by_key.entry(key(row)).or_default().push(row);
        }

        let mut out = Vec::new();
        for l in left.iter() {
            let Some(matches) = by_key.get(&key(l)) else {
                continue;
            };
            for r in matches {
                out.push(self.combine_rows(l, r, plan));
            }
        }

        let mut table = Table::from_rows(out);
        table.sort_by_date();
        table
    }

    fn combine_rows(&self, l: &Row, r: &Row, plan: &JoinPlan) -> Row {
        let identifier = if plan.on_identifier {
            l.identifier.clone()
        } else {
            format!("{} {} {}", l.identifier, self.op.symbol(), r.identifier)
        };

        let mut row = Row::new(identifier, l.date, self.op.apply(l.close, r.close));
        for column in columns::PRICE {
            if let (Some(a), Some(b)) = (l.price(column), r.price(column)) {
                row.set_price(column, self.op.apply(a, b));
            }
        }
        row.volume = f64::NAN;
        row.turnover = f64::NAN;

        keep_side(&mut row, l, &plan.left_prefix, !plan.on_identifier);
        keep_side(&mut row, r, &plan.right_prefix, !plan.on_identifier);
        row
    }
}

/// Copy one side's raw values into `row` under `prefix`.
fn keep_side(row: &mut Row, side: &Row, prefix: &str, with_identifier: bool) {
    if with_identifier {
        row.extra.insert(
            format!("{prefix}{}", columns::IDENTIFIER),
            Field::Text(side.identifier.clone()),
        );
    }
    let numbers = [
        (columns::OPEN, Some(side.open)),
        (columns::HIGH, Some(side.high)),
        (columns::LOW, Some(side.low)),
        (columns::CLOSE, Some(side.close)),
        (columns::PREVIOUS_CLOSE, side.previous_close),
        (columns::VOLUME, Some(side.volume)),
        (columns::TURNOVER, Some(side.turnover)),
    ];
    for (name, value) in numbers {
        if let Some(v) = value {
            row.extra.insert(format!("{prefix}{name}"), Field::Number(v));
        }
    }
    for (name, value) in &side.extra {
        row.extra.insert(format!("{prefix}{name}"), value.clone());
    }
}

impl<L: Reader, R: Reader> Reader for CompositeOpReader<L, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data(&self, _criteria: &DateCriteria) -> AvailabilityReport {
        AvailabilityReport::unknown()
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        let left = self.left.read(criteria)?;
        let right = self.right.read(criteria)?;
        if left.is_empty() || right.is_empty() {
            debug!(reader = %self.name, %criteria, "one side empty, nothing to combine");
            return Ok(Table::new());
        }

        let plan = self.plan(&left, &right);
        let joined = self.join(&left, &right, &plan);
        debug!(
            reader = %self.name,
            on_identifier = plan.on_identifier,
            left = left.len(),
            right = right.len(),
            joined = joined.len(),
            "combined"
        );
        Ok(post_process(joined, self.filter.as_ref()))
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        self.filter = filter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Reader serving a fixed table.
    struct Fixed {
        name: &'static str,
        prefix: &'static str,
        rows: Table,
    }

    impl Reader for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn column_prefix(&self) -> &str {
            self.prefix
        }

        fn has_data(&self, _criteria: &DateCriteria) -> AvailabilityReport {
            AvailabilityReport::unknown()
        }

        fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
            Ok(self.rows.filter_criteria(criteria))
        }

        fn set_filter(&mut self, _filter: Option<RowFilter>) {}
    }

    fn fixed(name: &'static str, prefix: &'static str, rows: Vec<Row>) -> Fixed {
        Fixed {
            name,
            prefix,
            rows: Table::from_rows(rows),
        }
    }

    fn january() -> DateCriteria {
        DateCriteria::range(d(1), d(31)).unwrap()
    }

    #[test]
    fn name_encodes_operands_and_symbol() {
        let r = ratio(fixed("nse_indices", "index-", vec![]), fixed("vix", "", vec![]));
        assert_eq!(r.name(), "nse_indices/vix");
        assert_eq!(r.op(), BinaryOp::Div);
        assert_eq!(spread(fixed("a", "", vec![]), fixed("b", "", vec![])).name(), "a-b");
    }

    #[test]
    fn single_identifier_side_joins_on_date_with_identifier_prefix() {
        let indices = fixed(
            "nse_indices",
            "index-",
            vec![
                Row::new("NIFTY 50", d(2), 21000.0),
                Row::new("NIFTY BANK", d(2), 48000.0),
                Row::new("NIFTY 50", d(3), 21500.0),
            ],
        );
        let vix = fixed(
            "vix",
            "index-",
            vec![Row::new("INDIA VIX", d(2), 15.0), Row::new("INDIA VIX", d(3), 14.0)],
        );

        let mut reader = ratio(indices, vix);
        let rows = reader.read(&january()).unwrap();

        assert_eq!(rows.len(), 3);
        let first = &rows.rows[0];
        assert_eq!(first.identifier, "NIFTY 50 / INDIA VIX");
        assert_eq!(first.close, 1400.0);
        assert_eq!(first.extra.get("INDIA VIX-Close"), Some(&Field::Number(15.0)));
        assert_eq!(first.extra.get("index-Close"), Some(&Field::Number(21000.0)));
        assert_eq!(
            first.extra.get("index-Identifier"),
            Some(&Field::Text("NIFTY 50".into()))
        );
        assert!(rows.column_names().iter().any(|c| c == "INDIA VIX-Open"));
    }

    #[test]
    fn multi_identifier_sides_join_on_identifier_and_date() {
        let cash = fixed(
            "nse_equities",
            "Cash-",
            vec![Row::new("INFY", d(2), 1500.0), Row::new("TCS", d(2), 3700.0)],
        );
        let futures = fixed(
            "nse_futstk",
            "Futures-",
            vec![
                Row::new("TCS", d(2), 3712.0),
                Row::new("INFY", d(2), 1504.5),
                Row::new("WIPRO", d(2), 450.0),
            ],
        );

        let mut reader = spread(futures, cash);
        let rows = reader.read(&january()).unwrap();

        assert_eq!(rows.len(), 2);
        let tcs = rows.iter().find(|r| r.identifier == "TCS").unwrap();
        assert_eq!(tcs.close, 12.0);
        assert_eq!(tcs.extra.get("Futures-Close"), Some(&Field::Number(3712.0)));
        assert_eq!(tcs.extra.get("Cash-Close"), Some(&Field::Number(3700.0)));
        assert!(!tcs.extra.contains_key("Cash-Identifier"));
    }

    #[test]
    fn identical_prefixes_fall_back_to_reader_names() {
        let a = fixed("nifty", "", vec![Row::new("X", d(2), 10.0), Row::new("Y", d(2), 1.0)]);
        let b = fixed("bank", "", vec![Row::new("X", d(2), 4.0), Row::new("Y", d(2), 2.0)]);
        let rows = sum(a, b).read(&january()).unwrap();
        let x = rows.iter().find(|r| r.identifier == "X").unwrap();
        assert_eq!(x.close, 14.0);
        assert_eq!(x.extra.get("nifty-Close"), Some(&Field::Number(10.0)));
        assert_eq!(x.extra.get("bank-Close"), Some(&Field::Number(4.0)));
    }

    #[test]
    fn same_named_sides_keep_both_values() {
        let a = fixed("nifty", "", vec![Row::new("X", d(2), 10.0), Row::new("Y", d(2), 1.0)]);
        let b = fixed("nifty", "", vec![Row::new("X", d(2), 4.0), Row::new("Y", d(2), 2.0)]);
        let rows = spread(a, b).read(&january()).unwrap();
        let x = rows.iter().find(|r| r.identifier == "X").unwrap();
        assert_eq!(x.close, 6.0);
        assert_eq!(x.extra.get("nifty-lhs-Close"), Some(&Field::Number(10.0)));
        assert_eq!(x.extra.get("nifty-rhs-Close"), Some(&Field::Number(4.0)));
        assert!(!x.extra.contains_key("nifty-Close"));
    }

    #[test]
    fn empty_side_or_no_match_gives_empty_table() {
        let a = fixed("a", "", vec![Row::new("X", d(2), 10.0)]);
        let empty = fixed("b", "", vec![]);
        assert!(product(a, empty).read(&january()).unwrap().is_empty());

        let a = fixed("a", "", vec![Row::new("X", d(2), 10.0)]);
        let b = fixed("b", "", vec![Row::new("Y", d(3), 4.0)]);
        assert!(combine(a, b, BinaryOp::Mul).read(&january()).unwrap().is_empty());
    }

    #[test]
    fn availability_is_unknown() {
        let r = sum(fixed("a", "", vec![]), fixed("b", "", vec![]));
        assert_eq!(
            r.has_data(&january()).status,
            crate::availability::AvailabilityStatus::Unknown
        );
    }
}
