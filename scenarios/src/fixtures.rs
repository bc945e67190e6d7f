//! Built-in scenario datasets.
//!
//! Each fixture is a rigged table whose rows fall into known categories, the
//! rule document describing those categories, and the counts a correct
//! classifier must produce. Data is drawn from a seeded `StdRng`, so a seed
//! always reproduces the same bytes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use engine::core::classify::{Assignment, CategoryRule, Comparison, Op, Operand, RuleClassifier};
use engine::core::schema::SchemaContext;
use engine::core::table::Table;
use engine::core::types::ExpectedCounts;
use engine::io::fs_util::{write_json, write_text};
use engine::io::table_io::write_table;

pub const DATA_FILE: &str = "data.csv";
pub const RULES_FILE: &str = "rules.json";
pub const SCHEMA_FILE: &str = "context.txt";
pub const NATIVE_RULES_FILE: &str = "native_rules.toml";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    /// Stock ageing: liquidation, review, and a VIP exception.
    Warehouse,
    /// Price tiers with a low-rating clearance exception.
    Electronics,
    /// Fulfilment priority with a VIP rush exception.
    Orders,
}

impl FixtureKind {
    pub fn default_seed(self) -> u64 {
        match self {
            FixtureKind::Warehouse => 42,
            FixtureKind::Electronics => 99,
            FixtureKind::Orders => 77,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub data: Table,
    pub rules: Value,
    pub expected: ExpectedCounts,
    /// The same rules as structured predicates, for `engine run --native-rules`.
    pub native: RuleClassifier,
}

/// Paths written by [`write_fixture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededFiles {
    pub data: PathBuf,
    pub rules: PathBuf,
    pub schema: PathBuf,
    pub native_rules: PathBuf,
}

pub fn build_fixture(kind: FixtureKind, seed: u64) -> Fixture {
    let mut rng = StdRng::seed_from_u64(seed);
    match kind {
        FixtureKind::Warehouse => warehouse(&mut rng),
        FixtureKind::Electronics => electronics(&mut rng),
        FixtureKind::Orders => orders(&mut rng),
    }
}

/// Write the fixture's data, rules, schema context, and native rules into `dir`.
pub fn write_fixture(dir: &Path, fixture: &Fixture) -> Result<SeededFiles> {
    let files = SeededFiles {
        data: dir.join(DATA_FILE),
        rules: dir.join(RULES_FILE),
        schema: dir.join(SCHEMA_FILE),
        native_rules: dir.join(NATIVE_RULES_FILE),
    };
    write_table(&files.data, &fixture.data)?;
    write_json(&files.rules, &fixture.rules)?;
    write_text(
        &files.schema,
        &SchemaContext::from_table(&fixture.data).render(),
    )?;
    let native = toml::to_string(&fixture.native).context("serialize native rules")?;
    write_text(&files.native_rules, &native)?;
    debug!(
        dir = %dir.display(),
        rows = fixture.data.len(),
        "fixture written"
    );
    Ok(files)
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn rating(value: f64) -> String {
    format!("{value:.1}")
}

fn python_bool(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

fn counts(pairs: &[(&str, usize)]) -> ExpectedCounts {
    pairs
        .iter()
        .map(|(category, count)| ((*category).to_string(), *count))
        .collect()
}

fn cmp(column: &str, op: Op, value: Operand) -> Comparison {
    Comparison {
        column: column.to_string(),
        op,
        value,
    }
}

fn warehouse(rng: &mut StdRng) -> Fixture {
    let mut data = Table::new(vec![
        "Item_Name".into(),
        "Price".into(),
        "Days_in_Warehouse".into(),
        "Profit_Per_Item".into(),
    ]);
    let mut item = 0;
    let mut push = |data: &mut Table, price: f64, days: i64, profit: f64| {
        item += 1;
        data.rows.push(vec![
            format!("Widget_{item:03}"),
            money(price),
            days.to_string(),
            money(profit),
        ]);
    };
    for _ in 0..80 {
        let price = rng.gen_range(20.0..100.0);
        let days = rng.gen_range(10..100);
        let profit = rng.gen_range(10.0..50.0);
        push(&mut data, price, days, profit);
    }
    for _ in 0..10 {
        push(&mut data, 50.0, 200, 4.0);
    }
    for _ in 0..5 {
        push(&mut data, 30.0, 50, 2.0);
    }
    for _ in 0..5 {
        push(&mut data, 75.0, 250, 25.0);
    }

    let rules = json!({
        "rules": [
            {
                "rule_id": 1,
                "rule_name": "Low Margin Review",
                "condition_logic": "If Profit_Per_Item is less than 5, status should be 'Review'.",
                "exception_logic": null
            },
            {
                "rule_id": 2,
                "rule_name": "Aged Stock Liquidation",
                "condition_logic": "If Days_in_Warehouse is greater than 180, status should be 'Liquidation'.",
                "exception_logic": "If Days_in_Warehouse is greater than 180 BUT Profit_Per_Item is greater than 20, status should be 'VIP_Keep' instead of 'Liquidation'."
            }
        ],
        "total_rules": 2
    });

    let native = RuleClassifier {
        column: "Status".into(),
        default_category: "Normal".into(),
        rules: vec![
            CategoryRule {
                category: "Review".into(),
                when: vec![cmp("Profit_Per_Item", Op::Lt, Operand::Number(5.0))],
                exception: None,
            },
            CategoryRule {
                category: "Liquidation".into(),
                when: vec![cmp("Days_in_Warehouse", Op::Gt, Operand::Number(180.0))],
                exception: Some(Assignment {
                    category: "VIP_Keep".into(),
                    when: vec![cmp("Profit_Per_Item", Op::Gt, Operand::Number(20.0))],
                }),
            },
        ],
    };

    Fixture {
        data,
        rules,
        expected: counts(&[
            ("Normal", 80),
            ("Liquidation", 10),
            ("Review", 5),
            ("VIP_Keep", 5),
        ]),
        native,
    }
}

fn electronics(rng: &mut StdRng) -> Fixture {
    let mut data = Table::new(vec![
        "Product_Name".into(),
        "Price".into(),
        "Customer_Rating".into(),
        "Units_Sold".into(),
    ]);
    // (rows, price range, rating range, units range)
    let bands = [
        (60, (50.0, 200.0), (3.0, 5.0), (100, 1000)),
        (15, (10.0, 29.0), (2.0, 4.0), (50, 300)),
        (15, (501.0, 1000.0), (4.0, 5.0), (10, 100)),
        (10, (501.0, 800.0), (1.0, 2.4), (1, 20)),
    ];
    let mut product = 0;
    for (rows, price, stars, units) in bands {
        for _ in 0..rows {
            product += 1;
            data.rows.push(vec![
                format!("Gadget_{product:03}"),
                money(rng.gen_range(price.0..price.1)),
                rating(rng.gen_range(stars.0..stars.1)),
                rng.gen_range(units.0..units.1).to_string(),
            ]);
        }
    }

    let rules = json!({
        "rules": [
            {
                "rule_id": 1,
                "rule_name": "Budget Tier",
                "condition_logic": "If Price is less than 30, status should be 'Budget'.",
                "exception_logic": null
            },
            {
                "rule_id": 2,
                "rule_name": "Premium Tier",
                "condition_logic": "If Price is greater than 500, status should be 'Premium'.",
                "exception_logic": "If Price is greater than 500 BUT Customer_Rating is below 2.5, status should be 'Clearance' instead of 'Premium'."
            },
            {
                "rule_id": 3,
                "rule_name": "Clearance Exception",
                "condition_logic": "If Price is greater than 500 and Customer_Rating is less than 2.5, status should be 'Clearance' (override Premium).",
                "exception_logic": null
            }
        ],
        "total_rules": 3
    });

    let native = RuleClassifier {
        column: "Status".into(),
        default_category: "Normal".into(),
        rules: vec![
            CategoryRule {
                category: "Budget".into(),
                when: vec![cmp("Price", Op::Lt, Operand::Number(30.0))],
                exception: None,
            },
            CategoryRule {
                category: "Premium".into(),
                when: vec![cmp("Price", Op::Gt, Operand::Number(500.0))],
                exception: Some(Assignment {
                    category: "Clearance".into(),
                    when: vec![cmp("Customer_Rating", Op::Lt, Operand::Number(2.5))],
                }),
            },
        ],
    };

    Fixture {
        data,
        rules,
        expected: counts(&[
            ("Normal", 60),
            ("Budget", 15),
            ("Premium", 15),
            ("Clearance", 10),
        ]),
        native,
    }
}

fn orders(rng: &mut StdRng) -> Fixture {
    let mut data = Table::new(vec![
        "Order_ID".into(),
        "Order_Value".into(),
        "Days_Since_Order".into(),
        "Is_Prime_Member".into(),
    ]);
    let mut order = 0;
    let mut push = |data: &mut Table, value: f64, days: i64, prime: bool| {
        order += 1;
        data.rows.push(vec![
            format!("ORD_{order:04}"),
            money(value),
            days.to_string(),
            python_bool(prime),
        ]);
    };
    for _ in 0..50 {
        let value = rng.gen_range(20.0..200.0);
        let days = rng.gen_range(0..4);
        let prime = rng.gen_bool(0.5);
        push(&mut data, value, days, prime);
    }
    for _ in 0..20 {
        let value = rng.gen_range(20.0..200.0);
        let days = rng.gen_range(8..15);
        push(&mut data, value, days, false);
    }
    for _ in 0..15 {
        let value = rng.gen_range(501.0..2000.0);
        let days = rng.gen_range(0..3);
        let prime = rng.gen_bool(0.5);
        push(&mut data, value, days, prime);
    }
    for _ in 0..15 {
        let value = rng.gen_range(501.0..2000.0);
        let days = rng.gen_range(8..20);
        push(&mut data, value, days, true);
    }

    let rules = json!({
        "rules": [
            {
                "rule_id": 1,
                "rule_name": "Delayed Order",
                "condition_logic": "If Days_Since_Order is greater than 7, status should be 'Urgent'.",
                "exception_logic": "If Days_Since_Order > 7 AND Order_Value > 500, status should be 'VIP_Rush' instead of 'Urgent'."
            },
            {
                "rule_id": 2,
                "rule_name": "High Value Order",
                "condition_logic": "If Order_Value is greater than 500, status should be 'Priority'.",
                "exception_logic": null
            },
            {
                "rule_id": 3,
                "rule_name": "VIP Rush Exception",
                "condition_logic": "If Days_Since_Order > 7 AND Order_Value > 500, status should be 'VIP_Rush'. This overrides both 'Urgent' and 'Priority'.",
                "exception_logic": null
            }
        ],
        "total_rules": 3
    });

    let native = RuleClassifier {
        column: "Status".into(),
        default_category: "Normal".into(),
        rules: vec![
            CategoryRule {
                category: "Urgent".into(),
                when: vec![cmp("Days_Since_Order", Op::Gt, Operand::Number(7.0))],
                exception: None,
            },
            CategoryRule {
                category: "Priority".into(),
                when: vec![cmp("Order_Value", Op::Gt, Operand::Number(500.0))],
                exception: None,
            },
            CategoryRule {
                category: "VIP_Rush".into(),
                when: vec![
                    cmp("Days_Since_Order", Op::Gt, Operand::Number(7.0)),
                    cmp("Order_Value", Op::Gt, Operand::Number(500.0)),
                ],
                exception: None,
            },
        ],
    };

    Fixture {
        data,
        rules,
        expected: counts(&[
            ("Normal", 50),
            ("Urgent", 20),
            ("Priority", 15),
            ("VIP_Rush", 15),
        ]),
        native,
    }
}
