//! Property tests for the grouping invariants.

mod support;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use proptest::prelude::*;
use ringfinder::rules::{
    BlockingSpec, CompoundPredicate, FuzzySpec, KeyColumn, SimilarityClause, TemporalSpec,
};
use ringfinder::similarity::SimilarityMetric;
use ringfinder::{ClusteringStrategy, Rule, RuleEngine, Table, Value};
use support::flagged;

fn phone_rule(threshold: usize) -> Rule {
    Rule::exact_key("phone", vec![KeyColumn::verbatim("phone")]).with_threshold(threshold)
}

fn phone_table(rows: &[(u8, u8)]) -> Table {
    Table::with_rows(
        ["phone", "buyer_id"],
        rows.iter()
            .map(|(phone, buyer)| vec![Value::text(format!("p{phone}")), Value::text(format!("b{buyer}"))])
            .collect(),
    )
    .unwrap()
}

fn burst_rule(threshold: usize) -> Rule {
    Rule::temporal_window(
        "burst",
        TemporalSpec {
            partition: KeyColumn::verbatim("ip"),
            time_columns: vec!["t".to_string()],
            window_secs: 600,
            anchor: Default::default(),
            advance: Default::default(),
        },
    )
    .with_threshold(threshold)
}

fn burst_table(rows: &[(u8, i64, u8)]) -> Table {
    Table::with_rows(
        ["ip", "t", "buyer_id"],
        rows.iter()
            .map(|(ip, t, buyer)| {
                vec![
                    Value::text(format!("ip{ip}")),
                    Value::Timestamp(*t),
                    Value::text(format!("b{buyer}")),
                ]
            })
            .collect(),
    )
    .unwrap()
}

fn address_rule(strategy: ClusteringStrategy) -> Rule {
    Rule::fuzzy_cluster(
        "address",
        FuzzySpec {
            name_column: None,
            address_column: "address".to_string(),
            value_column: None,
            blocking: BlockingSpec {
                name_words: 0,
                address_words: 0,
                include_value: false,
            },
            predicate: CompoundPredicate {
                name: None,
                address: SimilarityClause::new(SimilarityMetric::Ratio, 70),
                exact_address_shortcut: true,
                value: None,
            },
            strategy,
        },
    )
    .with_threshold(2)
}

fn address_strategy() -> impl Strategy<Value = Vec<(String, u8)>> {
    prop::collection::vec(("[ab]{3,5}", 0u8..6), 0..24)
}

fn phone_rows() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0u8..4, 0u8..8), 0..40)
}

proptest! {
    #[test]
    fn exact_key_flags_exactly_the_qualifying_partitions(rows in phone_rows(), threshold in 1usize..5) {
        let mut buyers: BTreeMap<u8, BTreeSet<String>> = BTreeMap::new();
        for (phone, buyer) in &rows {
            buyers.entry(*phone).or_default().insert(format!("b{buyer}"));
        }
        let expected: BTreeSet<String> = buyers
            .values()
            .filter(|set| set.len() >= threshold)
            .flat_map(|set| set.iter().cloned())
            .collect();

        let evaluation = RuleEngine::default().evaluate(&phone_rule(threshold), &phone_table(&rows));
        let got: BTreeSet<String> = flagged(&evaluation).into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn exact_key_is_idempotent_and_order_independent(rows in phone_rows()) {
        let engine = RuleEngine::default();
        let rule = phone_rule(3);
        let first = flagged(&engine.evaluate(&rule, &phone_table(&rows)));
        let second = flagged(&engine.evaluate(&rule, &phone_table(&rows)));
        let reversed: Vec<_> = rows.iter().rev().copied().collect();
        let third = flagged(&engine.evaluate(&rule, &phone_table(&reversed)));
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &third);
    }

    #[test]
    fn raising_the_threshold_never_grows_the_result(
        rows in phone_rows(),
        bursts in prop::collection::vec((0u8..3, 0i64..3_600, 0u8..8), 0..40),
        threshold in 1usize..5,
    ) {
        let engine = RuleEngine::default();
        let table = phone_table(&rows);
        let lower: HashSet<String> = flagged(&engine.evaluate(&phone_rule(threshold), &table)).into_iter().collect();
        let higher: HashSet<String> = flagged(&engine.evaluate(&phone_rule(threshold + 1), &table)).into_iter().collect();
        prop_assert!(higher.is_subset(&lower));

        let table = burst_table(&bursts);
        let lower: HashSet<String> = flagged(&engine.evaluate(&burst_rule(threshold), &table)).into_iter().collect();
        let higher: HashSet<String> = flagged(&engine.evaluate(&burst_rule(threshold + 1), &table)).into_iter().collect();
        prop_assert!(higher.is_subset(&lower));
    }

    #[test]
    fn flagged_bursts_fit_one_window(
        bursts in prop::collection::vec((0u8..3, 0i64..3_600, 0u8..8), 0..40),
        threshold in 1usize..4,
    ) {
        let table = burst_table(&bursts);
        let evaluation = RuleEngine::default().evaluate(&burst_rule(threshold), &table);
        let t = table.column("t").unwrap();
        for cluster in &evaluation.clusters {
            prop_assert!(cluster.distinct_count() >= threshold);
            let times: Vec<i64> = cluster
                .records
                .iter()
                .map(|id| table.value(*id, t).as_instant().unwrap())
                .collect();
            let anchor = times[0];
            prop_assert!(times.iter().all(|time| *time >= anchor && time - anchor <= 600));
        }
    }

    #[test]
    fn star_clusters_never_share_a_record(rows in address_strategy()) {
        let table = Table::with_rows(
            ["address", "buyer_id"],
            rows.iter()
                .map(|(address, buyer)| vec![Value::text(address.clone()), Value::text(format!("b{buyer}"))])
                .collect(),
        )
        .unwrap();
        for strategy in [ClusteringStrategy::Star, ClusteringStrategy::ConnectedComponents] {
            let evaluation = RuleEngine::default().evaluate(&address_rule(strategy), &table);
            let mut seen = HashSet::new();
            for cluster in &evaluation.clusters {
                for id in &cluster.records {
                    prop_assert!(seen.insert(*id), "record {} absorbed twice", id);
                }
            }
        }
    }
}
