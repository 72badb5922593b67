//! Property tests for inference, sampling and dependency ordering invariants.

use std::sync::Arc;

use genstar_core::{
    AttributeId, AttributeSpec, Catalog, Coordinate, DataType, DependencyGraph,
    DistributionSampler, HierarchicalHypothesis, IndependenceHypothesis, InferenceConfig,
    Matrix, NoopObserver, PlainMatrix, Sampler, SamplerConfig, SegmentedMatrix, SurveyKind,
    ValueId,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn labels(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

fn count_table(catalog: &Arc<Catalog>, attribute: AttributeId, weights: &[f64]) -> PlainMatrix<f64> {
    let mut table = PlainMatrix::new(
        catalog.clone(),
        catalog.name_of(attribute).to_string(),
        SurveyKind::ContingencyTable,
        [attribute],
    )
    .unwrap();
    for (value, w) in catalog.values_of(attribute).zip(weights) {
        table.add(Coordinate::new([value]).unwrap(), *w).unwrap();
    }
    table
}

fn cell_table(
    catalog: &Arc<Catalog>,
    label: &str,
    dimensions: &[AttributeId],
    cells: impl IntoIterator<Item = (Coordinate, f64)>,
) -> PlainMatrix<f64> {
    let mut table = PlainMatrix::new(
        catalog.clone(),
        label,
        SurveyKind::ContingencyTable,
        dimensions.iter().copied(),
    )
    .unwrap();
    for (coordinate, w) in cells {
        if w > 0.0 {
            table.add(coordinate, w).unwrap();
        }
    }
    table
}

fn weight() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0f64), 0.1f64..5.0]
}

proptest! {
    #[test]
    fn partial_aggregate_tables_keep_total_mass(
        ages in 3usize..8,
        age_sex in prop::collection::vec(weight(), 16),
        group_sex in prop::collection::vec(weight(), 8),
    ) {
        let age_sex = &age_sex[..ages * 2];
        prop_assume!(age_sex.iter().sum::<f64>() > 0.0);
        prop_assume!(group_sex.iter().sum::<f64>() > 0.0);

        let age_labels = labels("a", ages);
        let mut builder = Catalog::builder();
        let age = builder.add(AttributeSpec::unique("Age", DataType::String, age_labels.clone())).unwrap();
        let mapping: Vec<(String, Vec<String>)> = (0..3)
            .map(|g| {
                let members = age_labels.iter().skip(g).step_by(3).cloned().collect();
                (format!("g{g}"), members)
            })
            .collect();
        let group = builder.add(AttributeSpec::aggregated("AgeGroup", DataType::String, age, mapping)).unwrap();
        let sex = builder.add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"])).unwrap();
        let catalog = builder.build();

        let sexes: Vec<ValueId> = catalog.values_of(sex).collect();
        let age_cells = catalog
            .values_of(age)
            .flat_map(|a| sexes.iter().map(move |s| Coordinate::new([a, *s]).unwrap()))
            .zip(age_sex.iter().copied());
        // the empty group takes part alongside the substantive ones
        let group_cells = std::iter::once(ValueId::empty(group))
            .chain(catalog.values_of(group))
            .flat_map(|g| sexes.iter().map(move |s| Coordinate::new([g, *s]).unwrap()))
            .zip(group_sex.iter().copied());

        let matrix: Matrix = SegmentedMatrix::new(
            "partial",
            vec![
                cell_table(&catalog, "group-sex", &[group, sex], group_cells),
                cell_table(&catalog, "age-sex", &[age, sex], age_cells),
            ],
        )
        .unwrap()
        .into();

        let (dist, diagnostics) = HierarchicalHypothesis
            .infer(&matrix, &InferenceConfig::default(), &mut NoopObserver)
            .unwrap();
        prop_assert!((diagnostics.total_mass - 1.0).abs() < 1e-9);
        for step in &diagnostics.steps {
            prop_assert!(step.dropped_mass().abs() < 1e-9);
        }
        for (profile, _) in dist.iter() {
            let g = profile.value_of(group).unwrap();
            let a = profile.value_of(age).unwrap();
            if !g.is_empty() {
                prop_assert!(catalog.map_to_referent(g).contains(&a));
            }
        }
    }

    #[test]
    fn disjoint_tables_follow_the_product_rule(
        xs in prop::collection::vec(0.01f64..10.0, 1..6),
        ys in prop::collection::vec(0.01f64..10.0, 1..6),
    ) {
        let mut builder = Catalog::builder();
        let x = builder.add(AttributeSpec::unique("X", DataType::String, labels("x", xs.len()))).unwrap();
        let y = builder.add(AttributeSpec::unique("Y", DataType::String, labels("y", ys.len()))).unwrap();
        let catalog = builder.build();
        let matrix: Matrix = SegmentedMatrix::new(
            "xy",
            vec![count_table(&catalog, x, &xs), count_table(&catalog, y, &ys)],
        )
        .unwrap()
        .into();

        let (dist, _) = IndependenceHypothesis
            .infer(&matrix, &InferenceConfig::default(), &mut NoopObserver)
            .unwrap();
        prop_assert_eq!(dist.len(), xs.len() * ys.len());

        let (sx, sy): (f64, f64) = (xs.iter().sum(), ys.iter().sum());
        for (i, vx) in catalog.values_of(x).enumerate() {
            for (j, vy) in catalog.values_of(y).enumerate() {
                let expected = xs[i] / sx * ys[j] / sy;
                let p = dist.get(&Coordinate::new([vx, vy]).unwrap()).unwrap();
                prop_assert!((p - expected).abs() <= 1e-12 * expected.max(1.0));
            }
        }
    }

    #[test]
    fn draws_never_leave_the_support(
        weights in prop::collection::vec(prop_oneof![Just(0.0f64), 0.1f64..5.0], 1..8),
        seed in any::<u64>(),
    ) {
        let sum: f64 = weights.iter().sum();
        prop_assume!(sum > 0.0);
        let mut builder = Catalog::builder();
        let x = builder.add(AttributeSpec::unique("X", DataType::String, labels("x", weights.len()))).unwrap();
        let catalog = builder.build();
        let pairs: Vec<(Coordinate, f64)> = catalog
            .values_of(x)
            .zip(&weights)
            .map(|(v, w)| (Coordinate::new([v]).unwrap(), w / sum))
            .collect();
        let sampler = DistributionSampler::from_pairs(catalog.clone(), [x], pairs.clone(), SamplerConfig::default()).unwrap();

        let mut rng = StdRng::seed_from_u64(seed);
        for drawn in sampler.draw_n(200, &mut rng).unwrap() {
            prop_assert!(sampler.contains(&drawn));
            let weight = pairs.iter().find(|(c, _)| *c == drawn).map(|(_, p)| *p);
            prop_assert!(weight.is_some_and(|p| p > 0.0));
        }
    }

    #[test]
    fn exploration_lists_referents_first(
        links in prop::collection::vec((any::<bool>(), any::<u8>()), 1..7),
        sets in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..4), 1..5),
    ) {
        let mut builder = Catalog::builder();
        let mut ids = vec![builder.add(AttributeSpec::unique("A0", DataType::String, ["a", "b"])).unwrap()];
        for (i, (linked, target)) in links.iter().enumerate() {
            let mut spec = AttributeSpec::unique(format!("A{}", i + 1), DataType::String, ["a", "b", "c"]);
            if *linked {
                spec = spec.with_referent(ids[*target as usize % ids.len()]);
            }
            ids.push(builder.add(spec).unwrap());
        }
        let catalog = builder.build();
        let sets: Vec<Vec<AttributeId>> = sets
            .iter()
            .map(|s| s.iter().map(|k| ids[*k as usize % ids.len()]).collect())
            .collect();

        let graph = DependencyGraph::from_dimension_sets(catalog.clone(), sets.iter().map(|s| s.as_slice()));
        let nodes: Vec<AttributeId> = graph.attributes().collect();
        for node in &nodes {
            let owners = graph.components().iter().filter(|c| c.contains(node)).count();
            prop_assert_eq!(owners, 1);
        }

        for (c, members) in graph.components().iter().enumerate() {
            let order = graph.exploration_order(c);
            let mut sorted = order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(&sorted, members);
            for (position, attribute) in order.iter().enumerate() {
                if let Some(referent) = graph.depends_on(*attribute) {
                    let before = order.iter().position(|a| *a == referent).unwrap();
                    prop_assert!(before < position);
                }
            }
        }

        let again = DependencyGraph::from_dimension_sets(catalog, sets.iter().map(|s| s.as_slice()));
        prop_assert_eq!(graph.full_exploration_order(), again.full_exploration_order());
    }

    #[test]
    fn coordinates_are_canonical(slots in prop::collection::btree_map(0u32..12, 0u32..5, 1..8)) {
        let values: Vec<ValueId> = slots
            .iter()
            .map(|(a, i)| ValueId { attribute: AttributeId(*a), index: *i })
            .collect();
        let forward = Coordinate::new(values.iter().copied()).unwrap();
        let backward = Coordinate::new(values.iter().rev().copied()).unwrap();
        prop_assert_eq!(forward.values(), backward.values());
        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(forward.len(), slots.len());
    }
}
