//! End-to-end inference scenarios.

use genstar_core::{
    infer_distribution_sampler, infer_distribution_with_diagnostics, AttributeSpec, Catalog,
    Coordinate, DataType, DistributionSampler, GenstarError, InferenceConfig, InferenceStrategy,
    RecordingObserver, Sampler, SamplerConfig, StepKind,
};
use genstar_tests::{age_weight, scenario_a, scenario_c, UNKNOWN_WEIGHT};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn scenario_a_independent_margins_multiply() {
    let s = scenario_a();
    let sampler =
        infer_distribution_sampler(&s.matrix, InferenceStrategy::IndependenceHypothesis).unwrap();
    assert_eq!(sampler.len(), 4);
    for (age, sex, expected) in [
        ("young", "M", 0.30),
        ("young", "F", 0.30),
        ("old", "M", 0.20),
        ("old", "F", 0.20),
    ] {
        let profile = s.catalog.coordinate(&[("Age", age), ("Sex", sex)]).unwrap();
        let p = sampler.probability(&profile).unwrap();
        assert!((p - expected).abs() < 1e-12, "{age} {sex}: {p}");
    }
    assert_eq!(sampler.dimensions(), &[s.age, s.sex]);
}

fn scenario_b_sampler() -> (DistributionSampler, Coordinate, Coordinate) {
    let mut builder = Catalog::builder();
    let x = builder
        .add(AttributeSpec::unique("X", DataType::String, ["a", "b"]))
        .unwrap();
    let catalog = builder.build();
    let a = catalog.coordinate(&[("X", "a")]).unwrap();
    let b = catalog.coordinate(&[("X", "b")]).unwrap();
    let sampler = DistributionSampler::from_pairs(
        catalog,
        [x],
        [(a.clone(), 0.5), (b.clone(), 0.499)],
        SamplerConfig::default(),
    )
    .unwrap();
    (sampler, a, b)
}

#[test]
fn scenario_b_upper_bound_clamps_to_sum() {
    let (sampler, a, b) = scenario_b_sampler();
    assert!((sampler.upper_bound() - 0.999).abs() < 1e-12);

    let draws = sampler.draw_n(20_000, &mut StdRng::seed_from_u64(5)).unwrap();
    let b_count = draws.iter().filter(|d| **d == b).count();
    assert_eq!(draws.iter().filter(|d| **d == a).count() + b_count, draws.len());
    // b keeps its own share: the residual range is never mapped onto it
    let share = b_count as f64 / draws.len() as f64;
    assert!((share - 0.499 / 0.999).abs() < 0.02, "share of b: {share}");
}

#[test]
fn sum_far_from_one_is_a_configuration_error() {
    let mut builder = Catalog::builder();
    let x = builder
        .add(AttributeSpec::unique("X", DataType::String, ["a", "b"]))
        .unwrap();
    let catalog = builder.build();
    let a = catalog.coordinate(&[("X", "a")]).unwrap();
    let b = catalog.coordinate(&[("X", "b")]).unwrap();
    let err = DistributionSampler::from_pairs(catalog, [x], [(a, 0.5), (b, 0.4)], SamplerConfig::default())
        .unwrap_err();
    assert!(matches!(err, GenstarError::SamplerConfiguration { sum } if (sum - 0.9).abs() < 1e-12));
}

#[test]
fn scenario_b_csv_lists_every_indexed_profile() {
    let (sampler, _, _) = scenario_b_sampler();
    let csv = sampler.to_csv(",");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "X,Probability");
    assert_eq!(lines.len(), 3);
    assert!(lines[1..].iter().any(|l| l.starts_with("a,")));
}

#[test]
fn scenario_c_extends_every_profile_with_one_age() {
    let s = scenario_c();
    let mut observer = RecordingObserver::default();
    let (sampler, diagnostics) = infer_distribution_with_diagnostics(
        &s.matrix,
        InferenceStrategy::Hierarchical,
        &InferenceConfig::default(),
        &mut observer,
    )
    .unwrap();

    assert_eq!(observer.started, vec!["age", "group-sex"]);
    assert_eq!(diagnostics.steps[1].kind, StepKind::Aggregated);
    assert_eq!(diagnostics.steps[1].untargeted, 1);
    assert!(diagnostics.dropped_mass().abs() < 1e-9);
    assert_eq!(diagnostics.exploration_order.first(), Some(&s.age));

    let mut total = 0.0;
    let mut unknown = 0.0;
    for (profile, p) in sampler.iter() {
        total += p;
        let age = profile.value_of(s.age).unwrap();
        let group = profile.value_of(s.group).unwrap();
        assert!(profile.has_attribute(s.sex));
        if age.is_empty() {
            unknown += p;
            assert!(group.is_empty());
        } else {
            assert!(s.catalog.map_to_referent(group).contains(&age));
        }
    }
    assert!((total - 1.0).abs() < 1e-9);
    assert!((unknown - s.unknown_share).abs() < 1e-9);
}

#[test]
fn scenario_c_conserves_mass_of_each_age() {
    let s = scenario_c();
    let sampler = infer_distribution_sampler(&s.matrix, InferenceStrategy::Hierarchical).unwrap();
    let known: f64 = (0..100).map(age_weight).sum();
    for a in 0..100u32 {
        let value = s.catalog.find_value(s.age, &a.to_string()).unwrap();
        let mass: f64 = sampler
            .iter()
            .filter(|(c, _)| c.contains(value))
            .map(|(_, p)| p)
            .sum();
        let expected = age_weight(a) / (known + UNKNOWN_WEIGHT);
        assert!((mass - expected).abs() < 1e-9, "age {a}: {mass} vs {expected}");
    }
}

#[test]
fn independence_ignores_referent_links() {
    let s = scenario_c();
    let sampler =
        infer_distribution_sampler(&s.matrix, InferenceStrategy::IndependenceHypothesis).unwrap();
    let inconsistent = sampler
        .iter()
        .filter(|(c, _)| {
            let age = c.value_of(s.age).unwrap();
            let group = c.value_of(s.group).unwrap();
            !age.is_empty() && !s.catalog.map_to_referent(group).contains(&age)
        })
        .count();
    assert!(inconsistent > 0);
}

#[test]
fn draws_stay_in_the_inferred_support() {
    let s = scenario_c();
    let sampler = infer_distribution_sampler(&s.matrix, InferenceStrategy::Hierarchical).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    for drawn in sampler.draw_n(5_000, &mut rng).unwrap() {
        assert!(sampler.contains(&drawn));
        assert_eq!(drawn.len(), 3);
    }
}
