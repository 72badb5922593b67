//! Marginal extraction against seeds of different granularity.

use std::sync::Arc;

use genstar_core::{
    build_compliant_marginals, AttributeId, Catalog, GenstarError, Margin, MarginConfig,
    MarginalsProcessor, Matrix, PlainMatrix, SegmentedMatrix, SurveyKind,
};
use genstar_tests::{age_catalog, age_weight, frequency_table, AGE_GROUPS};

/// Age counts (no unknown bucket) and a uniform AgeGroup x Sex table.
fn known_age_control() -> (Arc<Catalog>, AttributeId, AttributeId, AttributeId, Matrix) {
    let (catalog, age, group, sex) = age_catalog();
    let mut ages =
        PlainMatrix::new(catalog.clone(), "age", SurveyKind::ContingencyTable, [age]).unwrap();
    for a in 0..100u32 {
        let label = a.to_string();
        ages.add(catalog.coordinate(&[("Age", label.as_str())]).unwrap(), age_weight(a))
            .unwrap();
    }
    let mut group_sex = PlainMatrix::new(
        catalog.clone(),
        "group-sex",
        SurveyKind::GlobalFrequencyTable,
        [group, sex],
    )
    .unwrap();
    for (label, _, _) in AGE_GROUPS {
        for s in ["M", "F"] {
            group_sex
                .add(catalog.coordinate(&[("AgeGroup", label), ("Sex", s)]).unwrap(), 1.0 / 6.0)
                .unwrap();
        }
    }
    let matrix = SegmentedMatrix::new("control", vec![group_sex, ages])
        .unwrap()
        .into();
    (catalog, age, group, sex, matrix)
}

#[test]
fn segmented_control_against_group_seed() {
    let (catalog, age, group, sex, control) = known_age_control();
    let mut seed =
        PlainMatrix::<f64>::new(catalog.clone(), "seed", SurveyKind::ContingencyTable, [group, sex])
            .unwrap();
    seed.add(catalog.coordinate(&[("AgeGroup", "19-65"), ("Sex", "F")]).unwrap(), 12.0)
        .unwrap();

    let margins = build_compliant_marginals(&control, &seed, false).unwrap();
    // Age and Sex are the root control attributes
    assert_eq!(margins.len(), 2);
    let age_margin = margins
        .iter()
        .find(|m| m.control_dimension() == age)
        .unwrap();
    assert!(matches!(age_margin, Margin::Complex { .. }));
    assert_eq!(age_margin.seed_dimension(), group);
    assert!((age_margin.total() - 1.0).abs() < 1e-9);
    for entry in age_margin.entries() {
        assert!(entry
            .seed_descriptor
            .iter()
            .all(|v| v.attribute == group || v.attribute == sex));
    }
    let sex_margin = margins
        .iter()
        .find(|m| m.control_dimension() == sex)
        .unwrap();
    assert!(sex_margin.is_simple());
}

#[test]
fn processor_tolerance_is_configurable() {
    let (catalog, _, _, sex) = age_catalog();
    let control: Matrix = frequency_table(&catalog, "sex", sex, &[("M", 0.45), ("F", 0.5)]).into();
    let seed = frequency_table(&catalog, "seed", sex, &[("M", 1.0)]);

    let strict = MarginalsProcessor::new(MarginConfig {
        tolerance: 0.01,
        parallel: false,
    })
    .unwrap();
    assert!(matches!(
        strict.build_compliant_marginals(&control, &seed),
        Err(GenstarError::MarginConsistency { .. })
    ));

    let lenient = MarginalsProcessor::new(MarginConfig {
        tolerance: 0.1,
        parallel: false,
    })
    .unwrap();
    let margins = lenient.build_compliant_marginals(&control, &seed).unwrap();
    assert_eq!(margins.len(), 1);
    assert!(margins[0].is_simple());
}
