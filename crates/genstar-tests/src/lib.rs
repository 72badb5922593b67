//! Shared fixtures for the integration, property and statistical tests.

use std::sync::Arc;

use genstar_core::{
    AttributeId, AttributeSpec, Catalog, DataType, Matrix, PlainMatrix, SegmentedMatrix,
    SurveyKind,
};

/// Label of the explicit unknown bucket of the Age attribute.
pub const UNKNOWN_AGE: &str = "unknown";

/// Age groups over ages `0..100`: label and inclusive bounds.
pub const AGE_GROUPS: [(&str, u32, u32); 3] = [("0-18", 0, 18), ("19-65", 19, 65), ("66+", 66, 99)];

/// One-dimensional global frequency table over `attribute`.
pub fn frequency_table(
    catalog: &Arc<Catalog>,
    label: &str,
    attribute: AttributeId,
    cells: &[(&str, f64)],
) -> PlainMatrix<f64> {
    let name = catalog.name_of(attribute).to_string();
    let mut table =
        PlainMatrix::new(catalog.clone(), label, SurveyKind::GlobalFrequencyTable, [attribute])
            .unwrap();
    for (value, p) in cells {
        table
            .add(catalog.coordinate(&[(name.as_str(), *value)]).unwrap(), *p)
            .unwrap();
    }
    table
}

/// Age and Sex as two independent one-dimensional tables:
/// Age young/old = 0.6/0.4, Sex M/F = 0.5/0.5.
pub struct ScenarioA {
    pub catalog: Arc<Catalog>,
    pub age: AttributeId,
    pub sex: AttributeId,
    pub matrix: Matrix,
}

pub fn scenario_a() -> ScenarioA {
    let mut builder = Catalog::builder();
    let age = builder
        .add(AttributeSpec::unique("Age", DataType::String, ["young", "old"]))
        .unwrap();
    let sex = builder
        .add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"]))
        .unwrap();
    let catalog = builder.build();
    let ages = frequency_table(&catalog, "age", age, &[("young", 0.6), ("old", 0.4)]);
    let sexes = frequency_table(&catalog, "sex", sex, &[("M", 0.5), ("F", 0.5)]);
    let matrix = SegmentedMatrix::new("scenario-a", vec![ages, sexes])
        .unwrap()
        .into();
    ScenarioA {
        catalog,
        age,
        sex,
        matrix,
    }
}

/// Age `0..100` with an unknown bucket, AgeGroup aggregating it, and Sex.
pub struct ScenarioC {
    pub catalog: Arc<Catalog>,
    pub age: AttributeId,
    pub group: AttributeId,
    pub sex: AttributeId,
    pub matrix: Matrix,
    /// Share of the population in the unknown age bucket.
    pub unknown_share: f64,
}

/// Count weight of one age in the age table.
pub fn age_weight(age: u32) -> f64 {
    1.0 + (age % 7) as f64
}

/// Weight of the unknown age bucket.
pub const UNKNOWN_WEIGHT: f64 = 40.0;

pub fn age_catalog() -> (Arc<Catalog>, AttributeId, AttributeId, AttributeId) {
    let mut builder = Catalog::builder();
    let age = builder
        .add(
            AttributeSpec::unique("Age", DataType::Integer, (0..100).map(|a| a.to_string()))
                .with_empty_label(UNKNOWN_AGE),
        )
        .unwrap();
    let group = builder
        .add(AttributeSpec::aggregated(
            "AgeGroup",
            DataType::Integer,
            age,
            AGE_GROUPS.map(|(label, low, high)| {
                (label, (low..=high).map(|a| a.to_string()).collect::<Vec<_>>())
            }),
        ))
        .unwrap();
    let sex = builder
        .add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"]))
        .unwrap();
    (builder.build(), age, group, sex)
}

/// An Age count table (unknown bucket included) and an AgeGroup x Sex
/// frequency table whose group marginals agree with the known ages.
pub fn scenario_c() -> ScenarioC {
    let (catalog, age, group, sex) = age_catalog();

    let mut ages =
        PlainMatrix::new(catalog.clone(), "age", SurveyKind::ContingencyTable, [age]).unwrap();
    for a in 0..100u32 {
        let label = a.to_string();
        ages.add(
            catalog.coordinate(&[("Age", label.as_str())]).unwrap(),
            age_weight(a),
        )
        .unwrap();
    }
    ages.add(
        catalog.coordinate(&[("Age", UNKNOWN_AGE)]).unwrap(),
        UNKNOWN_WEIGHT,
    )
    .unwrap();

    let known: f64 = (0..100).map(age_weight).sum();
    let mut group_sex = PlainMatrix::new(
        catalog.clone(),
        "group-sex",
        SurveyKind::GlobalFrequencyTable,
        [group, sex],
    )
    .unwrap();
    for (label, low, high) in AGE_GROUPS {
        let share: f64 = (low..=high).map(age_weight).sum::<f64>() / known;
        for (s, ratio) in [("M", 0.48), ("F", 0.52)] {
            group_sex
                .add(
                    catalog
                        .coordinate(&[("AgeGroup", label), ("Sex", s)])
                        .unwrap(),
                    share * ratio,
                )
                .unwrap();
        }
    }

    let matrix = SegmentedMatrix::new("scenario-c", vec![group_sex, ages])
        .unwrap()
        .into();
    ScenarioC {
        catalog,
        age,
        group,
        sex,
        matrix,
        unknown_share: UNKNOWN_WEIGHT / (known + UNKNOWN_WEIGHT),
    }
}

/// Pearson chi-square statistic of `observed` counts against `expected`
/// probabilities over `n` draws.
pub fn chi_square(observed: &[usize], expected: &[f64], n: usize) -> f64 {
    observed
        .iter()
        .zip(expected)
        .map(|(o, p)| {
            let e = p * n as f64;
            (*o as f64 - e).powi(2) / e
        })
        .sum()
}
