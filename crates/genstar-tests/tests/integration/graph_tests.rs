//! Dependency graph built from real matrices.

use genstar_core::{DependencyGraph, HierarchicalHypothesis};
use genstar_tests::{scenario_a, scenario_c};

#[test]
fn aggregation_joins_referent_and_aggregate() {
    let s = scenario_c();
    let graph = DependencyGraph::new(&s.matrix);
    assert_eq!(graph.components().len(), 1);
    assert!(graph.has_edge(s.age, s.group));
    assert!(graph.has_edge(s.group, s.sex));
    assert!(!graph.has_edge(s.age, s.sex));
    assert_eq!(graph.depends_on(s.group), Some(s.age));
    assert_eq!(graph.root(0), Some(s.age));
    assert_eq!(graph.exploration_order(0), vec![s.age, s.group, s.sex]);
}

#[test]
fn independent_tables_form_separate_components() {
    let s = scenario_a();
    let graph = DependencyGraph::new(&s.matrix);
    assert_eq!(graph.components().len(), 2);
    assert_ne!(graph.component_of(s.age), graph.component_of(s.sex));
    assert_eq!(
        HierarchicalHypothesis.exploration_order(&s.matrix),
        vec![s.age, s.sex]
    );
}

#[test]
fn dot_export_marks_roots_and_aggregation() {
    let s = scenario_c();
    let dot = DependencyGraph::new(&s.matrix).to_dot();
    assert!(dot.starts_with("graph dependencies {"));
    assert!(dot.contains("\"Age\" [shape=box];"));
    assert!(dot.contains("\"AgeGroup\" [shape=ellipse];"));
    assert!(dot.contains("\"Age\" -- \"AgeGroup\" [style=dashed];"));
    assert!(dot.contains("\"AgeGroup\" -- \"Sex\";"));
}
