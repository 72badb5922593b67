//! # Attribute dependency graph
//!
//! Undirected graph over the dimensions of a (segmented) matrix:
//! - **co-membership edges** link attributes appearing in the same plain matrix
//! - **aggregation edges** link an attribute to its referent when both are dimensions
//!
//! Connected components are independent attribute clusters. Within each one,
//! the exploration order starts at a deterministic root and lists every
//! attribute after its referent, so referent values are allocated before the
//! aggregates that refer to them.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::model::attribute::AttributeId;
use crate::model::catalog::Catalog;
use crate::model::control::Control;
use crate::model::segmented::Matrix;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    catalog: Arc<Catalog>,
    adjacency: BTreeMap<AttributeId, BTreeSet<AttributeId>>,
    /// `(attribute, referent)` pairs, both nodes of the graph.
    aggregation: BTreeSet<(AttributeId, AttributeId)>,
    components: Vec<Vec<AttributeId>>,
}

impl DependencyGraph {
    /// Graph over the members of `matrix`.
    pub fn new<C: Control>(matrix: &Matrix<C>) -> Self {
        Self::from_dimension_sets(
            Arc::clone(matrix.catalog()),
            matrix.members().iter().map(|m| m.dimensions()),
        )
    }

    /// Graph over explicit dimension sets, one per plain matrix.
    pub fn from_dimension_sets<'a, I>(catalog: Arc<Catalog>, sets: I) -> Self
    where
        I: IntoIterator<Item = &'a [AttributeId]>,
    {
        let mut adjacency: BTreeMap<AttributeId, BTreeSet<AttributeId>> = BTreeMap::new();
        for set in sets {
            for &a in set {
                let neighbours = adjacency.entry(a).or_default();
                neighbours.extend(set.iter().copied().filter(|b| *b != a));
            }
        }

        let mut aggregation = BTreeSet::new();
        let nodes: Vec<AttributeId> = adjacency.keys().copied().collect();
        for &a in &nodes {
            let Some(attribute) = catalog.attribute(a) else {
                continue;
            };
            if attribute.is_record() {
                continue;
            }
            if let Some(referent) = attribute.referent().filter(|r| adjacency.contains_key(r)) {
                aggregation.insert((a, referent));
                adjacency.entry(a).or_default().insert(referent);
                adjacency.entry(referent).or_default().insert(a);
            }
        }

        let components = connected_components(&adjacency);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = adjacency.len(),
            aggregation_edges = aggregation.len(),
            components = components.len(),
            "built attribute dependency graph"
        );

        Self {
            catalog,
            adjacency,
            aggregation,
            components,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbours(&self, attribute: AttributeId) -> impl Iterator<Item = AttributeId> + '_ {
        self.adjacency
            .get(&attribute)
            .into_iter()
            .flat_map(|n| n.iter().copied())
    }

    pub fn has_edge(&self, a: AttributeId, b: AttributeId) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    /// Referent `attribute` depends on, when it is a node of this graph.
    pub fn depends_on(&self, attribute: AttributeId) -> Option<AttributeId> {
        self.aggregation
            .range((attribute, AttributeId(0))..=(attribute, AttributeId(u32::MAX)))
            .next()
            .map(|(_, referent)| *referent)
    }

    /// Components sorted by their smallest attribute; members in attribute order.
    pub fn components(&self) -> &[Vec<AttributeId>] {
        &self.components
    }

    pub fn component_of(&self, attribute: AttributeId) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.binary_search(&attribute).is_ok())
    }

    /// Root of a component: an attribute depending on no other member, with the
    /// largest domain, ties broken by name.
    pub fn root(&self, component: usize) -> Option<AttributeId> {
        let members = self.components.get(component)?;
        members
            .iter()
            .copied()
            .filter(|a| self.depends_on(*a).is_none())
            .min_by(|a, b| {
                let key = |id: AttributeId| {
                    let attribute = self.catalog.attribute(id);
                    (
                        Reverse(attribute.map_or(0, |x| x.cardinality())),
                        attribute.map_or("", |x| x.name()),
                    )
                };
                key(*a).cmp(&key(*b))
            })
    }

    /// Breadth-first order of a component from its root, every attribute
    /// listed after its referent.
    pub fn exploration_order(&self, component: usize) -> Vec<AttributeId> {
        let Some(root) = self.root(component) else {
            return Vec::new();
        };
        let mut order = Vec::new();
        let mut emitted = BTreeSet::new();
        let mut queue = VecDeque::new();
        self.emit(root, &mut order, &mut emitted, &mut queue);
        while let Some(node) = queue.pop_front() {
            for next in self.neighbours(node) {
                if !emitted.contains(&next) {
                    self.emit(next, &mut order, &mut emitted, &mut queue);
                }
            }
        }
        order
    }

    /// Exploration orders of all components, concatenated.
    pub fn full_exploration_order(&self) -> Vec<AttributeId> {
        (0..self.components.len())
            .flat_map(|c| self.exploration_order(c))
            .collect()
    }

    // Emits `attribute` preceded by its not yet emitted referent chain.
    fn emit(
        &self,
        attribute: AttributeId,
        order: &mut Vec<AttributeId>,
        emitted: &mut BTreeSet<AttributeId>,
        queue: &mut VecDeque<AttributeId>,
    ) {
        let mut chain = Vec::new();
        let mut current = attribute;
        while !emitted.contains(&current) && !chain.contains(&current) {
            chain.push(current);
            match self.depends_on(current) {
                Some(referent) => current = referent,
                None => break,
            }
        }
        for node in chain.into_iter().rev() {
            if emitted.insert(node) {
                order.push(node);
                queue.push_back(node);
            }
        }
    }

    /// Graphviz rendering; aggregation edges are dashed, roots boxed.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("graph dependencies {\n");
        let roots: BTreeSet<AttributeId> = (0..self.components.len())
            .filter_map(|c| self.root(c))
            .collect();
        for a in self.attributes() {
            let shape = if roots.contains(&a) { "box" } else { "ellipse" };
            out.push_str(&format!(
                "  \"{}\" [shape={}];\n",
                self.catalog.name_of(a),
                shape
            ));
        }
        for (&a, neighbours) in &self.adjacency {
            for &b in neighbours.range(a..).filter(|b| **b != a) {
                let dashed =
                    self.aggregation.contains(&(a, b)) || self.aggregation.contains(&(b, a));
                out.push_str(&format!(
                    "  \"{}\" -- \"{}\"{};\n",
                    self.catalog.name_of(a),
                    self.catalog.name_of(b),
                    if dashed { " [style=dashed]" } else { "" }
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn connected_components(
    adjacency: &BTreeMap<AttributeId, BTreeSet<AttributeId>>,
) -> Vec<Vec<AttributeId>> {
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();
    for &start in adjacency.keys() {
        if !seen.insert(start) {
            continue;
        }
        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in adjacency.get(&node).into_iter().flatten() {
                if seen.insert(next) {
                    component.push(next);
                    queue.push_back(next);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::DataType;
    use crate::model::catalog::AttributeSpec;

    struct Ids {
        age: AttributeId,
        group: AttributeId,
        sex: AttributeId,
        income: AttributeId,
        region: AttributeId,
    }

    fn catalog() -> (Arc<Catalog>, Ids) {
        let mut b = Catalog::builder();
        let age = b
            .add(AttributeSpec::unique("Age", DataType::Integer, ["10", "30", "70"]))
            .unwrap();
        let group = b
            .add(AttributeSpec::aggregated(
                "AgeGroup",
                DataType::Integer,
                age,
                [("0-18", vec!["10"]), ("19+", vec!["30", "70"])],
            ))
            .unwrap();
        let sex = b
            .add(AttributeSpec::unique("Sex", DataType::String, ["M", "F"]))
            .unwrap();
        let income = b
            .add(AttributeSpec::unique("Income", DataType::String, ["low", "mid", "high", "top"]))
            .unwrap();
        let region = b
            .add(AttributeSpec::unique("Region", DataType::String, ["north", "south"]))
            .unwrap();
        (
            b.build(),
            Ids {
                age,
                group,
                sex,
                income,
                region,
            },
        )
    }

    #[test]
    fn components_partition_the_attributes() {
        let (cat, ids) = catalog();
        let graph = DependencyGraph::from_dimension_sets(
            cat,
            [
                &[ids.age][..],
                &[ids.group, ids.sex][..],
                &[ids.income, ids.region][..],
            ],
        );
        assert_eq!(graph.components().len(), 2);
        assert_eq!(graph.component_of(ids.sex), graph.component_of(ids.age));
        assert_ne!(graph.component_of(ids.income), graph.component_of(ids.age));
        assert!(graph.has_edge(ids.group, ids.age));
        assert_eq!(graph.depends_on(ids.group), Some(ids.age));
        assert_eq!(graph.depends_on(ids.age), None);
    }

    #[test]
    fn root_is_largest_independent_attribute() {
        let (cat, ids) = catalog();
        let graph = DependencyGraph::from_dimension_sets(
            cat,
            [&[ids.age][..], &[ids.group, ids.sex][..]],
        );
        let c = graph.component_of(ids.age).unwrap();
        assert_eq!(graph.root(c), Some(ids.age));
        assert_eq!(graph.exploration_order(c), vec![ids.age, ids.group, ids.sex]);
    }

    #[test]
    fn referent_chain_precedes_aggregate_even_from_another_root() {
        let (cat, ids) = catalog();
        // Income has the largest domain and becomes root; AgeGroup is reached
        // through it before Age is.
        let graph = DependencyGraph::from_dimension_sets(
            cat,
            [&[ids.income, ids.group][..], &[ids.age][..]],
        );
        let c = graph.component_of(ids.age).unwrap();
        assert_eq!(graph.root(c), Some(ids.income));
        let order = graph.exploration_order(c);
        let pos = |a: AttributeId| order.iter().position(|x| *x == a).unwrap();
        assert!(pos(ids.age) < pos(ids.group));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn root_ties_break_on_name() {
        let (cat, ids) = catalog();
        let graph = DependencyGraph::from_dimension_sets(cat, [&[ids.sex, ids.region][..]]);
        assert_eq!(graph.root(0), Some(ids.region));
    }

    #[test]
    fn dot_export_marks_aggregation_edges() {
        let (cat, ids) = catalog();
        let graph = DependencyGraph::from_dimension_sets(
            cat,
            [&[ids.age][..], &[ids.group, ids.sex][..]],
        );
        let dot = graph.to_dot();
        assert!(dot.starts_with("graph dependencies {"));
        assert!(dot.contains("\"Age\" -- \"AgeGroup\" [style=dashed];"));
        assert!(dot.contains("\"AgeGroup\" -- \"Sex\";"));
        assert!(dot.contains("\"Age\" [shape=box];"));
    }
}
