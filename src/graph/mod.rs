//! Dependency graph construction and level computation.
//!
//! A recipe's normal steps form a directed acyclic graph over `depends_on`.
//! Building the graph validates every dependency reference and rejects
//! cycles (naming the offending path) before anything executes. The
//! scheduler consumes the graph as [`DependencyGraph::levels`]: waves of
//! steps whose dependencies all live in earlier waves, ordered within a
//! wave by declared index only.

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, Result};
use crate::recipe::Recipe;

/// Immutable view of the dependency relation between steps.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step name -> its direct dependencies.
    dependencies: HashMap<String, HashSet<String>>,
    /// Step name -> steps that depend on it.
    dependents: HashMap<String, HashSet<String>>,
    /// Step name -> declared index (in-level ordering tie-break).
    order: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Start building a graph.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::default()
    }

    /// Build the graph for a recipe's normal steps.
    ///
    /// `on_error` steps never enter the DAG; they form their own terminal
    /// level dispatched by the scheduler after a failure.
    pub fn from_recipe(recipe: &Recipe) -> Result<Self> {
        let mut builder = Self::builder();
        for step in recipe.normal_steps() {
            builder = builder.add_step(&step.name, step.index, step.depends_on.clone());
        }
        builder.build()
    }

    /// Direct dependencies of a step.
    pub fn dependencies_of(&self, step: &str) -> Option<&HashSet<String>> {
        self.dependencies.get(step)
    }

    /// Steps that depend directly on the given step.
    pub fn dependents_of(&self, step: &str) -> Option<&HashSet<String>> {
        self.dependents.get(step)
    }

    /// Whether a step exists in the graph.
    pub fn contains(&self, step: &str) -> bool {
        self.dependencies.contains_key(step)
    }

    /// Number of steps in the graph.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Steps grouped into dispatch waves (Kahn's algorithm).
    ///
    /// Level 0 holds every step with no dependencies; each later level
    /// holds the steps whose dependencies all completed in earlier levels.
    /// Within a level, steps are ordered by declared index. That order is
    /// a reporting tie-break, never an added dependency.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(step, deps)| (step.as_str(), deps.len()))
            .collect();

        let mut current: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&step, _)| step)
            .collect();

        let mut levels = Vec::new();
        while !current.is_empty() {
            current.sort_by_key(|step| self.order.get(*step).copied().unwrap_or(usize::MAX));

            let mut next = Vec::new();
            for &step in &current {
                if let Some(dependents) = self.dependents.get(step) {
                    for dependent in dependents {
                        let degree = in_degree
                            .get_mut(dependent.as_str())
                            .expect("dependent missing from in-degree table");
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }

            levels.push(current.iter().map(|s| s.to_string()).collect());
            current = next;
        }

        levels
    }

    /// Steps in an order consistent with a topological sort of `depends_on`.
    pub fn topological_order(&self) -> Vec<String> {
        self.levels().into_iter().flatten().collect()
    }

    /// Whether a step's dependencies are all in `completed`.
    pub fn is_satisfied(&self, step: &str, completed: &HashSet<String>) -> bool {
        self.dependencies
            .get(step)
            .map_or(true, |deps| deps.iter().all(|d| completed.contains(d)))
    }

    /// Find a dependency cycle, if one exists, as a closed path.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        fn visit<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::Grey);
            path.push(node);

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match marks.get(dep.as_str()).copied().unwrap_or(Mark::White) {
                        Mark::Grey => {
                            let start = path
                                .iter()
                                .position(|&s| s == dep.as_str())
                                .expect("grey node must be on the path");
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Mark::White => {
                            if let Some(cycle) = visit(dep, graph, marks, path) {
                                return Some(cycle);
                            }
                        }
                        Mark::Black => {}
                    }
                }
            }

            path.pop();
            marks.insert(node, Mark::Black);
            None
        }

        let mut marks: HashMap<&str, Mark> = self
            .dependencies
            .keys()
            .map(|s| (s.as_str(), Mark::White))
            .collect();
        let mut path = Vec::new();

        let mut roots: Vec<&str> = self.dependencies.keys().map(|s| s.as_str()).collect();
        roots.sort_by_key(|step| self.order.get(*step).copied().unwrap_or(usize::MAX));

        for root in roots {
            if marks.get(root) == Some(&Mark::White) {
                if let Some(cycle) = visit(root, self, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }
}

/// Builder for a [`DependencyGraph`].
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    steps: Vec<(String, usize, Vec<String>)>,
}

impl DependencyGraphBuilder {
    /// Add a step with its declared index and dependencies.
    pub fn add_step(
        mut self,
        name: impl Into<String>,
        index: usize,
        depends_on: Vec<String>,
    ) -> Self {
        self.steps.push((name.into(), index, depends_on));
        self
    }

    /// Build and validate the graph.
    ///
    /// Fails with [`EngineError::UnknownDependency`] when a dependency
    /// names an absent step, and [`EngineError::CyclicDependency`] when
    /// the relation is not acyclic.
    pub fn build(self) -> Result<DependencyGraph> {
        let mut dependencies: HashMap<String, HashSet<String>> = HashMap::new();
        let mut order = HashMap::new();

        for (name, index, deps) in &self.steps {
            dependencies
                .entry(name.clone())
                .or_default()
                .extend(deps.iter().cloned());
            order.insert(name.clone(), *index);
        }

        for (step, deps) in &dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(EngineError::UnknownDependency {
                        step: step.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut dependents: HashMap<String, HashSet<String>> = dependencies
            .keys()
            .map(|step| (step.clone(), HashSet::new()))
            .collect();
        for (step, deps) in &dependencies {
            for dep in deps {
                dependents
                    .get_mut(dep)
                    .expect("dependency validated above")
                    .insert(step.clone());
            }
        }

        let graph = DependencyGraph {
            dependencies,
            dependents,
            order,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(EngineError::CyclicDependency {
                cycle: cycle.join(" -> "),
            });
        }

        Ok(graph)
    }
}
