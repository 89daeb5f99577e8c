//! The probe registry: every capability fact a manifest can carry, plus
//! the conflict groups, derivation rules and invariants that relate them.
//!
//! A registry is immutable once built. Construction validates every
//! cross-reference and rejects cyclic derivations, so the resolver can
//! evaluate rules in a single topological pass.

pub mod catalog;
pub mod rules;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use miette::Diagnostic as MietteDiagnostic;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::core::fact::{FactKind, FactSpec};
use crate::util::diagnostic::Diagnostic;

pub use catalog::Catalog;
pub use rules::{
    CompareOp, Comparison, ConflictGroup, DerivationRule, Invariant, InvariantKind, Operand,
    RuleKind, TargetProperty,
};

/// Catalog shipped with the binary.
const BUILTIN_CATALOG: &str = include_str!("catalog.toml");

static BUILTIN: LazyLock<Result<ProbeRegistry, RegistryError>> =
    LazyLock::new(|| ProbeRegistry::from_toml_str(BUILTIN_CATALOG));

/// Errors raised while building or querying a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum RegistryError {
    #[error("failed to read catalog {path}: {message}")]
    #[diagnostic(code(capgen::registry::io))]
    Io { path: String, message: String },

    #[error("invalid catalog: {0}")]
    #[diagnostic(code(capgen::registry::parse))]
    Parse(String),

    #[error("catalog schema {found} is not supported (expected {supported})")]
    #[diagnostic(
        code(capgen::registry::schema),
        help("Regenerate the catalog against this version of capgen")
    )]
    UnsupportedSchema { found: String, supported: String },

    #[error("unknown fact `{name}`")]
    #[diagnostic(code(capgen::registry::unknown_fact))]
    UnknownFact { name: String },

    #[error("fact `{name}` is declared more than once")]
    #[diagnostic(code(capgen::registry::duplicate_fact))]
    DuplicateFact { name: String },

    #[error("{context} references unknown fact `{name}`")]
    #[diagnostic(code(capgen::registry::unknown_reference))]
    UnknownReference { context: String, name: String },

    #[error("{context}: `{name}` is {found}, expected {expected}")]
    #[diagnostic(code(capgen::registry::kind_mismatch))]
    KindMismatch {
        context: String,
        name: String,
        expected: FactKind,
        found: FactKind,
    },

    #[error("conflict group `{group}` must have at least two distinct members")]
    #[diagnostic(code(capgen::registry::conflict_group))]
    DegenerateConflictGroup { group: String },

    #[error("conflict group `{group}` member `{name}` is a derived fact")]
    #[diagnostic(code(capgen::registry::derived_member))]
    DerivedConflictMember { group: String, name: String },

    #[error("conflict group `{group}` has cyclic precedence through `{member}`")]
    #[diagnostic(code(capgen::registry::cyclic_precedence))]
    CyclicPrecedence { group: String, member: String },

    #[error("rule output `{name}` is not a derived fact")]
    #[diagnostic(
        code(capgen::registry::not_derived),
        help("Only facts in the `derived` category may be produced by a rule")
    )]
    NotDerived { name: String },

    #[error("derived fact `{name}` has more than one rule")]
    #[diagnostic(code(capgen::registry::duplicate_rule))]
    DuplicateRule { name: String },

    #[error("derived fact `{name}` has no rule")]
    #[diagnostic(code(capgen::registry::missing_rule))]
    MissingRule { name: String },

    #[error("cyclic derivation: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(capgen::registry::cyclic_derivation),
        help("Break the cycle by making one of these facts a probe")
    )]
    CyclicDerivation { cycle: Vec<String> },
}

impl RegistryError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            RegistryError::UnknownFact { name } => {
                diag.with_subject(name.clone())
                    .with_suggestion("Run `capgen registry` to list known facts")
            }
            RegistryError::CyclicDerivation { cycle } => {
                let mut diag = diag;
                for pair in cycle.windows(2) {
                    diag = diag.with_context(format!("`{}` feeds `{}`", pair[0], pair[1]));
                }
                diag
            }
            RegistryError::UnsupportedSchema { .. } => {
                diag.with_suggestion("Regenerate the catalog against this version of capgen")
            }
            _ => diag,
        }
    }
}

/// An immutable, validated set of fact definitions.
#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    schema: semver::Version,
    facts: Vec<FactSpec>,
    index: HashMap<String, usize>,
    conflicts: Vec<ConflictGroup>,
    /// Rules in evaluation order
    rules: Vec<DerivationRule>,
    invariants: Vec<Invariant>,
    /// Positions into `facts`, category then declaration order
    emission: Vec<usize>,
}

impl ProbeRegistry {
    /// The registry compiled into the binary.
    pub fn builtin() -> Result<&'static ProbeRegistry, RegistryError> {
        BUILTIN.as_ref().map_err(Clone::clone)
    }

    /// Parse and validate a TOML catalog.
    pub fn from_toml_str(contents: &str) -> Result<Self, RegistryError> {
        let catalog: Catalog =
            toml::from_str(contents).map_err(|e| RegistryError::Parse(e.to_string()))?;
        catalog.into_registry()
    }

    /// Load a catalog from disk.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!("loading catalog from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn schema(&self) -> &semver::Version {
        &self.schema
    }

    /// Look up a fact by name.
    pub fn lookup(&self, name: &str) -> Result<&FactSpec, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::UnknownFact {
            name: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&FactSpec> {
        self.index.get(name).map(|&i| &self.facts[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All facts in declaration order.
    pub fn facts(&self) -> &[FactSpec] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn conflict_groups(&self) -> &[ConflictGroup] {
        &self.conflicts
    }

    /// Conflict groups containing `name`.
    pub fn groups_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConflictGroup> {
        self.conflicts
            .iter()
            .filter(move |g| g.members.iter().any(|m| m == name))
    }

    /// Derivation rules, ordered so every rule follows the rules that
    /// produce its inputs.
    pub fn derivation_rules(&self) -> &[DerivationRule] {
        &self.rules
    }

    /// The rule producing `name`, if it is a derived fact.
    pub fn rule_for(&self, name: &str) -> Option<&DerivationRule> {
        self.rules.iter().find(|r| r.output == name)
    }

    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    /// Emitted facts: grouped by category, declaration order within each.
    /// Internal facts are skipped.
    pub fn emission_order(&self) -> impl Iterator<Item = &FactSpec> {
        self.emission.iter().map(move |&i| &self.facts[i])
    }
}

/// Assembles and validates a [`ProbeRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    schema: semver::Version,
    facts: Vec<FactSpec>,
    conflicts: Vec<ConflictGroup>,
    rules: Vec<DerivationRule>,
    invariants: Vec<Invariant>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        RegistryBuilder::new(semver::Version::new(1, 0, 0))
    }
}

impl RegistryBuilder {
    pub fn new(schema: semver::Version) -> Self {
        RegistryBuilder {
            schema,
            facts: Vec::new(),
            conflicts: Vec::new(),
            rules: Vec::new(),
            invariants: Vec::new(),
        }
    }

    pub fn fact(mut self, spec: FactSpec) -> Self {
        self.facts.push(spec);
        self
    }

    pub fn conflict(mut self, group: ConflictGroup) -> Self {
        self.conflicts.push(group);
        self
    }

    pub fn rule(mut self, rule: DerivationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn invariant(mut self, invariant: Invariant) -> Self {
        self.invariants.push(invariant);
        self
    }

    pub fn build(self) -> Result<ProbeRegistry, RegistryError> {
        let supported = catalog::supported_schema();
        if !supported.matches(&self.schema) {
            return Err(RegistryError::UnsupportedSchema {
                found: self.schema.to_string(),
                supported: supported.to_string(),
            });
        }

        let mut facts = self.facts;
        let mut index = HashMap::with_capacity(facts.len());
        for (i, spec) in facts.iter_mut().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateFact {
                    name: spec.name.clone(),
                });
            }
            spec.index = i;
        }

        let kind_of = |context: &str, name: &str| -> Result<FactKind, RegistryError> {
            index
                .get(name)
                .map(|&i| facts[i].kind)
                .ok_or_else(|| RegistryError::UnknownReference {
                    context: context.to_string(),
                    name: name.to_string(),
                })
        };
        let expect_kind = |context: &str,
                           name: &str,
                           expected: FactKind|
         -> Result<(), RegistryError> {
            let found = kind_of(context, name)?;
            if found != expected {
                return Err(RegistryError::KindMismatch {
                    context: context.to_string(),
                    name: name.to_string(),
                    expected,
                    found,
                });
            }
            Ok(())
        };

        // Conflict groups
        let mut conflicts = self.conflicts;
        for group in &mut conflicts {
            let context = format!("conflict group `{}`", group.name);
            let distinct: BTreeSet<&str> = group.members.iter().map(String::as_str).collect();
            if distinct.len() < 2 || distinct.len() != group.members.len() {
                return Err(RegistryError::DegenerateConflictGroup {
                    group: group.name.clone(),
                });
            }
            for member in &group.members {
                expect_kind(&context, member, FactKind::Boolean)?;
                if facts[index[member]].is_derived() {
                    return Err(RegistryError::DerivedConflictMember {
                        group: group.name.clone(),
                        name: member.clone(),
                    });
                }
            }
            for member in group.prefer.iter().flatten() {
                if group.position(member).is_none() {
                    return Err(RegistryError::UnknownReference {
                        context: context.clone(),
                        name: member.clone(),
                    });
                }
            }
            group
                .close_precedence()
                .map_err(|member| RegistryError::CyclicPrecedence {
                    group: group.name.clone(),
                    member,
                })?;
        }

        // Derivation rules
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (i, rule) in self.rules.iter().enumerate() {
            let context = format!("rule for `{}`", rule.output);
            let output_kind = kind_of(&context, &rule.output)?;
            if !facts[index[&rule.output]].is_derived() {
                return Err(RegistryError::NotDerived {
                    name: rule.output.clone(),
                });
            }
            if output_kind != rule.kind.output_kind() {
                return Err(RegistryError::KindMismatch {
                    context,
                    name: rule.output.clone(),
                    expected: rule.kind.output_kind(),
                    found: output_kind,
                });
            }
            if producers.insert(rule.output.as_str(), i).is_some() {
                return Err(RegistryError::DuplicateRule {
                    name: rule.output.clone(),
                });
            }
            match &rule.kind {
                RuleKind::AnyOf { inputs } | RuleKind::AllOf { inputs } => {
                    for input in inputs {
                        expect_kind(&context, input, FactKind::Boolean)?;
                    }
                }
                RuleKind::Equals { input, value } => {
                    expect_kind(&context, input, value.kind())?;
                }
                RuleKind::CompareAll { conditions } => {
                    for name in conditions.iter().flat_map(Comparison::facts) {
                        expect_kind(&context, name, FactKind::Integer)?;
                    }
                }
                RuleKind::Target { .. } => {}
            }
        }
        if let Some(orphan) = facts
            .iter()
            .find(|f| f.is_derived() && !producers.contains_key(f.name.as_str()))
        {
            return Err(RegistryError::MissingRule {
                name: orphan.name.clone(),
            });
        }

        let order = evaluation_order(&self.rules, &producers)?;
        drop(producers);
        let mut slots: Vec<Option<DerivationRule>> = self.rules.into_iter().map(Some).collect();
        let rules: Vec<DerivationRule> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        // Invariants
        for invariant in &self.invariants {
            let context = format!("invariant `{}`", invariant.name);
            match &invariant.kind {
                InvariantKind::Compare { left, right, .. } => {
                    expect_kind(&context, left, FactKind::Integer)?;
                    if let Some(right) = right.fact() {
                        expect_kind(&context, right, FactKind::Integer)?;
                    }
                }
                InvariantKind::Range { fact, .. } | InvariantKind::PointerWidth { fact } => {
                    expect_kind(&context, fact, FactKind::Integer)?;
                }
                InvariantKind::Implies { fact, requires } => {
                    expect_kind(&context, fact, FactKind::Boolean)?;
                    expect_kind(&context, requires, FactKind::Boolean)?;
                }
                InvariantKind::Endianness { fact } => {
                    expect_kind(&context, fact, FactKind::String)?;
                }
            }
        }

        let mut emission: Vec<usize> = facts
            .iter()
            .filter(|f| !f.internal)
            .map(|f| f.index)
            .collect();
        emission.sort_by_key(|&i| (facts[i].category, i));

        tracing::debug!(
            "registry built: {} facts, {} conflict groups, {} rules, {} invariants",
            facts.len(),
            conflicts.len(),
            rules.len(),
            self.invariants.len()
        );

        Ok(ProbeRegistry {
            schema: self.schema,
            facts,
            index,
            conflicts,
            rules,
            invariants: self.invariants,
            emission,
        })
    }
}

/// Topologically order rules by their data dependencies.
fn evaluation_order(
    rules: &[DerivationRule],
    producers: &HashMap<&str, usize>,
) -> Result<Vec<usize>, RegistryError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..rules.len()).map(|i| graph.add_node(i)).collect();

    for (consumer, rule) in rules.iter().enumerate() {
        for input in rule.inputs() {
            if let Some(&producer) = producers.get(input) {
                graph.update_edge(nodes[producer], nodes[consumer], ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(sorted) => Ok(sorted.into_iter().map(|n| graph[n]).collect()),
        Err(cycle) => {
            let start = cycle.node_id();
            let component = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&start))
                .unwrap_or_else(|| vec![start]);
            let path = cycle_path(&graph, start, &component);
            Err(RegistryError::CyclicDerivation {
                cycle: path.into_iter().map(|n| rules[graph[n]].output.clone()).collect(),
            })
        }
    }
}

/// Walk a cycle from `start` back to itself inside one strongly connected
/// component. The returned path begins and ends with `start`.
fn cycle_path(graph: &DiGraph<usize, ()>, start: NodeIndex, component: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut path = vec![start];
    let mut visited = BTreeSet::new();

    fn walk(
        graph: &DiGraph<usize, ()>,
        node: NodeIndex,
        start: NodeIndex,
        component: &[NodeIndex],
        visited: &mut BTreeSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        let mut next: Vec<NodeIndex> = graph
            .neighbors(node)
            .filter(|n| component.contains(n))
            .collect();
        next.sort();
        for n in next {
            if n == start {
                path.push(n);
                return true;
            }
            if visited.insert(n) {
                path.push(n);
                if walk(graph, n, start, component, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    walk(graph, start, start, component, &mut visited, &mut path);
    path
}
