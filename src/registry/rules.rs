//! Conflict groups, derivation rules and invariants declared by the
//! registry catalog.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::fact::{FactKind, FactValue};
use crate::core::target::{TargetCondition, TargetDescriptor};

/// Integer comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

impl CompareOp {
    pub fn apply(self, left: i64, right: i64) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Right-hand side of a comparison: another fact or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Literal(i64),
    Fact(String),
}

impl Operand {
    pub fn fact(&self) -> Option<&str> {
        match self {
            Operand::Fact(name) => Some(name),
            Operand::Literal(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{}", v),
            Operand::Fact(name) => write!(f, "{}", name),
        }
    }
}

/// `left op right` over integer facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    pub left: String,
    pub op: CompareOp,
    pub right: Operand,
}

impl Comparison {
    pub fn facts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.left.as_str()).chain(self.right.fact())
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// A set of boolean facts of which at most one may be enabled.
///
/// `prefer` holds chains in descending preference; the group's precedence
/// relation is the transitive closure of every chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictGroup {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub prefer: Vec<Vec<String>>,
    /// (winner, loser) member positions, filled in by the registry
    #[serde(skip)]
    beats: BTreeSet<(usize, usize)>,
}

impl ConflictGroup {
    pub fn new(name: impl Into<String>, members: &[&str]) -> Self {
        ConflictGroup {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            prefer: Vec::new(),
            beats: BTreeSet::new(),
        }
    }

    /// Add a preference chain, most preferred first.
    pub fn prefer(mut self, chain: &[&str]) -> Self {
        self.prefer.push(chain.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn position(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    /// Whether the group's precedence ranks `winner` above `loser`.
    pub fn prefers(&self, winner: &str, loser: &str) -> bool {
        match (self.position(winner), self.position(loser)) {
            (Some(w), Some(l)) => self.beats.contains(&(w, l)),
            _ => false,
        }
    }

    /// Close the preference chains transitively. Returns a member that
    /// would have to beat itself if the chains are cyclic.
    pub(crate) fn close_precedence(&mut self) -> Result<(), String> {
        let mut beats = BTreeSet::new();
        for chain in &self.prefer {
            let positions: Vec<usize> = chain.iter().filter_map(|m| self.position(m)).collect();
            for (i, &w) in positions.iter().enumerate() {
                for &l in &positions[i + 1..] {
                    beats.insert((w, l));
                }
            }
        }

        loop {
            let mut added = Vec::new();
            for &(a, b) in &beats {
                for &(c, d) in beats.range((b, 0)..=(b, usize::MAX)) {
                    debug_assert_eq!(c, b);
                    if !beats.contains(&(a, d)) {
                        added.push((a, d));
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            beats.extend(added);
        }

        if let Some(&(w, _)) = beats.iter().find(|(w, l)| w == l) {
            return Err(self.members[w].clone());
        }
        self.beats = beats;
        Ok(())
    }
}

/// Target properties a rule can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetProperty {
    /// Pointer size in bytes
    PointerBytes,
    /// Whether the declared byte order is big-endian
    BigEndian,
}

impl TargetProperty {
    /// Whether the target descriptor carries this property.
    pub fn is_known(self, target: &TargetDescriptor) -> bool {
        match self {
            TargetProperty::PointerBytes => true,
            TargetProperty::BigEndian => target.endianness.is_some(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TargetProperty::PointerBytes => "target pointer width in bytes",
            TargetProperty::BigEndian => "target byte order",
        }
    }
}

/// The computation a derivation rule performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleKind {
    /// True if any boolean input is true
    AnyOf { inputs: Vec<String> },
    /// True if every boolean input is true
    AllOf { inputs: Vec<String> },
    /// True if the input equals a value
    Equals { input: String, value: FactValue },
    /// True if every comparison holds
    CompareAll { conditions: Vec<Comparison> },
    /// Read from the target descriptor
    Target { property: TargetProperty },
}

impl RuleKind {
    /// Facts this rule reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            RuleKind::AnyOf { inputs } | RuleKind::AllOf { inputs } => {
                inputs.iter().map(String::as_str).collect()
            }
            RuleKind::Equals { input, .. } => vec![input.as_str()],
            RuleKind::CompareAll { conditions } => {
                let mut seen = Vec::new();
                for name in conditions.iter().flat_map(Comparison::facts) {
                    if !seen.contains(&name) {
                        seen.push(name);
                    }
                }
                seen
            }
            RuleKind::Target { .. } => Vec::new(),
        }
    }

    /// Kind of the value this rule produces.
    pub fn output_kind(&self) -> FactKind {
        match self {
            RuleKind::Target {
                property: TargetProperty::PointerBytes,
            } => FactKind::Integer,
            _ => FactKind::Boolean,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::AnyOf { .. } => "any_of",
            RuleKind::AllOf { .. } => "all_of",
            RuleKind::Equals { .. } => "equals",
            RuleKind::CompareAll { .. } => "compare_all",
            RuleKind::Target { .. } => "target",
        }
    }
}

/// A pure function from resolved facts (or the target) to one derived fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationRule {
    pub output: String,
    /// Undefined inputs are an error rather than an undefined output
    #[serde(default)]
    pub required: bool,
    /// Only applies to matching targets
    #[serde(default)]
    pub when: Option<TargetCondition>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl DerivationRule {
    pub fn new(output: impl Into<String>, kind: RuleKind) -> Self {
        DerivationRule {
            output: output.into(),
            required: false,
            when: None,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn inputs(&self) -> Vec<&str> {
        self.kind.inputs()
    }
}

/// A post-resolution sanity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum InvariantKind {
    Compare {
        left: String,
        op: CompareOp,
        right: Operand,
    },
    Range {
        fact: String,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    /// If `fact` is enabled, `requires` must be enabled too
    Implies { fact: String, requires: String },
    /// `fact` (bytes) times 8 equals the target pointer width
    PointerWidth { fact: String },
    /// `fact` ("little"/"big") agrees with the target's byte order
    Endianness { fact: String },
}

impl InvariantKind {
    pub fn facts(&self) -> Vec<&str> {
        match self {
            InvariantKind::Compare { left, right, .. } => {
                std::iter::once(left.as_str()).chain(right.fact()).collect()
            }
            InvariantKind::Range { fact, .. }
            | InvariantKind::PointerWidth { fact }
            | InvariantKind::Endianness { fact } => vec![fact.as_str()],
            InvariantKind::Implies { fact, requires } => vec![fact.as_str(), requires.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    #[serde(default)]
    pub when: Option<TargetCondition>,
    #[serde(flatten)]
    pub kind: InvariantKind,
}

impl Invariant {
    pub fn new(name: impl Into<String>, kind: InvariantKind) -> Self {
        Invariant {
            name: name.into(),
            when: None,
            kind,
        }
    }
}
