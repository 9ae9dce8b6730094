//! Per-kind structural validation.
//!
//! A [`SchemaRegistry`] holds one declarative [`ValidationRule`] per kind.
//! Rules describe which tags an event must or may carry, how many values each
//! tag has and what those values look like, cross-tag constraints, and the
//! shape of the content. Validation is pure: no I/O and no knowledge of other
//! events.
//!
//! Tags that a rule does not mention are ignored.

mod rules;

pub use rules::*;

use crate::event::{Event, EventTemplate, HEX_KEY_LEN, UnsignedEvent, is_lower_hex};
use crate::kind::parse_address;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Type of a single tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Any string.
    Text,
    /// Base-10 signed 64-bit integer.
    Integer,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// 64 lowercase hex characters (an event id or pubkey).
    Hex32,
    /// `<kind>:<pubkey>:<d>` coordinate.
    Address,
}

/// Number of values a tag carries after its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn admits(&self, n: usize) -> bool {
        match *self {
            Arity::Exactly(expected) => n == expected,
            Arity::AtLeast(min) => n >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Rule for every occurrence of one tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRule {
    pub name: &'static str,
    pub presence: Presence,
    pub repeatable: bool,
    pub arity: Arity,
    /// Positional value types; values past the end of this list are unchecked.
    pub values: &'static [ValueType],
}

impl TagRule {
    /// A required, non-repeatable tag with at least one value.
    pub const fn required(name: &'static str, values: &'static [ValueType]) -> Self {
        Self {
            name,
            presence: Presence::Required,
            repeatable: false,
            arity: Arity::AtLeast(1),
            values,
        }
    }

    /// An optional, non-repeatable tag with at least one value.
    pub const fn optional(name: &'static str, values: &'static [ValueType]) -> Self {
        Self {
            presence: Presence::Optional,
            ..Self::required(name, values)
        }
    }

    pub const fn repeatable(self) -> Self {
        Self {
            repeatable: true,
            ..self
        }
    }

    pub const fn arity(self, arity: Arity) -> Self {
        Self { arity, ..self }
    }
}

/// Constraint spanning several tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Exactly one of the named tags must be present.
    ExactlyOneOf(&'static [&'static str]),
    /// No more than one of the named tags may be present.
    AtMostOneOf(&'static [&'static str]),
    /// If `tag` is present, `requires` must be present too.
    Requires {
        tag: &'static str,
        requires: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    Any,
    Empty,
    JsonObject,
}

/// The complete rule for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRule {
    pub kind: u16,
    /// Human readable label, used in logs.
    pub name: &'static str,
    pub tags: &'static [TagRule],
    pub constraints: &'static [Constraint],
    pub content: ContentRule,
}

/// What a violation is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Tag(&'static str),
    Tags(&'static [&'static str]),
    Content,
    Kind,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Tag(name) => write!(f, "tag `{}`", name),
            Field::Tags(names) => write!(f, "tags `{}`", names.join("`, `")),
            Field::Content => f.write_str("content"),
            Field::Kind => f.write_str("kind"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    MissingTag,
    RepeatedTag { count: usize },
    WrongArity { expected: Arity, found: usize },
    NotInteger { value: String },
    NotHex { value: String },
    MalformedAddress { value: String },
    NotInEnum {
        value: String,
        allowed: &'static [&'static str],
    },
    /// Both or neither of an exactly-one-of pair were present.
    ExactlyOneOf { found: usize },
    AtMostOneOf { found: usize },
    Requires { requires: &'static str },
    ContentNotJsonObject,
    ContentNotEmpty,
    UnknownKind { kind: u16 },
}

/// One broken rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: Field,
    pub kind: ViolationKind,
}

impl Violation {
    fn tag(name: &'static str, kind: ViolationKind) -> Self {
        Self {
            field: Field::Tag(name),
            kind,
        }
    }

    /// True if this violation concerns the tag `name`.
    pub fn references_tag(&self, name: &str) -> bool {
        match &self.field {
            Field::Tag(tag) => *tag == name,
            Field::Tags(tags) => tags.iter().any(|tag| *tag == name),
            Field::Content | Field::Kind => false,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.field)?;
        match &self.kind {
            ViolationKind::MissingTag => f.write_str("missing required tag"),
            ViolationKind::RepeatedTag { count } => {
                write!(f, "appears {} times but is not repeatable", count)
            }
            ViolationKind::WrongArity { expected, found } => {
                write!(f, "expected {} values, found {}", expected, found)
            }
            ViolationKind::NotInteger { value } => write!(f, "{:?} is not an integer", value),
            ViolationKind::NotHex { value } => {
                write!(f, "{:?} is not 64 lowercase hex chars", value)
            }
            ViolationKind::MalformedAddress { value } => {
                write!(f, "{:?} is not a kind:pubkey:d address", value)
            }
            ViolationKind::NotInEnum { value, allowed } => {
                write!(f, "{:?} is not one of {}", value, allowed.join("|"))
            }
            ViolationKind::ExactlyOneOf { found } => {
                write!(f, "exactly one must be present, found {}", found)
            }
            ViolationKind::AtMostOneOf { found } => {
                write!(f, "at most one may be present, found {}", found)
            }
            ViolationKind::Requires { requires } => {
                write!(f, "requires tag `{}`", requires)
            }
            ViolationKind::ContentNotJsonObject => f.write_str("must be a JSON object"),
            ViolationKind::ContentNotEmpty => f.write_str("must be empty"),
            ViolationKind::UnknownKind { kind } => write!(f, "no rule registered for {}", kind),
        }
    }
}

/// What to do with a kind that has no registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKindPolicy {
    /// Unknown kinds pass validation.
    #[default]
    Accept,
    /// Unknown kinds fail with [`ViolationKind::UnknownKind`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("rule table registers kind {0} more than once")]
    DuplicateKind(u16),
}

/// Immutable table of validation rules, keyed by kind.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    rules: HashMap<u16, &'static ValidationRule>,
    policy: UnknownKindPolicy,
}

impl SchemaRegistry {
    pub fn new(
        rules: &'static [ValidationRule],
        policy: UnknownKindPolicy,
    ) -> Result<Self, SchemaError> {
        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            if map.insert(rule.kind, rule).is_some() {
                return Err(SchemaError::DuplicateKind(rule.kind));
            }
        }
        Ok(Self { rules: map, policy })
    }

    /// Registry over the built-in rule table, accepting unknown kinds.
    pub fn standard() -> Self {
        Self {
            rules: STANDARD_RULES.iter().map(|rule| (rule.kind, rule)).collect(),
            policy: UnknownKindPolicy::Accept,
        }
    }

    pub fn with_policy(mut self, policy: UnknownKindPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnknownKindPolicy {
        self.policy
    }

    pub fn rule(&self, kind: u16) -> Option<&'static ValidationRule> {
        self.rules.get(&kind).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = u16> + '_ {
        self.rules.keys().copied()
    }

    /// Validate a signed event against the rule for its kind.
    pub fn validate<'e>(&self, event: &'e Event) -> Result<&'e Event, Vec<Violation>> {
        self.check(event.kind, &event.tags, &event.content)?;
        Ok(event)
    }

    /// Validate before signing.
    pub fn validate_unsigned(&self, event: &UnsignedEvent) -> Result<(), Vec<Violation>> {
        self.check(event.kind, &event.tags, &event.content)
    }

    pub fn validate_template(&self, template: &EventTemplate) -> Result<(), Vec<Violation>> {
        self.check(template.kind, &template.tags, &template.content)
    }

    fn check(&self, kind: u16, tags: &[Vec<String>], content: &str) -> Result<(), Vec<Violation>> {
        let Some(rule) = self.rule(kind) else {
            return match self.policy {
                UnknownKindPolicy::Accept => Ok(()),
                UnknownKindPolicy::Reject => Err(vec![Violation {
                    field: Field::Kind,
                    kind: ViolationKind::UnknownKind { kind },
                }]),
            };
        };

        let mut violations = Vec::new();
        for tag_rule in rule.tags {
            check_tag(tag_rule, tags, &mut violations);
        }
        for constraint in rule.constraints {
            check_constraint(constraint, tags, &mut violations);
        }
        check_content(rule.content, content, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn occurrences<'a>(tags: &'a [Vec<String>], name: &'a str) -> impl Iterator<Item = &'a [String]> {
    tags.iter()
        .filter(move |tag| tag.first().map(String::as_str) == Some(name))
        .map(|tag| &tag[1..])
}

fn check_tag(rule: &TagRule, tags: &[Vec<String>], out: &mut Vec<Violation>) {
    let found: Vec<&[String]> = occurrences(tags, rule.name).collect();

    if found.is_empty() {
        if rule.presence == Presence::Required {
            out.push(Violation::tag(rule.name, ViolationKind::MissingTag));
        }
        return;
    }
    if found.len() > 1 && !rule.repeatable {
        out.push(Violation::tag(
            rule.name,
            ViolationKind::RepeatedTag { count: found.len() },
        ));
    }

    for values in found {
        if !rule.arity.admits(values.len()) {
            out.push(Violation::tag(
                rule.name,
                ViolationKind::WrongArity {
                    expected: rule.arity,
                    found: values.len(),
                },
            ));
        }
        for (value, ty) in values.iter().zip(rule.values) {
            if let Some(kind) = check_value(*ty, value) {
                out.push(Violation::tag(rule.name, kind));
            }
        }
    }
}

fn check_value(ty: ValueType, value: &str) -> Option<ViolationKind> {
    match ty {
        ValueType::Text => None,
        ValueType::Integer => value.parse::<i64>().is_err().then(|| ViolationKind::NotInteger {
            value: value.to_string(),
        }),
        ValueType::Enum(allowed) => {
            (!allowed.iter().any(|a| *a == value)).then(|| ViolationKind::NotInEnum {
                value: value.to_string(),
                allowed,
            })
        }
        ValueType::Hex32 => (!is_lower_hex(value, HEX_KEY_LEN)).then(|| ViolationKind::NotHex {
            value: value.to_string(),
        }),
        ValueType::Address => {
            parse_address(value)
                .is_err()
                .then(|| ViolationKind::MalformedAddress {
                    value: value.to_string(),
                })
        }
    }
}

fn present(tags: &[Vec<String>], name: &str) -> bool {
    occurrences(tags, name).next().is_some()
}

fn check_constraint(constraint: &Constraint, tags: &[Vec<String>], out: &mut Vec<Violation>) {
    match *constraint {
        Constraint::ExactlyOneOf(names) => {
            let found = names.iter().filter(|name| present(tags, name)).count();
            if found != 1 {
                out.push(Violation {
                    field: Field::Tags(names),
                    kind: ViolationKind::ExactlyOneOf { found },
                });
            }
        }
        Constraint::AtMostOneOf(names) => {
            let found = names.iter().filter(|name| present(tags, name)).count();
            if found > 1 {
                out.push(Violation {
                    field: Field::Tags(names),
                    kind: ViolationKind::AtMostOneOf { found },
                });
            }
        }
        Constraint::Requires { tag, requires } => {
            if present(tags, tag) && !present(tags, requires) {
                out.push(Violation::tag(tag, ViolationKind::Requires { requires }));
            }
        }
    }
}

fn check_content(rule: ContentRule, content: &str, out: &mut Vec<Violation>) {
    let kind = match rule {
        ContentRule::Any => None,
        ContentRule::Empty => (!content.is_empty()).then_some(ViolationKind::ContentNotEmpty),
        ContentRule::JsonObject => {
            let is_object = serde_json::from_str::<serde_json::Value>(content)
                .map(|value| value.is_object())
                .unwrap_or(false);
            (!is_object).then_some(ViolationKind::ContentNotJsonObject)
        }
    };
    if let Some(kind) = kind {
        out.push(Violation {
            field: Field::Content,
            kind,
        });
    }
}
