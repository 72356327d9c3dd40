//! Policy enum sets and their bit-vector wire encoding.
//!
//! A set of enum values travels as a signed 64-bit integer where bit `i`
//! stands for the `i`-th declared value. The wildcard `"*"` is the reserved
//! value `-1` and never combines with concrete bits.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const WILDCARD: &str = "*";
pub const WILDCARD_BITS: i64 = -1;
/// Bit 63 is the sign bit; using it would make a full set collide with the wildcard.
pub const MAX_POLICY_VALUES: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownPolicyValue {
    pub kind: &'static str,
    pub value: String,
}

pub trait PolicyEnum: Copy + Eq + fmt::Debug + Sized + 'static {
    const KIND: &'static str;
    /// Declaration order defines bit positions and must never be reordered.
    const VALUES: &'static [Self];

    fn as_str(self) -> &'static str;

    fn position(self) -> usize {
        Self::VALUES
            .iter()
            .position(|value| *value == self)
            .unwrap_or(MAX_POLICY_VALUES)
    }

    fn bit(self) -> i64 {
        let position = self.position();
        if position >= MAX_POLICY_VALUES {
            return 0;
        }
        1i64 << position
    }

    fn from_name(name: &str) -> Result<Self, UnknownPolicyValue> {
        Self::VALUES
            .iter()
            .copied()
            .find(|value| value.as_str() == name)
            .ok_or_else(|| UnknownPolicyValue {
                kind: Self::KIND,
                value: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySet<T> {
    Any,
    Only(Vec<T>),
}

impl<T> Default for PolicySet<T> {
    fn default() -> Self {
        PolicySet::Only(Vec::new())
    }
}

impl<T: PolicyEnum> PolicySet<T> {
    /// Builds a concrete set in declaration order without duplicates.
    pub fn only(values: impl IntoIterator<Item = T>) -> Self {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by_key(|value| value.position());
        values.dedup();
        PolicySet::Only(values)
    }

    /// The wildcard dominates: any set naming `"*"` becomes `Any`.
    pub fn from_names<I, S>(names: I) -> Result<Self, UnknownPolicyValue>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = Vec::new();
        let mut wildcard = false;
        for name in names {
            let name = name.as_ref().trim();
            if name == WILDCARD {
                wildcard = true;
                continue;
            }
            values.push(T::from_name(name)?);
        }
        if wildcard {
            return Ok(PolicySet::Any);
        }
        Ok(Self::only(values))
    }

    pub fn names(&self) -> Vec<&'static str> {
        match self {
            PolicySet::Any => vec![WILDCARD],
            PolicySet::Only(values) => values.iter().map(|value| value.as_str()).collect(),
        }
    }

    pub fn contains(&self, value: T) -> bool {
        match self {
            PolicySet::Any => true,
            PolicySet::Only(values) => values.contains(&value),
        }
    }

    pub fn encode(&self) -> i64 {
        match self {
            PolicySet::Any => WILDCARD_BITS,
            PolicySet::Only(values) => values.iter().fold(0, |bits, value| bits | value.bit()),
        }
    }

    /// Bits without a declared value are ignored so newer server enums still decode.
    pub fn decode(bits: i64) -> Self {
        if bits == WILDCARD_BITS {
            return PolicySet::Any;
        }
        let values = T::VALUES
            .iter()
            .copied()
            .take(MAX_POLICY_VALUES)
            .enumerate()
            .filter(|(position, _)| bits & (1i64 << position) != 0)
            .map(|(_, value)| value)
            .collect();
        PolicySet::Only(values)
    }
}

impl<T: PolicyEnum> Serialize for PolicySet<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.encode())
    }
}

impl<'de, T: PolicyEnum> Deserialize<'de> for PolicySet<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PolicySetVisitor(PhantomData))
    }
}

struct PolicySetVisitor<T>(PhantomData<T>);

impl<'de, T: PolicyEnum> Visitor<'de> for PolicySetVisitor<T> {
    type Value = PolicySet<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "a {} bit-vector integer or a list of names",
            T::KIND
        )
    }

    fn visit_i64<E: de::Error>(self, bits: i64) -> Result<Self::Value, E> {
        Ok(PolicySet::decode(bits))
    }

    fn visit_u64<E: de::Error>(self, bits: u64) -> Result<Self::Value, E> {
        let bits = i64::try_from(bits).map_err(|_| E::custom("bit-vector exceeds 63 bits"))?;
        Ok(PolicySet::decode(bits))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut names: Vec<String> = Vec::new();
        while let Some(name) = seq.next_element::<String>()? {
            names.push(name);
        }
        PolicySet::from_names(names).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    TaskRead,
    TaskWrite,
    TurnRead,
    TurnWrite,
    LogsRead,
    LogsWrite,
    RunnerManage,
    EnvironmentManage,
    TenantAdmin,
}

const ACTIONS: &[Action] = &[
    Action::TaskRead,
    Action::TaskWrite,
    Action::TurnRead,
    Action::TurnWrite,
    Action::LogsRead,
    Action::LogsWrite,
    Action::RunnerManage,
    Action::EnvironmentManage,
    Action::TenantAdmin,
];
const _: () = assert!(ACTIONS.len() <= MAX_POLICY_VALUES);

impl PolicyEnum for Action {
    const KIND: &'static str = "action";
    const VALUES: &'static [Self] = ACTIONS;

    fn as_str(self) -> &'static str {
        match self {
            Action::TaskRead => "task.read",
            Action::TaskWrite => "task.write",
            Action::TurnRead => "turn.read",
            Action::TurnWrite => "turn.write",
            Action::LogsRead => "logs.read",
            Action::LogsWrite => "logs.write",
            Action::RunnerManage => "runner.manage",
            Action::EnvironmentManage => "environment.manage",
            Action::TenantAdmin => "tenant.admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    User,
    Runner,
    Service,
    Delegated,
}

const TOKEN_TYPES: &[TokenType] = &[
    TokenType::User,
    TokenType::Runner,
    TokenType::Service,
    TokenType::Delegated,
];
const _: () = assert!(TOKEN_TYPES.len() <= MAX_POLICY_VALUES);

impl PolicyEnum for TokenType {
    const KIND: &'static str = "token type";
    const VALUES: &'static [Self] = TOKEN_TYPES;

    fn as_str(self) -> &'static str {
        match self {
            TokenType::User => "user",
            TokenType::Runner => "runner",
            TokenType::Service => "service",
            TokenType::Delegated => "delegated",
        }
    }
}

/// Grants `actions` to callers holding one of `token_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub actions: PolicySet<Action>,
    #[serde(default)]
    pub token_types: PolicySet<TokenType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subsets<T: PolicyEnum>() -> Vec<Vec<T>> {
        let n = T::VALUES.len();
        (0u32..(1 << n))
            .map(|mask| {
                T::VALUES
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, v)| v)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn every_action_subset_round_trips() {
        for subset in subsets::<Action>() {
            let set = PolicySet::only(subset.clone());
            assert_eq!(PolicySet::<Action>::decode(set.encode()), set);
        }
    }

    #[test]
    fn every_token_type_subset_round_trips() {
        for subset in subsets::<TokenType>() {
            let set = PolicySet::only(subset);
            assert_eq!(PolicySet::<TokenType>::decode(set.encode()), set);
        }
    }

    #[test]
    fn empty_set_is_zero() {
        assert_eq!(PolicySet::<Action>::only([]).encode(), 0);
        assert_eq!(
            PolicySet::<Action>::decode(0),
            PolicySet::Only(Vec::new())
        );
    }

    #[test]
    fn wildcard_is_minus_one_and_decodes_to_star() {
        let any = PolicySet::<TokenType>::from_names(["*"]).expect("names");
        assert_eq!(any.encode(), -1);
        assert_eq!(PolicySet::<TokenType>::decode(-1).names(), vec!["*"]);
    }

    #[test]
    fn wildcard_dominates_concrete_values() {
        let set = PolicySet::<Action>::from_names(["task.read", "*"]).expect("names");
        assert_eq!(set, PolicySet::Any);
        assert_eq!(set.encode(), WILDCARD_BITS);
    }

    #[test]
    fn undefined_bits_are_ignored() {
        let bits = TokenType::Runner.bit() | (1 << 40);
        assert_eq!(
            PolicySet::<TokenType>::decode(bits),
            PolicySet::Only(vec![TokenType::Runner])
        );
    }

    #[test]
    fn bit_positions_follow_declaration_order() {
        assert_eq!(Action::TaskRead.bit(), 1);
        assert_eq!(Action::TaskWrite.bit(), 2);
        assert_eq!(Action::TenantAdmin.bit(), 1 << 8);
        let set = PolicySet::<Action>::from_names(["turn.read", "task.read"]).expect("names");
        assert_eq!(set.encode(), 0b101);
        assert_eq!(set.names(), vec!["task.read", "turn.read"]);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = PolicySet::<Action>::from_names(["task.delete"]).unwrap_err();
        assert_eq!(err.to_string(), "unknown action `task.delete`");
    }

    #[test]
    fn policy_serializes_sets_as_integers_and_accepts_names() {
        let policy: Policy = serde_json::from_value(json!({
            "name": "runners",
            "actions": ["logs.write", "turn.write"],
            "tokenTypes": -1,
        }))
        .expect("decode");
        assert_eq!(policy.token_types, PolicySet::Any);
        let wire = serde_json::to_value(&policy).expect("encode");
        assert_eq!(
            wire,
            json!({
                "name": "runners",
                "actions": Action::TurnWrite.bit() | Action::LogsWrite.bit(),
                "tokenTypes": -1,
            })
        );
    }
}
