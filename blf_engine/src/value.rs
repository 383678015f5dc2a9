//! The runtime values manipulated by instructions and their types.

use std::fmt::{self, Display, Formatter};

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use enum_as_inner::EnumAsInner;
use num_bigint::{BigInt, Sign};

/// A tagged runtime value.
///
/// Chain-derived numbers (block numbers, gas, difficulty) are arbitrary
/// precision since they can exceed the 64-bit range.
#[derive(Clone, Debug, EnumAsInner, Eq, Hash, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(BigInt),
    String(String),
    Bytes(Bytes),
    Address(Address),
    List(Vec<Value>),
}

/// The type of a [`Value`], as used by method signatures and the variable
/// catalog.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ValueType {
    /// Accepts any value. Only ever appears on the expected side of a
    /// signature, or as the element type of lists with mixed content.
    Any,
    Boolean,
    Integer,
    String,
    Bytes,
    Address,
    List(Box<ValueType>),
}

impl ValueType {
    pub fn list(element: ValueType) -> Self {
        Self::List(Box::new(element))
    }

    /// Whether a value of type `actual` can be passed where `self` is
    /// expected.
    pub fn is_assignable_from(&self, actual: &ValueType) -> bool {
        match (self, actual) {
            (ValueType::Any, _) => true,
            (ValueType::List(expected), ValueType::List(actual)) => {
                expected.is_assignable_from(actual)
            }
            _ => self == actual,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Boolean => write!(f, "bool"),
            ValueType::Integer => write!(f, "int"),
            ValueType::String => write!(f, "string"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::Address => write!(f, "address"),
            ValueType::List(element) => write!(f, "{element}[]"),
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Address(_) => ValueType::Address,
            Value::List(values) => {
                let mut types = values.iter().map(Value::value_type);
                let element = types
                    .next()
                    .filter(|first| types.all(|it| it == *first))
                    .unwrap_or(ValueType::Any);
                ValueType::list(element)
            }
        }
    }
}

/// Renders values the way exporters write them: integers in decimal, bytes
/// as `0x`-prefixed hex, addresses checksummed and lists as `[a, b]`.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Bytes(value) => write!(f, "0x{}", hex::encode(value)),
            Value::Address(value) => write!(f, "{}", value.to_checksum(None)),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value.into())
    }
}

impl From<U256> for Value {
    fn from(value: U256) -> Self {
        Self::Integer(u256_to_bigint(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<B256> for Value {
    fn from(value: B256) -> Self {
        Self::Bytes(Bytes::copy_from_slice(value.as_slice()))
    }
}

impl From<Address> for Value {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

pub fn u256_to_bigint(value: U256) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>())
}

pub fn i256_to_bigint(value: I256) -> BigInt {
    let magnitude = u256_to_bigint(value.unsigned_abs());
    if value.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}
