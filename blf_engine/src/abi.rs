//! Conversions between engine values and dynamically typed ABI values.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Bytes, B256, I256, U256};
use num_bigint::{BigInt, Sign};

use crate::error::{ExecutionError, ExecutionResult};
use crate::value::{i256_to_bigint, u256_to_bigint, Value, ValueType};

/// Parses a Solidity type name such as `uint256` or `address[]`.
pub fn parse_type(name: &str) -> ExecutionResult<DynSolType> {
    DynSolType::parse(name).map_err(|e| ExecutionError::invalid_parameters(name, e.to_string()))
}

/// Converts a decoded ABI value. Fixed-size byte arrays keep their declared
/// length; arrays and tuples become lists.
pub fn value_from_sol(value: DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(value) => Value::Boolean(value),
        DynSolValue::Int(value, _) => Value::Integer(i256_to_bigint(value)),
        DynSolValue::Uint(value, _) => Value::Integer(u256_to_bigint(value)),
        DynSolValue::FixedBytes(word, size) => Value::Bytes(Bytes::copy_from_slice(&word[..size])),
        DynSolValue::Address(address) => Value::Address(address),
        DynSolValue::Function(function) => Value::Bytes(Bytes::copy_from_slice(function.as_slice())),
        DynSolValue::Bytes(bytes) => Value::Bytes(bytes.into()),
        DynSolValue::String(string) => Value::String(string),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            Value::List(values.into_iter().map(value_from_sol).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::Bytes(other.abi_encode().into()),
    }
}

/// Converts `value` to an ABI value of type `ty`.
pub fn value_to_sol(value: &Value, ty: &DynSolType) -> ExecutionResult<DynSolValue> {
    let mismatch = || {
        ExecutionError::invalid_parameters(
            "abi encoding",
            format!("cannot encode {value} as {ty}"),
        )
    };
    let encoded = match (value, ty) {
        (Value::Boolean(value), DynSolType::Bool) => DynSolValue::Bool(*value),
        (Value::Integer(value), DynSolType::Uint(size)) => {
            DynSolValue::Uint(bigint_to_u256(value).ok_or_else(mismatch)?, *size)
        }
        (Value::Integer(value), DynSolType::Int(size)) => DynSolValue::Int(
            I256::from_dec_str(&value.to_string()).map_err(|_| mismatch())?,
            *size,
        ),
        (Value::Address(address), DynSolType::Address) => DynSolValue::Address(*address),
        (Value::Bytes(bytes), DynSolType::Bytes) => DynSolValue::Bytes(bytes.to_vec()),
        (Value::Bytes(bytes), DynSolType::FixedBytes(size)) if bytes.len() == *size => {
            let mut word = B256::ZERO;
            word[..*size].copy_from_slice(bytes);
            DynSolValue::FixedBytes(word, *size)
        }
        (Value::String(string), DynSolType::String) => DynSolValue::String(string.clone()),
        (Value::List(values), DynSolType::Array(element)) => DynSolValue::Array(
            values
                .iter()
                .map(|value| value_to_sol(value, element))
                .collect::<ExecutionResult<_>>()?,
        ),
        (Value::List(values), DynSolType::FixedArray(element, len)) if values.len() == *len => {
            DynSolValue::FixedArray(
                values
                    .iter()
                    .map(|value| value_to_sol(value, element))
                    .collect::<ExecutionResult<_>>()?,
            )
        }
        (Value::List(values), DynSolType::Tuple(types)) if values.len() == types.len() => {
            DynSolValue::Tuple(
                values
                    .iter()
                    .zip(types)
                    .map(|(value, ty)| value_to_sol(value, ty))
                    .collect::<ExecutionResult<_>>()?,
            )
        }
        _ => return Err(mismatch()),
    };
    Ok(encoded)
}

/// The type of the values [`value_from_sol`] produces for `ty`.
pub fn value_type_of(ty: &DynSolType) -> ValueType {
    match ty {
        DynSolType::Bool => ValueType::Boolean,
        DynSolType::Int(_) | DynSolType::Uint(_) => ValueType::Integer,
        DynSolType::Address => ValueType::Address,
        DynSolType::String => ValueType::String,
        DynSolType::Array(element) | DynSolType::FixedArray(element, _) => {
            ValueType::list(value_type_of(element))
        }
        DynSolType::Tuple(_) => ValueType::list(ValueType::Any),
        _ => ValueType::Bytes,
    }
}

/// The Solidity type a value is encoded as when no type is declared.
pub fn default_type(value: &Value) -> DynSolType {
    match value {
        Value::Boolean(_) => DynSolType::Bool,
        Value::Integer(value) if value.sign() == Sign::Minus => DynSolType::Int(256),
        Value::Integer(_) => DynSolType::Uint(256),
        Value::String(_) => DynSolType::String,
        Value::Bytes(_) => DynSolType::Bytes,
        Value::Address(_) => DynSolType::Address,
        Value::List(values) => DynSolType::Array(Box::new(
            values.first().map(default_type).unwrap_or(DynSolType::Uint(256)),
        )),
    }
}

pub fn bigint_to_u256(value: &BigInt) -> Option<U256> {
    match value.to_bytes_be() {
        (Sign::Minus, _) => None,
        (_, bytes) => U256::try_from_be_slice(&bytes),
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;

    #[test]
    fn decoded_values_convert() {
        let ty = parse_type("(uint8,int16,bytes4,address[],string)").unwrap();
        let decoded = ty
            .abi_decode_sequence(
                &DynSolValue::Tuple(vec![
                    DynSolValue::Uint(U256::from(7), 8),
                    DynSolValue::Int(I256::MINUS_ONE, 16),
                    DynSolValue::FixedBytes(B256::ZERO, 4),
                    DynSolValue::Array(vec![DynSolValue::Address(Address::repeat_byte(1))]),
                    DynSolValue::String("hi".into()),
                ])
                .abi_encode_sequence()
                .unwrap(),
            )
            .unwrap();

        assert_eq!(
            value_from_sol(decoded),
            Value::List(vec![
                7u64.into(),
                (-1i64).into(),
                Value::Bytes(vec![0u8; 4].into()),
                Value::List(vec![Address::repeat_byte(1).into()]),
                "hi".into(),
            ])
        );
    }

    #[test]
    fn values_encode_to_declared_types() {
        let ty = parse_type("uint256[]").unwrap();
        assert_eq!(
            value_to_sol(&Value::List(vec![1u64.into(), 2u64.into()]), &ty).unwrap(),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(2), 256),
            ])
        );
        assert!(value_to_sol(&(-1i64).into(), &parse_type("uint256").unwrap()).is_err());
        assert_eq!(
            value_to_sol(&(-1i64).into(), &parse_type("int256").unwrap()).unwrap(),
            DynSolValue::Int(I256::MINUS_ONE, 256)
        );
        assert!(parse_type("uint7x").is_err());
        assert_eq!(
            value_type_of(&parse_type("address[2]").unwrap()),
            ValueType::list(ValueType::Address)
        );
        assert_eq!(value_type_of(&parse_type("bytes32").unwrap()), ValueType::Bytes);
        assert_eq!(default_type(&Value::List(vec!["a".into()])).to_string(), "string[]");
    }
}
