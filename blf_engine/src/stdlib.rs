//! Built-in methods available to every program.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::chain::{BlockData, ChainClient};
use crate::error::{ExecutionError, ExecutionResult};
use crate::library::Library;
use crate::program::ProgramState;
use crate::value::{Value, ValueType};
use crate::variables::Scope;

/// Builds a library holding every built-in method.
pub fn standard_library<C: ChainClient + 'static>() -> ExecutionResult<Library<C>> {
    use ValueType as T;

    let mut library = Library::<C>::new();
    let int2 = || vec![T::Integer, T::Integer];
    let bool2 = || vec![T::Boolean, T::Boolean];

    library.register("add", int2(), T::Integer, |p, _| {
        Ok((integer("add", p, 0)? + integer("add", p, 1)?).into())
    })?;
    library.register("subtract", int2(), T::Integer, |p, _| {
        Ok((integer("subtract", p, 0)? - integer("subtract", p, 1)?).into())
    })?;
    library.register("multiply", int2(), T::Integer, |p, _| {
        Ok((integer("multiply", p, 0)? * integer("multiply", p, 1)?).into())
    })?;
    library.register("divide", int2(), T::Integer, |p, _| {
        let divisor = non_zero("divide", p, 1)?;
        Ok((integer("divide", p, 0)? / divisor).into())
    })?;
    library.register("mod", int2(), T::Integer, |p, _| {
        let divisor = non_zero("mod", p, 1)?;
        Ok((integer("mod", p, 0)? % divisor).into())
    })?;

    library.register("lessThan", int2(), T::Boolean, |p, _| {
        Ok((integer("lessThan", p, 0)? < integer("lessThan", p, 1)?).into())
    })?;
    library.register("greaterThan", int2(), T::Boolean, |p, _| {
        Ok((integer("greaterThan", p, 0)? > integer("greaterThan", p, 1)?).into())
    })?;
    library.register("equals", vec![T::Any, T::Any], T::Boolean, |p, _| {
        Ok((p.first() == p.get(1)).into())
    })?;

    library.register("and", bool2(), T::Boolean, |p, _| {
        Ok((boolean("and", p, 0)? && boolean("and", p, 1)?).into())
    })?;
    library.register("or", bool2(), T::Boolean, |p, _| {
        Ok((boolean("or", p, 0)? || boolean("or", p, 1)?).into())
    })?;
    library.register("not", vec![T::Boolean], T::Boolean, |p, _| {
        Ok((!boolean("not", p, 0)?).into())
    })?;

    library.register("concat", vec![T::String, T::String], T::String, |p, _| {
        Ok(format!("{}{}", string("concat", p, 0)?, string("concat", p, 1)?).into())
    })?;
    library.register("toString", vec![T::Any], T::String, |p, _| {
        Ok(parameter("toString", p, 0)?.to_string().into())
    })?;
    library.register("toString", int2(), T::String, |p, _| {
        let radix = integer("toString", p, 1)?
            .to_u32()
            .filter(|radix| (2..=36).contains(radix))
            .ok_or_else(|| ExecutionError::invalid_parameters("toString", "radix must be in 2..=36"))?;
        Ok(integer("toString", p, 0)?.to_str_radix(radix).into())
    })?;
    library.register("toString", vec![T::Bytes], T::String, |p, _| {
        let bytes = parameter("toString", p, 0)?
            .as_bytes()
            .ok_or_else(|| mismatch("toString", 0, "bytes"))?;
        Ok(format!("0x{}", hex::encode(bytes)).into())
    })?;
    library.register("toHex", vec![T::Integer], T::String, |p, _| {
        Ok(format!("{:#x}", integer("toHex", p, 0)?).into())
    })?;

    library.register("length", vec![T::list(T::Any)], T::Integer, |p, _| {
        Ok((list("length", p, 0)?.len() as u64).into())
    })?;
    library.register("length", vec![T::String], T::Integer, |p, _| {
        Ok((string("length", p, 0)?.chars().count() as u64).into())
    })?;
    library.register("length", vec![T::Bytes], T::Integer, |p, _| {
        let bytes = parameter("length", p, 0)?
            .as_bytes()
            .ok_or_else(|| mismatch("length", 0, "bytes"))?;
        Ok((bytes.len() as u64).into())
    })?;
    library.register("contains", vec![T::list(T::Any), T::Any], T::Boolean, |p, _| {
        let needle = parameter("contains", p, 1)?;
        Ok(list("contains", p, 0)?.contains(needle).into())
    })?;

    library.register(
        "readContract",
        vec![T::Address, T::String, T::list(T::Any), T::list(T::String)],
        T::list(T::Any),
        read_contract,
    )?;

    Ok(library)
}

/// `readContract(contract, member, inputs, outputTypes)`: reads public
/// contract state as of the current block.
fn read_contract<C: ChainClient>(p: &[Value], state: &mut ProgramState<C>) -> ExecutionResult<Value> {
    const NAME: &str = "readContract";

    let contract = parameter(NAME, p, 0)?
        .as_address()
        .ok_or_else(|| mismatch(NAME, 0, "an address"))?;
    let member = string(NAME, p, 1)?;
    let inputs = list(NAME, p, 2)?;
    let output_types = list(NAME, p, 3)?
        .iter()
        .map(|it| it.as_string().cloned().ok_or_else(|| mismatch(NAME, 3, "a list of strings")))
        .collect::<ExecutionResult<Vec<_>>>()?;

    let block = state
        .reader
        .current_block()
        .map(|block| block.number().clone())
        .ok_or_else(|| ExecutionError::UnsetCursor {
            variable: NAME.to_owned(),
            scope: Scope::Block,
        })?;

    let values = state
        .reader
        .query_public_member(contract, &block, member, inputs, &output_types)?;
    Ok(Value::List(values))
}

fn parameter<'a>(method: &str, p: &'a [Value], index: usize) -> ExecutionResult<&'a Value> {
    p.get(index).ok_or_else(|| {
        ExecutionError::invalid_parameters(method, format!("missing parameter {index}"))
    })
}

fn mismatch(method: &str, index: usize, expected: &str) -> ExecutionError {
    ExecutionError::invalid_parameters(method, format!("parameter {index} must be {expected}"))
}

fn integer<'a>(method: &str, p: &'a [Value], index: usize) -> ExecutionResult<&'a BigInt> {
    parameter(method, p, index)?
        .as_integer()
        .ok_or_else(|| mismatch(method, index, "an integer"))
}

fn non_zero<'a>(method: &str, p: &'a [Value], index: usize) -> ExecutionResult<&'a BigInt> {
    let value = integer(method, p, index)?;
    if value.is_zero() {
        return Err(ExecutionError::invalid_parameters(method, "division by zero"));
    }
    Ok(value)
}

fn boolean(method: &str, p: &[Value], index: usize) -> ExecutionResult<bool> {
    parameter(method, p, index)?
        .as_boolean()
        .copied()
        .ok_or_else(|| mismatch(method, index, "a boolean"))
}

fn string<'a>(method: &str, p: &'a [Value], index: usize) -> ExecutionResult<&'a str> {
    parameter(method, p, index)?
        .as_string()
        .map(String::as_str)
        .ok_or_else(|| mismatch(method, index, "a string"))
}

fn list<'a>(method: &str, p: &'a [Value], index: usize) -> ExecutionResult<&'a [Value]> {
    parameter(method, p, index)?
        .as_list()
        .map(Vec::as_slice)
        .ok_or_else(|| mismatch(method, index, "a list"))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use num_bigint::BigInt;

    use super::*;
    use crate::chain::MockChainClient;
    use crate::library::MethodSignature;
    use crate::testing_utils::{block, mock_state};

    fn call(name: &str, parameters: Vec<Value>) -> ExecutionResult<Value> {
        let library = standard_library::<MockChainClient>()?;
        let signature = MethodSignature::new(
            name,
            parameters.iter().map(Value::value_type).collect(),
        );
        let (mut state, _dir) = mock_state(MockChainClient::new());
        library.resolve(&signature)?.invoke(&parameters, &mut state)
    }

    #[test]
    fn arithmetic_is_arbitrary_precision() {
        let big = BigInt::from(u64::MAX);
        assert_eq!(
            call("multiply", vec![big.clone().into(), big.clone().into()]).unwrap(),
            Value::Integer(&big * &big)
        );
        assert_eq!(
            call("subtract", vec![1u64.into(), 3u64.into()]).unwrap(),
            Value::from(-2i64)
        );
    }

    #[test]
    fn division_by_zero_is_rejected() {
        assert!(matches!(
            call("divide", vec![1u64.into(), 0u64.into()]),
            Err(ExecutionError::InvalidParameters { .. })
        ));
        assert!(matches!(
            call("mod", vec![1u64.into(), 0u64.into()]),
            Err(ExecutionError::InvalidParameters { .. })
        ));
        assert_eq!(
            call("divide", vec![7u64.into(), 2u64.into()]).unwrap(),
            Value::from(3u64)
        );
    }

    #[test]
    fn overloads_dispatch_on_parameter_types() {
        assert_eq!(call("toString", vec![true.into()]).unwrap(), Value::from("true"));
        assert_eq!(
            call("toString", vec![Value::Bytes(vec![0xab, 0x01].into())]).unwrap(),
            Value::from("0xab01")
        );
        assert_eq!(
            call("toString", vec![255u64.into(), 16u64.into()]).unwrap(),
            Value::from("ff")
        );
        assert_eq!(
            call("length", vec![Value::List(vec![1u64.into(), 2u64.into()])]).unwrap(),
            Value::from(2u64)
        );
        assert_eq!(call("length", vec!["héllo".into()]).unwrap(), Value::from(5u64));
        assert_eq!(call("toHex", vec![255u64.into()]).unwrap(), Value::from("0xff"));
    }

    #[test]
    fn membership_and_logic() {
        let list = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(
            call("contains", vec![list.clone(), "b".into()]).unwrap(),
            Value::from(true)
        );
        assert_eq!(call("contains", vec![list, "c".into()]).unwrap(), Value::from(false));
        assert_eq!(
            call("and", vec![true.into(), false.into()]).unwrap(),
            Value::from(false)
        );
        assert_eq!(call("not", vec![false.into()]).unwrap(), Value::from(true));
        assert_eq!(
            call("equals", vec![1u64.into(), 1u64.into()]).unwrap(),
            Value::from(true)
        );
    }

    #[test]
    fn read_contract_queries_at_the_current_block() {
        let token = Address::repeat_byte(0x11);
        let mut client = MockChainClient::new();
        client
            .expect_query_public_member()
            .withf(move |contract, at_block, member, inputs, outputs| {
                contract == &token
                    && at_block == &BigInt::from(42)
                    && member == "totalSupply"
                    && inputs.is_empty()
                    && outputs == ["uint256".to_owned()]
            })
            .returning(|_, _, _, _, _| Ok(vec![Value::from(1000u64)]));

        let library = standard_library::<MockChainClient>().unwrap();
        let (mut state, _dir) = mock_state(client);
        let parameters = vec![
            Value::Address(token),
            "totalSupply".into(),
            Value::List(vec![]),
            Value::List(vec!["uint256".into()]),
        ];
        let signature = MethodSignature::new(
            "readContract",
            parameters.iter().map(Value::value_type).collect(),
        );
        let method = library.resolve(&signature).unwrap();

        assert!(matches!(
            method.invoke(&parameters, &mut state),
            Err(ExecutionError::UnsetCursor { .. })
        ));

        state.reader.set_current_block(block("a", 42));
        assert_eq!(
            method.invoke(&parameters, &mut state).unwrap(),
            Value::List(vec![Value::from(1000u64)])
        );
    }
}
