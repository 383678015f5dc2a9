//! Registry of built-in callables with structural overload resolution.
//!
//! Methods are keyed by name and parameter types. A call is resolved in two
//! phases: an exact structural match wins immediately, otherwise the unique
//! method whose parameters are each assignable from the call's actual
//! parameter types is selected. Zero or several compatible methods are
//! errors; the library never picks one of several candidates.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use tracing::trace;

use crate::chain::ChainClient;
use crate::error::{ExecutionError, ExecutionResult};
use crate::program::ProgramState;
use crate::value::{Value, ValueType};

/// Name plus ordered parameter types. Equality is structural.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MethodSignature {
    name: String,
    parameter_types: Vec<ValueType>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, parameter_types: Vec<ValueType>) -> Self {
        Self {
            name: name.into(),
            parameter_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[ValueType] {
        &self.parameter_types
    }

    /// Whether a call with signature `call` may be dispatched to a method
    /// declared with `self`: same name, same arity, and every formal
    /// parameter assignable from the actual one at the same position.
    pub fn is_assignable_from(&self, call: &MethodSignature) -> bool {
        self.name == call.name
            && self.parameter_types.len() == call.parameter_types.len()
            && self
                .parameter_types
                .iter()
                .zip(&call.parameter_types)
                .all(|(expected, actual)| expected.is_assignable_from(actual))
    }
}

impl Display for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, ty) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

/// The callable behind a [`Method`]. Parameters are already validated
/// against the signature when it is invoked.
pub type MethodFn<C> =
    Arc<dyn Fn(&[Value], &mut ProgramState<C>) -> ExecutionResult<Value> + Send + Sync>;

/// A registered built-in. Immutable once created.
pub struct Method<C: ChainClient> {
    signature: MethodSignature,
    return_type: ValueType,
    callable: MethodFn<C>,
}

impl<C: ChainClient> Debug for Method<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("signature", &self.signature)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl<C: ChainClient> Method<C> {
    pub fn new<F>(signature: MethodSignature, return_type: ValueType, callable: F) -> Self
    where
        F: Fn(&[Value], &mut ProgramState<C>) -> ExecutionResult<Value> + Send + Sync + 'static,
    {
        Self {
            signature,
            return_type,
            callable: Arc::new(callable),
        }
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    /// Validates arity and parameter types, then calls the method.
    pub fn invoke(&self, parameters: &[Value], state: &mut ProgramState<C>) -> ExecutionResult<Value> {
        self.validate(parameters)?;
        (self.callable)(parameters, state)
    }

    fn validate(&self, parameters: &[Value]) -> ExecutionResult<()> {
        let expected = self.signature.parameter_types();
        if parameters.len() != expected.len() {
            return Err(ExecutionError::invalid_parameters(
                self.signature.to_string(),
                format!(
                    "expected {} parameters, got {}",
                    expected.len(),
                    parameters.len()
                ),
            ));
        }
        for (position, (ty, value)) in expected.iter().zip(parameters).enumerate() {
            let actual = value.value_type();
            if !ty.is_assignable_from(&actual) {
                return Err(ExecutionError::invalid_parameters(
                    self.signature.to_string(),
                    format!("parameter {position} must be {ty}, got {actual}"),
                ));
            }
        }
        Ok(())
    }
}

/// The set of methods callable from a program.
pub struct Library<C: ChainClient> {
    // Grouped by name, in registration order.
    methods: HashMap<String, Vec<Arc<Method<C>>>>,
}

impl<C: ChainClient> Default for Library<C> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<C: ChainClient> Clone for Library<C> {
    fn clone(&self) -> Self {
        Self {
            methods: self.methods.clone(),
        }
    }
}

impl<C: ChainClient> Debug for Library<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.methods.values().flatten().map(|it| &it.signature))
            .finish()
    }
}

impl<C: ChainClient> Library<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method. Fails with [`ExecutionError::InvalidLibraryState`]
    /// if a method with an equal signature already exists.
    pub fn add_method(&mut self, method: Method<C>) -> ExecutionResult<()> {
        let overloads = self
            .methods
            .entry(method.signature.name.clone())
            .or_default();
        if overloads.iter().any(|it| it.signature == method.signature) {
            return Err(ExecutionError::InvalidLibraryState(format!(
                "method {} is already registered",
                method.signature
            )));
        }
        overloads.push(Arc::new(method));
        Ok(())
    }

    /// Convenience wrapper around [`Library::add_method`].
    pub fn register<F>(
        &mut self,
        name: &str,
        parameter_types: Vec<ValueType>,
        return_type: ValueType,
        callable: F,
    ) -> ExecutionResult<()>
    where
        F: Fn(&[Value], &mut ProgramState<C>) -> ExecutionResult<Value> + Send + Sync + 'static,
    {
        self.add_method(Method::new(
            MethodSignature::new(name, parameter_types),
            return_type,
            callable,
        ))
    }

    /// Selects the method a call with signature `call` dispatches to.
    pub fn resolve(&self, call: &MethodSignature) -> ExecutionResult<Arc<Method<C>>> {
        let overloads = self
            .methods
            .get(call.name())
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Some(exact) = overloads.iter().find(|it| &it.signature == call) {
            trace!("resolved {call} by exact match");
            return Ok(exact.clone());
        }

        let mut candidates = overloads
            .iter()
            .filter(|it| it.signature.is_assignable_from(call));
        match (candidates.next(), candidates.next()) {
            (None, _) => Err(ExecutionError::NoSuchMethod(call.clone())),
            (Some(method), None) => {
                trace!("resolved {call} to {}", method.signature);
                Ok(method.clone())
            }
            (Some(_), Some(_)) => Err(ExecutionError::AmbiguousMethod {
                signature: call.clone(),
                candidates: overloads
                    .iter()
                    .filter(|it| it.signature.is_assignable_from(call))
                    .map(|it| it.signature.clone())
                    .collect(),
            }),
        }
    }

    pub fn contains(&self, signature: &MethodSignature) -> bool {
        self.methods
            .get(signature.name())
            .is_some_and(|overloads| overloads.iter().any(|it| &it.signature == signature))
    }

    pub fn len(&self) -> usize {
        self.methods.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::testing_utils::mock_state;

    type Lib = Library<MockChainClient>;

    fn constant(value: &'static str) -> impl Fn(&[Value], &mut ProgramState<MockChainClient>) -> ExecutionResult<Value> + Send + Sync {
        move |_, _| Ok(Value::from(value))
    }

    fn sig(name: &str, types: &[ValueType]) -> MethodSignature {
        MethodSignature::new(name, types.to_vec())
    }

    #[test]
    fn duplicate_signatures_are_rejected() {
        let mut library = Lib::new();
        library
            .register("f", vec![ValueType::Integer], ValueType::String, constant("a"))
            .unwrap();
        let err = library
            .register("f", vec![ValueType::Integer], ValueType::Boolean, constant("b"))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidLibraryState(_)));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn exact_match_wins_over_compatible_ones() {
        let mut library = Lib::new();
        library
            .register("show", vec![ValueType::Any], ValueType::String, constant("any"))
            .unwrap();
        library
            .register("show", vec![ValueType::Integer], ValueType::String, constant("int"))
            .unwrap();

        let method = library.resolve(&sig("show", &[ValueType::Integer])).unwrap();
        assert_eq!(method.signature(), &sig("show", &[ValueType::Integer]));

        let method = library.resolve(&sig("show", &[ValueType::Boolean])).unwrap();
        assert_eq!(method.signature(), &sig("show", &[ValueType::Any]));
    }

    #[test]
    fn compatible_lists_resolve() {
        let mut library = Lib::new();
        library
            .register(
                "length",
                vec![ValueType::list(ValueType::Any)],
                ValueType::Integer,
                constant("list"),
            )
            .unwrap();
        library
            .register("length", vec![ValueType::String], ValueType::Integer, constant("string"))
            .unwrap();

        let method = library
            .resolve(&sig("length", &[ValueType::list(ValueType::Address)]))
            .unwrap();
        assert_eq!(
            method.signature().parameter_types(),
            &[ValueType::list(ValueType::Any)]
        );
    }

    #[test]
    fn ambiguity_is_an_error() {
        let mut library = Lib::new();
        library
            .register(
                "pair",
                vec![ValueType::Any, ValueType::String],
                ValueType::String,
                constant("left"),
            )
            .unwrap();
        library
            .register(
                "pair",
                vec![ValueType::String, ValueType::Any],
                ValueType::String,
                constant("right"),
            )
            .unwrap();

        let err = library
            .resolve(&sig("pair", &[ValueType::String, ValueType::String]))
            .unwrap_err();
        match err {
            ExecutionError::AmbiguousMethod { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_calls_fail() {
        let mut library = Lib::new();
        library
            .register("f", vec![ValueType::Integer], ValueType::Integer, constant("f"))
            .unwrap();

        assert!(matches!(
            library.resolve(&sig("g", &[ValueType::Integer])),
            Err(ExecutionError::NoSuchMethod(_))
        ));
        assert!(matches!(
            library.resolve(&sig("f", &[ValueType::Integer, ValueType::Integer])),
            Err(ExecutionError::NoSuchMethod(_))
        ));
        assert!(matches!(
            library.resolve(&sig("f", &[ValueType::String])),
            Err(ExecutionError::NoSuchMethod(_))
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut library = Lib::new();
        for ty in [ValueType::Integer, ValueType::Any, ValueType::Bytes] {
            library
                .register("f", vec![ty], ValueType::String, constant("f"))
                .unwrap();
        }
        let call = sig("f", &[ValueType::Address]);
        let first = library.resolve(&call).unwrap();
        for _ in 0..16 {
            assert!(Arc::ptr_eq(&first, &library.resolve(&call).unwrap()));
        }
    }

    #[test]
    fn invocation_validates_parameters() {
        let (mut state, _dir) = mock_state(MockChainClient::new());
        let method = Method::new(
            sig("f", &[ValueType::Integer]),
            ValueType::String,
            constant("ok"),
        );

        assert_eq!(
            method.invoke(&[Value::from(1u64)], &mut state).unwrap(),
            Value::from("ok")
        );
        assert!(matches!(
            method.invoke(&[], &mut state),
            Err(ExecutionError::InvalidParameters { .. })
        ));
        assert!(matches!(
            method.invoke(&[Value::from("1")], &mut state),
            Err(ExecutionError::InvalidParameters { .. })
        ));
    }
}
