//! Compilation of an [`ExtractionPlan`] into an executable [`Program`].
//!
//! Compilation resolves method overloads against the [`Library`], checks
//! that chain variables exist and are read within their scope, and tracks
//! the type of every user variable so that calls can be resolved before the
//! first block is fetched.

use std::collections::HashMap;
use std::sync::Arc;

use blf_engine::abi::{parse_type, value_type_of};
use blf_engine::eth::{self, EthBlock};
use blf_engine::export::{
    AddCsvRow, AddLogLine, AddXesEvent, CsvExporter, ExportMode, LogExporter, Sink,
    XesAttributeAccessor, XesExporter, XesType,
};
use blf_engine::filter::{
    BlockRangeFilter, ConditionalFilter, LogEntryFilter, LogEntryParameter, LogEntrySignature,
    MemberQuery, SmartContractFilter, TransactionFilter,
};
use blf_engine::instruction::{MethodCall, ValueAccessor, ValueMutator, VariableAssignment};
use blf_engine::library::{Library, MethodSignature};
use blf_engine::stdlib::standard_library;
use blf_engine::variables::{Scope, VariableCatalog};
use blf_engine::{
    ChainClient, EngineConfig, ExecutionError, Instruction, Program, ProgramState, Value,
    ValueType,
};
use num_bigint::BigInt;
use thiserror::Error;

use crate::plan::{
    CallPlan, ExtractionPlan, InstructionPlan, ModePlan, OperandPlan, OutputPlan, XesTypePlan,
};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("variable '{0}' is used before it is assigned")]
    UndefinedVariable(String),

    #[error("unknown chain variable '{0}'")]
    UnknownChainVariable(String),

    #[error("chain variable '{variable}' is only available within a {scope} filter")]
    OutOfScope { variable: String, scope: Scope },

    #[error("{instruction} is only allowed {required}")]
    Misplaced {
        instruction: &'static str,
        required: &'static str,
    },

    #[error("{context}: expected {expected}, found {actual}")]
    TypeMismatch {
        context: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("invalid literal {0}")]
    InvalidLiteral(String),

    #[error(transparent)]
    Engine(#[from] ExecutionError),
}

type Compiled<C> = Box<dyn Instruction<C>>;

/// Builds the state of a run from `config`, registers the sinks the plan
/// asks for and compiles the plan against the standard library.
pub fn prepare<C>(
    plan: &ExtractionPlan,
    client: C,
    config: &EngineConfig,
) -> anyhow::Result<(Program<C>, ProgramState<C>)>
where
    C: ChainClient<Block = EthBlock> + 'static,
{
    let mut state = ProgramState::new(client, Arc::new(eth::catalog()), config)?;
    for sink in sinks(&plan.outputs) {
        state.exporters.register(sink);
    }
    let library = standard_library::<C>()?;
    let program = PlanCompiler::new(&library, state.catalog()).compile(plan)?;
    Ok((program, state))
}

pub fn sinks(outputs: &[OutputPlan]) -> Vec<Box<dyn Sink>> {
    outputs
        .iter()
        .map(|output| -> Box<dyn Sink> {
            match *output {
                OutputPlan::Csv {
                    mode,
                    delimiter: Some(delimiter),
                } => Box::new(CsvExporter::with_delimiter(mode.into(), delimiter)),
                OutputPlan::Csv {
                    mode,
                    delimiter: None,
                } => Box::new(CsvExporter::new(mode.into())),
                OutputPlan::Log { mode } => Box::new(LogExporter::new(mode.into())),
                OutputPlan::Xes { mode } => Box::new(XesExporter::new(mode.into())),
            }
        })
        .collect()
}

impl From<ModePlan> for ExportMode {
    fn from(mode: ModePlan) -> Self {
        match mode {
            ModePlan::Batch => ExportMode::Batch,
            ModePlan::Streaming => ExportMode::Streaming,
        }
    }
}

impl From<XesTypePlan> for XesType {
    fn from(ty: XesTypePlan) -> Self {
        match ty {
            XesTypePlan::Boolean => XesType::Boolean,
            XesTypePlan::Date => XesType::Date,
            XesTypePlan::Float => XesType::Float,
            XesTypePlan::Int => XesType::Int,
            XesTypePlan::String => XesType::String,
        }
    }
}

pub struct PlanCompiler<'a, C: ChainClient> {
    library: &'a Library<C>,
    catalog: &'a VariableCatalog<EthBlock>,
    /// Innermost data scope, `None` outside of any block range.
    scope: Option<Scope>,
    /// User variables visible at each nesting level.
    frames: Vec<HashMap<String, Declared>>,
    /// How often each name was declared, across the whole plan.
    declarations: HashMap<String, usize>,
}

/// A user variable: the type it was declared with and the name it is
/// stored under at runtime.
#[derive(Clone, Debug)]
struct Declared {
    storage: String,
    ty: ValueType,
}

impl<'a, C> PlanCompiler<'a, C>
where
    C: ChainClient<Block = EthBlock> + 'static,
{
    pub fn new(library: &'a Library<C>, catalog: &'a VariableCatalog<EthBlock>) -> Self {
        Self {
            library,
            catalog,
            scope: None,
            frames: vec![HashMap::new()],
            declarations: HashMap::new(),
        }
    }

    pub fn compile(&mut self, plan: &ExtractionPlan) -> Result<Program<C>, CompileError> {
        Ok(Program::new(self.instructions(&plan.instructions)?))
    }

    fn instructions(
        &mut self,
        plans: &[InstructionPlan],
    ) -> Result<Vec<Compiled<C>>, CompileError> {
        plans.iter().map(|plan| self.instruction(plan)).collect()
    }

    /// Compiles one nesting level deeper, within `scope`. Variables
    /// declared inside go out of scope afterwards.
    fn nested<T>(
        &mut self,
        scope: Option<Scope>,
        compile: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let outer = std::mem::replace(&mut self.scope, scope);
        self.frames.push(HashMap::new());
        let compiled = compile(self);
        self.frames.pop();
        self.scope = outer;
        compiled
    }

    /// Declares `name` in the innermost frame and returns its storage name.
    /// Storage names are unique across the plan: later declarations of a
    /// name are stored as `name#1`, `name#2` and so on.
    fn declare(&mut self, name: &str, ty: ValueType) -> String {
        let count = self.declarations.entry(name.to_owned()).or_default();
        let storage = match *count {
            0 => name.to_owned(),
            n => format!("{name}#{n}"),
        };
        *count += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(
                name.to_owned(),
                Declared {
                    storage: storage.clone(),
                    ty,
                },
            );
        }
        storage
    }

    /// The storage name an assignment of a `ty` value to `name` writes to.
    /// A visible variable accepting `ty` is updated in place, otherwise the
    /// assignment declares a new variable shadowing any outer one.
    fn assign(&mut self, name: &str, ty: ValueType) -> String {
        match self.lookup(name) {
            Some(declared) if declared.ty.is_assignable_from(&ty) => declared.storage.clone(),
            _ => self.declare(name, ty),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Declared> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn require_scope(
        &self,
        instruction: &'static str,
        accepted: &[Option<Scope>],
        required: &'static str,
    ) -> Result<(), CompileError> {
        if accepted.contains(&self.scope) {
            Ok(())
        } else {
            Err(CompileError::Misplaced {
                instruction,
                required,
            })
        }
    }

    fn instruction(&mut self, plan: &InstructionPlan) -> Result<Compiled<C>, CompileError> {
        let compiled: Compiled<C> = match plan {
            InstructionPlan::Blocks(plan) => {
                self.require_scope("a block range", &[None], "outside of other filters")?;
                let from = self.typed_operand(&plan.from, &ValueType::Integer, "block range start")?;
                let to = plan
                    .to
                    .as_ref()
                    .map(|to| self.typed_operand(to, &ValueType::Integer, "block range end"))
                    .transpose()?;
                let instructions =
                    self.nested(Some(Scope::Block), |c| c.instructions(&plan.instructions))?;
                Box::new(BlockRangeFilter::new(from, to, instructions))
            }
            InstructionPlan::Transactions(plan) => {
                self.require_scope("a transaction filter", &[Some(Scope::Block)], "within a block range")?;
                let senders = self.address_set(plan.senders.as_ref(), "senders")?;
                let recipients = self.address_set(plan.recipients.as_ref(), "recipients")?;
                let instructions = self.nested(Some(Scope::Transaction), |c| {
                    c.instructions(&plan.instructions)
                })?;
                Box::new(TransactionFilter::new(senders, recipients, instructions))
            }
            InstructionPlan::LogEntries(plan) => {
                self.require_scope(
                    "a log entry filter",
                    &[Some(Scope::Transaction)],
                    "within a transaction filter",
                )?;
                let addresses = self.address_set(plan.addresses.as_ref(), "log entry addresses")?;
                let (signature, instructions) = self.nested(Some(Scope::LogEntry), |c| {
                    let parameters = plan
                        .parameters
                        .iter()
                        .map(|p| {
                            let parameter = LogEntryParameter::new(&p.name, &p.ty, p.indexed)?;
                            let storage = c.declare(&p.name, parameter.value_type());
                            Ok(LogEntryParameter::new(storage, &p.ty, p.indexed)?)
                        })
                        .collect::<Result<Vec<_>, CompileError>>()?;
                    let signature = LogEntrySignature::new(&plan.event, parameters);
                    Ok((signature, c.instructions(&plan.instructions)?))
                })?;
                Box::new(LogEntryFilter::new(signature, addresses, instructions))
            }
            InstructionPlan::If(plan) => {
                let predicate =
                    self.typed_operand(&plan.condition, &ValueType::Boolean, "condition")?;
                let instructions = self.nested(self.scope, |c| c.instructions(&plan.instructions))?;
                Box::new(ConditionalFilter::new(predicate, instructions))
            }
            InstructionPlan::SmartContract(plan) => {
                self.require_scope(
                    "a smart contract filter",
                    &[
                        Some(Scope::Block),
                        Some(Scope::Transaction),
                        Some(Scope::LogEntry),
                    ],
                    "within a block range",
                )?;
                let contract =
                    self.typed_operand(&plan.contract, &ValueType::Address, "smart contract")?;
                let inputs = plan
                    .queries
                    .iter()
                    .map(|query| {
                        query
                            .inputs
                            .iter()
                            .map(|input| self.operand(input).map(|(accessor, _)| accessor))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let (queries, instructions) = self.nested(self.scope, |c| {
                    let mut queries = Vec::with_capacity(plan.queries.len());
                    for (query, inputs) in plan.queries.iter().zip(inputs) {
                        let outputs = query
                            .outputs
                            .iter()
                            .map(|output| {
                                let ty = value_type_of(&parse_type(&output.ty)?);
                                Ok((c.declare(&output.name, ty), output.ty.clone()))
                            })
                            .collect::<Result<Vec<_>, CompileError>>()?;
                        queries.push(MemberQuery::new(&query.member, inputs, outputs));
                    }
                    Ok((queries, c.instructions(&plan.instructions)?))
                })?;
                Box::new(SmartContractFilter::new(contract, queries, instructions))
            }
            InstructionPlan::Assign(plan) => {
                let (value, ty) = self.operand(&plan.value)?;
                let storage = self.assign(&plan.name, ty);
                Box::new(VariableAssignment::new(storage, value))
            }
            InstructionPlan::Call(plan) => Box::new(self.call(plan)?),
            InstructionPlan::CsvRow(plan) => {
                let columns = plan
                    .columns
                    .iter()
                    .map(|(name, operand)| Ok((name.clone(), self.operand(operand)?.0)))
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Box::new(AddCsvRow::new(&plan.table, columns))
            }
            InstructionPlan::LogLine(plan) => {
                let parts = plan
                    .parts
                    .iter()
                    .map(|part| self.operand(part).map(|(accessor, _)| accessor))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(AddLogLine::new(parts))
            }
            InstructionPlan::XesEvent(plan) => {
                let trace = self.operand(&plan.trace)?.0;
                let event = self.operand(&plan.event)?.0;
                let attributes = plan
                    .attributes
                    .iter()
                    .map(|attribute| {
                        Ok(XesAttributeAccessor {
                            key: attribute.key.clone(),
                            ty: attribute.ty.into(),
                            value: self.operand(&attribute.value)?.0,
                        })
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Box::new(AddXesEvent::new(trace, event, attributes))
            }
        };
        Ok(compiled)
    }

    fn call(&mut self, plan: &CallPlan) -> Result<MethodCall<C>, CompileError> {
        let (parameters, types): (Vec<_>, Vec<_>) = plan
            .parameters
            .iter()
            .map(|parameter| self.operand(parameter))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();
        let method = self
            .library
            .resolve(&MethodSignature::new(&plan.method, types))?;
        let result = plan
            .result
            .as_deref()
            .map(|result| ValueMutator::new(self.assign(result, method.return_type().clone())));
        Ok(MethodCall::new(method, parameters, result))
    }

    /// An operand whose value must be of type `expected`. Operands of
    /// unknown type are checked when evaluated.
    fn typed_operand(
        &mut self,
        plan: &OperandPlan,
        expected: &ValueType,
        context: &str,
    ) -> Result<ValueAccessor<C>, CompileError> {
        let (accessor, actual) = self.operand(plan)?;
        if actual == ValueType::Any || expected.is_assignable_from(&actual) {
            Ok(accessor)
        } else {
            Err(CompileError::TypeMismatch {
                context: context.to_owned(),
                expected: expected.clone(),
                actual,
            })
        }
    }

    /// An optional address or list of addresses.
    fn address_set(
        &mut self,
        plan: Option<&OperandPlan>,
        context: &str,
    ) -> Result<Option<ValueAccessor<C>>, CompileError> {
        let Some(plan) = plan else {
            return Ok(None);
        };
        let (accessor, actual) = self.operand(plan)?;
        match actual {
            ValueType::Any | ValueType::Address => Ok(Some(accessor)),
            ValueType::List(ref element)
                if matches!(**element, ValueType::Any | ValueType::Address) =>
            {
                Ok(Some(accessor))
            }
            actual => Err(CompileError::TypeMismatch {
                context: context.to_owned(),
                expected: ValueType::list(ValueType::Address),
                actual,
            }),
        }
    }

    fn operand(
        &mut self,
        plan: &OperandPlan,
    ) -> Result<(ValueAccessor<C>, ValueType), CompileError> {
        Ok(match plan {
            OperandPlan::Variable { var } => {
                let Declared { storage, ty } = self
                    .lookup(var)
                    .cloned()
                    .ok_or_else(|| CompileError::UndefinedVariable(var.clone()))?;
                (ValueAccessor::Variable(storage), ty)
            }
            OperandPlan::Chain { chain } => {
                let variable = self
                    .catalog
                    .get(chain)
                    .ok_or_else(|| CompileError::UnknownChainVariable(chain.clone()))?;
                if !self.scope.is_some_and(|scope| variable.is_visible_in(scope)) {
                    return Err(CompileError::OutOfScope {
                        variable: chain.clone(),
                        scope: variable.scope(),
                    });
                }
                (
                    ValueAccessor::Chain(chain.clone()),
                    variable.value_type().clone(),
                )
            }
            OperandPlan::Call { call } => {
                let call = self.call(call)?;
                let ty = call.method().return_type().clone();
                (ValueAccessor::Call(Box::new(call)), ty)
            }
            OperandPlan::List { list } => {
                let (items, types): (Vec<_>, Vec<_>) = list
                    .iter()
                    .map(|item| self.operand(item))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .unzip();
                (ValueAccessor::List(items), list_type(types))
            }
            OperandPlan::Address { address } => {
                (ValueAccessor::Literal((*address).into()), ValueType::Address)
            }
            OperandPlan::Bytes { bytes } => {
                (ValueAccessor::Literal(bytes.clone().into()), ValueType::Bytes)
            }
            OperandPlan::Integer { int } => (
                ValueAccessor::Literal(parse_integer(int)?.into()),
                ValueType::Integer,
            ),
            OperandPlan::Literal(json) => {
                let value = literal(json)?;
                let ty = value.value_type();
                (ValueAccessor::Literal(value), ty)
            }
        })
    }
}

/// The type of a list literal: its element type if all elements agree.
fn list_type(types: Vec<ValueType>) -> ValueType {
    let mut types = types.into_iter();
    let Some(first) = types.next() else {
        return ValueType::list(ValueType::Any);
    };
    if types.all(|ty| ty == first) {
        ValueType::list(first)
    } else {
        ValueType::list(ValueType::Any)
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
fn parse_integer(text: &str) -> Result<BigInt, CompileError> {
    let (digits, radix) = match text.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    BigInt::parse_bytes(digits.as_bytes(), radix)
        .ok_or_else(|| CompileError::InvalidLiteral(text.to_owned()))
}

fn literal(json: &serde_json::Value) -> Result<Value, CompileError> {
    use serde_json::Value as Json;

    match json {
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::from)
            .or_else(|| n.as_u64().map(Value::from))
            .ok_or_else(|| CompileError::InvalidLiteral(n.to_string())),
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(literal)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Json::Null | Json::Object(_) => Err(CompileError::InvalidLiteral(json.to_string())),
    }
}
