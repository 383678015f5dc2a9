//! The serialized form of an extraction program.
//!
//! A plan is a JSON document listing the output sinks and the instruction
//! tree:
//!
//! ```json
//! {
//!   "outputs": [{ "format": "csv", "mode": "batch" }],
//!   "instructions": [{
//!     "blocks": {
//!       "from": 19000000,
//!       "to": 19000010,
//!       "instructions": [{
//!         "csv_row": {
//!           "table": "blocks",
//!           "columns": { "number": { "chain": "block.number" } }
//!         }
//!       }]
//!     }
//!   }]
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use alloy::primitives::{Address, Bytes};
use anyhow::Context as _;
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPlan {
    #[serde(default)]
    pub outputs: Vec<OutputPlan>,
    pub instructions: Vec<InstructionPlan>,
}

impl ExtractionPlan {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open plan {}", path.display()))?;
        let des = &mut serde_json::Deserializer::from_reader(BufReader::new(file));
        serde_path_to_error::deserialize(des)
            .with_context(|| format!("invalid plan {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let des = &mut serde_json::Deserializer::from_str(json);
        Ok(serde_path_to_error::deserialize(des)?)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ModePlan {
    #[default]
    Batch,
    Streaming,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputPlan {
    Csv {
        #[serde(default)]
        mode: ModePlan,
        delimiter: Option<char>,
    },
    Log {
        #[serde(default)]
        mode: ModePlan,
    },
    Xes {
        #[serde(default)]
        mode: ModePlan,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InstructionPlan {
    Blocks(BlocksPlan),
    Transactions(TransactionsPlan),
    LogEntries(LogEntriesPlan),
    If(ConditionPlan),
    SmartContract(SmartContractPlan),
    Assign(AssignPlan),
    Call(CallPlan),
    CsvRow(CsvRowPlan),
    LogLine(LogLinePlan),
    XesEvent(XesEventPlan),
}

/// Walks the blocks `from..=to`, or follows the chain head if `to` is
/// omitted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BlocksPlan {
    pub from: OperandPlan,
    pub to: Option<OperandPlan>,
    #[serde(default)]
    pub instructions: Vec<InstructionPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransactionsPlan {
    pub senders: Option<OperandPlan>,
    pub recipients: Option<OperandPlan>,
    #[serde(default)]
    pub instructions: Vec<InstructionPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogEntriesPlan {
    pub event: String,
    #[serde(default)]
    pub parameters: Vec<EventParameterPlan>,
    pub addresses: Option<OperandPlan>,
    #[serde(default)]
    pub instructions: Vec<InstructionPlan>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EventParameterPlan {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub indexed: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConditionPlan {
    pub condition: OperandPlan,
    #[serde(default)]
    pub instructions: Vec<InstructionPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SmartContractPlan {
    pub contract: OperandPlan,
    pub queries: Vec<MemberQueryPlan>,
    #[serde(default)]
    pub instructions: Vec<InstructionPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemberQueryPlan {
    pub member: String,
    #[serde(default)]
    pub inputs: Vec<OperandPlan>,
    pub outputs: Vec<MemberOutputPlan>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemberOutputPlan {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssignPlan {
    pub name: String,
    pub value: OperandPlan,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CallPlan {
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<OperandPlan>,
    /// Variable receiving the result, if any.
    pub result: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CsvRowPlan {
    pub table: String,
    pub columns: IndexMap<String, OperandPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogLinePlan {
    pub parts: Vec<OperandPlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct XesEventPlan {
    pub trace: OperandPlan,
    pub event: OperandPlan,
    #[serde(default)]
    pub attributes: Vec<XesAttributePlan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct XesAttributePlan {
    pub key: String,
    #[serde(rename = "type")]
    pub ty: XesTypePlan,
    pub value: OperandPlan,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum XesTypePlan {
    Boolean,
    Date,
    Float,
    Int,
    String,
}

/// A value source.
///
/// Typed literals are written as single-key objects; bare JSON booleans,
/// integers, strings and arrays are literals of the obvious type. Integers
/// beyond the JSON number range are given as decimal or `0x` strings under
/// `int`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OperandPlan {
    Variable {
        var: String,
    },
    Chain {
        chain: String,
    },
    Call {
        call: CallPlan,
    },
    List {
        list: Vec<OperandPlan>,
    },
    Address {
        address: Address,
    },
    Bytes {
        bytes: Bytes,
    },
    Integer {
        int: String,
    },
    Literal(serde_json::Value),
}
