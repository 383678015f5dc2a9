use std::marker::PhantomData;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{keccak256, Address, Bytes};
use alloy::rpc::types::{Block, BlockId, BlockTransactionsKind, TransactionReceipt};
use alloy::{providers::Provider, transports::Transport};
use anyhow::Context as _;
use blf_engine::abi::{default_type, parse_type, value_from_sol, value_to_sol};
use blf_engine::eth::EthBlock;
use blf_engine::{ChainClient, Value};
use futures::future::try_join_all;
use itertools::Itertools as _;
use num_bigint::BigInt;
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::convert;

/// A [`ChainClient`] backed by an alloy provider.
///
/// The engine is synchronous, so the client owns a single threaded tokio
/// runtime and blocks on every request.
pub struct RpcChainClient<ProviderT, TransportT> {
    provider: ProviderT,
    runtime: Runtime,
    _phantom: PhantomData<TransportT>,
}

impl<ProviderT, TransportT> RpcChainClient<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    pub fn new(provider: ProviderT) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start the RPC runtime")?;
        Ok(Self {
            provider,
            runtime,
            _phantom: PhantomData,
        })
    }

    async fn fetch_receipts(&self, block: &Block) -> anyhow::Result<Vec<TransactionReceipt>> {
        let hashes = block
            .transactions
            .as_transactions()
            .unwrap_or_default()
            .iter()
            .map(|tx| tx.hash);
        try_join_all(hashes.map(|hash| async move {
            self.provider
                .get_transaction_receipt(hash)
                .await?
                .with_context(|| format!("receipt of transaction {hash} not found"))
        }))
        .await
    }
}

/// The 4-byte selector of `member` called with arguments of `types`.
fn function_selector(member: &str, types: &[DynSolType]) -> [u8; 4] {
    let signature = format!(
        "{member}({})",
        types.iter().map(|ty| ty.sol_type_name()).join(",")
    );
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encodes the calldata of `member(inputs)`, inferring the argument types
/// from the values.
fn encode_call(member: &str, inputs: &[Value]) -> anyhow::Result<Bytes> {
    let types = inputs.iter().map(default_type).collect::<Vec<_>>();
    let arguments = inputs
        .iter()
        .zip(&types)
        .map(|(value, ty)| value_to_sol(value, ty))
        .collect::<Result<Vec<_>, _>>()?;

    let mut calldata = function_selector(member, &types).to_vec();
    calldata.extend(DynSolValue::Tuple(arguments).abi_encode_params());
    Ok(calldata.into())
}

fn decode_output(output: &[u8], output_types: &[String]) -> anyhow::Result<Vec<Value>> {
    let ty = DynSolType::Tuple(
        output_types
            .iter()
            .map(|name| parse_type(name))
            .collect::<Result<_, _>>()?,
    );
    let decoded = ty
        .abi_decode_sequence(output)
        .context("failed to decode the call result")?;
    Ok(decoded
        .as_tuple()
        .map(<[_]>::to_vec)
        .unwrap_or_default()
        .into_iter()
        .map(value_from_sol)
        .collect())
}

impl<ProviderT, TransportT> ChainClient for RpcChainClient<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    type Block = EthBlock;

    fn latest_block_number(&self) -> anyhow::Result<BigInt> {
        let number = self.runtime.block_on(self.provider.get_block_number())?;
        Ok(BigInt::from(number))
    }

    fn block_by_number(&self, number: &BigInt) -> anyhow::Result<EthBlock> {
        let number = u64::try_from(number).context("block number out of range")?;
        self.runtime.block_on(async {
            let block = self
                .provider
                .get_block(BlockId::number(number), BlockTransactionsKind::Full)
                .await?
                .with_context(|| format!("block {number} not found"))?;
            let receipts = self.fetch_receipts(&block).await?;
            debug!("Fetched block {number} with {} receipts", receipts.len());
            convert::eth_block(&block, &receipts)
        })
    }

    fn query_public_member(
        &self,
        contract: &Address,
        at_block: &BigInt,
        member: &str,
        inputs: &[Value],
        output_types: &[String],
    ) -> anyhow::Result<Vec<Value>> {
        let at_block = u64::try_from(at_block).context("block number out of range")?;
        let calldata = encode_call(member, inputs)?;
        let output = self.runtime.block_on(self.provider.raw_request::<_, Bytes>(
            "eth_call".into(),
            (
                json!({"to": contract, "data": calldata}),
                &format!("{:#x}", at_block),
            ),
        ))?;
        decode_output(&output, output_types)
            .with_context(|| format!("unexpected result of {member} on {contract}"))
    }
}
