//! Transaction and internal (call-trace) transaction transforms.

use clickhouse::rowkey::{ITX_PREFIX, TX_PREFIX, itx_row_key, tx_row_key};
use eyre::Result;
use primitives::{Block, BulkMutations, Mutation};

use crate::transforms::{SignalCache, Transform, push_native_balance_signal};

const TX_FAMILY: &str = "t";
const ITX_FAMILY: &str = "i";

/// Writes one `TX:<number>:<index>` row per top-level transaction and signals
/// native-balance recomputation for the parties of successful value
/// transfers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxTransform;

impl Transform for TxTransform {
    fn name(&self) -> &'static str {
        "txs"
    }

    fn prefix(&self) -> &'static str {
        TX_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        let mut metadata = BulkMutations::new();

        for tx in &block.transactions {
            let mut mutation = Mutation::new()
                .set_cell(TX_FAMILY, "hash", format!("{:#x}", tx.hash))
                .set_cell(TX_FAMILY, "from", format!("{:#x}", tx.from));
            if let Some(to) = tx.to {
                mutation = mutation.set_cell(TX_FAMILY, "to", format!("{to:#x}"));
            }
            mutation = mutation
                .set_cell(TX_FAMILY, "nonce", tx.nonce.to_string())
                .set_cell(TX_FAMILY, "value", tx.value.to_string())
                .set_cell(TX_FAMILY, "gas_limit", tx.gas_limit.to_string())
                .set_cell(TX_FAMILY, "gas_used", tx.gas_used.to_string())
                .set_cell(TX_FAMILY, "effective_gas_price", tx.effective_gas_price.to_string())
                .set_cell(TX_FAMILY, "status", u8::from(tx.status).to_string());
            if tx.input.len() >= 4 {
                let method = format!("0x{}", hex::encode(&tx.input[..4]));
                mutation = mutation.set_cell(TX_FAMILY, "method", method);
            }
            if let Some(contract) = tx.contract_address {
                let contract = format!("{contract:#x}");
                mutation = mutation.set_cell(TX_FAMILY, "contract_address", contract);
            }
            data.push(tx_row_key(block.number, tx.index), mutation);

            if tx.status && !tx.value.is_zero() {
                push_native_balance_signal(&mut metadata, cache, tx.from);
                if let Some(to) = tx.to {
                    push_native_balance_signal(&mut metadata, cache, to);
                }
            }
        }

        Ok((data, metadata))
    }
}

/// Writes one `ITX:<number>:<index>:<path>` row per value-carrying internal
/// call frame. Signals are only raised for frames that actually moved value:
/// the enclosing transaction succeeded and the frame itself did not revert.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalTxTransform;

impl Transform for InternalTxTransform {
    fn name(&self) -> &'static str {
        "itxs"
    }

    fn prefix(&self) -> &'static str {
        ITX_PREFIX
    }

    fn apply(
        &self,
        block: &Block,
        cache: &SignalCache,
    ) -> Result<(BulkMutations, BulkMutations)> {
        let mut data = BulkMutations::new();
        let mut metadata = BulkMutations::new();

        for tx in &block.transactions {
            for itx in &tx.internal {
                if itx.value.is_zero() {
                    continue;
                }
                let mutation = Mutation::new()
                    .set_cell(ITX_FAMILY, "from", format!("{:#x}", itx.from))
                    .set_cell(ITX_FAMILY, "to", format!("{:#x}", itx.to))
                    .set_cell(ITX_FAMILY, "value", itx.value.to_string())
                    .set_cell(ITX_FAMILY, "call_type", itx.call_type.clone());
                data.push(itx_row_key(block.number, tx.index, &itx.path_label()), mutation);

                if tx.status && itx.error.is_none() {
                    push_native_balance_signal(&mut metadata, cache, itx.from);
                    push_native_balance_signal(&mut metadata, cache, itx.to);
                }
            }
        }

        Ok((data, metadata))
    }
}
