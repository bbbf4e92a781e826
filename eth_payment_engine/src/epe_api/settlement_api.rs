//! Outbound transfers, from request to settlement.
//!
//! A transfer moves through these steps:
//! 1. [`SettlementApi::request_transfer`] validates the request and stores it as `Pending`. The caller's reference is
//!    the idempotency key.
//! 2. [`SettlementApi::execute_transfer`] claims the transfer, selects a funded custodial account, builds a legacy
//!    (EIP-155) transaction, signs it and broadcasts it. Nonce fetch, signing and broadcast for one account happen
//!    under that account's gate, so an account never signs two transactions with the same nonce. A claimed transfer
//!    that was broadcast but could not be recorded stays claimed and is never broadcast again.
//! 3. [`SettlementApi::process_receipt`] settles the transfer once it is mined. A successful transfer debits the
//!    ledger (amount and gas fee) and is `Confirmed`. A reverted transfer is `Failed` and the ledger is untouched.
//!
//! A failed transfer is final. Paying the recipient again takes a new request, which selects an account afresh.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use epg_common::{checksum, is_null_address, TokenAmount};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, H256, U256};
use log::*;
use tokio::sync::Mutex;

use crate::{
    chain::{encode_transfer_data, BroadcastError, Broadcaster, ChainState, ReceiptSource, TransferReceipt},
    db_types::{InsertResult, NewBalanceEntry, NewTransfer, Transfer, TransferStatus},
    epe_api::{errors::SettlementError, fund_selector::FundSelector, native_currency},
    events::{EventProducers, TransferConfirmed, TransferFailed},
    traits::{CurrencyManagement, CustodialAccountManagement, LedgerManagement, TransferManagement},
    wallets::AccountFactory,
};

type AccountGates = Arc<Mutex<HashMap<Address, Arc<Mutex<()>>>>>;

pub struct SettlementApi<B, C> {
    db: B,
    chain: C,
    factory: AccountFactory,
    selector: FundSelector<B, C>,
    gates: AccountGates,
    producers: EventProducers,
}

impl<B, C> Debug for SettlementApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi ({:?})", self.selector)
    }
}

impl<B, C> SettlementApi<B, C>
where
    B: TransferManagement + LedgerManagement + CustodialAccountManagement + CurrencyManagement,
    C: ChainState + Broadcaster + Clone,
{
    pub fn new(db: B, chain: C, factory: AccountFactory, transfer_gas_limit: u64, producers: EventProducers) -> Self {
        let selector = FundSelector::new(db.clone(), chain.clone(), transfer_gas_limit);
        Self { db, chain, factory, selector, gates: Arc::new(Mutex::new(HashMap::new())), producers }
    }

    pub fn fund_selector(&self) -> &FundSelector<B, C> {
        &self.selector
    }

    /// Stores a new pending transfer. A request with a reference that is already known returns the stored transfer
    /// as [`InsertResult::AlreadyExists`] and changes nothing.
    pub async fn request_transfer(&self, transfer: NewTransfer) -> Result<InsertResult<Transfer>, SettlementError> {
        if !transfer.amount.is_positive() {
            return Err(SettlementError::InvalidTransfer(format!("{} is not a positive amount", transfer.amount)));
        }
        if is_null_address(&transfer.recipient) {
            return Err(SettlementError::InvalidTransfer("the recipient is the null address".into()));
        }
        let currency = &transfer.amount.currency;
        if currency.is_native() {
            native_currency(&self.db, currency.chain_id).await.map_err(SettlementError::database)?;
        } else if self
            .db
            .fetch_currency(currency.chain_id, &currency.address)
            .await
            .map_err(SettlementError::database)?
            .is_none()
        {
            return Err(SettlementError::UnknownCurrency(currency.to_string()));
        }
        transfer.amount.to_base_units()?;
        let result = self.db.insert_transfer(transfer).await.map_err(SettlementError::database)?;
        match &result {
            InsertResult::Inserted(t) => {
                info!("💸️ Transfer #{} [{}] of {} to {} requested", t.id, t.reference, t.amount, checksum(&t.recipient))
            },
            InsertResult::AlreadyExists(t) => debug!("💸️ Transfer [{}] was already requested as #{}", t.reference, t.id),
        }
        Ok(result)
    }

    /// Builds the unsigned transaction that pays `amount` from `sender` to `recipient`. Gas price, gas limit and nonce
    /// are filled in from the chain.
    pub async fn build_transfer_transaction(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: &TokenAmount,
    ) -> Result<TypedTransaction, SettlementError> {
        let chain_id = self.chain.chain_id().await?;
        if chain_id != amount.currency.chain_id {
            return Err(SettlementError::ChainMismatch { expected: amount.currency.chain_id, actual: chain_id });
        }
        let base_units = amount.to_base_units()?;
        let gas_price = self.chain.gas_price().await?;
        let nonce = self.chain.next_nonce(sender).await?;
        let request = TransactionRequest::new()
            .from(*sender)
            .gas(self.selector.transfer_gas_limit())
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(chain_id);
        let request = if amount.is_native() {
            request.to(*recipient).value(base_units)
        } else {
            request.to(amount.currency.address).value(U256::zero()).data(encode_transfer_data(*recipient, base_units))
        };
        trace!("💸️ Built transaction paying {amount} from {} with nonce {nonce}", checksum(sender));
        Ok(TypedTransaction::Legacy(request))
    }

    /// Selects a funded account for the pending transfer, then signs and broadcasts the payout.
    ///
    /// The transfer is claimed in the database before anything else happens, so concurrent calls for one transfer
    /// broadcast it at most once. The others get [`SettlementError::TransferInProgress`].
    ///
    /// If no account can fund the transfer, the claim is released, the transfer stays pending and
    /// [`SettlementError::InsufficientFunds`] is returned. If the network rejects the transaction, the transfer is
    /// marked `Failed` and [`TransferFailed`] is published. A transfer that has already been broadcast is returned
    /// unchanged.
    pub async fn execute_transfer(&self, id: i64) -> Result<Transfer, SettlementError> {
        let transfer = self.pending_transfer(id).await?;
        if transfer.is_submitted() {
            debug!("💸️ Transfer #{id} has already been broadcast");
            return Ok(transfer);
        }
        if !self.db.claim_transfer(id).await.map_err(SettlementError::database)? {
            debug!("💸️ Transfer #{id} is claimed by another executor");
            return Err(SettlementError::TransferInProgress(id));
        }
        let (sender, hash) = match self.broadcast(&transfer).await {
            Ok(submitted) => submitted,
            Err(e) => {
                if let Err(release) = self.db.release_transfer_claim(id).await {
                    error!("💸️ Could not release the claim on transfer #{id}. It will not be retried. {release}");
                }
                return Err(e);
            },
        };
        match self.db.mark_transfer_submitted(id, &sender, &hash).await {
            Ok(transfer) => {
                info!("💸️ Transfer #{id} of {} broadcast from {} in {hash:#x}", transfer.amount, checksum(&sender));
                Ok(transfer)
            },
            Err(e) => {
                error!(
                    "💸️ Transfer #{id} was broadcast in {hash:#x} but could not be recorded. It stays claimed and will \
                     not be broadcast again. {e}"
                );
                Err(SettlementError::SubmissionNotRecorded { id, hash, reason: e.to_string() })
            },
        }
    }

    /// Settles a broadcast transfer against its receipt.
    pub async fn process_receipt(&self, id: i64, receipt: TransferReceipt) -> Result<Transfer, SettlementError> {
        let transfer = self.pending_transfer(id).await?;
        let (Some(sender), Some(hash)) = (transfer.sender, transfer.transaction_hash) else {
            return Err(SettlementError::TransferNotSubmitted(id));
        };
        if hash != receipt.transaction_hash {
            return Err(SettlementError::ReceiptMismatch { id, receipt: receipt.transaction_hash });
        }
        if !receipt.success {
            let reason = SettlementError::TransactionReverted(hash).to_string();
            return self.fail_transfer(id, &reason).await;
        }
        let native = native_currency(&self.db, transfer.amount.currency.chain_id)
            .await
            .map_err(SettlementError::database)?;
        let fee = TokenAmount::from_base_units(native, receipt.fee_paid)?;
        let reference = format!("transfer:{id}");
        let debits = if transfer.amount.is_native() {
            let total = transfer.amount.checked_add(&fee)?;
            vec![NewBalanceEntry::new(sender, total.negated(), reference)]
        } else {
            vec![
                NewBalanceEntry::new(sender, transfer.amount.negated(), reference.clone()),
                NewBalanceEntry::new(sender, fee.negated(), reference),
            ]
        };
        let confirmed = self.db.confirm_transfer(id, debits).await.map_err(SettlementError::database)?;
        info!("💸️ Transfer #{id} confirmed in block {}. Fee paid: {fee}", receipt.block_number);
        self.producers.publish_transfer_confirmed(TransferConfirmed { transfer: confirmed.clone(), receipt }).await;
        Ok(confirmed)
    }

    /// Checks every broadcast, pending transfer for a receipt and settles the ones that have been mined. Returns the
    /// transfers that were settled.
    pub async fn poll_receipts<R: ReceiptSource>(&self, source: &R) -> Result<Vec<Transfer>, SettlementError> {
        let submitted = self.db.fetch_submitted_transfers().await.map_err(SettlementError::database)?;
        let mut settled = Vec::new();
        for transfer in submitted {
            let Some(hash) = transfer.transaction_hash else {
                continue;
            };
            match source.receipt(&hash).await {
                Ok(Some(receipt)) => match self.process_receipt(transfer.id, receipt).await {
                    Ok(t) => settled.push(t),
                    Err(e) => error!("💸️ Could not settle transfer #{}: {e}", transfer.id),
                },
                Ok(None) => trace!("💸️ Transfer #{} ({hash:#x}) has not been mined yet", transfer.id),
                Err(e) => warn!("💸️ Could not fetch the receipt for {hash:#x}: {e}"),
            }
        }
        Ok(settled)
    }

    pub async fn fetch_transfer(&self, id: i64) -> Result<Option<Transfer>, SettlementError> {
        self.db.fetch_transfer(id).await.map_err(SettlementError::database)
    }

    pub async fn unsubmitted_transfers(&self) -> Result<Vec<Transfer>, SettlementError> {
        self.db.fetch_unsubmitted_transfers().await.map_err(SettlementError::database)
    }

    async fn pending_transfer(&self, id: i64) -> Result<Transfer, SettlementError> {
        let transfer = self
            .db
            .fetch_transfer(id)
            .await
            .map_err(SettlementError::database)?
            .ok_or(SettlementError::TransferNotFound(id))?;
        if transfer.status != TransferStatus::Pending {
            return Err(SettlementError::TransferNotPending(id, transfer.status));
        }
        Ok(transfer)
    }

    /// Signs and broadcasts the payout from a selected account, under that account's gate. Returns the sender and the
    /// transaction hash.
    async fn broadcast(&self, transfer: &Transfer) -> Result<(Address, H256), SettlementError> {
        let id = transfer.id;
        let account = self
            .selector
            .select_for_transfer(&transfer.amount)
            .await?
            .ok_or_else(|| SettlementError::InsufficientFunds(transfer.amount.clone()))?;
        let sender = account.address();
        let gate = self.gate_for(sender).await;
        let _guard = gate.lock().await;
        let mut tx = self.build_transfer_transaction(&sender, &transfer.recipient, &transfer.amount).await?;
        let chain_id = transfer.amount.currency.chain_id;
        let raw = self.factory.sign_transaction(&account, &tx, chain_id)?;
        let submitted = match self.chain.submit(raw).await {
            Err(BroadcastError::NonceTooLow(msg)) => {
                let nonce = tx.nonce().copied().unwrap_or_default() + U256::one();
                warn!("💸️ Nonce too low for {account} ({msg}). Retrying transfer #{id} with nonce {nonce}");
                tx.set_nonce(nonce);
                let raw = self.factory.sign_transaction(&account, &tx, chain_id)?;
                self.chain.submit(raw).await
            },
            result => result,
        };
        match submitted {
            Ok(hash) => Ok((sender, hash)),
            Err(BroadcastError::Unavailable(msg)) => {
                warn!("💸️ Transfer #{id} could not be broadcast and remains pending: {msg}");
                Err(SettlementError::BroadcastUnavailable(msg))
            },
            Err(BroadcastError::NonceTooLow(msg) | BroadcastError::Rejected(msg)) => {
                self.fail_transfer(id, &format!("Broadcast rejected: {msg}")).await?;
                Err(SettlementError::BroadcastRejected(msg))
            },
        }
    }

    async fn fail_transfer(&self, id: i64, reason: &str) -> Result<Transfer, SettlementError> {
        let failed = self.db.mark_transfer_failed(id, reason).await.map_err(SettlementError::database)?;
        warn!("💸️ Transfer #{id} failed: {reason}");
        let event = TransferFailed { transfer: failed.clone(), reason: reason.to_string() };
        self.producers.publish_transfer_failed(event).await;
        Ok(failed)
    }

    async fn gate_for(&self, account: Address) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates.entry(account).or_default().clone()
    }
}
