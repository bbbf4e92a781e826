//! Data types that are stored by, and returned from, the engine's storage backends.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use epg_common::{checksum, TokenAmount};
use ethers::types::{Address, H256};
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ConfirmedTransaction;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

/// The outcome of an idempotent insert. A repeated insert returns the record that is already stored.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult<T> {
    Inserted(T),
    AlreadyExists(T),
}

impl<T> InsertResult<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            InsertResult::Inserted(v) | InsertResult::AlreadyExists(v) => v,
        }
    }
}

macro_rules! string_enum {
    ($name:ident, $default:ident, { $($variant:ident),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => f.write_str(stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok($name::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!("Invalid {}: {value}. Defaulting to {}", stringify!($name), stringify!($default));
                    $name::$default
                })
            }
        }
    };
}

//--------------------------------------      Ledger       -----------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct NewBalanceEntry {
    pub account: Address,
    pub amount: TokenAmount,
    pub source_reference: String,
}

impl NewBalanceEntry {
    pub fn new<S: Into<String>>(account: Address, amount: TokenAmount, source_reference: S) -> Self {
        Self { account, amount, source_reference: source_reference.into() }
    }
}

/// An immutable, signed movement of funds on a custodial account. Credits are positive, debits negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub id: i64,
    pub account: Address,
    pub amount: TokenAmount,
    pub source_reference: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Orders       -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order is waiting for payment
    Open,
    /// Payments for the order have reached the requested amount
    Settled,
    /// The order was abandoned before it was settled
    Expired,
}

string_enum!(OrderStatusType, Open, { Open, Settled, Expired });

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub reference: String,
    pub requested: TokenAmount,
}

impl NewOrder {
    pub fn new<S: Into<String>>(reference: S, requested: TokenAmount) -> Self {
        Self { reference: reference.into(), requested }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub reference: String,
    pub requested: TokenAmount,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      Routes       -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStatus {
    Open,
    Expired,
    Filled,
}

string_enum!(RouteStatus, Open, { Open, Expired, Filled });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteType {
    Internal,
    Blockchain,
    OffChain,
}

string_enum!(RouteType, Internal, { Internal, Blockchain, OffChain });

/// The mechanism through which an order can be paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteKind {
    /// Payment by another user of the gateway, moved between accounts on the ledger.
    Internal { receiver: String },
    /// Payment by an on-chain transfer into `account` between `start_block` and `expiration_block`, inclusive.
    Blockchain { account: Address, start_block: u64, expiration_block: u64 },
    /// Payment through an off-chain payment channel before `expiration_time`.
    OffChain { channel_identity: String, expiration_time: DateTime<Utc> },
}

impl RouteKind {
    pub fn route_type(&self) -> RouteType {
        match self {
            RouteKind::Internal { .. } => RouteType::Internal,
            RouteKind::Blockchain { .. } => RouteType::Blockchain,
            RouteKind::OffChain { .. } => RouteType::OffChain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRoute {
    pub id: i64,
    pub order_id: i64,
    pub kind: RouteKind,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRoute {
    pub fn is_open(&self) -> bool {
        self.status == RouteStatus::Open
    }
}

impl Display for PaymentRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RouteKind::Internal { receiver } => write!(f, "internal route #{} to {receiver}", self.id),
            RouteKind::Blockchain { account, start_block, expiration_block } => write!(
                f,
                "blockchain route #{} to {} (blocks {start_block}-{expiration_block})",
                self.id,
                checksum(account)
            ),
            RouteKind::OffChain { channel_identity, expiration_time } => {
                write!(f, "off-chain route #{} via {channel_identity} (until {expiration_time})", self.id)
            },
        }
    }
}

//--------------------------------------     Payments      -----------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: i64,
    pub route_id: i64,
    pub amount: TokenAmount,
    /// Identifies the payment within the route, e.g. the transaction hash for blockchain payments.
    pub source_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub route_id: i64,
    pub amount: TokenAmount,
    pub source_reference: String,
    pub created_at: DateTime<Utc>,
}

/// The result of recording a payment against a route.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecordResult {
    pub payment: InsertResult<Payment>,
    /// The order, if this payment caused it to be settled.
    pub settled_order: Option<Order>,
}

/// A deposit into an account with an open route, in a currency other than the one the order asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUnreconciledDeposit {
    pub route_id: i64,
    pub account: Address,
    pub transaction_hash: H256,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreconciledDeposit {
    pub id: i64,
    pub route_id: i64,
    pub account: Address,
    pub transaction_hash: H256,
    pub amount: TokenAmount,
    pub created_at: DateTime<Utc>,
}

/// A confirmed value transfer into a custodial account.
#[derive(Debug, Clone, PartialEq)]
pub struct Deposit {
    pub account: Address,
    pub transaction: ConfirmedTransaction,
    pub amount: TokenAmount,
}

//--------------------------------------     Transfers     -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

string_enum!(TransferStatus, Pending, { Pending, Confirmed, Failed });

/// A request to pay funds out of custody.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransfer {
    /// Caller-supplied idempotency key
    pub reference: String,
    pub amount: TokenAmount,
    pub recipient: Address,
}

impl NewTransfer {
    pub fn new<S: Into<String>>(reference: S, amount: TokenAmount, recipient: Address) -> Self {
        Self { reference: reference.into(), amount, recipient }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub reference: String,
    pub amount: TokenAmount,
    pub recipient: Address,
    pub status: TransferStatus,
    pub sender: Option<Address>,
    pub transaction_hash: Option<H256>,
    pub failure_reason: Option<String>,
    /// When an executor took the transfer over for signing and broadcast.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    /// A transfer that has been broadcast and is waiting for its receipt.
    pub fn is_submitted(&self) -> bool {
        self.status == TransferStatus::Pending && self.transaction_hash.is_some()
    }

    /// A pending transfer that an executor has taken over but not recorded as broadcast.
    pub fn is_claimed(&self) -> bool {
        self.status == TransferStatus::Pending && self.transaction_hash.is_none() && self.claimed_at.is_some()
    }
}
