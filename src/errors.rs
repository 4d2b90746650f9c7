use concordium_std::*;

pub type AuctionResult<A> = Result<A, AuctionError>;

/// The custom errors the contract can produce.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Reject, SchemaType)]
pub enum AuctionError {
    /// Failed parsing the parameter (Error code: -1).
    #[from(ParseError)]
    ParseParams,
    /// Failed logging: Log is full (Error code: -2).
    LogFull,
    /// Failed logging: Log is malformed (Error code: -3).
    LogMalformed,
    /// Reserve price, window, decrement or step duration is zero, or the start
    /// price does not fit into an amount (Error code: -4).
    InvalidConfig,
    /// Seller is not allowed to bid on its own lot (Error code: -5).
    OwnerCannotBid,
    /// Bid placed after the auction was settled (Error code: -6).
    AuctionAlreadyEnded,
    /// Bid placed after the auction window elapsed (Error code: -7).
    AuctionClosed,
    /// Bid is lower than the reserve price (Error code: -8).
    BelowReserve,
    /// Bidder did not allow the contract to pull the bid (Error code: -9).
    InsufficientAllowance,
    /// Bid does not exceed the highest bid (Error code: -10).
    BidTooLow,
    /// Payment token or NFT transfer was rejected (Error code: -11).
    TransferFailed,
    /// Only the seller can settle the auction (Error code: -12).
    Unauthorized,
    /// Auction was already settled (Error code: -13).
    AlreadyEnded,
    /// Nothing to settle (Error code: -14).
    NoBids,
    /// Only account addresses can bid or settle (Error code: -15).
    OnlyAccountAddress,
    /// Failed to query a token contract (Error code: -16).
    InvokeContractError,
    /// Contract received tokens other than the payment token (Error code: -17).
    UnknownToken,
}

/// Mapping the logging errors to AuctionError.
impl From<LogError> for AuctionError {
    fn from(le: LogError) -> Self {
        match le {
            LogError::Full => Self::LogFull,
            LogError::Malformed => Self::LogMalformed,
        }
    }
}

/// Mapping errors related to contract invocations to AuctionError.
impl<T> From<CallContractError<T>> for AuctionError {
    fn from(_cce: CallContractError<T>) -> Self {
        Self::TransferFailed
    }
}

#[derive(Debug)]
pub enum ContractReadError<R> {
    Call(CallContractError<R>),
    Compatibility,
    Parse,
}

/// Failed queries never move funds, so they are not transfer failures.
impl<R> From<ContractReadError<R>> for AuctionError {
    fn from(_cre: ContractReadError<R>) -> Self {
        Self::InvokeContractError
    }
}
