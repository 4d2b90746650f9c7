use concordium_std::*;

use crate::state::{AuctionConfig, Bid};
use crate::types::{BidAmount, Step, Token};

/// Auction terms. The account creating the instance becomes the seller.
#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct InitParams {
    /// Fungible token bids are paid in.
    pub payment_token: Token,
    /// NFT put up for sale. The seller must make the instance an operator of
    /// this token before settling.
    pub collateral_token: Token,
    /// Smallest allowed bid.
    pub reserve_price: BidAmount,
    /// Number of steps bids are accepted for.
    pub auction_window: Step,
    /// Price drop per step.
    pub price_decrement: BidAmount,
    /// Length of a step.
    pub step_duration: Duration,
}

#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct ViewState {
    pub config: AuctionConfig,
    pub highest_bid: Option<Bid>,
    pub ended: bool,
    /// Values at the block time of the query.
    pub current_step: Step,
    pub current_price: BidAmount,
    pub closed: bool,
}
