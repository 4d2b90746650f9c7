use concordium_std::*;

use crate::errors::{AuctionError, AuctionResult};
use crate::external::InitParams;
use crate::ledger::{AssetRegistry, PaymentLedger};
use crate::types::{BidAmount, Step, Token};

/// Step index of `slot_time` on a clock ticking every `step_duration`.
pub fn step_at(slot_time: Timestamp, step_duration: Duration) -> AuctionResult<Step> {
    slot_time
        .timestamp_millis()
        .checked_div(step_duration.millis())
        .ok_or(AuctionError::InvalidConfig)
}

/// Auction terms, fixed on initialization.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct AuctionConfig {
    /// Seller account. Owns the NFT until settlement and is the only account
    /// allowed to settle.
    pub seller: AccountAddress,
    /// Fungible CIS-2 token bids are paid in.
    pub payment_token: Token,
    /// The NFT being sold.
    pub collateral_token: Token,
    /// Smallest acceptable bid and the floor of the price.
    pub reserve_price: BidAmount,
    /// Number of steps the auction accepts bids for.
    pub auction_window: Step,
    /// Price drop per elapsed step.
    pub price_decrement: BidAmount,
    /// `reserve_price + auction_window * price_decrement`.
    pub start_price: BidAmount,
    /// Step at which the auction was initialized.
    pub start_step: Step,
    /// Length of a single step.
    pub step_duration: Duration,
}

/// Bid held in contract custody.
#[derive(Debug, Clone, Copy, Serialize, SchemaType, PartialEq, Eq)]
pub struct Bid {
    pub bidder: AccountAddress,
    pub amount: BidAmount,
}

/// Outcome of a successful settlement.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub seller: AccountAddress,
    pub winner: AccountAddress,
    pub price: BidAmount,
    pub step: Step,
}

/// The contract state.
#[derive(Debug, Clone, Serialize, SchemaType, PartialEq, Eq)]
pub struct State {
    pub config: AuctionConfig,
    /// Current highest bid, escrowed by the contract.
    highest_bid: Option<Bid>,
    /// Set once by a successful settlement.
    ended: bool,
}

impl State {
    /// Validate the auction terms and create an auction without bids.
    pub fn new(
        seller: AccountAddress,
        params: InitParams,
        start_step: Step,
    ) -> AuctionResult<Self> {
        ensure!(params.reserve_price > 0, AuctionError::InvalidConfig);
        ensure!(params.auction_window > 0, AuctionError::InvalidConfig);
        ensure!(params.price_decrement > 0, AuctionError::InvalidConfig);
        ensure!(
            params.step_duration.millis() > 0,
            AuctionError::InvalidConfig
        );

        let start_price = params
            .auction_window
            .checked_mul(params.price_decrement)
            .and_then(|decay| decay.checked_add(params.reserve_price))
            .ok_or(AuctionError::InvalidConfig)?;

        Ok(Self {
            config: AuctionConfig {
                seller,
                payment_token: params.payment_token,
                collateral_token: params.collateral_token,
                reserve_price: params.reserve_price,
                auction_window: params.auction_window,
                price_decrement: params.price_decrement,
                start_price,
                start_step,
                step_duration: params.step_duration,
            },
            highest_bid: None,
            ended: false,
        })
    }

    /// Steps passed since initialization. Steps before the start count as 0.
    fn elapsed(&self, now: Step) -> Step {
        now.saturating_sub(self.config.start_step)
    }

    /// Price at step `now`, floored at the reserve price.
    pub fn current_price(&self, now: Step) -> BidAmount {
        let decay = self
            .config
            .price_decrement
            .saturating_mul(self.elapsed(now));
        self.config
            .start_price
            .saturating_sub(decay)
            .max(self.config.reserve_price)
    }

    /// Whether the bidding window is over at step `now`.
    ///
    /// A closed auction can still be settled.
    pub fn is_closed(&self, now: Step) -> bool {
        self.elapsed(now) > self.config.auction_window
    }

    pub fn highest_bid(&self) -> Option<Bid> {
        self.highest_bid
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Accept `amount` from `bidder` as the new highest bid.
    ///
    /// The bid is pulled into contract custody and the previous highest bid is
    /// refunded. The amount is compared with the reserve price and the previous
    /// bid only, never with [`State::current_price`]: any bid above both wins.
    ///
    /// Returns the refunded bid. The state is unchanged when an error is
    /// returned. Ledger transfers are undone on a failed refund only: if the
    /// new bid can not be pushed back either, it stays in custody and the
    /// caller's transaction must be reverted.
    pub fn bid<L: PaymentLedger>(
        &mut self,
        ledger: &mut L,
        bidder: AccountAddress,
        amount: BidAmount,
        now: Step,
    ) -> AuctionResult<Option<Bid>> {
        // Owner is not allowed to raise bids
        ensure_ne!(bidder, self.config.seller, AuctionError::OwnerCannotBid);
        ensure!(!self.ended, AuctionError::AuctionAlreadyEnded);
        ensure!(!self.is_closed(now), AuctionError::AuctionClosed);
        ensure!(
            amount >= self.config.reserve_price,
            AuctionError::BelowReserve
        );
        ensure!(
            ledger.allowance_of(&bidder)? >= amount,
            AuctionError::InsufficientAllowance
        );
        if let Some(highest) = &self.highest_bid {
            ensure!(amount > highest.amount, AuctionError::BidTooLow);
        }

        ledger
            .transfer_from(&bidder, amount)
            .map_err(|_| AuctionError::TransferFailed)?;

        if let Some(previous) = &self.highest_bid {
            if ledger.transfer(&previous.bidder, previous.amount).is_err() {
                // Previous bid stays in custody, so the new one goes back
                ledger
                    .transfer(&bidder, amount)
                    .map_err(|_| AuctionError::TransferFailed)?;
                bail!(AuctionError::TransferFailed);
            }
        }

        // Update the highest bid after all transfers, return the previous bid
        Ok(self.highest_bid.replace(Bid { bidder, amount }))
    }

    /// Transfer the NFT to the highest bidder and the highest bid to the
    /// seller, ending the auction.
    ///
    /// Settling is allowed after the bidding window has closed.
    ///
    /// On `TransferFailed` the auction stays open, but the NFT may already
    /// belong to the winner when the proceeds transfer is the one that failed.
    /// The caller's transaction must be reverted on error.
    pub fn settle<C: PaymentLedger + AssetRegistry>(
        &mut self,
        custody: &mut C,
        caller: AccountAddress,
        now: Step,
    ) -> AuctionResult<Settlement> {
        ensure_eq!(caller, self.config.seller, AuctionError::Unauthorized);
        ensure!(!self.ended, AuctionError::AlreadyEnded);
        let winning_bid = self.highest_bid.ok_or(AuctionError::NoBids)?;

        custody
            .transfer_asset(&self.config.seller, &winning_bid.bidder)
            .map_err(|_| AuctionError::TransferFailed)?;
        custody
            .transfer(&self.config.seller, winning_bid.amount)
            .map_err(|_| AuctionError::TransferFailed)?;

        self.ended = true;

        Ok(Settlement {
            seller: self.config.seller,
            winner: winning_bid.bidder,
            price: winning_bid.amount,
            step: now,
        })
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use crate::test::*;

    const SELLER: AccountAddress = AccountAddress([0u8; 32]);
    const ALICE: AccountAddress = AccountAddress([1u8; 32]);
    const BOB: AccountAddress = AccountAddress([2u8; 32]);

    fn params(reserve_price: u64, auction_window: u64, price_decrement: u64) -> InitParams {
        InitParams {
            payment_token: payment_token(),
            collateral_token: collateral_token(),
            reserve_price,
            auction_window,
            price_decrement,
            step_duration: Duration::from_seconds(1),
        }
    }

    /// Auction with reserve 10, a 100 step window and a decrement of 1 started
    /// at step 0, with the NFT minted to the seller and approved.
    fn default_auction() -> (State, TestCustody) {
        let state = State::new(SELLER, params(10, 100, 1), 0).expect_report("Valid config");
        let mut custody = TestCustody::new(AUCTION);
        custody
            .nft
            .mint(collateral_token().id, Address::Account(SELLER))
            .expect_report("Fresh token id");
        custody
            .nft
            .approve(Address::Account(SELLER), Address::Contract(AUCTION));
        (state, custody)
    }

    fn fund(custody: &mut TestCustody, account: AccountAddress, balance: u64, allowance: u64) {
        custody.token.mint(Address::Account(account), balance);
        custody.token.approve(
            Address::Account(account),
            Address::Contract(AUCTION),
            allowance,
        );
    }

    fn balance(custody: &TestCustody, account: AccountAddress) -> u64 {
        custody.token.balance_of(&Address::Account(account))
    }

    #[concordium_test]
    fn test_new_derives_start_price() {
        let state = State::new(SELLER, params(10, 100, 1), 7).expect_report("Valid config");

        claim_eq!(state.config.start_price, 110);
        claim_eq!(state.config.start_step, 7);
        claim_eq!(state.config.seller, SELLER);
        claim_eq!(state.highest_bid(), None);
        claim!(!state.has_ended());
    }

    #[concordium_test]
    fn test_new_rejects_invalid_config() {
        claim_eq!(
            State::new(SELLER, params(0, 100, 1), 0),
            Err(AuctionError::InvalidConfig)
        );
        claim_eq!(
            State::new(SELLER, params(10, 0, 1), 0),
            Err(AuctionError::InvalidConfig)
        );
        claim_eq!(
            State::new(SELLER, params(10, 100, 0), 0),
            Err(AuctionError::InvalidConfig)
        );
        claim_eq!(
            State::new(SELLER, params(10, u64::MAX, 2), 0),
            Err(AuctionError::InvalidConfig)
        );

        let mut zero_step = params(10, 100, 1);
        zero_step.step_duration = Duration::from_millis(0);
        claim_eq!(
            State::new(SELLER, zero_step, 0),
            Err(AuctionError::InvalidConfig)
        );
    }

    #[concordium_test]
    fn test_step_at() {
        let duration = Duration::from_seconds(12);

        claim_eq!(step_at(Timestamp::from_timestamp_millis(0), duration), Ok(0));
        claim_eq!(
            step_at(Timestamp::from_timestamp_millis(11_999), duration),
            Ok(0)
        );
        claim_eq!(
            step_at(Timestamp::from_timestamp_millis(36_000), duration),
            Ok(3)
        );
        claim_eq!(
            step_at(
                Timestamp::from_timestamp_millis(1),
                Duration::from_millis(0)
            ),
            Err(AuctionError::InvalidConfig)
        );
    }

    #[concordium_test]
    fn test_price_decays_to_reserve() {
        let state = State::new(SELLER, params(10, 1, 10), 5).expect_report("Valid config");

        claim_eq!(state.config.start_price, 20);
        claim_eq!(state.current_price(5), 20);
        claim_eq!(state.current_price(6), 10);
        claim_eq!(state.current_price(7), 10);
        claim_eq!(state.current_price(u64::MAX), 10);
        // Steps before the start are treated as the start
        claim_eq!(state.current_price(0), 20);
    }

    #[concordium_test]
    fn test_price_is_non_increasing() {
        let state = State::new(SELLER, params(50, 40, 3), 100).expect_report("Valid config");

        let mut last = state.current_price(100);
        claim_eq!(last, state.config.start_price);
        for now in 100..200 {
            let price = state.current_price(now);
            claim!(price <= last);
            claim!(price >= state.config.reserve_price);
            last = price;
        }
        claim_eq!(state.current_price(140), 50);
    }

    #[concordium_test]
    fn test_window_closes_after_auction_window() {
        let state = State::new(SELLER, params(10, 100, 1), 0).expect_report("Valid config");

        claim!(!state.is_closed(0));
        claim!(!state.is_closed(100));
        claim!(state.is_closed(101));
    }

    #[concordium_test]
    fn test_first_bid_is_escrowed() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);

        let refunded = state.bid(&mut custody, ALICE, 120, 1);

        claim_eq!(refunded, Ok(None));
        claim_eq!(balance(&custody, ALICE), 80);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            120
        );
        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120
            })
        );
    }

    #[concordium_test]
    fn test_higher_bid_refunds_previous_bidder() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        fund(&mut custody, BOB, 200, 200);

        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));
        let refunded = state.bid(&mut custody, BOB, 130, 2);

        claim_eq!(
            refunded,
            Ok(Some(Bid {
                bidder: ALICE,
                amount: 120
            }))
        );
        claim_eq!(balance(&custody, ALICE), 200);
        claim_eq!(balance(&custody, BOB), 70);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            130
        );
        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: BOB,
                amount: 130
            })
        );
    }

    #[concordium_test]
    fn test_bidder_can_raise_own_bid() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 500, 500);

        claim_eq!(state.bid(&mut custody, ALICE, 200, 1), Ok(None));
        claim!(state.bid(&mut custody, ALICE, 300, 2).is_ok());

        claim_eq!(balance(&custody, ALICE), 200);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            300
        );
    }

    #[concordium_test]
    fn test_bid_not_gated_by_current_price() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 1_000, 1_000);

        // Price is 110 at the start, both bids are accepted
        claim!(state.bid(&mut custody, ALICE, 15, 0).is_ok());
        claim!(state.bid(&mut custody, ALICE, 500, 0).is_ok());
    }

    #[concordium_test]
    fn test_bid_too_low_leaves_balances() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        fund(&mut custody, BOB, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        claim_eq!(
            state.bid(&mut custody, BOB, 100, 2),
            Err(AuctionError::BidTooLow)
        );
        claim_eq!(
            state.bid(&mut custody, BOB, 120, 2),
            Err(AuctionError::BidTooLow)
        );
        claim_eq!(balance(&custody, ALICE), 80);
        claim_eq!(balance(&custody, BOB), 200);
        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120
            })
        );
    }

    #[concordium_test]
    fn test_bid_rejections() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, SELLER, 1_000, 1_000);
        fund(&mut custody, ALICE, 200, 100);

        claim_eq!(
            state.bid(&mut custody, SELLER, 500, 1),
            Err(AuctionError::OwnerCannotBid)
        );
        claim_eq!(
            state.bid(&mut custody, ALICE, 9, 1),
            Err(AuctionError::BelowReserve)
        );
        claim_eq!(
            state.bid(&mut custody, ALICE, 120, 1),
            Err(AuctionError::InsufficientAllowance)
        );
        claim_eq!(
            state.bid(&mut custody, ALICE, 50, 101),
            Err(AuctionError::AuctionClosed)
        );
        claim_eq!(balance(&custody, ALICE), 200);
        claim_eq!(state.highest_bid(), None);
    }

    #[concordium_test]
    fn test_bid_check_precedence() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));
        claim!(state.settle(&mut custody, SELLER, 2).is_ok());

        // Seller check wins over the ended auction
        claim_eq!(
            state.bid(&mut custody, SELLER, 500, 3),
            Err(AuctionError::OwnerCannotBid)
        );
        // Ended wins over the closed window and a bid below reserve
        claim_eq!(
            state.bid(&mut custody, BOB, 1, 500),
            Err(AuctionError::AuctionAlreadyEnded)
        );

        let (mut state, mut custody) = default_auction();
        // Closed window wins over a bid below reserve
        claim_eq!(
            state.bid(&mut custody, ALICE, 1, 500),
            Err(AuctionError::AuctionClosed)
        );
        // Reserve wins over a missing allowance
        claim_eq!(
            state.bid(&mut custody, BOB, 1, 1),
            Err(AuctionError::BelowReserve)
        );
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));
        // Allowance wins over a bid that is too low
        claim_eq!(
            state.bid(&mut custody, BOB, 100, 1),
            Err(AuctionError::InsufficientAllowance)
        );
    }

    #[concordium_test]
    fn test_failed_pull_changes_nothing() {
        let (mut state, mut custody) = default_auction();
        // Allowance without balance
        fund(&mut custody, ALICE, 50, 200);

        claim_eq!(
            state.bid(&mut custody, ALICE, 120, 1),
            Err(AuctionError::TransferFailed)
        );
        claim_eq!(balance(&custody, ALICE), 50);
        claim_eq!(state.highest_bid(), None);
    }

    #[concordium_test]
    fn test_failed_refund_rolls_back_bid() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        fund(&mut custody, BOB, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        custody.token.reject_transfers_to(Address::Account(ALICE));
        claim_eq!(
            state.bid(&mut custody, BOB, 130, 2),
            Err(AuctionError::TransferFailed)
        );

        claim_eq!(balance(&custody, BOB), 200);
        claim_eq!(balance(&custody, ALICE), 80);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            120
        );
        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120
            })
        );
    }

    #[concordium_test]
    fn test_settle_transfers_nft_and_proceeds() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        let settlement = state.settle(&mut custody, SELLER, 3);

        claim_eq!(
            settlement,
            Ok(Settlement {
                seller: SELLER,
                winner: ALICE,
                price: 120,
                step: 3,
            })
        );
        claim_eq!(
            custody.nft.owner_of(&collateral_token().id),
            Some(Address::Account(ALICE))
        );
        claim_eq!(balance(&custody, SELLER), 120);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            0
        );
        claim!(state.has_ended());

        claim_eq!(
            state.settle(&mut custody, SELLER, 4),
            Err(AuctionError::AlreadyEnded)
        );
        claim_eq!(balance(&custody, SELLER), 120);
    }

    #[concordium_test]
    fn test_settle_rejections() {
        let (mut state, mut custody) = default_auction();

        claim_eq!(
            state.settle(&mut custody, SELLER, 1),
            Err(AuctionError::NoBids)
        );

        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));
        claim_eq!(
            state.settle(&mut custody, ALICE, 2),
            Err(AuctionError::Unauthorized)
        );
        claim_eq!(
            custody.nft.owner_of(&collateral_token().id),
            Some(Address::Account(SELLER))
        );
        claim!(!state.has_ended());
    }

    #[concordium_test]
    fn test_settle_after_window_closed() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        fund(&mut custody, BOB, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        claim_eq!(
            state.bid(&mut custody, BOB, 150, 102),
            Err(AuctionError::AuctionClosed)
        );
        claim!(state.settle(&mut custody, SELLER, 102).is_ok());
        claim_eq!(
            custody.nft.owner_of(&collateral_token().id),
            Some(Address::Account(ALICE))
        );
    }

    #[concordium_test]
    fn test_failed_nft_transfer_keeps_auction_open() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        // Seller revoked the approval
        custody
            .nft
            .revoke(Address::Account(SELLER), Address::Contract(AUCTION));
        claim_eq!(
            state.settle(&mut custody, SELLER, 2),
            Err(AuctionError::TransferFailed)
        );
        claim!(!state.has_ended());
        claim_eq!(balance(&custody, SELLER), 0);

        custody
            .nft
            .approve(Address::Account(SELLER), Address::Contract(AUCTION));
        claim!(state.settle(&mut custody, SELLER, 3).is_ok());
        claim!(state.has_ended());
    }

    #[concordium_test]
    fn test_failed_proceeds_keeps_auction_open() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        custody.token.reject_transfers_to(Address::Account(SELLER));
        claim_eq!(
            state.settle(&mut custody, SELLER, 2),
            Err(AuctionError::TransferFailed)
        );
        claim!(!state.has_ended());
        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120
            })
        );
        // The NFT already moved, only the caller's transaction can revert it
        claim_eq!(
            custody.nft.owner_of(&collateral_token().id),
            Some(Address::Account(ALICE))
        );
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            120
        );
    }

    #[concordium_test]
    fn test_failed_push_back_keeps_previous_bid() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        fund(&mut custody, BOB, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        custody.token.reject_transfers_to(Address::Account(ALICE));
        custody.token.reject_transfers_to(Address::Account(BOB));
        claim_eq!(
            state.bid(&mut custody, BOB, 130, 2),
            Err(AuctionError::TransferFailed)
        );

        claim_eq!(
            state.highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120
            })
        );
        // Both bids are left in custody
        claim_eq!(balance(&custody, BOB), 70);
        claim_eq!(
            custody.token.balance_of(&Address::Contract(AUCTION)),
            250
        );
    }

    #[concordium_test]
    fn test_burnt_nft_cannot_be_settled() {
        let (mut state, mut custody) = default_auction();
        fund(&mut custody, ALICE, 200, 200);
        claim_eq!(state.bid(&mut custody, ALICE, 120, 1), Ok(None));

        custody
            .nft
            .burn(&collateral_token().id)
            .expect_report("Token was minted");
        claim_eq!(
            state.settle(&mut custody, SELLER, 2),
            Err(AuctionError::TransferFailed)
        );
        claim!(!state.has_ended());
    }
}
