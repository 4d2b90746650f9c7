use concordium_cis2::OnReceivingCis2Params;
use concordium_std::*;

use crate::cis2::Cis2Custody;
use crate::errors::{AuctionError, AuctionResult};
use crate::events::AuctionEvents;
use crate::external::*;
use crate::state::{step_at, Bid, State};
use crate::types::*;

/// Start the auction at the current step. The sender becomes the seller.
///
/// It rejects if:
/// - Fails to parse `InitParams`;
/// - Reserve price, window, decrement or step duration is zero;
/// - The start price overflows.
#[init(contract = "BictoryDutchAuction", parameter = "InitParams")]
fn contract_init<S: HasStateApi>(
    ctx: &impl HasInitContext,
    _state_builder: &mut StateBuilder<S>,
) -> InitResult<State> {
    let params = InitParams::deserial(&mut ctx.parameter_cursor())?;
    let start_step = step_at(ctx.metadata().slot_time(), params.step_duration)?;
    let state = State::new(ctx.init_origin(), params, start_step)?;
    Ok(state)
}

/// Place a bid of the given amount of payment tokens.
///
/// The bid is pulled from the sender into the contract and the previous
/// highest bid is refunded. The sender must have made the contract an operator
/// of its payment tokens.
///
/// It rejects if:
/// - Fails to parse the bid amount;
/// - Sender is a contract or the seller;
/// - Auction is settled or the bidding window is over;
/// - Bid is below the reserve price or not above the highest bid;
/// - Sender has not allowed the contract to pull the bid;
/// - Any token transfer fails.
#[receive(
    mutable,
    contract = "BictoryDutchAuction",
    name = "bid",
    parameter = "u64",
    enable_logger
)]
fn contract_bid<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> AuctionResult<()> {
    let amount: BidAmount = ctx.parameter_cursor().get()?;
    let bidder = get_account_address(ctx.sender())?;

    // Work on a copy so a rejected bid leaves the state untouched
    let mut state = host.state().clone();
    let now = step_at(ctx.metadata().slot_time(), state.config.step_duration)?;

    let mut custody = Cis2Custody::new(host, ctx.self_address(), &state.config);
    let refunded = state.bid(&mut custody, bidder, amount, now)?;

    logger.log(&AuctionEvents::bid(&bidder, amount, now))?;
    if let Some(refund) = refunded {
        logger.log(&AuctionEvents::refund(&refund.bidder, refund.amount))?;
    }

    *host.state_mut() = state;

    Ok(())
}

/// Send the NFT to the highest bidder and the winning bid to the seller.
///
/// It rejects if:
/// - Sender is not the seller;
/// - Auction is already settled or has no bids;
/// - Either transfer fails.
#[receive(
    mutable,
    contract = "BictoryDutchAuction",
    name = "settle",
    enable_logger
)]
fn contract_settle<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> AuctionResult<()> {
    let caller = get_account_address(ctx.sender())?;

    let mut state = host.state().clone();
    let now = step_at(ctx.metadata().slot_time(), state.config.step_duration)?;

    let mut custody = Cis2Custody::new(host, ctx.self_address(), &state.config);
    let settlement = state.settle(&mut custody, caller, now)?;

    logger.log(&AuctionEvents::settle(
        &state.config.collateral_token,
        &settlement.seller,
        &settlement.winner,
        settlement.price,
        settlement.step,
    ))?;

    *host.state_mut() = state;

    Ok(())
}

/// Accept payment tokens sent to the contract.
///
/// Bids arrive through this hook. It rejects if the tokens are not the payment
/// token of the auction. Payment tokens sent directly by any holder are
/// accepted too; they are not a bid and can not be withdrawn.
#[receive(
    contract = "BictoryDutchAuction",
    name = "onReceivingCIS2",
    parameter = "OnReceivingCis2Params<ContractTokenId, ContractTokenAmount>"
)]
fn contract_on_receiving_cis2<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<()> {
    let params = OnReceivingCis2Params::<ContractTokenId, ContractTokenAmount>::deserial(
        &mut ctx.parameter_cursor(),
    )?;
    let payment_token = &host.state().config.payment_token;

    ensure!(
        ctx.sender().matches_contract(&payment_token.contract),
        AuctionError::UnknownToken
    );
    ensure_eq!(
        params.token_id,
        payment_token.id,
        AuctionError::UnknownToken
    );

    Ok(())
}

#[receive(
    contract = "BictoryDutchAuction",
    name = "currentPrice",
    return_value = "u64"
)]
fn contract_current_price<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<BidAmount> {
    let state = host.state();
    let now = step_at(ctx.metadata().slot_time(), state.config.step_duration)?;
    Ok(state.current_price(now))
}

#[receive(
    contract = "BictoryDutchAuction",
    name = "currentStep",
    return_value = "u64"
)]
fn contract_current_step<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<Step> {
    step_at(ctx.metadata().slot_time(), host.state().config.step_duration)
}

#[receive(
    contract = "BictoryDutchAuction",
    name = "highestBid",
    return_value = "Option<Bid>"
)]
fn contract_highest_bid<S: HasStateApi>(
    _ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<Option<Bid>> {
    Ok(host.state().highest_bid())
}

#[receive(
    contract = "BictoryDutchAuction",
    name = "hasEnded",
    return_value = "bool"
)]
fn contract_has_ended<S: HasStateApi>(
    _ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<bool> {
    Ok(host.state().has_ended())
}

/// View function that returns the auction terms and progress.
#[receive(
    contract = "BictoryDutchAuction",
    name = "view",
    return_value = "ViewState"
)]
fn contract_view<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State, StateApiType = S>,
) -> AuctionResult<ViewState> {
    let state = host.state();
    let now = step_at(ctx.metadata().slot_time(), state.config.step_duration)?;

    Ok(ViewState {
        config: state.config.clone(),
        highest_bid: state.highest_bid(),
        ended: state.has_ended(),
        current_step: now,
        current_price: state.current_price(now),
        closed: state.is_closed(now),
    })
}

fn get_account_address(address: Address) -> AuctionResult<AccountAddress> {
    match address {
        Address::Account(account) => Ok(account),
        Address::Contract(_) => bail!(AuctionError::OnlyAccountAddress),
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::test::*;
    use concordium_cis2::*;
    use std::{cell::RefCell, rc::Rc};
    use test_infrastructure::*;

    const SELLER: AccountAddress = AccountAddress([0u8; 32]);
    const ALICE: AccountAddress = AccountAddress([1u8; 32]);
    const BOB: AccountAddress = AccountAddress([2u8; 32]);
    const CAROL: AccountAddress = AccountAddress([3u8; 32]);

    /// Step the auction is initialized at.
    const START_STEP: u64 = 5;

    fn init_params() -> InitParams {
        InitParams {
            payment_token: payment_token(),
            collateral_token: collateral_token(),
            reserve_price: 10,
            auction_window: 100,
            price_decrement: 1,
            step_duration: Duration::from_seconds(1),
        }
    }

    fn slot_time(step: u64) -> Timestamp {
        Timestamp::from_timestamp_millis(step * 1000)
    }

    fn receive_ctx<'a>(sender: Address, step: u64, parameter: &'a [u8]) -> TestReceiveContext<'a> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(sender);
        ctx.set_self_address(AUCTION);
        ctx.set_metadata_slot_time(slot_time(step));
        ctx.set_parameter(parameter);
        ctx
    }

    struct Env {
        host: TestHost<State>,
        token: Rc<RefCell<TestToken>>,
        nft: Rc<RefCell<TestNft>>,
        logger: TestLogger,
    }

    /// Initialized auction with mocked token contracts. Alice and Bob hold 200
    /// payment tokens each and made the auction their operator. Carol holds
    /// 200 tokens without approval. The seller owns the NFT and approved the
    /// auction.
    fn setup() -> Env {
        let parameter_bytes = to_bytes(&init_params());
        let mut ctx = TestInitContext::empty();
        ctx.set_init_origin(SELLER);
        ctx.set_metadata_slot_time(slot_time(START_STEP));
        ctx.set_parameter(&parameter_bytes);

        let mut state_builder = TestStateBuilder::new();
        let state = contract_init(&ctx, &mut state_builder).expect_report("Init should pass");
        let mut host = TestHost::new(state, state_builder);

        let token = Rc::new(RefCell::new(TestToken::default()));
        for account in [ALICE, BOB, CAROL] {
            token.borrow_mut().mint(Address::Account(account), 200);
        }
        for account in [ALICE, BOB] {
            token.borrow_mut().approve(
                Address::Account(account),
                Address::Contract(AUCTION),
                200,
            );
        }

        let nft = Rc::new(RefCell::new(TestNft::default()));
        nft.borrow_mut()
            .mint(collateral_token().id, Address::Account(SELLER))
            .expect_report("Fresh token id");
        nft.borrow_mut()
            .approve(Address::Account(SELLER), Address::Contract(AUCTION));

        host.setup_mock_entrypoint(
            PAYMENT_CONTRACT,
            OwnedEntrypointName::new_unchecked(TRANSFER_ENTRYPOINT.into()),
            token_transfer_mock(token.clone(), Address::Contract(AUCTION)),
        );
        host.setup_mock_entrypoint(
            PAYMENT_CONTRACT,
            OwnedEntrypointName::new_unchecked(BALANCE_OF_ENTRYPOINT.into()),
            token_balance_of_mock(token.clone()),
        );
        host.setup_mock_entrypoint(
            PAYMENT_CONTRACT,
            OwnedEntrypointName::new_unchecked(OPERATOR_OF_ENTRYPOINT.into()),
            token_operator_of_mock(token.clone()),
        );
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked(TRANSFER_ENTRYPOINT.into()),
            nft_transfer_mock(nft.clone(), Address::Contract(AUCTION)),
        );

        Env {
            host,
            token,
            nft,
            logger: TestLogger::init(),
        }
    }

    impl Env {
        fn bid(&mut self, bidder: AccountAddress, amount: u64, step: u64) -> AuctionResult<()> {
            let parameter_bytes = to_bytes(&amount);
            let ctx = receive_ctx(Address::Account(bidder), step, &parameter_bytes);
            contract_bid(&ctx, &mut self.host, &mut self.logger)
        }

        fn settle(&mut self, caller: AccountAddress, step: u64) -> AuctionResult<()> {
            let ctx = receive_ctx(Address::Account(caller), step, &[]);
            contract_settle(&ctx, &mut self.host, &mut self.logger)
        }

        fn balance_of(&self, address: Address) -> u64 {
            self.token.borrow().balance_of(&address)
        }
    }

    #[concordium_test]
    fn test_init() {
        let env = setup();
        let state = env.host.state();

        claim_eq!(state.config.seller, SELLER);
        claim_eq!(state.config.start_step, START_STEP);
        claim_eq!(state.config.start_price, 110);
        claim_eq!(state.highest_bid(), None);
        claim!(!state.has_ended(), "Fresh auction should not be ended");
    }

    #[concordium_test]
    fn test_init_rejects_invalid_config() {
        let mut params = init_params();
        params.price_decrement = 0;
        let parameter_bytes = to_bytes(&params);
        let mut ctx = TestInitContext::empty();
        ctx.set_init_origin(SELLER);
        ctx.set_metadata_slot_time(slot_time(START_STEP));
        ctx.set_parameter(&parameter_bytes);

        let result = contract_init(&ctx, &mut TestStateBuilder::new());
        claim_eq!(result.err(), Some(AuctionError::InvalidConfig.into()));
    }

    #[concordium_test]
    fn test_bid_escrows_and_refunds() {
        let mut env = setup();

        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        claim_eq!(env.balance_of(Address::Account(ALICE)), 80);
        claim_eq!(env.balance_of(Address::Contract(AUCTION)), 120);
        claim_eq!(
            env.host.state().highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120,
            })
        );

        claim_eq!(env.bid(BOB, 130, START_STEP + 1), Ok(()));
        claim_eq!(env.balance_of(Address::Account(ALICE)), 200);
        claim_eq!(env.balance_of(Address::Account(BOB)), 70);
        claim_eq!(env.balance_of(Address::Contract(AUCTION)), 130);
        claim_eq!(
            env.host.state().highest_bid(),
            Some(Bid {
                bidder: BOB,
                amount: 130,
            })
        );

        claim_eq!(
            env.logger.logs,
            vec![
                to_bytes(&AuctionEvents::bid(&ALICE, 120, START_STEP)),
                to_bytes(&AuctionEvents::bid(&BOB, 130, START_STEP + 1)),
                to_bytes(&AuctionEvents::refund(&ALICE, 120)),
            ]
        );
    }

    #[concordium_test]
    fn test_rejected_bids_leave_state_unchanged() {
        let mut env = setup();
        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        let state = env.host.state().clone();

        claim_eq!(
            env.bid(BOB, 120, START_STEP),
            Err(AuctionError::BidTooLow)
        );
        claim_eq!(
            env.bid(SELLER, 150, START_STEP),
            Err(AuctionError::OwnerCannotBid)
        );
        claim_eq!(
            env.bid(CAROL, 150, START_STEP),
            Err(AuctionError::InsufficientAllowance)
        );
        claim_eq!(env.bid(BOB, 5, START_STEP), Err(AuctionError::BelowReserve));
        claim_eq!(
            env.bid(BOB, 150, START_STEP + 101),
            Err(AuctionError::AuctionClosed)
        );

        let parameter_bytes = to_bytes(&150u64);
        let ctx = receive_ctx(Address::Contract(NFT_CONTRACT), START_STEP, &parameter_bytes);
        claim_eq!(
            contract_bid(&ctx, &mut env.host, &mut env.logger),
            Err(AuctionError::OnlyAccountAddress)
        );

        claim_eq!(*env.host.state(), state);
        claim_eq!(env.balance_of(Address::Account(BOB)), 200);
        claim_eq!(env.logger.logs.len(), 1);
    }

    #[concordium_test]
    fn test_bid_on_the_last_step() {
        let mut env = setup();

        claim_eq!(env.bid(ALICE, 10, START_STEP + 100), Ok(()));
    }

    #[concordium_test]
    fn test_failed_refund_rejects_bid() {
        let mut env = setup();
        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        env.token
            .borrow_mut()
            .reject_transfers_to(Address::Account(ALICE));

        claim_eq!(
            env.bid(BOB, 130, START_STEP),
            Err(AuctionError::TransferFailed)
        );
        claim_eq!(env.balance_of(Address::Account(BOB)), 200);
        claim_eq!(env.balance_of(Address::Contract(AUCTION)), 120);
        claim_eq!(
            env.host.state().highest_bid(),
            Some(Bid {
                bidder: ALICE,
                amount: 120,
            })
        );
    }

    #[concordium_test]
    fn test_settle() {
        let mut env = setup();
        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        claim_eq!(env.bid(BOB, 130, START_STEP + 10), Ok(()));

        // Settling is allowed after the window is over
        let settle_step = START_STEP + 200;
        claim_eq!(env.settle(SELLER, settle_step), Ok(()));

        claim_eq!(
            env.nft.borrow().owner_of(&collateral_token().id),
            Some(Address::Account(BOB))
        );
        claim_eq!(env.balance_of(Address::Account(SELLER)), 130);
        claim_eq!(env.balance_of(Address::Contract(AUCTION)), 0);
        claim!(env.host.state().has_ended(), "Auction should be ended");
        claim_eq!(
            env.logger.logs.last(),
            Some(&to_bytes(&AuctionEvents::settle(
                &collateral_token(),
                &SELLER,
                &BOB,
                130,
                settle_step,
            )))
        );

        claim_eq!(
            env.settle(SELLER, settle_step),
            Err(AuctionError::AlreadyEnded)
        );
        claim_eq!(
            env.bid(ALICE, 150, START_STEP + 20),
            Err(AuctionError::AuctionAlreadyEnded)
        );
    }

    #[concordium_test]
    fn test_settle_rejections() {
        let mut env = setup();

        claim_eq!(env.settle(SELLER, START_STEP), Err(AuctionError::NoBids));

        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        claim_eq!(
            env.settle(ALICE, START_STEP),
            Err(AuctionError::Unauthorized)
        );

        // Seller revoked the auction: NFT can not be moved
        env.nft
            .borrow_mut()
            .revoke(Address::Account(SELLER), Address::Contract(AUCTION));
        claim_eq!(
            env.settle(SELLER, START_STEP),
            Err(AuctionError::TransferFailed)
        );
        claim!(!env.host.state().has_ended(), "Auction should not be ended");
        claim_eq!(env.balance_of(Address::Contract(AUCTION)), 120);

        env.nft
            .borrow_mut()
            .approve(Address::Account(SELLER), Address::Contract(AUCTION));
        claim_eq!(env.settle(SELLER, START_STEP), Ok(()));
    }

    #[concordium_test]
    fn test_failed_proceeds_leave_state_unchanged() {
        let mut env = setup();
        claim_eq!(env.bid(ALICE, 120, START_STEP), Ok(()));
        let state = env.host.state().clone();

        env.token
            .borrow_mut()
            .reject_transfers_to(Address::Account(SELLER));
        claim_eq!(
            env.settle(SELLER, START_STEP + 1),
            Err(AuctionError::TransferFailed)
        );

        claim_eq!(*env.host.state(), state);
        claim!(!env.host.state().has_ended(), "Auction should not be ended");
        claim_eq!(env.logger.logs.len(), 1);
    }

    #[concordium_test]
    fn test_views() {
        let mut env = setup();
        let step = START_STEP + 10;
        let ctx = receive_ctx(Address::Account(CAROL), step, &[]);

        claim_eq!(contract_current_step(&ctx, &env.host), Ok(step));
        claim_eq!(contract_current_price(&ctx, &env.host), Ok(100));
        claim_eq!(contract_highest_bid(&ctx, &env.host), Ok(None));
        claim_eq!(contract_has_ended(&ctx, &env.host), Ok(false));

        // Price never drops below the reserve
        let late_ctx = receive_ctx(Address::Account(CAROL), START_STEP + 500, &[]);
        claim_eq!(contract_current_price(&late_ctx, &env.host), Ok(10));

        claim_eq!(env.bid(ALICE, 120, step), Ok(()));
        let view = contract_view(&ctx, &env.host).expect_report("View should pass");
        claim_eq!(view.config, env.host.state().config);
        claim_eq!(
            view.highest_bid,
            Some(Bid {
                bidder: ALICE,
                amount: 120,
            })
        );
        claim_eq!(view.current_step, step);
        claim_eq!(view.current_price, 100);
        claim!(!view.closed, "Auction should be open");
        claim!(!view.ended, "Auction should not be ended");
    }

    #[concordium_test]
    fn test_on_receiving_cis2() {
        let env = setup();
        let params = OnReceivingCis2Params {
            token_id: payment_token().id,
            amount: TokenAmountU64(120),
            from: Address::Account(ALICE),
            data: AdditionalData::empty(),
        };
        let parameter_bytes = to_bytes(&params);

        let ctx = receive_ctx(Address::Contract(PAYMENT_CONTRACT), START_STEP, &parameter_bytes);
        claim_eq!(contract_on_receiving_cis2(&ctx, &env.host), Ok(()));

        let ctx = receive_ctx(Address::Contract(NFT_CONTRACT), START_STEP, &parameter_bytes);
        claim_eq!(
            contract_on_receiving_cis2(&ctx, &env.host),
            Err(AuctionError::UnknownToken)
        );

        let params = OnReceivingCis2Params {
            token_id: collateral_token().id,
            amount: TokenAmountU64(1),
            from: Address::Account(SELLER),
            data: AdditionalData::empty(),
        };
        let parameter_bytes = to_bytes(&params);
        let ctx = receive_ctx(Address::Contract(PAYMENT_CONTRACT), START_STEP, &parameter_bytes);
        claim_eq!(
            contract_on_receiving_cis2(&ctx, &env.host),
            Err(AuctionError::UnknownToken)
        );
    }
}
