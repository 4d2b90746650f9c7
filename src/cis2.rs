use concordium_cis2::*;
use concordium_std::*;

use crate::constants::{
    BALANCE_OF_ENTRYPOINT, ON_RECEIVING_CIS2_ENTRYPOINT, OPERATOR_OF_ENTRYPOINT,
    TRANSFER_ENTRYPOINT,
};
use crate::errors::{AuctionResult, ContractReadError};
use crate::ledger::{AssetRegistry, PaymentLedger};
use crate::state::{AuctionConfig, State};
use crate::types::*;

pub trait HostCis2Ext<S>: HasHost<S> {
    fn cis2_transfer(
        &mut self,
        token: &Token,
        from: Address,
        to: Receiver,
        amount: ContractTokenAmount,
    ) -> Result<(), CallContractError<Self::ReturnValueType>> {
        let parameter: TransferParameter = TransferParams(vec![Transfer {
            token_id: token.id.clone(),
            amount,
            from,
            to,
            data: AdditionalData::empty(),
        }]);

        self.invoke_contract(
            &token.contract,
            &parameter,
            EntrypointName::new_unchecked(TRANSFER_ENTRYPOINT),
            Amount::zero(),
        )?;

        Ok(())
    }

    fn cis2_balance_of(
        &self,
        token: &Token,
        address: Address,
    ) -> Result<ContractTokenAmount, ContractReadError<Self::ReturnValueType>> {
        let parameter = ContractBalanceOfQueryParams {
            queries: vec![BalanceOfQuery {
                token_id: token.id.clone(),
                address,
            }],
        };

        let mut result = self
            .invoke_contract_read_only(
                &token.contract,
                &parameter,
                EntrypointName::new_unchecked(BALANCE_OF_ENTRYPOINT),
                Amount::zero(),
            )
            .map_err(ContractReadError::Call)?
            .ok_or(ContractReadError::Compatibility)?;

        let BalanceOfQueryResponse(balances) =
            ContractBalanceOfQueryResponse::deserial(&mut result)
                .map_err(|_| ContractReadError::Parse)?;

        balances
            .first()
            .copied()
            .ok_or(ContractReadError::Compatibility)
    }

    fn cis2_operator_of(
        &self,
        contract: &ContractAddress,
        owner: Address,
        address: Address,
    ) -> Result<bool, ContractReadError<Self::ReturnValueType>> {
        let parameter = OperatorOfQueryParams {
            queries: vec![OperatorOfQuery { owner, address }],
        };

        let mut result = self
            .invoke_contract_read_only(
                contract,
                &parameter,
                EntrypointName::new_unchecked(OPERATOR_OF_ENTRYPOINT),
                Amount::zero(),
            )
            .map_err(ContractReadError::Call)?
            .ok_or(ContractReadError::Compatibility)?;

        let OperatorOfQueryResponse(operators) =
            OperatorOfQueryResponse::deserial(&mut result).map_err(|_| ContractReadError::Parse)?;

        operators
            .first()
            .copied()
            .ok_or(ContractReadError::Compatibility)
    }
}

impl<S, H: HasHost<S>> HostCis2Ext<S> for H {}

/// Payment and NFT custody of an auction instance, backed by CIS-2 contracts.
///
/// CIS-2 has no allowances. An account allows the auction to pull its whole
/// balance by adding the auction as an operator on the payment token contract.
pub struct Cis2Custody<'a, H> {
    host: &'a mut H,
    self_address: ContractAddress,
    payment_token: Token,
    collateral_token: Token,
}

impl<'a, H: HasHost<State>> Cis2Custody<'a, H> {
    pub fn new(host: &'a mut H, self_address: ContractAddress, config: &AuctionConfig) -> Self {
        Self {
            host,
            self_address,
            payment_token: config.payment_token.clone(),
            collateral_token: config.collateral_token.clone(),
        }
    }

    fn self_receiver(&self) -> Receiver {
        Receiver::Contract(
            self.self_address,
            OwnedEntrypointName::new_unchecked(ON_RECEIVING_CIS2_ENTRYPOINT.into()),
        )
    }
}

impl<'a, H: HasHost<State>> PaymentLedger for Cis2Custody<'a, H> {
    fn allowance_of(&self, owner: &AccountAddress) -> AuctionResult<BidAmount> {
        let owner = Address::Account(*owner);
        let is_operator = self.host.cis2_operator_of(
            &self.payment_token.contract,
            owner,
            Address::Contract(self.self_address),
        )?;

        if !is_operator {
            return Ok(0);
        }

        let balance = self.host.cis2_balance_of(&self.payment_token, owner)?;
        Ok(balance.0)
    }

    fn transfer_from(&mut self, owner: &AccountAddress, amount: BidAmount) -> AuctionResult<()> {
        let to = self.self_receiver();
        self.host.cis2_transfer(
            &self.payment_token,
            Address::Account(*owner),
            to,
            TokenAmountU64(amount),
        )?;
        Ok(())
    }

    fn transfer(&mut self, destination: &AccountAddress, amount: BidAmount) -> AuctionResult<()> {
        self.host.cis2_transfer(
            &self.payment_token,
            Address::Contract(self.self_address),
            Receiver::Account(*destination),
            TokenAmountU64(amount),
        )?;
        Ok(())
    }
}

impl<'a, H: HasHost<State>> AssetRegistry for Cis2Custody<'a, H> {
    fn transfer_asset(
        &mut self,
        owner: &AccountAddress,
        destination: &AccountAddress,
    ) -> AuctionResult<()> {
        self.host.cis2_transfer(
            &self.collateral_token,
            Address::Account(*owner),
            Receiver::Account(*destination),
            TokenAmountU64(1),
        )?;
        Ok(())
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use crate::external::InitParams;
    use crate::test::*;
    use std::{cell::RefCell, rc::Rc};
    use test_infrastructure::*;

    const SELLER: AccountAddress = AccountAddress([0u8; 32]);
    const ALICE: AccountAddress = AccountAddress([1u8; 32]);

    fn new_host() -> TestHost<State> {
        let state = State::new(
            SELLER,
            InitParams {
                payment_token: payment_token(),
                collateral_token: collateral_token(),
                reserve_price: 10,
                auction_window: 100,
                price_decrement: 1,
                step_duration: Duration::from_seconds(1),
            },
            0,
        )
        .expect_report("Valid config");
        TestHost::new(state, TestStateBuilder::new())
    }

    fn setup_token(host: &mut TestHost<State>) -> Rc<RefCell<TestToken>> {
        let token = Rc::new(RefCell::new(TestToken::default()));
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
        token
    }

    #[concordium_test]
    fn test_allowance_requires_operator() {
        let mut host = new_host();
        let token = setup_token(&mut host);
        token.borrow_mut().mint(Address::Account(ALICE), 200);
        let config = host.state().config.clone();

        let custody = Cis2Custody::new(&mut host, AUCTION, &config);
        claim_eq!(custody.allowance_of(&ALICE), Ok(0));

        token.borrow_mut().approve(
            Address::Account(ALICE),
            Address::Contract(AUCTION),
            200,
        );
        claim_eq!(custody.allowance_of(&ALICE), Ok(200));
    }

    #[concordium_test]
    fn test_pull_and_push_payment() {
        let mut host = new_host();
        let token = setup_token(&mut host);
        token.borrow_mut().mint(Address::Account(ALICE), 200);
        token.borrow_mut().approve(
            Address::Account(ALICE),
            Address::Contract(AUCTION),
            200,
        );
        let config = host.state().config.clone();

        let mut custody = Cis2Custody::new(&mut host, AUCTION, &config);
        claim_eq!(custody.transfer_from(&ALICE, 120), Ok(()));
        claim_eq!(token.borrow().balance_of(&Address::Account(ALICE)), 80);
        claim_eq!(token.borrow().balance_of(&Address::Contract(AUCTION)), 120);

        claim_eq!(custody.transfer(&SELLER, 120), Ok(()));
        claim_eq!(token.borrow().balance_of(&Address::Account(SELLER)), 120);

        claim_eq!(
            custody.transfer(&SELLER, 1),
            Err(crate::errors::AuctionError::TransferFailed)
        );
    }

    #[concordium_test]
    fn test_transfer_asset() {
        let mut host = new_host();
        let nft = Rc::new(RefCell::new(TestNft::default()));
        nft.borrow_mut()
            .mint(collateral_token().id, Address::Account(SELLER))
            .expect_report("Fresh token id");
        host.setup_mock_entrypoint(
            NFT_CONTRACT,
            OwnedEntrypointName::new_unchecked(TRANSFER_ENTRYPOINT.into()),
            nft_transfer_mock(nft.clone(), Address::Contract(AUCTION)),
        );
        let config = host.state().config.clone();

        let mut custody = Cis2Custody::new(&mut host, AUCTION, &config);
        claim_eq!(
            custody.transfer_asset(&SELLER, &ALICE),
            Err(crate::errors::AuctionError::TransferFailed)
        );

        nft.borrow_mut()
            .approve(Address::Account(SELLER), Address::Contract(AUCTION));
        claim_eq!(custody.transfer_asset(&SELLER, &ALICE), Ok(()));
        claim_eq!(
            nft.borrow().owner_of(&collateral_token().id),
            Some(Address::Account(ALICE))
        );
    }
}
