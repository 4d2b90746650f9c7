//! In-memory token contracts and `MockFn` helpers for tests.
use concordium_std::concordium_cfg_test;

#[concordium_cfg_test]
pub use inner::*;

#[concordium_cfg_test]
mod inner {
    use concordium_cis2::*;
    use concordium_std::collections::{HashMap as Map, HashSet as Set};
    use concordium_std::test_infrastructure::MockFn;
    use concordium_std::*;
    use std::{cell::RefCell, rc::Rc};

    use crate::errors::{AuctionError, AuctionResult};
    use crate::ledger::{AssetRegistry, PaymentLedger};
    use crate::types::*;

    /// Address of the auction instance under test.
    pub const AUCTION: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };

    /// Address of the fungible payment token contract.
    pub const PAYMENT_CONTRACT: ContractAddress = ContractAddress {
        index: 2,
        subindex: 0,
    };

    /// Address of the NFT contract.
    pub const NFT_CONTRACT: ContractAddress = ContractAddress {
        index: 3,
        subindex: 0,
    };

    pub fn payment_token() -> Token {
        Token {
            contract: PAYMENT_CONTRACT,
            id: TokenIdVec(vec![]),
        }
    }

    pub fn collateral_token() -> Token {
        Token {
            contract: NFT_CONTRACT,
            id: TokenIdVec(vec![0, 1]),
        }
    }

    /// Fungible token with ERC-20 style allowances.
    #[derive(Debug, Default)]
    pub struct TestToken {
        balances: Map<Address, u64>,
        allowances: Map<(Address, Address), u64>,
        rejected_receivers: Set<Address>,
    }

    impl TestToken {
        pub fn mint(&mut self, owner: Address, amount: u64) {
            *self.balances.entry(owner).or_insert(0) += amount;
        }

        pub fn burn(&mut self, owner: Address, amount: u64) -> AuctionResult<()> {
            let balance = self.balances.entry(owner).or_insert(0);
            *balance = balance
                .checked_sub(amount)
                .ok_or(AuctionError::TransferFailed)?;
            Ok(())
        }

        pub fn approve(&mut self, owner: Address, spender: Address, amount: u64) {
            self.allowances.insert((owner, spender), amount);
        }

        pub fn balance_of(&self, owner: &Address) -> u64 {
            self.balances.get(owner).copied().unwrap_or(0)
        }

        pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
            self.allowances
                .get(&(*owner, *spender))
                .copied()
                .unwrap_or(0)
        }

        /// Make every following transfer to `receiver` fail.
        pub fn reject_transfers_to(&mut self, receiver: Address) {
            self.rejected_receivers.insert(receiver);
        }

        /// Move tokens owned by `from`.
        pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> AuctionResult<()> {
            ensure!(
                !self.rejected_receivers.contains(&to),
                AuctionError::TransferFailed
            );
            self.burn(from, amount)?;
            self.mint(to, amount);
            Ok(())
        }

        /// Move tokens owned by `from` on behalf of `spender`.
        pub fn transfer_from(
            &mut self,
            spender: Address,
            from: Address,
            to: Address,
            amount: u64,
        ) -> AuctionResult<()> {
            let allowance = self.allowance(&from, &spender);
            if spender != from {
                ensure!(allowance >= amount, AuctionError::TransferFailed);
            }
            self.transfer(from, to, amount)?;
            if spender != from {
                self.approve(from, spender, allowance - amount);
            }
            Ok(())
        }
    }

    /// NFT registry with operator approvals.
    #[derive(Debug, Default)]
    pub struct TestNft {
        owners: Map<Vec<u8>, Address>,
        operators: Set<(Address, Address)>,
    }

    impl TestNft {
        pub fn mint(&mut self, id: ContractTokenId, owner: Address) -> AuctionResult<()> {
            ensure!(
                !self.owners.contains_key(&id.0),
                AuctionError::TransferFailed
            );
            self.owners.insert(id.0, owner);
            Ok(())
        }

        pub fn burn(&mut self, id: &ContractTokenId) -> AuctionResult<()> {
            self.owners
                .remove(&id.0)
                .map(|_| ())
                .ok_or(AuctionError::TransferFailed)
        }

        pub fn owner_of(&self, id: &ContractTokenId) -> Option<Address> {
            self.owners.get(&id.0).copied()
        }

        pub fn approve(&mut self, owner: Address, operator: Address) {
            self.operators.insert((owner, operator));
        }

        pub fn revoke(&mut self, owner: Address, operator: Address) {
            self.operators.remove(&(owner, operator));
        }

        pub fn is_operator(&self, owner: &Address, operator: &Address) -> bool {
            owner == operator || self.operators.contains(&(*owner, *operator))
        }

        pub fn transfer_from(
            &mut self,
            operator: Address,
            from: Address,
            to: Address,
            id: &ContractTokenId,
        ) -> AuctionResult<()> {
            ensure_eq!(
                self.owner_of(id),
                Some(from),
                AuctionError::TransferFailed
            );
            ensure!(
                self.is_operator(&from, &operator),
                AuctionError::TransferFailed
            );
            self.owners.insert(id.0.clone(), to);
            Ok(())
        }
    }

    /// Custody of a single auction over the in-memory token contracts.
    pub struct TestCustody {
        pub token: TestToken,
        pub nft: TestNft,
        engine: Address,
    }

    impl TestCustody {
        pub fn new(engine: ContractAddress) -> Self {
            Self {
                token: TestToken::default(),
                nft: TestNft::default(),
                engine: Address::Contract(engine),
            }
        }
    }

    impl PaymentLedger for TestCustody {
        fn allowance_of(&self, owner: &AccountAddress) -> AuctionResult<BidAmount> {
            Ok(self
                .token
                .allowance(&Address::Account(*owner), &self.engine))
        }

        fn transfer_from(&mut self, owner: &AccountAddress, amount: BidAmount) -> AuctionResult<()> {
            self.token
                .transfer_from(self.engine, Address::Account(*owner), self.engine, amount)
        }

        fn transfer(&mut self, destination: &AccountAddress, amount: BidAmount) -> AuctionResult<()> {
            self.token
                .transfer(self.engine, Address::Account(*destination), amount)
        }
    }

    impl AssetRegistry for TestCustody {
        fn transfer_asset(
            &mut self,
            owner: &AccountAddress,
            destination: &AccountAddress,
        ) -> AuctionResult<()> {
            self.nft.transfer_from(
                self.engine,
                Address::Account(*owner),
                Address::Account(*destination),
                &collateral_token().id,
            )
        }
    }

    fn receiver_address(receiver: &Receiver) -> Address {
        match receiver {
            Receiver::Account(account) => Address::Account(*account),
            Receiver::Contract(contract, _) => Address::Contract(*contract),
        }
    }

    /// CIS-2 `transfer` of the payment token, sent by `sender`.
    ///
    /// CIS-2 operators are modelled with allowances: a transfer by an operator
    /// consumes allowance.
    pub fn token_transfer_mock<S>(token: Rc<RefCell<TestToken>>, sender: Address) -> MockFn<S> {
        MockFn::new(
            move |parameter, _amount, _balance, _state| -> CallContractResult<()> {
                let TransferParams(transfers) =
                    TransferParameter::deserial(&mut Cursor::new(parameter))
                        .map_err(|_| CallContractError::Trap)?;
                let mut token = token.borrow_mut();
                for transfer in transfers {
                    token
                        .transfer_from(
                            sender,
                            transfer.from,
                            receiver_address(&transfer.to),
                            transfer.amount.0,
                        )
                        .map_err(|_| CallContractError::Trap)?;
                }
                Ok((false, Some(())))
            },
        )
    }

    /// CIS-2 `balanceOf` of the payment token.
    pub fn token_balance_of_mock<S>(token: Rc<RefCell<TestToken>>) -> MockFn<S> {
        MockFn::new(
            move |parameter, _amount, _balance, _state| -> CallContractResult<ContractBalanceOfQueryResponse> {
                let params = ContractBalanceOfQueryParams::deserial(&mut Cursor::new(parameter))
                    .map_err(|_| CallContractError::Trap)?;
                let token = token.borrow();
                let response = params
                    .queries
                    .iter()
                    .map(|query| TokenAmountU64(token.balance_of(&query.address)))
                    .collect();
                Ok((false, Some(BalanceOfQueryResponse(response))))
            },
        )
    }

    /// CIS-2 `operatorOf` of the payment token. Any allowance makes an operator.
    pub fn token_operator_of_mock<S>(token: Rc<RefCell<TestToken>>) -> MockFn<S> {
        MockFn::new(
            move |parameter, _amount, _balance, _state| -> CallContractResult<OperatorOfQueryResponse> {
                let params = OperatorOfQueryParams::deserial(&mut Cursor::new(parameter))
                    .map_err(|_| CallContractError::Trap)?;
                let token = token.borrow();
                let response = params
                    .queries
                    .iter()
                    .map(|query| token.allowance(&query.owner, &query.address) > 0)
                    .collect();
                Ok((false, Some(OperatorOfQueryResponse(response))))
            },
        )
    }

    /// CIS-2 `transfer` of the NFT, sent by `sender`.
    pub fn nft_transfer_mock<S>(nft: Rc<RefCell<TestNft>>, sender: Address) -> MockFn<S> {
        MockFn::new(
            move |parameter, _amount, _balance, _state| -> CallContractResult<()> {
                let TransferParams(transfers) =
                    TransferParameter::deserial(&mut Cursor::new(parameter))
                        .map_err(|_| CallContractError::Trap)?;
                let mut nft = nft.borrow_mut();
                for transfer in transfers {
                    if transfer.amount.0 != 1 {
                        return Err(CallContractError::Trap);
                    }
                    nft.transfer_from(
                        sender,
                        transfer.from,
                        receiver_address(&transfer.to),
                        &transfer.token_id,
                    )
                    .map_err(|_| CallContractError::Trap)?;
                }
                Ok((false, Some(())))
            },
        )
    }
}
