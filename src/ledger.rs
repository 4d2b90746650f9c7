use concordium_std::*;

use crate::errors::AuctionResult;
use crate::types::BidAmount;

/// Custody of the fungible payment token.
///
/// A ledger handle is bound to one auction: "the engine" below is the custody
/// account of that auction. Transfers are final: the engine does not roll
/// them back when a later step of the same operation fails.
pub trait PaymentLedger {
    /// Amount `owner` allows the engine to pull.
    fn allowance_of(&self, owner: &AccountAddress) -> AuctionResult<BidAmount>;

    /// Pull `amount` from `owner` into engine custody. Fails with
    /// `TransferFailed` when the ledger rejects the transfer.
    fn transfer_from(&mut self, owner: &AccountAddress, amount: BidAmount) -> AuctionResult<()>;

    /// Push `amount` out of engine custody to `destination`.
    fn transfer(&mut self, destination: &AccountAddress, amount: BidAmount) -> AuctionResult<()>;
}

/// Custody of the auctioned NFT.
///
/// There is no owner query: CIS-2 can only answer balances of known
/// addresses. The registry checks ownership and authorization in
/// [`AssetRegistry::transfer_asset`]. Like ledger transfers, a moved asset
/// is not moved back by the engine.
pub trait AssetRegistry {
    /// Move the auctioned NFT from `owner` to `destination`. The registry checks
    /// that `owner` authorized the engine beforehand.
    fn transfer_asset(
        &mut self,
        owner: &AccountAddress,
        destination: &AccountAddress,
    ) -> AuctionResult<()>;
}
