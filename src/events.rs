use concordium_std::*;

use crate::constants::{BIDING_TAG, FINALIZE_TAG, REFUND_TAG};
use crate::types::{BidAmount, Step, Token};

/// Bid event data.
#[derive(Debug, Serial)]
pub struct BidEvent<'a> {
    /// Bidder account address.
    pub bidder: &'a AccountAddress,
    /// Bid amount in payment token units.
    pub amount: BidAmount,
    /// Step the bid was accepted at.
    pub step: Step,
}

/// Refund of an outbid bid.
#[derive(Debug, Serial)]
pub struct RefundEvent<'a> {
    pub bidder: &'a AccountAddress,
    pub amount: BidAmount,
}

/// Auction settlement event data.
#[derive(Debug, Serial)]
pub struct SettleEvent<'a> {
    /// The NFT sold.
    pub token: &'a Token,
    /// Address of the previous token owner.
    pub seller: &'a AccountAddress,
    /// Address of the auction winner.
    pub winner: &'a AccountAddress,
    /// Winning bid, paid to the seller.
    pub price: BidAmount,
    /// Step the auction was settled at.
    pub step: Step,
}

/// Tagged Custom event to be serialized for the event log.
#[derive(Debug)]
pub enum AuctionEvents<'a> {
    Bid(BidEvent<'a>),
    Refund(RefundEvent<'a>),
    Settle(SettleEvent<'a>),
}

impl<'a> AuctionEvents<'a> {
    pub fn bid(bidder: &'a AccountAddress, amount: BidAmount, step: Step) -> Self {
        Self::Bid(BidEvent {
            bidder,
            amount,
            step,
        })
    }

    pub fn refund(bidder: &'a AccountAddress, amount: BidAmount) -> Self {
        Self::Refund(RefundEvent { bidder, amount })
    }

    pub fn settle(
        token: &'a Token,
        seller: &'a AccountAddress,
        winner: &'a AccountAddress,
        price: BidAmount,
        step: Step,
    ) -> Self {
        Self::Settle(SettleEvent {
            token,
            seller,
            winner,
            price,
            step,
        })
    }
}

impl<'a> Serial for AuctionEvents<'a> {
    fn serial<W: Write>(&self, out: &mut W) -> Result<(), W::Err> {
        match self {
            AuctionEvents::Bid(event) => {
                out.write_u8(BIDING_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Refund(event) => {
                out.write_u8(REFUND_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Settle(event) => {
                out.write_u8(FINALIZE_TAG)?;
                event.serial(out)
            }
        }
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;

    #[concordium_test]
    fn test_events_are_tagged() {
        let bidder = AccountAddress([1u8; 32]);

        let bytes = to_bytes(&AuctionEvents::bid(&bidder, 120, 7));
        claim_eq!(bytes[0], BIDING_TAG);
        claim_eq!(bytes[1..33].to_vec(), bidder.0.to_vec());
        claim_eq!(bytes[33..41].to_vec(), 120u64.to_le_bytes().to_vec());
        claim_eq!(bytes[41..].to_vec(), 7u64.to_le_bytes().to_vec());

        let bytes = to_bytes(&AuctionEvents::refund(&bidder, 120));
        claim_eq!(bytes[0], REFUND_TAG);
        claim_eq!(bytes.len(), 1 + 32 + 8);
    }
}
