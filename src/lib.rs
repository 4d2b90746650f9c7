//! Dutch auction for a single CIS-2 NFT, paid for in a fungible CIS-2 token.
//!
//! The price starts at `reserve_price + auction_window * price_decrement` and
//! falls by `price_decrement` every step until it reaches the reserve price.
//! Bidders escrow their bid with the contract; a higher bid refunds the
//! previous one. The seller settles the auction, which sends the NFT to the
//! highest bidder and the escrowed bid to the seller.
#![cfg_attr(not(feature = "std"), no_std)]

mod cis2;
mod constants;
mod contract;
mod errors;
mod events;
mod external;
mod ledger;
mod state;
mod types;

pub mod test;

pub use crate::{
    cis2::{Cis2Custody, HostCis2Ext},
    constants::*,
    errors::*,
    events::*,
    external::*,
    ledger::{AssetRegistry, PaymentLedger},
    state::{step_at, AuctionConfig, Bid, Settlement, State},
    types::*,
};
