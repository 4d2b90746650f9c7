use concordium_cis2::*;
use concordium_std::*;

/// Contract token ID type.
pub type ContractTokenId = TokenIdVec;

/// Contract token amount type.
pub type ContractTokenAmount = TokenAmountU64;

/// Amount of payment token units.
pub type BidAmount = u64;

/// Index of a discrete auction step.
pub type Step = u64;

pub type TransferParameter = TransferParams<ContractTokenId, ContractTokenAmount>;

/// Parameter type for the CIS-2 function `balanceOf` specialized to the subset
/// of TokenIDs used by this contract.
pub type ContractBalanceOfQueryParams = BalanceOfQueryParams<ContractTokenId>;

/// Response type for the CIS-2 function `balanceOf` specialized to the subset
/// of TokenAmounts used by this contract.
pub type ContractBalanceOfQueryResponse = BalanceOfQueryResponse<ContractTokenAmount>;

/// Token
#[derive(Debug, Serialize, SchemaType, Hash, PartialEq, Eq, Clone)]
pub struct Token {
    pub contract: ContractAddress,
    pub id: ContractTokenId,
}
