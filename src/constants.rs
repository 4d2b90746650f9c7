/// Tag for the Custom Biding event.
pub const BIDING_TAG: u8 = u8::MAX - 11;

/// Tag for the Custom Finalize Biding event.
pub const FINALIZE_TAG: u8 = u8::MAX - 12;

/// Tag for the Custom Refund event.
pub const REFUND_TAG: u8 = u8::MAX - 23;

/// CIS-2 entrypoint used to move tokens.
pub const TRANSFER_ENTRYPOINT: &str = "transfer";

/// CIS-2 entrypoint used to query balances.
pub const BALANCE_OF_ENTRYPOINT: &str = "balanceOf";

/// CIS-2 entrypoint used to query operators.
pub const OPERATOR_OF_ENTRYPOINT: &str = "operatorOf";

/// CIS-2 receive hook called on the contract when it receives tokens.
pub const ON_RECEIVING_CIS2_ENTRYPOINT: &str = "onReceivingCIS2";
