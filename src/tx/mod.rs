//! Transaction submission module with nonce allocation and fee selection

mod gas;
mod nonce;
mod payload;
mod sender;

pub use gas::{
    detector_for, BaseFeeProbe, FeeScheme, FeeSchemeDetector, FixedScheme, GasEstimator,
    GasPrice, DEFAULT_GAS_LIMIT, LEGACY_PRICE_BUMP,
};
pub use nonce::{NonceManager, NonceReservation};
pub use payload::{encode_token_transfer, TransferTarget, TRANSFER_SELECTOR};
pub use sender::{
    classify_submission_error, SignedTransfer, SubmissionFailure, TransactionSender,
    TransferConfig,
};
