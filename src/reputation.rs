//! Agent reputation ledger: trusted and blocked records persisted as a
//! single JSON document.

pub(crate) mod ledger;
pub mod records;

pub(crate) use ledger::ReputationLedger;
