pub mod catalog;
pub mod checkout;
pub mod ledger;
pub mod reconciler;
