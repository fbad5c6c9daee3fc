pub mod ledger;
pub mod numbering;

pub use ledger::InvoiceLedgerService;
pub use numbering::InvoiceNumbering;
