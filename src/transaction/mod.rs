//! Transaction management.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and database functions for storing and querying
//! - The JSON endpoints for creating, updating, deleting and listing
//!   transactions, each of which emits a notification after a successful
//!   mutation
//!
//! The endpoints act as the effective session user, so an admin impersonating
//! someone mutates (and notifies) that user's data, not their own.

mod core;
mod create_endpoint;
mod delete_endpoint;
mod list_endpoint;
mod update_endpoint;

pub use core::{
    NewTransaction, Transaction, TransactionId, TransactionKind, create_transaction_table,
    map_transaction_row,
};
pub use create_endpoint::create_transaction_endpoint;
pub use delete_endpoint::delete_transaction_endpoint;
pub use list_endpoint::list_transactions_endpoint;
pub use update_endpoint::update_transaction_endpoint;

#[cfg(test)]
pub use core::{
    count_transactions, create_transaction, delete_transaction, get_transaction,
    list_transactions, update_transaction,
};
