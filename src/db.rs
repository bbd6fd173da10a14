//! Database initialization for the application.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, transaction::create_transaction_table, user::create_user_table,
};

/// Create the application tables if they do not exist.
///
/// # Errors
///
/// This function will return an error if the SQL transaction could not be
/// created or committed, or if creating a table failed.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let sql_transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&sql_transaction)?;
    create_transaction_table(&sql_transaction)?;

    sql_transaction.commit()?;

    Ok(())
}
