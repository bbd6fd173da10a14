//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, user::UserID};

/// The ID of a transaction in the database.
pub type TransactionId = i64;

// ============================================================================
// MODELS
// ============================================================================

/// Whether a transaction brings money in or takes it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money earned, e.g. a salary deposit.
    Income,
    /// Money spent, e.g. a grocery run.
    Expense,
}

impl TransactionKind {
    /// The string form stored in the database and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// The label used in notification messages, e.g. "Income of R$ 50,00".
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
        }
    }

    fn from_db(value: &str) -> Option<Self> {
        match value {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            _ => None,
        }
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// Whether this transaction is an income or an expense.
    pub kind: TransactionKind,
    /// The amount of money spent or earned in this transaction, in reais.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// The ID of the user who owns this transaction.
    pub user_id: UserID,
}

/// The data needed to insert a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether the transaction is an income or an expense.
    pub kind: TransactionKind,
    /// The monetary amount of the transaction, in reais.
    pub amount: f64,
    /// The date when the transaction occurred.
    pub date: Date,
    /// A human-readable description of the transaction.
    pub description: String,
    /// The user who owns the transaction.
    pub user_id: UserID,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (kind, amount, date, description, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, kind, amount, date, description, user_id",
        )?
        .query_row(
            (
                new_transaction.kind.as_str(),
                new_transaction.amount,
                new_transaction.date,
                new_transaction.description,
                new_transaction.user_id.as_i64(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Overwrite the transaction `id` owned by `user_id` with new values.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a transaction
///   owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    updated: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "UPDATE \"transaction\"
             SET kind = ?1, amount = ?2, date = ?3, description = ?4
             WHERE id = ?5 AND user_id = ?6
             RETURNING id, kind, amount, date, description, user_id",
        )?
        .query_row(
            (
                updated.kind.as_str(),
                updated.amount,
                updated.date,
                updated.description,
                id,
                updated.user_id.as_i64(),
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => error.into(),
        })
}

/// The number of rows removed by a delete.
pub type RowsAffected = usize;

/// Delete the transaction `id` owned by `user_id`.
///
/// Returns the number of rows deleted; zero means the transaction did not
/// exist (or belongs to another user), which callers surface as
/// [Error::DeleteMissingTransaction].
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn delete_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<RowsAffected, Error> {
    connection
        .execute(
            "DELETE FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
            &[(":id", &id), (":user_id", &user_id.as_i64())],
        )
        .map_err(|error| error.into())
}

/// Retrieve a transaction owned by `user_id` from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, kind, amount, date, description, user_id
             FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve all transactions owned by `user_id`, most recent first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn list_transactions(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, kind, amount, date, description, user_id
             FROM \"transaction\" WHERE user_id = :user_id
             ORDER BY date DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;

    let raw_kind: String = row.get(1)?;
    let kind = TransactionKind::from_db(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown transaction kind {raw_kind:?}").into(),
        )
    })?;

    let amount = row.get(2)?;
    let date = row.get(3)?;
    let description = row.get(4)?;
    let user_id = UserID::new(row.get(5)?);

    Ok(Transaction {
        id,
        kind,
        amount,
        date,
        description,
        user_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        transaction::{
            NewTransaction, TransactionKind, count_transactions, create_transaction,
            delete_transaction, get_transaction, list_transactions, update_transaction,
        },
        user::{UserID, UserRole, create_user},
    };

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let user = create_user("Ana", UserRole::Usuario, &conn).unwrap();

        (conn, user.id)
    }

    fn expense(amount: f64, description: &str, user_id: UserID) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            amount,
            date: date!(2025 - 10 - 05),
            description: description.to_owned(),
            user_id,
        }
    }

    #[test]
    fn create_succeeds() {
        let (conn, user_id) = get_test_connection();
        let amount = 12.3;

        let result = create_transaction(expense(amount, "Lunch", user_id), &conn);

        match result {
            Ok(transaction) => {
                assert_eq!(transaction.amount, amount);
                assert_eq!(transaction.kind, TransactionKind::Expense);
                assert_eq!(transaction.user_id, user_id);
            }
            Err(error) => panic!("Unexpected error: {error}"),
        }
    }

    #[test]
    fn update_succeeds() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(expense(12.3, "Lunch", user_id), &conn).unwrap();

        let updated = update_transaction(
            transaction.id,
            NewTransaction {
                kind: TransactionKind::Income,
                amount: 99.0,
                date: date!(2025 - 10 - 06),
                description: "Refund".to_owned(),
                user_id,
            },
            &conn,
        )
        .unwrap();

        assert_eq!(updated.id, transaction.id);
        assert_eq!(updated.kind, TransactionKind::Income);
        assert_eq!(updated.amount, 99.0);
        assert_eq!(updated.description, "Refund");
    }

    #[test]
    fn update_fails_on_missing_transaction() {
        let (conn, user_id) = get_test_connection();

        let result = update_transaction(42, expense(1.0, "", user_id), &conn);

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
    }

    #[test]
    fn update_fails_on_other_users_transaction() {
        let (conn, user_id) = get_test_connection();
        let other_id = UserID::new(user_id.as_i64() + 1);
        let transaction = create_transaction(expense(12.3, "Lunch", user_id), &conn).unwrap();

        let result = update_transaction(transaction.id, expense(1.0, "", other_id), &conn);

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
    }

    #[test]
    fn delete_removes_transaction() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(expense(1.23, "Test", user_id), &conn).unwrap();

        let rows_affected = delete_transaction(transaction.id, user_id, &conn).unwrap();

        assert_eq!(rows_affected, 1);
        assert_eq!(
            get_transaction(transaction.id, user_id, &conn),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn delete_skips_other_users_transaction() {
        let (conn, user_id) = get_test_connection();
        let other_id = UserID::new(user_id.as_i64() + 1);
        let transaction = create_transaction(expense(1.23, "Test", user_id), &conn).unwrap();

        let rows_affected = delete_transaction(transaction.id, other_id, &conn).unwrap();

        assert_eq!(rows_affected, 0);
    }

    #[test]
    fn list_returns_only_own_transactions() {
        let (conn, user_id) = get_test_connection();
        let mine = create_transaction(expense(1.0, "Mine", user_id), &conn).unwrap();

        let other = crate::user::create_user("Bruno", UserRole::Usuario, &conn).unwrap();
        create_transaction(expense(2.0, "Theirs", other.id), &conn).unwrap();

        let transactions = list_transactions(user_id, &conn).unwrap();

        assert_eq!(transactions, vec![mine]);
    }

    #[test]
    fn get_count() {
        let (conn, user_id) = get_test_connection();
        let want_count = 20;
        for i in 1..=want_count {
            create_transaction(expense(i as f64, "", user_id), &conn)
                .expect("Could not create transaction");
        }

        let got_count = count_transactions(&conn).expect("Could not get count");

        assert_eq!(want_count, got_count);
    }
}
