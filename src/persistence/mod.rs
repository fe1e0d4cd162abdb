//! Ledger store: the transactional contract, its Postgres and in-memory
//! implementations, and the SQL access functions behind the Postgres one.

mod accounts;
mod assets;
mod memory;
mod pg;
mod pool;
mod positions;
mod store;
mod trades;

pub use memory::{MemoryLedgerStore, MemoryTxn};
pub use pg::{PgLedgerStore, PgLedgerTxn};
pub use pool::{create_pool_and_migrate, run_migrations};
pub use sqlx::PgPool;
pub use store::{LedgerStore, LedgerTxn};
