// API module
//
// HTTP driver over the ledger: chain inspection, wallets, balances and transfers

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
