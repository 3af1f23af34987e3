use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::{BlockView, TransactionView};
use crate::blockchain::{Address, Blockchain, BlockchainError, Transaction, Wallets};

/// Shared state behind every handler
pub struct AppState {
    /// The ledger handle; a single writer at a time
    pub chain: Mutex<Blockchain>,

    /// Wallets owned by this node
    pub wallets: Mutex<Wallets>,

    /// Where `wallets` is persisted
    pub wallet_file: PathBuf,
}

impl AppState {
    pub fn new(chain: Blockchain, wallets: Wallets, wallet_file: PathBuf) -> Self {
        AppState {
            chain: Mutex::new(chain),
            wallets: Mutex::new(wallets),
            wallet_file,
        }
    }
}

/// Data structure for the application state
pub type AppData = web::Data<AppState>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The number of blocks in the chain
    pub length: usize,

    /// The blocks, newest first
    pub blocks: Vec<BlockView>,

    /// Whether the whole chain is valid
    pub is_valid: bool,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// The sender's address; must be a wallet of this node
    pub from: String,

    /// The recipient's address
    pub to: String,

    /// The amount to transfer
    pub amount: u64,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransferResponse {
    /// Hash of the new transaction
    pub transaction_id: String,

    /// Hash of the block that holds it
    pub block_hash: String,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Maps a ledger error onto an HTTP response
fn chain_error_response(err: BlockchainError) -> HttpResponse {
    let mut builder = match &err {
        BlockchainError::TransactionError(_) | BlockchainError::InvalidTransaction(_) => {
            HttpResponse::BadRequest()
        }
        BlockchainError::NotFound | BlockchainError::TransactionNotFound(_) => HttpResponse::NotFound(),
        _ => {
            error!("Ledger error: {}", err);
            HttpResponse::InternalServerError()
        }
    };

    builder.json(error_body(err.to_string()))
}

/// Get the full blockchain
///
/// Returns every block from the tip back to genesis and the chain's validity
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_chain(state: AppData) -> impl Responder {
    let chain = state.chain.lock().unwrap_or_else(PoisonError::into_inner);

    let blocks = match chain.blocks() {
        Ok(blocks) => blocks,
        Err(err) => return chain_error_response(err),
    };
    let is_valid = match chain.validate_chain() {
        Ok(is_valid) => is_valid,
        Err(err) => return chain_error_response(err),
    };

    let response = ChainResponse {
        length: blocks.len(),
        blocks: blocks.iter().map(BlockView::from).collect(),
        is_valid,
    };

    HttpResponse::Ok().json(response)
}

/// Check if the blockchain is valid
///
/// Validates proofs, links and signatures of the entire chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn validate_chain(state: AppData) -> impl Responder {
    let chain = state.chain.lock().unwrap_or_else(PoisonError::into_inner);

    match chain.validate_chain() {
        Ok(is_valid) => HttpResponse::Ok().json(is_valid),
        Err(err) => chain_error_response(err),
    }
}

/// Create a new wallet
///
/// Generates a keypair, stores it in the node's wallet file and returns the address
#[utoipa::path(
    post,
    path = "/api/v1/wallets",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_wallet(state: AppData) -> impl Responder {
    let mut wallets = state.wallets.lock().unwrap_or_else(PoisonError::into_inner);
    let address = wallets.add_wallet();

    if let Err(err) = wallets.save_file(&state.wallet_file) {
        error!("Failed to save wallets: {}", err);
        return HttpResponse::InternalServerError()
            .json(error_body(format!("Failed to save wallet: {}", err)));
    }

    info!("Created wallet {}", address);
    HttpResponse::Created().json(WalletResponse { address: address.0 })
}

/// List wallets
///
/// Returns the addresses of every wallet held by this node
#[utoipa::path(
    get,
    path = "/api/v1/wallets",
    responses(
        (status = 200, description = "Wallet addresses", body = Vec<String>)
    )
)]
pub async fn list_wallets(state: AppData) -> impl Responder {
    let wallets = state.wallets.lock().unwrap_or_else(PoisonError::into_inner);
    HttpResponse::Ok().json(wallets.addresses())
}

/// Get balance
///
/// Returns the sum of all unspent outputs locked to an address
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 400, description = "Invalid address"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_balance(state: AppData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let pub_key_hash = match address.pub_key_hash() {
        Ok(hash) => hash,
        Err(err) => return HttpResponse::BadRequest().json(error_body(err.to_string())),
    };

    let chain = state.chain.lock().unwrap_or_else(PoisonError::into_inner);
    match chain.get_balance(&pub_key_hash) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse {
            address: address.0,
            balance,
        }),
        Err(err) => chain_error_response(err),
    }
}

/// Send coins
///
/// Builds and signs a transfer from one of this node's wallets, then mines
/// a block holding it
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = TransferRequest,
    responses(
        (status = 201, description = "Transaction mined successfully", body = TransferResponse),
        (status = 400, description = "Invalid address or insufficient funds"),
        (status = 404, description = "Sender wallet not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn send_transaction(state: AppData, request: web::Json<TransferRequest>) -> impl Responder {
    let request = request.into_inner();
    let recipient = match Address(request.to.clone()).pub_key_hash() {
        Ok(hash) => hash,
        Err(err) => {
            return HttpResponse::BadRequest().json(error_body(format!("Invalid recipient address: {}", err)))
        }
    };

    let sender = {
        let wallets = state.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        match wallets.get_wallet(&request.from) {
            Some(wallet) => wallet.clone(),
            None => {
                return HttpResponse::NotFound()
                    .json(error_body(format!("Wallet {} not found", request.from)))
            }
        }
    };

    // Mining runs on the blocking pool, off the worker thread
    let amount = request.amount;
    let mining_state = state.clone();
    let mined = web::block(move || -> Result<(Vec<u8>, Vec<u8>), BlockchainError> {
        let mut chain = mining_state.chain.lock().unwrap_or_else(PoisonError::into_inner);
        let transaction = Transaction::new_transfer(&sender, &recipient, amount, &chain)?;
        if !chain.verify_transaction(&transaction)? {
            return Err(BlockchainError::InvalidTransaction(hex::encode(&transaction.hash_id)));
        }

        let transaction_id = transaction.hash_id.clone();
        let block = chain.add_block(vec![transaction])?;
        Ok((transaction_id, block.hash))
    })
    .await;

    match mined {
        Ok(Ok((transaction_id, block_hash))) => {
            info!("Transferred {} from {} to {}", amount, request.from, request.to);
            HttpResponse::Created().json(TransferResponse {
                transaction_id: hex::encode(transaction_id),
                block_hash: hex::encode(block_hash),
            })
        }
        Ok(Err(err)) => chain_error_response(err),
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

/// Get a transaction
///
/// Looks up a persisted transaction by its hex encoded id
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    responses(
        (status = 200, description = "Transaction found", body = TransactionView),
        (status = 400, description = "Malformed transaction id"),
        (status = 404, description = "Transaction not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_transaction(state: AppData, id: web::Path<String>) -> impl Responder {
    let hash_id = match hex::decode(id.as_str()) {
        Ok(hash_id) => hash_id,
        Err(err) => {
            return HttpResponse::BadRequest().json(error_body(format!("Invalid transaction id: {}", err)))
        }
    };

    let chain = state.chain.lock().unwrap_or_else(PoisonError::into_inner);
    match chain.find_transaction(&hash_id) {
        Ok(transaction) => HttpResponse::Ok().json(TransactionView::from(&transaction)),
        Err(err) => chain_error_response(err),
    }
}

/// List unspent transactions
///
/// Returns the transactions still holding an unspent output for an address
#[utoipa::path(
    get,
    path = "/api/v1/unspent/{address}",
    responses(
        (status = 200, description = "Unspent transactions", body = Vec<TransactionView>),
        (status = 400, description = "Invalid address"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_unspent(state: AppData, address: web::Path<String>) -> impl Responder {
    let pub_key_hash = match Address(address.into_inner()).pub_key_hash() {
        Ok(hash) => hash,
        Err(err) => return HttpResponse::BadRequest().json(error_body(err.to_string())),
    };

    let chain = state.chain.lock().unwrap_or_else(PoisonError::into_inner);
    match chain.find_unspent_transactions(&pub_key_hash) {
        Ok(transactions) => {
            let views: Vec<TransactionView> = transactions.iter().map(TransactionView::from).collect();
            HttpResponse::Ok().json(views)
        }
        Err(err) => chain_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::ChainStore;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    struct Fixture {
        state: AppData,
        alice: Address,
        bob: Address,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut wallets = Wallets::new();
        let alice = wallets.add_wallet();
        let bob = wallets.add_wallet();

        let store = ChainStore::temporary().unwrap();
        let chain = Blockchain::create(store, &alice.pub_key_hash().unwrap()).unwrap();
        let state = web::Data::new(AppState::new(chain, wallets, dir.path().join("wallets.json")));

        Fixture {
            state,
            alice,
            bob,
            _dir: dir,
        }
    }

    #[actix_web::test]
    async fn test_transfer_and_balances() {
        let fixture = fixture();
        let app = test::init_service(
            App::new()
                .app_data(fixture.state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions")
            .set_json(TransferRequest {
                from: fixture.alice.0.clone(),
                to: fixture.bob.0.clone(),
                amount: 30,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let transfer: TransferResponse = test::read_body_json(resp).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/transactions/{}", transfer.transaction_id))
            .to_request();
        let found: TransactionView = test::call_and_read_body_json(&app, req).await;
        assert_eq!(found.id, transfer.transaction_id);
        assert!(!found.is_coinbase);
        assert_eq!(found.outputs[0].value, 30);
        assert_eq!(found.outputs[0].address, fixture.bob.0);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/unspent/{}", fixture.bob))
            .to_request();
        let unspent: Vec<TransactionView> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].id, transfer.transaction_id);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/balance/{}", fixture.alice))
            .to_request();
        let body: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.balance, 70);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/balance/{}", fixture.bob))
            .to_request();
        let body: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.balance, 30);

        let req = test::TestRequest::get().uri("/api/v1/chain").to_request();
        let body: ChainResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.length, 2);
        assert!(body.is_valid);
        assert!(body.blocks.iter().all(|block| block.is_valid));
        assert!(body.blocks[1].prev_hash.is_empty());
    }

    #[actix_web::test]
    async fn test_transfer_errors() {
        let fixture = fixture();
        let app = test::init_service(
            App::new()
                .app_data(fixture.state.clone())
                .configure(configure_routes),
        )
        .await;

        // Insufficient funds
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions")
            .set_json(TransferRequest {
                from: fixture.bob.0.clone(),
                to: fixture.alice.0.clone(),
                amount: 1,
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        // Unknown sender wallet
        let outsider = crate::blockchain::crypto::Wallet::new();
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions")
            .set_json(TransferRequest {
                from: outsider.address().0.clone(),
                to: fixture.alice.0.clone(),
                amount: 1,
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        // Malformed address
        let req = test::TestRequest::get().uri("/api/v1/balance/nope").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        // Transaction lookups
        let req = test::TestRequest::get().uri("/api/v1/transactions/not-hex").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/transactions/{}", hex::encode([0u8; 32])))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_create_and_list_wallets() {
        let fixture = fixture();
        let app = test::init_service(
            App::new()
                .app_data(fixture.state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/wallets").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: WalletResponse = test::read_body_json(resp).await;

        let req = test::TestRequest::get().uri("/api/v1/wallets").to_request();
        let addresses: Vec<String> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(addresses.len(), 3);
        assert!(addresses.contains(&created.address));

        let saved = Wallets::load_file(&fixture.state.wallet_file).unwrap();
        assert_eq!(saved.addresses(), addresses);
    }
}
