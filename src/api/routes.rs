use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/wallets", web::post().to(handlers::create_wallet))
            .route("/wallets", web::get().to(handlers::list_wallets))
            .route("/balance/{address}", web::get().to(handlers::get_balance))
            .route("/unspent/{address}", web::get().to(handlers::get_unspent))
            .route("/transactions", web::post().to(handlers::send_transaction))
            .route("/transactions/{id}", web::get().to(handlers::get_transaction))
    );
}
